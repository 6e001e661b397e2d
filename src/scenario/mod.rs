//! Declarative scenario suites: YAML model, placeholders and execution

pub mod executor;
pub mod model;
pub mod placeholder;

pub use executor::{run_leaf, run_leaf_with, Outcome, ScenarioContext};
pub use model::{Leaf, LeafKind, Step, Suite};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default location of suite files
pub const DEFAULT_SUITE_DIR: &str = "suites";

fn is_suite_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Expand directories into their suite files, sorted by name
pub fn discover(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read suite directory: {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_suite_file(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

/// Load and validate every suite under `paths`
pub fn load_suites(paths: &[PathBuf]) -> Result<Vec<Suite>> {
    discover(paths)?
        .iter()
        .map(|path| Suite::from_file(path))
        .collect()
}
