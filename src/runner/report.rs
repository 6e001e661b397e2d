use crate::runner::pool::ScenarioResult;
use crate::scenario::Outcome;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub skipped: usize,
    pub timed_out: usize,
}

impl Summary {
    pub fn of(results: &[ScenarioResult]) -> Self {
        let mut summary = Summary {
            total: results.len(),
            ..Summary::default()
        };
        for result in results {
            match result.outcome {
                Outcome::Passed => summary.passed += 1,
                Outcome::Failed(_) => summary.failed += 1,
                Outcome::Pending => summary.pending += 1,
                Outcome::Skipped(_) => summary.skipped += 1,
                Outcome::TimedOut => summary.timed_out += 1,
            }
        }
        summary
    }
}

/// Results of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub duration_secs: f64,
    pub results: Vec<ScenarioResult>,
}

impl Report {
    pub fn new(results: Vec<ScenarioResult>, duration: Duration) -> Self {
        Self {
            summary: Summary::of(&results),
            duration_secs: duration.as_secs_f64(),
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.summary.failed == 0 && self.summary.timed_out == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.results.iter().filter(|r| r.outcome.is_failure())
    }

    /// Human-readable summary for the terminal
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in self.failures() {
            out.push_str(&format!("\n❌ {}\n", result.name));
            match &result.outcome {
                Outcome::Failed(detail) => {
                    for line in detail.lines() {
                        out.push_str(&format!("   {}\n", line));
                    }
                }
                Outcome::TimedOut => out.push_str("   did not finish before the suite timeout\n"),
                _ => {}
            }
        }

        let s = &self.summary;
        out.push_str(&format!(
            "\n🧪 Ran {} of {} scenarios in {:.1}s\n",
            s.passed + s.failed + s.timed_out,
            s.total,
            self.duration_secs
        ));
        out.push_str(&format!("✅ {} passed\n", s.passed));
        if s.failed > 0 {
            out.push_str(&format!("❌ {} failed\n", s.failed));
        }
        if s.timed_out > 0 {
            out.push_str(&format!("⏰ {} timed out\n", s.timed_out));
        }
        if s.pending > 0 {
            out.push_str(&format!("⏸️  {} pending\n", s.pending));
        }
        if s.skipped > 0 {
            out.push_str(&format!("⏭️  {} skipped\n", s.skipped));
        }
        out
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write report: {}", path.display()))
    }
}
