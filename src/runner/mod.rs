//! Runs loaded suites on a worker pool and collects a report

pub mod pool;
pub mod report;

pub use pool::{Job, ScenarioResult, WorkerPool};
pub use report::{Report, Summary};

use crate::cf::{Cf, CfSettings};
use crate::config::HarnessConfig;
use crate::scenario::{ScenarioContext, Suite};
use anyhow::{Context, Result};
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// `--focus` / `--skip` selection over scenario names
#[derive(Debug, Clone, Default)]
pub struct Filter {
    focus: Option<Regex>,
    skip: Option<Regex>,
}

impl Filter {
    pub fn new(focus: Option<&str>, skip: Option<&str>) -> Result<Self> {
        let compile = |pattern: Option<&str>, flag: &str| -> Result<Option<Regex>> {
            pattern
                .map(|p| Regex::new(p).with_context(|| format!("Invalid --{} regex: {}", flag, p)))
                .transpose()
        };
        Ok(Self {
            focus: compile(focus, "focus")?,
            skip: compile(skip, "skip")?,
        })
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.focus.as_ref().map_or(true, |re| re.is_match(name))
            && !self.skip.as_ref().is_some_and(|re| re.is_match(name))
    }
}

/// One job per leaf the filter accepts, suites in order
pub fn plan(suites: Vec<Suite>, filter: &Filter) -> Vec<Job> {
    let mut jobs = Vec::new();
    for suite in suites {
        let suite = Arc::new(suite);
        for (leaf, entry) in suite.leaves.iter().enumerate() {
            if filter.accepts(&entry.name) {
                jobs.push(Job {
                    suite: Arc::clone(&suite),
                    leaf,
                });
            }
        }
    }
    jobs
}

/// Log in once and keep the resulting session as every scenario's seed
pub async fn prepare_context(settings: CfSettings) -> Result<ScenarioContext> {
    if settings.api.is_none() {
        warn!("CF_INT_API is not set; scenarios needing a platform will be skipped");
        return Ok(ScenarioContext::offline(settings));
    }

    let seed = Cf::new(settings.clone())?;
    seed.login()
        .await
        .with_context(|| "Failed to log in to the platform")?;
    let config = seed.config()?;
    info!("Logged in to {}", config.target);
    Ok(ScenarioContext {
        settings,
        seed: Some(config),
    })
}

/// Load-to-report pipeline behind `cf-int run`.
///
/// `None` when `interrupted` completes first; fixtures of the scenarios
/// still running are removed before returning.
pub async fn run<F>(
    config: &HarnessConfig,
    suites: Vec<Suite>,
    filter: &Filter,
    workers: Option<usize>,
    interrupted: F,
) -> Result<Option<Report>>
where
    F: Future,
{
    let settings = CfSettings::from_config(config)?;
    let ctx = Arc::new(prepare_context(settings).await?);

    let jobs = plan(suites, filter);
    let pool = WorkerPool::new(workers.unwrap_or_else(|| config.workers()), config.suite_timeout()?);
    info!("Running {} scenarios on {} workers", jobs.len(), pool.size());

    let started = Instant::now();
    tokio::select! {
        results = pool.run(Arc::clone(&ctx), jobs) => {
            Ok(Some(Report::new(results, started.elapsed())))
        }
        _ = interrupted => {
            // dropping the run aborted its scenarios before their teardown
            warn!("Run interrupted, removing fixtures of unfinished scenarios");
            pool.clean_up(&ctx).await;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter() {
        let all = Filter::default();
        assert!(all.accepts("anything"));

        let filter = Filter::new(Some("allow-space-ssh"), Some("--help")).unwrap();
        assert!(filter.accepts("allow-space-ssh when ssh is disallowed enables ssh"));
        assert!(!filter.accepts("allow-space-ssh --help displays command usage"));
        assert!(!filter.accepts("orgs when listing"));

        assert!(Filter::new(Some("("), None).is_err());
    }

    #[test]
    fn test_plan_applies_filter() {
        let suite = Suite::from_yaml(
            "command: orgs\nmissing_argument: NAME\nscenarios:\n  - when: a\n    cases:\n      - it: b\n",
        )
        .unwrap();
        let jobs = plan(vec![suite], &Filter::new(None, Some("not provided")).unwrap());
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name(), "orgs when a b");
    }

    #[tokio::test]
    async fn test_offline_context() {
        let ctx = prepare_context(CfSettings::offline("cf")).await.unwrap();
        assert!(ctx.seed.is_none());
    }
}
