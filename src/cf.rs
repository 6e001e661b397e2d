//! Invocation of the CLI under test inside an isolated `CF_HOME`

use crate::cf_home::{CfConfig, CfHome};
use crate::config::{BrokerConfig, Credentials, HarnessConfig};
use crate::error::Result;
use crate::fixtures::names::NameGenerator;
use crate::matcher::Timeouts;
use crate::process::{Session, SessionBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Everything needed to invoke the CLI, minus the per-scenario home
#[derive(Debug, Clone)]
pub struct CfSettings {
    pub binary: PathBuf,
    pub api: Option<String>,
    pub skip_ssl_validation: bool,
    pub credentials: Credentials,
    pub broker: BrokerConfig,
    pub timeouts: Timeouts,
    pub dial_seconds: u64,
    pub names: NameGenerator,
}

impl CfSettings {
    pub fn from_config(config: &HarnessConfig) -> anyhow::Result<Self> {
        Ok(Self {
            binary: config.cli_binary()?,
            api: config.api.clone(),
            skip_ssl_validation: config.skip_ssl_validation,
            credentials: config.credentials()?,
            broker: config.service_broker.clone(),
            timeouts: config.matcher_timeouts()?,
            dial_seconds: config.timeouts.dial_seconds,
            names: NameGenerator::new(config.name_prefix.clone()),
        })
    }

    /// Settings for a local binary with no platform behind it
    pub fn offline(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            api: None,
            skip_ssl_validation: false,
            credentials: Credentials::User {
                username: "admin".to_string(),
                password: "admin".to_string(),
            },
            broker: BrokerConfig::default(),
            timeouts: Timeouts::default(),
            dial_seconds: 15,
            names: NameGenerator::default(),
        }
    }
}

/// The CLI bound to one scenario's home directory
#[derive(Debug)]
pub struct Cf {
    settings: CfSettings,
    home: CfHome,
    env: HashMap<String, String>,
}

impl Cf {
    pub fn new(settings: CfSettings) -> Result<Self> {
        Ok(Self::with_home(settings, CfHome::new()?))
    }

    /// A CLI whose home starts from `config` (typically a logged-in seed)
    pub fn with_config(settings: CfSettings, config: &CfConfig) -> Result<Self> {
        Ok(Self::with_home(settings, CfHome::with_config(config)?))
    }

    pub fn with_home(settings: CfSettings, home: CfHome) -> Self {
        Self {
            settings,
            home,
            env: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &CfSettings {
        &self.settings
    }

    pub fn home(&self) -> &CfHome {
        &self.home
    }

    pub fn names(&self) -> &NameGenerator {
        &self.settings.names
    }

    pub fn timeouts(&self) -> Timeouts {
        self.settings.timeouts
    }

    pub fn binary(&self) -> &Path {
        &self.settings.binary
    }

    /// Environment applied to every invocation from this handle
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn config(&self) -> Result<CfConfig> {
        self.home.load()
    }

    /// Rewrite the persisted session directly (e.g. to plant a stale token)
    pub fn set_config<F>(&self, mutate: F) -> Result<CfConfig>
    where
        F: FnOnce(&mut CfConfig),
    {
        self.home.update(mutate)
    }

    pub fn command<I, S>(&self, args: I) -> SessionBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SessionBuilder::new(self.settings.binary.to_string_lossy().into_owned())
            .args(args)
            .env("CF_HOME", self.home.path().to_string_lossy().into_owned())
            .env("CF_DIAL_TIMEOUT", self.settings.dial_seconds.to_string())
            .envs(self.env.clone())
            .timeouts(self.settings.timeouts)
    }

    pub async fn run(&self, args: &[&str]) -> Result<Session> {
        self.command(args.iter().copied()).start().await
    }

    /// Run with `input` fed on stdin, then closed
    pub async fn run_with_stdin(&self, input: &[u8], args: &[&str]) -> Result<Session> {
        self.command(args.iter().copied())
            .stdin_bytes(input)
            .start()
            .await
    }

    /// Run with stdin held open for prompt/response exchanges
    pub async fn run_interactive(&self, args: &[&str]) -> Result<Session> {
        self.command(args.iter().copied())
            .interactive()
            .start()
            .await
    }

    /// Run with extra environment overrides for this invocation only
    pub async fn run_with_env(&self, env: &HashMap<String, String>, args: &[&str]) -> Result<Session> {
        self.command(args.iter().copied())
            .envs(env.clone())
            .start()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_points_cli_at_home() {
        let cf = Cf::new(CfSettings::offline("/usr/bin/cf")).unwrap();
        let builder = cf.command(["target", "-o", "org"]);
        assert_eq!(builder.command_line(), "/usr/bin/cf target -o org");
    }

    #[tokio::test]
    async fn test_cf_home_is_exported() {
        let cf = Cf::new(CfSettings::offline("sh")).unwrap();
        let session = cf.run(&["-c", "echo $CF_HOME"]).await.unwrap();
        session
            .say(regex::escape(&cf.home().path().to_string_lossy()))
            .await
            .unwrap();
        session.exit(0).await.unwrap();
    }

    #[tokio::test]
    async fn test_per_call_env_overrides() {
        let mut cf = Cf::new(CfSettings::offline("sh")).unwrap();
        cf.set_env("CF_COLOR", "false");
        let mut env = HashMap::new();
        env.insert("CF_USERNAME".to_string(), "someone".to_string());

        let session = cf
            .run_with_env(&env, &["-c", "echo $CF_COLOR $CF_USERNAME"])
            .await
            .unwrap();
        session.say("false someone").await.unwrap();
        session.exit(0).await.unwrap();
    }
}
