pub mod helper;

use crate::matcher::Timeouts;
use anyhow::{anyhow, Context, Result};
use helper::{parse_bool, parse_duration};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Harness configuration: where the platform is, who to log in as, how long
/// to wait. Loaded from an optional YAML file, then overridden by `CF_INT_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct HarnessConfig {
    /// Platform API endpoint; scenarios needing a platform skip without it
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub skip_ssl_validation: bool,
    /// Path to the CLI under test; looked up on PATH when unset
    #[serde(default)]
    pub cli: Option<PathBuf>,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Broker registered by service fixtures
    #[serde(default)]
    pub service_broker: BrokerConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Authenticate with client credentials instead of a user
    #[serde(default)]
    pub client_credentials: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Where a running broker app answers; service fixtures need it
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_broker_username")]
    pub username: String,
    #[serde(default = "default_broker_password")]
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutsConfig {
    #[serde(default = "default_eventually")]
    pub eventually: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    #[serde(default = "default_consistently")]
    pub consistently: String,
    /// Upper bound for a whole `run`
    #[serde(default = "default_suite")]
    pub suite: String,
    /// Passed to the CLI as CF_DIAL_TIMEOUT (seconds)
    #[serde(default = "default_dial_seconds")]
    pub dial_seconds: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            api: None,
            skip_ssl_validation: false,
            cli: None,
            credentials: CredentialsConfig::default(),
            service_broker: BrokerConfig::default(),
            timeouts: TimeoutsConfig::default(),
            workers: default_workers(),
            name_prefix: default_name_prefix(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
            client_id: None,
            client_secret: None,
            client_credentials: false,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: default_broker_username(),
            password: default_broker_password(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            eventually: default_eventually(),
            poll_interval: default_poll_interval(),
            consistently: default_consistently(),
            suite: default_suite(),
            dial_seconds: default_dial_seconds(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_name_prefix() -> String {
    "INTEGRATION".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "admin".to_string()
}

fn default_broker_username() -> String {
    "username".to_string()
}

fn default_broker_password() -> String {
    "password".to_string()
}

fn default_eventually() -> String {
    "60s".to_string()
}

fn default_poll_interval() -> String {
    "50ms".to_string()
}

fn default_consistently() -> String {
    "1s".to_string()
}

fn default_suite() -> String {
    "2h".to_string()
}

fn default_dial_seconds() -> u64 {
    15
}

/// The principal scenarios authenticate as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    User { username: String, password: String },
    Client { client_id: String, client_secret: String },
}

impl Credentials {
    /// Name the CLI reports for this principal (`user: ...` in `cf target`)
    pub fn principal(&self) -> &str {
        match self {
            Credentials::User { username, .. } => username,
            Credentials::Client { client_id, .. } => client_id,
        }
    }

    pub fn secret(&self) -> &str {
        match self {
            Credentials::User { password, .. } => password,
            Credentials::Client { client_secret, .. } => client_secret,
        }
    }

    pub fn is_client(&self) -> bool {
        matches!(self, Credentials::Client { .. })
    }
}

impl HarnessConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: HarnessConfig =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse YAML config file")?;

        Ok(config)
    }

    /// `~/.config/cf-int/harness.yaml` (platform equivalent)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cf-int").join("harness.yaml"))
    }

    /// Explicit file, else the default file if present, else defaults; then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `CF_INT_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api) = lookup("CF_INT_API").filter(|v| !v.is_empty()) {
            self.api = Some(api);
        }
        if let Some(skip) = lookup("SKIP_SSL_VALIDATION") {
            self.skip_ssl_validation = parse_bool(&skip);
        }
        if let Some(cli) = lookup("CF_INT_CLI").filter(|v| !v.is_empty()) {
            self.cli = Some(PathBuf::from(cli));
        }
        if let Some(username) = lookup("CF_INT_USERNAME") {
            self.credentials.username = username;
        }
        if let Some(password) = lookup("CF_INT_PASSWORD") {
            self.credentials.password = password;
        }
        if let Some(client_id) = lookup("CF_INT_CLIENT_ID") {
            self.credentials.client_id = Some(client_id);
        }
        if let Some(client_secret) = lookup("CF_INT_CLIENT_SECRET") {
            self.credentials.client_secret = Some(client_secret);
        }
        if let Some(flag) = lookup("CF_INT_CLIENT_CREDENTIALS") {
            self.credentials.client_credentials = parse_bool(&flag);
        }
        if let Some(url) = lookup("CF_INT_BROKER_URL").filter(|v| !v.is_empty()) {
            self.service_broker.url = Some(url);
        }
        if let Some(username) = lookup("CF_INT_BROKER_USERNAME") {
            self.service_broker.username = username;
        }
        if let Some(password) = lookup("CF_INT_BROKER_PASSWORD") {
            self.service_broker.password = password;
        }
        if let Some(timeout) = lookup("CF_INT_TIMEOUT") {
            parse_duration(&timeout).with_context(|| "Invalid CF_INT_TIMEOUT")?;
            self.timeouts.eventually = timeout;
        }
        if let Some(workers) = lookup("CF_INT_WORKERS") {
            self.workers = workers
                .parse()
                .with_context(|| format!("Invalid CF_INT_WORKERS: {}", workers))?;
        }
        Ok(())
    }

    pub fn matcher_timeouts(&self) -> Result<Timeouts> {
        Ok(Timeouts {
            eventually: parse_duration(&self.timeouts.eventually)
                .with_context(|| "Invalid timeouts.eventually")?,
            poll_interval: parse_duration(&self.timeouts.poll_interval)
                .with_context(|| "Invalid timeouts.poll_interval")?,
            consistently: parse_duration(&self.timeouts.consistently)
                .with_context(|| "Invalid timeouts.consistently")?,
        })
    }

    pub fn suite_timeout(&self) -> Result<Duration> {
        parse_duration(&self.timeouts.suite).with_context(|| "Invalid timeouts.suite")
    }

    /// The CLI binary under test
    pub fn cli_binary(&self) -> Result<PathBuf> {
        match &self.cli {
            Some(path) => Ok(path.clone()),
            None => which::which("cf").map_err(|e| anyhow!("cf binary not found on PATH: {}", e)),
        }
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let creds = &self.credentials;
        if !creds.client_credentials {
            return Ok(Credentials::User {
                username: creds.username.clone(),
                password: creds.password.clone(),
            });
        }
        match (&creds.client_id, &creds.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Credentials::Client {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }),
            _ => Err(anyhow!(
                "client credentials mode requires CF_INT_CLIENT_ID and CF_INT_CLIENT_SECRET"
            )),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.api, None);
        assert_eq!(config.workers, 4);
        assert_eq!(config.name_prefix, "INTEGRATION");
        assert_eq!(config.credentials.username, "admin");
        assert_eq!(config.service_broker.url, None);

        let timeouts = config.matcher_timeouts().unwrap();
        assert_eq!(timeouts, Timeouts::default());
        assert_eq!(config.suite_timeout().unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
api: https://api.example.com
skip_ssl_validation: true
workers: 8
credentials:
  username: ci-user
timeouts:
  eventually: 2m
"#
        )
        .unwrap();

        let config = HarnessConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api.as_deref(), Some("https://api.example.com"));
        assert!(config.skip_ssl_validation);
        assert_eq!(config.workers, 8);
        assert_eq!(config.credentials.username, "ci-user");
        assert_eq!(config.credentials.password, "admin");
        assert_eq!(
            config.matcher_timeouts().unwrap().eventually,
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_from_file_missing() {
        let err = HarnessConfig::from_file(Path::new("nonexistent.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HarnessConfig::default();
        config
            .apply_env(lookup(&[
                ("CF_INT_API", "https://api.ci"),
                ("SKIP_SSL_VALIDATION", "true"),
                ("CF_INT_USERNAME", "someone"),
                ("CF_INT_PASSWORD", "secret"),
                ("CF_INT_WORKERS", "2"),
                ("CF_INT_TIMEOUT", "90s"),
            ]))
            .unwrap();

        assert_eq!(config.api.as_deref(), Some("https://api.ci"));
        assert!(config.skip_ssl_validation);
        assert_eq!(config.workers(), 2);
        assert_eq!(
            config.credentials().unwrap(),
            Credentials::User {
                username: "someone".to_string(),
                password: "secret".to_string()
            }
        );
        assert_eq!(
            config.matcher_timeouts().unwrap().eventually,
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_service_broker_settings() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "service_broker:\n  url: https://broker.example.com\n  username: broker-user\n"
        )
        .unwrap();
        let mut config = HarnessConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.service_broker.url.as_deref(),
            Some("https://broker.example.com")
        );
        assert_eq!(config.service_broker.username, "broker-user");
        assert_eq!(config.service_broker.password, "password");

        config
            .apply_env(lookup(&[
                ("CF_INT_BROKER_URL", "https://other-broker.ci"),
                ("CF_INT_BROKER_PASSWORD", "s3cret"),
            ]))
            .unwrap();
        assert_eq!(
            config.service_broker.url.as_deref(),
            Some("https://other-broker.ci")
        );
        assert_eq!(config.service_broker.password, "s3cret");
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = HarnessConfig::default();
        assert!(config.apply_env(lookup(&[("CF_INT_WORKERS", "many")])).is_err());
        assert!(config.apply_env(lookup(&[("CF_INT_TIMEOUT", "soon")])).is_err());
    }

    #[test]
    fn test_client_credentials_mode() {
        let mut config = HarnessConfig::default();
        config
            .apply_env(lookup(&[("CF_INT_CLIENT_CREDENTIALS", "true")]))
            .unwrap();
        assert!(config.credentials().is_err());

        config
            .apply_env(lookup(&[
                ("CF_INT_CLIENT_ID", "ci-client"),
                ("CF_INT_CLIENT_SECRET", "ci-secret"),
            ]))
            .unwrap();
        let creds = config.credentials().unwrap();
        assert!(creds.is_client());
        assert_eq!(creds.principal(), "ci-client");
        assert_eq!(creds.secret(), "ci-secret");
    }

    #[test]
    fn test_configured_cli_binary() {
        let config = HarnessConfig {
            cli: Some(PathBuf::from("/opt/cf/bin/cf")),
            ..HarnessConfig::default()
        };
        assert_eq!(config.cli_binary().unwrap(), PathBuf::from("/opt/cf/bin/cf"));
    }
}
