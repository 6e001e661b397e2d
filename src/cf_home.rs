//! The CLI's persisted session state (`$CF_HOME/.cf/config.json`)
//!
//! Every scenario owns a [`CfHome`]: an isolated directory handed to the CLI
//! through `CF_HOME`. The harness reads and rewrites the config file through
//! [`CfHome::load`] / [`CfHome::save`] instead of sharing one global file.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

pub const CURRENT_CONFIG_VERSION: u32 = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationFields {
    #[serde(rename = "GUID", default)]
    pub guid: String,
    #[serde(rename = "Name", default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpaceFields {
    #[serde(rename = "GUID", default)]
    pub guid: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "AllowSSH", default)]
    pub allow_ssh: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRepository {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "URL")]
    pub url: String,
}

/// Mirror of the CLI's JSON config. Fields the harness does not model are
/// kept in `extra` so a load/save cycle never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfConfig {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default)]
    pub target: String,
    #[serde(rename = "APIVersion", default)]
    pub api_version: String,
    #[serde(default)]
    pub authorization_endpoint: String,
    #[serde(rename = "UaaEndpoint", default)]
    pub uaa_endpoint: String,
    #[serde(rename = "DopplerEndPoint", default)]
    pub doppler_endpoint: String,
    #[serde(rename = "RoutingAPIEndpoint", default)]
    pub routing_endpoint: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(rename = "SSHOAuthClient", default)]
    pub ssh_oauth_client: String,
    #[serde(rename = "UAAOAuthClient", default)]
    pub uaa_oauth_client: String,
    #[serde(rename = "UAAOAuthClientSecret", default)]
    pub uaa_oauth_client_secret: String,
    #[serde(rename = "UAAGrantType", default)]
    pub uaa_grant_type: String,
    #[serde(rename = "SSLDisabled", default)]
    pub skip_ssl_validation: bool,
    #[serde(rename = "OrganizationFields", default)]
    pub targeted_organization: OrganizationFields,
    #[serde(rename = "SpaceFields", default)]
    pub targeted_space: SpaceFields,
    #[serde(rename = "PluginRepos", default)]
    pub plugin_repositories: Vec<PluginRepository>,
    #[serde(rename = "MinCLIVersion", default)]
    pub min_cli_version: String,
    #[serde(default)]
    pub async_timeout: u32,
    #[serde(default)]
    pub color_enabled: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub trace: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_config_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

impl Default for CfConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            target: String::new(),
            api_version: String::new(),
            authorization_endpoint: String::new(),
            uaa_endpoint: String::new(),
            doppler_endpoint: String::new(),
            routing_endpoint: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
            ssh_oauth_client: String::new(),
            uaa_oauth_client: String::new(),
            uaa_oauth_client_secret: String::new(),
            uaa_grant_type: String::new(),
            skip_ssl_validation: false,
            targeted_organization: OrganizationFields::default(),
            targeted_space: SpaceFields::default(),
            plugin_repositories: Vec::new(),
            min_cli_version: String::new(),
            async_timeout: 0,
            color_enabled: String::new(),
            locale: String::new(),
            trace: String::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl CfConfig {
    pub fn is_logged_in(&self) -> bool {
        !self.access_token.is_empty()
    }

    pub fn has_api(&self) -> bool {
        !self.target.is_empty()
    }

    pub fn has_targeted_organization(&self) -> bool {
        !self.targeted_organization.guid.is_empty()
    }

    pub fn has_targeted_space(&self) -> bool {
        !self.targeted_space.guid.is_empty()
    }

    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
    }

    pub fn set_refresh_token(&mut self, token: impl Into<String>) {
        self.refresh_token = token.into();
    }

    pub fn set_organization(&mut self, guid: impl Into<String>, name: impl Into<String>) {
        self.targeted_organization = OrganizationFields {
            guid: guid.into(),
            name: name.into(),
        };
    }

    pub fn set_space(&mut self, guid: impl Into<String>, name: impl Into<String>) {
        self.targeted_space = SpaceFields {
            guid: guid.into(),
            name: name.into(),
            allow_ssh: true,
        };
    }

    pub fn unset_organization_and_space(&mut self) {
        self.targeted_organization = OrganizationFields::default();
        self.targeted_space = SpaceFields::default();
    }

    pub fn unset_space(&mut self) {
        self.targeted_space = SpaceFields::default();
    }

    /// What `cf logout` leaves behind: the API stays, the session goes
    pub fn clear_tokens(&mut self) {
        self.access_token.clear();
        self.refresh_token.clear();
        self.unset_organization_and_space();
    }

    /// Forget the API endpoint along with everything that depends on it
    pub fn unset_api(&mut self) {
        self.target.clear();
        self.api_version.clear();
        self.authorization_endpoint.clear();
        self.uaa_endpoint.clear();
        self.doppler_endpoint.clear();
        self.routing_endpoint.clear();
        self.clear_tokens();
    }
}

/// An isolated `CF_HOME` directory, removed on drop
#[derive(Debug)]
pub struct CfHome {
    dir: TempDir,
}

impl CfHome {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("cf-home-").tempdir()?;
        debug!("Created CF_HOME at {}", dir.path().display());
        Ok(Self { dir })
    }

    /// A fresh home seeded with an existing session (e.g. a logged-in one)
    pub fn with_config(config: &CfConfig) -> Result<Self> {
        let home = Self::new()?;
        home.save(config)?;
        Ok(home)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join(".cf").join("config.json")
    }

    /// Current session state; a missing file reads as the CLI's defaults
    pub fn load(&self) -> Result<CfConfig> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(CfConfig::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, config: &CfConfig) -> Result<()> {
        let path = self.config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&path, content)?;
        debug!("Saved CLI config to {}", path.display());
        Ok(())
    }

    /// Load, mutate, save
    pub fn update<F>(&self, mutate: F) -> Result<CfConfig>
    where
        F: FnOnce(&mut CfConfig),
    {
        let mut config = self.load()?;
        mutate(&mut config);
        self.save(&config)?;
        Ok(config)
    }
}
