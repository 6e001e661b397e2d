//! Direct REST access to the platform, for verifying what the CLI did

use crate::cf_home::CfConfig;
use crate::error::{HarnessError, Result};
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// A platform API client authenticated with a CLI session's access token
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        skip_ssl_validation: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(skip_ssl_validation)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    /// Reuse the target and token of a logged-in CLI config
    pub fn from_config(config: &CfConfig) -> Result<Self> {
        if !config.has_api() {
            return Err(HarnessError::Config("CLI config has no API target".into()));
        }
        if !config.is_logged_in() {
            return Err(HarnessError::Config("CLI config has no access token".into()));
        }
        Self::new(
            config.target.clone(),
            config.access_token.clone(),
            config.skip_ssl_validation,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn parse_url(&self, path: &str) -> Result<Url> {
        let url = self.url(path);
        Url::parse(&url).map_err(|e| HarnessError::Config(format!("invalid API URL {}: {}", url, e)))
    }

    /// `/v3/<collection>?names=<name>`, with the name query-encoded
    pub fn collection_url(&self, collection: &str, name: &str) -> Result<Url> {
        let mut url = self.parse_url(&format!("/v3/{}", collection))?;
        url.query_pairs_mut().append_pair("names", name);
        Ok(url)
    }

    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.parse_url(path)?;
        self.get(url).await
    }

    async fn get(&self, url: Url) -> Result<Value> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            // the CLI stores the token with its `bearer ` prefix
            .header(reqwest::header::AUTHORIZATION, &self.access_token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// `metadata.labels` of a resource, e.g. `/v3/organizations/GUID`
    pub async fn labels(&self, resource_path: &str) -> Result<BTreeMap<String, String>> {
        let body = self.get_json(resource_path).await?;
        Ok(labels_of(&body))
    }

    /// GUID of the first `/v3/<collection>` entry named `name`
    pub async fn guid_by_name(&self, collection: &str, name: &str) -> Result<Option<String>> {
        let body = self.get(self.collection_url(collection, name)?).await?;
        Ok(body["resources"]
            .as_array()
            .and_then(|resources| resources.first())
            .and_then(|resource| resource["guid"].as_str())
            .map(str::to_string))
    }
}

/// Labels from a resource body; null-valued labels are dropped
pub fn labels_of(resource: &Value) -> BTreeMap<String, String> {
    resource["metadata"]["labels"]
        .as_object()
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_labels_of() {
        let body = json!({
            "guid": "org-guid",
            "metadata": {
                "labels": { "env": "prod", "tier": "backend", "gone": null },
                "annotations": {}
            }
        });
        let labels = labels_of(&body);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["env"], "prod");
        assert_eq!(labels["tier"], "backend");
    }

    #[test]
    fn test_labels_of_unlabelled_resource() {
        assert!(labels_of(&json!({ "guid": "x" })).is_empty());
    }

    #[test]
    fn test_from_config_requires_login() {
        let mut config = CfConfig::default();
        assert!(ApiClient::from_config(&config).is_err());

        config.target = "https://api.example.com/".to_string();
        assert!(ApiClient::from_config(&config).is_err());

        config.set_access_token("bearer abc");
        let client = ApiClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "https://api.example.com");
        assert_eq!(client.url("v3/organizations"), "https://api.example.com/v3/organizations");
    }

    #[test]
    fn test_collection_url_encodes_the_name() {
        let client = ApiClient::new("https://api.example.com", "bearer abc", false).unwrap();
        let url = client.collection_url("organizations", "a&b=c d,e").unwrap();
        assert_eq!(url.path(), "/v3/organizations");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("names".to_string(), "a&b=c d,e".to_string())]);
        assert!(!url.as_str().contains("a&b"));
    }
}
