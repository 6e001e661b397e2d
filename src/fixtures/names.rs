//! Collision-resistant fixture names

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Org,
    Space,
    App,
    User,
    Password,
    Quota,
    SpaceQuota,
    ServiceBroker,
    ServiceInstance,
    ServiceKey,
    ServiceOffering,
    Buildpack,
    Domain,
    SecurityGroup,
    Stack,
    Host,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 16] = [
        ResourceKind::Org,
        ResourceKind::Space,
        ResourceKind::App,
        ResourceKind::User,
        ResourceKind::Password,
        ResourceKind::Quota,
        ResourceKind::SpaceQuota,
        ResourceKind::ServiceBroker,
        ResourceKind::ServiceInstance,
        ResourceKind::ServiceKey,
        ResourceKind::ServiceOffering,
        ResourceKind::Buildpack,
        ResourceKind::Domain,
        ResourceKind::SecurityGroup,
        ResourceKind::Stack,
        ResourceKind::Host,
    ];

    fn label(self) -> &'static str {
        match self {
            ResourceKind::Org => "ORG",
            ResourceKind::Space => "SPACE",
            ResourceKind::App => "APP",
            ResourceKind::User => "USER",
            ResourceKind::Password => "PASSWORD",
            ResourceKind::Quota => "QUOTA",
            ResourceKind::SpaceQuota => "SPACE-QUOTA",
            ResourceKind::ServiceBroker => "SERVICE-BROKER",
            ResourceKind::ServiceInstance => "SI",
            ResourceKind::ServiceKey => "SERVICE-KEY",
            ResourceKind::ServiceOffering => "SERVICE",
            ResourceKind::Buildpack => "BPK",
            ResourceKind::Domain => "DOMAIN",
            ResourceKind::SecurityGroup => "SEC-GROUP",
            ResourceKind::Stack => "STACK",
            ResourceKind::Host => "HOST",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Org => "org",
            ResourceKind::Space => "space",
            ResourceKind::App => "app",
            ResourceKind::User => "user",
            ResourceKind::Password => "password",
            ResourceKind::Quota => "quota",
            ResourceKind::SpaceQuota => "space_quota",
            ResourceKind::ServiceBroker => "service_broker",
            ResourceKind::ServiceInstance => "service_instance",
            ResourceKind::ServiceKey => "service_key",
            ResourceKind::ServiceOffering => "service_offering",
            ResourceKind::Buildpack => "buildpack",
            ResourceKind::Domain => "domain",
            ResourceKind::SecurityGroup => "security_group",
            ResourceKind::Stack => "stack",
            ResourceKind::Host => "host",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('-', "_").to_ascii_lowercase();
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("Unknown resource kind: {}", s))
    }
}

/// Generates names like `INTEGRATION-ORG-3f2a9c0d1e7b-0`.
///
/// The random part keeps parallel runs on the same platform apart; the
/// counter keeps names from one process apart even if the RNG repeats.
#[derive(Debug, Clone)]
pub struct NameGenerator {
    prefix: String,
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

impl NameGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn name(&self, kind: ResourceKind) -> String {
        let name = self.prefixed(kind.label());
        match kind {
            // hostnames and domains must be valid DNS labels
            ResourceKind::Host => name.to_ascii_lowercase(),
            ResourceKind::Domain => format!("{}.com", name.to_ascii_lowercase()),
            _ => name,
        }
    }

    /// `PREFIX-LABEL-<random>-<counter>`
    pub fn prefixed(&self, label: &str) -> String {
        let random = Uuid::new_v4().simple().to_string();
        let count = COUNTER.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}-{}-{}", self.prefix, label, &random[..12], count)
    }

    pub fn org(&self) -> String {
        self.name(ResourceKind::Org)
    }

    pub fn space(&self) -> String {
        self.name(ResourceKind::Space)
    }

    pub fn app(&self) -> String {
        self.name(ResourceKind::App)
    }

    pub fn user(&self) -> String {
        self.name(ResourceKind::User)
    }

    pub fn password(&self) -> String {
        self.name(ResourceKind::Password)
    }

    pub fn quota(&self) -> String {
        self.name(ResourceKind::Quota)
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new("INTEGRATION")
    }
}
