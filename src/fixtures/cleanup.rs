//! Fixtures a scenario still owes the platform
//!
//! A scenario registers every resource right after creating it. The list is
//! shared with whoever drives the scenario, so resources are still removed
//! when the scenario itself is aborted (suite timeout, Ctrl+C).

use crate::cf::Cf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// One resource to remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    Org(String),
    User(String),
    OrgQuota(String),
    SpaceQuota(String),
    ServiceBroker(String),
    /// Instances live in a space, so deleting one needs that target
    ServiceInstance {
        org: String,
        space: String,
        name: String,
    },
    ServiceKey {
        org: String,
        space: String,
        instance: String,
        key: String,
    },
}

impl Cleanup {
    /// Delete the resource as `admin`; failures are logged
    pub async fn remove(&self, admin: &Cf) {
        match self {
            Cleanup::Org(org) => admin.quick_delete_org(org).await,
            Cleanup::User(user) => admin.delete_user(user).await,
            Cleanup::OrgQuota(quota) => admin.delete_org_quota(quota).await,
            Cleanup::SpaceQuota(quota) => admin.delete_space_quota(quota).await,
            Cleanup::ServiceBroker(broker) => admin.delete_service_broker(broker).await,
            Cleanup::ServiceInstance { org, space, name } => {
                if let Err(e) = admin.target_org_and_space(org, space).await {
                    warn!("Cannot target {}/{} to delete {}: {}", org, space, name, e);
                    return;
                }
                admin.delete_service(name).await;
            }
            Cleanup::ServiceKey {
                org,
                space,
                instance,
                key,
            } => {
                if let Err(e) = admin.target_org_and_space(org, space).await {
                    warn!("Cannot target {}/{} to delete {}: {}", org, space, key, e);
                    return;
                }
                admin.delete_service_key(instance, key).await;
            }
        }
    }
}

/// Shared, ordered list of pending cleanups; clones see the same list
#[derive(Debug, Clone, Default)]
pub struct Cleanups {
    items: Arc<Mutex<Vec<Cleanup>>>,
}

impl Cleanups {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, Vec<Cleanup>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, item: Cleanup) {
        debug!("Registered cleanup {:?}", item);
        self.items().push(item);
    }

    /// Drop `item` from the list, e.g. after a step deleted it explicitly
    pub fn forget(&self, item: &Cleanup) {
        self.items().retain(|pending| pending != item);
    }

    pub fn pending(&self) -> Vec<Cleanup> {
        self.items().clone()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Remove everything still registered, newest first
    pub async fn remove_all(&self, admin: &Cf) {
        self.remove_since(0, admin).await;
    }

    /// Remove what was registered at or after position `mark`, newest first.
    ///
    /// An item leaves the list only once its removal was attempted, so an
    /// interrupted pass leaves the rest for the next one.
    pub async fn remove_since(&self, mark: usize, admin: &Cf) {
        loop {
            let next = {
                let items = self.items();
                if items.len() <= mark {
                    return;
                }
                items.last().cloned()
            };
            let Some(item) = next else { return };
            item.remove(admin).await;
            let mut items = self.items();
            if let Some(position) = items.iter().rposition(|pending| *pending == item) {
                items.remove(position);
            }
        }
    }
}
