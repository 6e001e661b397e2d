//! Fixture setup and teardown performed through the CLI itself

use crate::cf::Cf;
use crate::config::Credentials;
use crate::error::{HarnessError, Result};
use crate::fixtures::cleanup::{Cleanup, Cleanups};
use crate::fixtures::names::ResourceKind;
use crate::process::Session;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tempfile::TempDir;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgRole {
    OrgManager,
    BillingManager,
    OrgAuditor,
}

impl OrgRole {
    pub fn as_str(self) -> &'static str {
        match self {
            OrgRole::OrgManager => "OrgManager",
            OrgRole::BillingManager => "BillingManager",
            OrgRole::OrgAuditor => "OrgAuditor",
        }
    }
}

impl FromStr for OrgRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [OrgRole::OrgManager, OrgRole::BillingManager, OrgRole::OrgAuditor]
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("Unknown org role: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceRole {
    SpaceManager,
    SpaceDeveloper,
    SpaceAuditor,
    SpaceSupporter,
}

impl SpaceRole {
    pub fn as_str(self) -> &'static str {
        match self {
            SpaceRole::SpaceManager => "SpaceManager",
            SpaceRole::SpaceDeveloper => "SpaceDeveloper",
            SpaceRole::SpaceAuditor => "SpaceAuditor",
            SpaceRole::SpaceSupporter => "SpaceSupporter",
        }
    }
}

impl FromStr for SpaceRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [
            SpaceRole::SpaceManager,
            SpaceRole::SpaceDeveloper,
            SpaceRole::SpaceAuditor,
            SpaceRole::SpaceSupporter,
        ]
        .into_iter()
        .find(|role| role.as_str() == s)
        .ok_or_else(|| format!("Unknown space role: {}", s))
    }
}

/// A user created for a scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestUser {
    pub username: String,
    pub password: String,
}

impl Cf {
    /// Run a setup command and insist on exit 0
    pub async fn setup(&self, args: &[&str]) -> Result<Session> {
        let session = self.run(args).await?;
        let code = session.wait_for_exit().await?;
        if code != 0 {
            return Err(HarnessError::Setup(format!(
                "`{}` exited with {}\n{}",
                session.command_line(),
                code,
                session.dump()
            )));
        }
        Ok(session)
    }

    async fn setup_with_env(&self, env: &HashMap<String, String>, args: &[&str]) -> Result<Session> {
        let session = self.run_with_env(env, args).await?;
        let code = session.wait_for_exit().await?;
        if code != 0 {
            return Err(HarnessError::Setup(format!(
                "`{}` exited with {}\n{}",
                session.command_line(),
                code,
                session.dump()
            )));
        }
        Ok(session)
    }

    /// Run a teardown command; failures are logged, never raised
    pub async fn teardown(&self, args: &[&str]) {
        let outcome = match self.run(args).await {
            Ok(session) => session.wait_for_exit().await.map(|code| (code, session)),
            Err(e) => Err(e),
        };
        match outcome {
            Ok((0, _)) => {}
            Ok((code, session)) => warn!(
                "Teardown `{}` exited with {}\n{}",
                session.command_line(),
                code,
                session.dump()
            ),
            Err(e) => warn!("Teardown `{}` failed: {}", args.join(" "), e),
        }
    }

    /// Credentials of the configured principal; no authentication happens
    pub fn credentials(&self) -> &Credentials {
        &self.settings().credentials
    }

    pub fn api_url(&self) -> Result<&str> {
        self.settings()
            .api
            .as_deref()
            .ok_or_else(|| HarnessError::Config("no platform API configured (CF_INT_API)".into()))
    }

    pub async fn set_api(&self) -> Result<()> {
        let api = self.api_url()?.to_string();
        if self.settings().skip_ssl_validation {
            self.setup(&["api", &api, "--skip-ssl-validation"]).await?;
        } else {
            self.setup(&["api", &api]).await?;
        }
        Ok(())
    }

    pub async fn unset_api(&self) -> Result<()> {
        self.setup(&["api", "--unset"]).await?;
        Ok(())
    }

    /// Target the API and authenticate as the configured principal
    pub async fn login(&self) -> Result<()> {
        self.set_api().await?;
        let credentials = self.credentials().clone();
        self.login_as(&credentials).await
    }

    /// Authenticate as `credentials` against the already targeted API
    pub async fn login_as(&self, credentials: &Credentials) -> Result<()> {
        info!("Logging in as {}", credentials.principal());
        match credentials {
            Credentials::User { username, password } => {
                // credentials travel via env so they never show up in `ps`
                let mut env = HashMap::new();
                env.insert("CF_USERNAME".to_string(), username.clone());
                env.insert("CF_PASSWORD".to_string(), password.clone());
                self.setup_with_env(&env, &["auth"]).await?;
            }
            Credentials::Client {
                client_id,
                client_secret,
            } => {
                self.setup(&["auth", client_id, client_secret, "--client-credentials"])
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn logout(&self) -> Result<()> {
        self.setup(&["logout"]).await?;
        Ok(())
    }

    /// Drop the org/space target without touching the API or tokens
    pub fn clear_target(&self) -> Result<()> {
        self.set_config(|config| config.unset_organization_and_space())?;
        Ok(())
    }

    pub async fn target_org(&self, org: &str) -> Result<()> {
        self.setup(&["target", "-o", org]).await?;
        Ok(())
    }

    pub async fn target_org_and_space(&self, org: &str, space: &str) -> Result<()> {
        self.setup(&["target", "-o", org, "-s", space]).await?;
        Ok(())
    }

    pub async fn create_org(&self, org: &str) -> Result<()> {
        info!("Creating org {}", org);
        self.setup(&["create-org", org]).await?;
        Ok(())
    }

    /// Create a space in the currently targeted org
    pub async fn create_space(&self, space: &str) -> Result<()> {
        info!("Creating space {}", space);
        self.setup(&["create-space", space]).await?;
        Ok(())
    }

    pub async fn create_space_in(&self, org: &str, space: &str) -> Result<()> {
        info!("Creating space {} in {}", space, org);
        self.setup(&["create-space", space, "-o", org]).await?;
        Ok(())
    }

    pub async fn create_org_and_space(&self, org: &str, space: &str) -> Result<()> {
        self.create_org(org).await?;
        self.create_space_in(org, space).await
    }

    /// Log in, create org and space, target both
    pub async fn setup_cf(&self, org: &str, space: &str) -> Result<()> {
        self.login().await?;
        self.create_org_and_space(org, space).await?;
        self.target_org_and_space(org, space).await
    }

    /// Delete an org and everything in it; tolerates a missing org
    pub async fn quick_delete_org(&self, org: &str) {
        info!("Deleting org {}", org);
        self.teardown(&["delete-org", org, "-f"]).await;
    }

    pub async fn quick_delete_space(&self, space: &str) {
        info!("Deleting space {}", space);
        self.teardown(&["delete-space", space, "-f"]).await;
    }

    pub async fn create_user(&self) -> Result<TestUser> {
        let user = TestUser {
            username: self.names().user(),
            password: self.names().password(),
        };
        self.create_named_user(&user).await?;
        Ok(user)
    }

    pub async fn create_named_user(&self, user: &TestUser) -> Result<()> {
        info!("Creating user {}", user.username);
        self.setup(&["create-user", &user.username, &user.password])
            .await?;
        Ok(())
    }

    pub async fn delete_user(&self, username: &str) {
        info!("Deleting user {}", username);
        self.teardown(&["delete-user", username, "-f"]).await;
    }

    pub async fn set_org_role(&self, username: &str, org: &str, role: OrgRole) -> Result<()> {
        self.setup(&["set-org-role", username, org, role.as_str()])
            .await?;
        Ok(())
    }

    pub async fn set_space_role(
        &self,
        username: &str,
        org: &str,
        space: &str,
        role: SpaceRole,
    ) -> Result<()> {
        self.setup(&["set-space-role", username, org, space, role.as_str()])
            .await?;
        Ok(())
    }

    /// Create a user holding `role` in `org`, then log in as that user.
    ///
    /// The user is registered in `cleanups` as soon as it exists, so it is
    /// removed even when granting the role or logging in fails.
    pub async fn switch_to_org_role(
        &self,
        org: &str,
        role: OrgRole,
        cleanups: &Cleanups,
    ) -> Result<TestUser> {
        let user = self.create_user().await?;
        cleanups.register(Cleanup::User(user.username.clone()));
        self.set_org_role(&user.username, org, role).await?;
        self.switch_to(&user).await?;
        Ok(user)
    }

    /// Create a user holding `role` in `space`, then log in as that user
    pub async fn switch_to_space_role(
        &self,
        org: &str,
        space: &str,
        role: SpaceRole,
        cleanups: &Cleanups,
    ) -> Result<TestUser> {
        let user = self.create_user().await?;
        cleanups.register(Cleanup::User(user.username.clone()));
        self.set_space_role(&user.username, org, space, role).await?;
        self.switch_to(&user).await?;
        Ok(user)
    }

    async fn switch_to(&self, user: &TestUser) -> Result<()> {
        self.logout().await?;
        self.set_api().await?;
        self.login_as(&Credentials::User {
            username: user.username.clone(),
            password: user.password.clone(),
        })
        .await
    }

    pub async fn create_org_quota(&self, quota: &str, flags: &[&str]) -> Result<()> {
        let mut args = vec!["create-org-quota", quota];
        args.extend_from_slice(flags);
        self.setup(&args).await?;
        Ok(())
    }

    pub async fn delete_org_quota(&self, quota: &str) {
        self.teardown(&["delete-org-quota", quota, "-f"]).await;
    }

    pub async fn create_space_quota(&self, quota: &str, flags: &[&str]) -> Result<()> {
        let mut args = vec!["create-space-quota", quota];
        args.extend_from_slice(flags);
        self.setup(&args).await?;
        Ok(())
    }

    pub async fn delete_space_quota(&self, quota: &str) {
        self.teardown(&["delete-space-quota", quota, "-f"]).await;
    }

    /// Register a service broker; `url` defaults to the configured broker
    pub async fn create_service_broker(&self, name: &str, url: Option<&str>) -> Result<()> {
        let broker = &self.settings().broker;
        let url = url
            .or(broker.url.as_deref())
            .ok_or_else(|| {
                HarnessError::Config("no service broker URL configured (CF_INT_BROKER_URL)".into())
            })?
            .to_string();
        let (username, password) = (broker.username.clone(), broker.password.clone());
        info!("Registering service broker {} at {}", name, url);
        self.setup(&["create-service-broker", name, &username, &password, &url])
            .await?;
        Ok(())
    }

    pub async fn delete_service_broker(&self, name: &str) {
        info!("Deleting service broker {}", name);
        self.teardown(&["delete-service-broker", name, "-f"]).await;
    }

    /// Make an offering's plans visible to every org
    pub async fn enable_service_access(&self, offering: &str, broker: Option<&str>) -> Result<()> {
        let mut args = vec!["enable-service-access", offering];
        if let Some(broker) = broker {
            args.extend_from_slice(&["-b", broker]);
        }
        self.setup(&args).await?;
        Ok(())
    }

    /// Create a managed service instance in the targeted space
    pub async fn create_service(
        &self,
        offering: &str,
        plan: &str,
        instance: &str,
        flags: &[&str],
    ) -> Result<()> {
        let mut args = vec!["create-service", offering, plan, instance];
        args.extend_from_slice(flags);
        info!("Creating service instance {}", instance);
        self.setup(&args).await?;
        Ok(())
    }

    pub async fn delete_service(&self, instance: &str) {
        info!("Deleting service instance {}", instance);
        self.teardown(&["delete-service", instance, "-f"]).await;
    }

    pub async fn create_service_key(&self, instance: &str, key: &str) -> Result<()> {
        self.setup(&["create-service-key", instance, key]).await?;
        Ok(())
    }

    pub async fn delete_service_key(&self, instance: &str, key: &str) {
        self.teardown(&["delete-service-key", instance, key, "-f"]).await;
    }

    /// Push the bundled static app, with any extra `cf push` flags
    pub async fn push_app(&self, app: &str, flags: &[&str]) -> Result<()> {
        let dir = hello_world_app()?;
        let path = dir.path().to_string_lossy().into_owned();
        let mut args = vec!["push", app, "-p", &path, "-b", "staticfile_buildpack"];
        args.extend_from_slice(flags);
        info!("Pushing app {}", app);
        self.setup(&args).await?;
        Ok(())
    }

    async fn guid(&self, resource: &str, name: &str) -> Result<String> {
        let session = self.setup(&[resource, name, "--guid"]).await?;
        Ok(session.out().contents().trim().to_string())
    }

    pub async fn app_guid(&self, app: &str) -> Result<String> {
        self.guid("app", app).await
    }

    pub async fn org_guid(&self, org: &str) -> Result<String> {
        self.guid("org", org).await
    }

    pub async fn space_guid(&self, space: &str) -> Result<String> {
        self.guid("space", space).await
    }

    pub async fn enable_feature_flag(&self, flag: &str) -> Result<()> {
        self.setup(&["enable-feature-flag", flag]).await?;
        Ok(())
    }

    pub async fn disable_feature_flag(&self, flag: &str) -> Result<()> {
        self.setup(&["disable-feature-flag", flag]).await?;
        Ok(())
    }

    /// `cf curl PATH`, parsed as JSON
    pub async fn curl(&self, path: &str) -> Result<serde_json::Value> {
        let session = self.setup(&["curl", path]).await?;
        Ok(serde_json::from_str(&session.out().contents())?)
    }

    /// Generate a fresh name of `kind`
    pub fn new_name(&self, kind: ResourceKind) -> String {
        self.names().name(kind)
    }
}

/// A directory holding a minimal static-file app
pub fn hello_world_app() -> Result<TempDir> {
    let dir = tempfile::Builder::new().prefix("simple-app-").tempdir()?;
    write_app_file(dir.path(), "index.html", "<html><body>hello world</body></html>")?;
    write_app_file(dir.path(), "Staticfile", "")?;
    Ok(dir)
}

fn write_app_file(dir: &Path, name: &str, content: &str) -> Result<()> {
    std::fs::write(dir.join(name), content)?;
    Ok(())
}
