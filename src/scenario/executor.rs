//! Runs one leaf of a suite: fixtures, steps, expectations, teardown

use crate::cf::{Cf, CfSettings};
use crate::cf_home::CfConfig;
use crate::env_check::{EnvironmentCheck, Requirements, Target, Violation};
use crate::error::{HarnessError, Result};
use crate::fixtures::{Cleanup, Cleanups, OrgRole, SpaceRole, TestUser};
use crate::help::{CommandListing, HelpText};
use crate::matcher::Pattern;
use crate::process::Session;
use crate::scenario::model::{
    CliStep, FixtureAction, FixtureStep, HelpExpectation, Leaf, LeafKind, Step, Suite,
};
use crate::scenario::placeholder::{resolve, resolve_all, resolve_pattern, Bindings};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// What a scenario ended with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed(String),
    Pending,
    Skipped(String),
    TimedOut,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_) | Outcome::TimedOut)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => f.write_str("passed"),
            Outcome::Failed(_) => f.write_str("failed"),
            Outcome::Pending => f.write_str("pending"),
            Outcome::Skipped(_) => f.write_str("skipped"),
            Outcome::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Shared, read-only inputs of every scenario in a run
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    pub settings: CfSettings,
    /// Logged-in session copied into each scenario's home; `None` offline
    pub seed: Option<CfConfig>,
}

impl ScenarioContext {
    pub fn offline(settings: CfSettings) -> Self {
        Self {
            settings,
            seed: None,
        }
    }

    /// A CLI holding the seed session, for removing what scenarios created
    pub fn admin(&self) -> Result<Cf> {
        match &self.seed {
            Some(seed) => Cf::with_config(self.settings.clone(), seed),
            None => Cf::new(self.settings.clone()),
        }
    }

    /// Remove everything still registered in `cleanups`
    pub async fn clean_up(&self, cleanups: &Cleanups) {
        if cleanups.is_empty() {
            return;
        }
        match self.admin() {
            Ok(admin) => cleanups.remove_all(&admin).await,
            Err(e) => warn!("Cannot tear down {:?}: {}", cleanups.pending(), e),
        }
    }
}

/// Run `leaf` of `suite` to completion
pub async fn run_leaf(ctx: &ScenarioContext, suite: &Suite, leaf: &Leaf) -> Outcome {
    run_leaf_with(ctx, suite, leaf, Cleanups::new()).await
}

/// Run `leaf`, registering every fixture it creates in `cleanups`.
///
/// The caller keeps a handle on the same list, so fixtures can still be
/// removed when this future is dropped before its own teardown ran.
pub async fn run_leaf_with(
    ctx: &ScenarioContext,
    suite: &Suite,
    leaf: &Leaf,
    cleanups: Cleanups,
) -> Outcome {
    if leaf.pending {
        return Outcome::Pending;
    }
    if leaf.needs_platform(suite.login) && ctx.seed.is_none() {
        return Outcome::Skipped("no platform configured (CF_INT_API is unset)".to_string());
    }

    info!("Running: {}", leaf.name);
    // environment checks start from a session and break it themselves
    let logged_in = suite.login || matches!(leaf.kind, LeafKind::Environment { .. });
    let mut scenario = match Scenario::new(ctx, suite, logged_in, cleanups) {
        Ok(scenario) => scenario,
        Err(e) => return Outcome::Failed(e.to_string()),
    };

    let body = scenario.body(&leaf.kind).await;
    let after = match &leaf.kind {
        LeafKind::Steps { after, .. } => scenario.run_steps(after).await,
        _ => Ok(()),
    };
    scenario.teardown().await;

    match body.and(after) {
        Ok(()) => Outcome::Passed,
        Err(e) => {
            debug!("Scenario failed: {}: {}", leaf.name, e);
            Outcome::Failed(e.to_string())
        }
    }
}

struct Scenario<'a> {
    ctx: &'a ScenarioContext,
    suite: &'a Suite,
    cf: Cf,
    bindings: Bindings,
    cleanups: Cleanups,
}

impl<'a> Scenario<'a> {
    fn new(
        ctx: &'a ScenarioContext,
        suite: &'a Suite,
        logged_in: bool,
        cleanups: Cleanups,
    ) -> Result<Self> {
        let settings = ctx.settings.clone();
        let cf = match &ctx.seed {
            Some(seed) if logged_in => Cf::with_config(settings, seed)?,
            Some(seed) => {
                // API targeted, no session
                let mut config = seed.clone();
                config.clear_tokens();
                Cf::with_config(settings, &config)?
            }
            None => Cf::new(settings)?,
        };

        let names = cf.names();
        let mut bindings = Bindings::new();
        bindings.insert("org".to_string(), names.org());
        bindings.insert("space".to_string(), names.space());
        bindings.insert("app".to_string(), names.app());
        bindings.insert(
            "username".to_string(),
            ctx.settings.credentials.principal().to_string(),
        );
        bindings.insert(
            "api".to_string(),
            ctx.settings.api.clone().unwrap_or_default(),
        );
        for (name, kind) in &suite.names {
            bindings.insert(name.clone(), names.name(*kind));
        }

        Ok(Self {
            ctx,
            suite,
            cf,
            bindings,
            cleanups,
        })
    }

    fn binding(&self, name: &str) -> String {
        self.bindings.get(name).cloned().unwrap_or_default()
    }

    fn resolve(&self, template: &str) -> Result<String> {
        resolve(template, &self.bindings).map_err(|reason| HarnessError::InvalidTemplate {
            template: template.to_string(),
            reason,
        })
    }

    fn pattern(&self, template: &str) -> Result<Pattern> {
        let resolved = resolve_pattern(template, &self.bindings).map_err(|reason| {
            HarnessError::InvalidTemplate {
                template: template.to_string(),
                reason,
            }
        })?;
        Pattern::regex(&resolved)
    }

    async fn body(&mut self, kind: &LeafKind) -> Result<()> {
        match kind {
            LeafKind::Steps { before, steps, .. } => {
                self.setup_fixtures().await?;
                self.run_steps(before).await?;
                self.run_steps(steps).await
            }
            LeafKind::Help(expected) => self.check_help(expected).await,
            LeafKind::MissingArgument(argument) => self.check_missing_argument(argument).await,
            LeafKind::Environment {
                violation,
                requirements,
                args,
            } => self.check_environment(*violation, *requirements, args).await,
        }
    }

    async fn setup_fixtures(&mut self) -> Result<()> {
        let fixtures = self.suite.fixtures;
        if !fixtures.org {
            return Ok(());
        }
        let org = self.binding("org");
        self.cf.create_org(&org).await?;
        self.cleanups.register(Cleanup::Org(org.clone()));
        self.cf.target_org(&org).await?;

        if fixtures.space {
            let space = self.binding("space");
            self.cf.create_space(&space).await?;
            self.cf.target_org_and_space(&org, &space).await?;
        }
        if fixtures.app {
            let app = self.binding("app");
            self.cf.push_app(&app, &[]).await?;
        }
        Ok(())
    }

    async fn run_steps(&mut self, steps: &[Step]) -> Result<()> {
        for step in steps {
            match step {
                Step::Cli(step) => self.run_cli(step).await?,
                Step::Fixture(step) => self.run_fixture(step).await?,
            }
        }
        Ok(())
    }

    async fn run_cli(&self, step: &CliStep) -> Result<()> {
        let args = resolve_all(&step.args, &self.bindings).map_err(|reason| {
            HarnessError::InvalidTemplate {
                template: step.args.join(" "),
                reason,
            }
        })?;

        let mut builder = self.cf.command(args);
        for (key, value) in &step.env {
            builder = builder.env(key.clone(), self.resolve(value)?);
        }
        if let Some(stdin) = &step.stdin {
            builder = builder.stdin_bytes(self.resolve(stdin)?.into_bytes());
        }
        if !step.prompts.is_empty() {
            builder = builder.interactive();
        }
        if let Some(timeout) = step.timeout {
            builder = builder.timeouts(self.cf.timeouts().with_eventually(timeout));
        }

        let session = builder.start().await?;
        for prompt in &step.prompts {
            let mut answer = self.resolve(&prompt.answer)?;
            answer.push('\n');
            session
                .respond(self.pattern(&prompt.expect)?, answer.as_bytes())
                .await?;
        }
        if !step.prompts.is_empty() {
            session.close_stdin().await;
        }

        for pattern in &step.say {
            session.say(self.pattern(pattern)?).await?;
        }
        for pattern in &step.say_err {
            session.say_err(self.pattern(pattern)?).await?;
        }
        for pattern in &step.not_say {
            session.should_not_say(self.pattern(pattern)?).await?;
        }
        for pattern in &step.not_say_err {
            session.should_not_say_err(self.pattern(pattern)?).await?;
        }

        match step.exit {
            Some(code) => session.exit(code).await,
            // later steps must not race this one
            None => session.wait_for_exit().await.map(|_| ()),
        }
    }

    async fn run_fixture(&mut self, step: &FixtureStep) -> Result<()> {
        let args = resolve_all(&step.args, &self.bindings).map_err(|reason| {
            HarnessError::InvalidTemplate {
                template: step.args.join(" "),
                reason,
            }
        })?;
        let extra: Vec<&str> = args.iter().skip(1).map(String::as_str).collect();
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();
        debug!("Fixture {:?} {:?}", step.action, args);

        match step.action {
            FixtureAction::Login => self.cf.login().await?,
            FixtureAction::Logout => self.cf.logout().await?,
            FixtureAction::UnsetApi => self.cf.unset_api().await?,
            FixtureAction::ClearTarget => self.cf.clear_target()?,
            FixtureAction::TargetOrg => self.cf.target_org(arg(0)).await?,
            FixtureAction::TargetOrgAndSpace => {
                self.cf.target_org_and_space(arg(0), arg(1)).await?
            }
            FixtureAction::CreateOrg => {
                self.cf.create_org(arg(0)).await?;
                self.cleanups.register(Cleanup::Org(arg(0).to_string()));
            }
            FixtureAction::CreateSpace => self.cf.create_space(arg(0)).await?,
            FixtureAction::CreateOrgAndSpace => {
                // the org exists before its space is created
                self.cf.create_org(arg(0)).await?;
                self.cleanups.register(Cleanup::Org(arg(0).to_string()));
                self.cf.create_space_in(arg(0), arg(1)).await?;
            }
            FixtureAction::DeleteOrg => {
                self.cf.quick_delete_org(arg(0)).await;
                self.cleanups.forget(&Cleanup::Org(arg(0).to_string()));
            }
            FixtureAction::DeleteSpace => self.cf.quick_delete_space(arg(0)).await,
            FixtureAction::CreateUser => {
                let user = TestUser {
                    username: arg(0).to_string(),
                    password: arg(1).to_string(),
                };
                self.cf.create_named_user(&user).await?;
                self.cleanups.register(Cleanup::User(user.username));
            }
            FixtureAction::DeleteUser => {
                self.cf.delete_user(arg(0)).await;
                self.cleanups.forget(&Cleanup::User(arg(0).to_string()));
            }
            FixtureAction::SetOrgRole => {
                let role: OrgRole = arg(2).parse().map_err(HarnessError::Setup)?;
                self.cf.set_org_role(arg(0), arg(1), role).await?
            }
            FixtureAction::SetSpaceRole => {
                let role: SpaceRole = arg(3).parse().map_err(HarnessError::Setup)?;
                self.cf.set_space_role(arg(0), arg(1), arg(2), role).await?
            }
            FixtureAction::SwitchToOrgRole => {
                let role: OrgRole = arg(1).parse().map_err(HarnessError::Setup)?;
                let user = self
                    .cf
                    .switch_to_org_role(arg(0), role, &self.cleanups)
                    .await?;
                self.switched_to(user);
            }
            FixtureAction::SwitchToSpaceRole => {
                let role: SpaceRole = arg(2).parse().map_err(HarnessError::Setup)?;
                let user = self
                    .cf
                    .switch_to_space_role(arg(0), arg(1), role, &self.cleanups)
                    .await?;
                self.switched_to(user);
            }
            FixtureAction::CreateOrgQuota => {
                self.cf.create_org_quota(arg(0), &extra).await?;
                self.cleanups.register(Cleanup::OrgQuota(arg(0).to_string()));
            }
            FixtureAction::DeleteOrgQuota => {
                self.cf.delete_org_quota(arg(0)).await;
                self.cleanups.forget(&Cleanup::OrgQuota(arg(0).to_string()));
            }
            FixtureAction::CreateSpaceQuota => {
                self.cf.create_space_quota(arg(0), &extra).await?;
                self.cleanups.register(Cleanup::SpaceQuota(arg(0).to_string()));
            }
            FixtureAction::DeleteSpaceQuota => {
                self.cf.delete_space_quota(arg(0)).await;
                self.cleanups.forget(&Cleanup::SpaceQuota(arg(0).to_string()));
            }
            FixtureAction::CreateServiceBroker => {
                let url = args.get(1).map(String::as_str);
                self.cf.create_service_broker(arg(0), url).await?;
                self.cleanups.register(Cleanup::ServiceBroker(arg(0).to_string()));
            }
            FixtureAction::DeleteServiceBroker => {
                self.cf.delete_service_broker(arg(0)).await;
                self.cleanups.forget(&Cleanup::ServiceBroker(arg(0).to_string()));
            }
            FixtureAction::EnableServiceAccess => {
                let broker = args.get(1).map(String::as_str);
                self.cf.enable_service_access(arg(0), broker).await?
            }
            FixtureAction::CreateService => {
                let (org, space) = self.targeted()?;
                let flags: Vec<&str> = args.iter().skip(3).map(String::as_str).collect();
                self.cf.create_service(arg(0), arg(1), arg(2), &flags).await?;
                self.cleanups.register(Cleanup::ServiceInstance {
                    org,
                    space,
                    name: arg(2).to_string(),
                });
            }
            FixtureAction::DeleteService => {
                let (org, space) = self.targeted()?;
                self.cf.delete_service(arg(0)).await;
                self.cleanups.forget(&Cleanup::ServiceInstance {
                    org,
                    space,
                    name: arg(0).to_string(),
                });
            }
            FixtureAction::CreateServiceKey => {
                let (org, space) = self.targeted()?;
                self.cf.create_service_key(arg(0), arg(1)).await?;
                self.cleanups.register(Cleanup::ServiceKey {
                    org,
                    space,
                    instance: arg(0).to_string(),
                    key: arg(1).to_string(),
                });
            }
            FixtureAction::DeleteServiceKey => {
                let (org, space) = self.targeted()?;
                self.cf.delete_service_key(arg(0), arg(1)).await;
                self.cleanups.forget(&Cleanup::ServiceKey {
                    org,
                    space,
                    instance: arg(0).to_string(),
                    key: arg(1).to_string(),
                });
            }
            FixtureAction::PushApp => self.cf.push_app(arg(0), &extra).await?,
            FixtureAction::EnableFeatureFlag => self.cf.enable_feature_flag(arg(0)).await?,
            FixtureAction::DisableFeatureFlag => self.cf.disable_feature_flag(arg(0)).await?,
        }
        Ok(())
    }

    /// Later steps see the new principal as `${username}`
    fn switched_to(&mut self, user: TestUser) {
        self.bindings.insert("username".to_string(), user.username);
    }

    /// Names of the org and space the scenario's CLI targets
    fn targeted(&self) -> Result<(String, String)> {
        let config = self.cf.config()?;
        if !config.has_targeted_space() {
            return Err(HarnessError::Setup(
                "service fixtures need a targeted org and space".to_string(),
            ));
        }
        Ok((
            config.targeted_organization.name,
            config.targeted_space.name,
        ))
    }

    async fn check_help(&self, expected: &HelpExpectation) -> Result<()> {
        let command = self.suite.command.as_str();
        let session = self.cf.run(&[command, "--help"]).await?;
        session.exit(0).await?;

        let help = HelpText::parse(&session.out().contents());
        help.validate()
            .map_err(|e| mismatch(&session, e.to_string()))?;
        let (name, description) = help.name().map_err(|e| mismatch(&session, e.to_string()))?;
        if name != command {
            return Err(mismatch(&session, format!("NAME: lists {:?}", name)));
        }
        if description != expected.description {
            return Err(mismatch(
                &session,
                format!("NAME: describes the command as {:?}", description),
            ));
        }
        if let Some(usage) = &expected.usage {
            if !help.usage().iter().any(|line| line == usage) {
                return Err(mismatch(&session, format!("USAGE: does not show {:?}", usage)));
            }
        }
        if !expected.aliases.is_empty() && help.aliases() != expected.aliases {
            return Err(mismatch(&session, format!("ALIAS: is {:?}", help.aliases())));
        }
        if !expected.see_also.is_empty() && help.see_also() != expected.see_also {
            return Err(mismatch(&session, format!("SEE ALSO: is {:?}", help.see_also())));
        }

        let listing_session = self.cf.run(&["help", "-a"]).await?;
        listing_session.exit(0).await?;
        let listing = CommandListing::parse(&listing_session.out().contents());
        let listed = listing.find(command).ok_or_else(|| {
            mismatch(&listing_session, format!("`{}` is not listed", command))
        })?;
        if listed.description != description {
            return Err(mismatch(
                &listing_session,
                format!(
                    "`{}` is listed as {:?} but its help says {:?}",
                    command, listed.description, description
                ),
            ));
        }
        if let Some(category) = &expected.category {
            if !listed.category.contains(category.as_str()) {
                return Err(mismatch(
                    &listing_session,
                    format!("`{}` is listed under {}", command, listed.category),
                ));
            }
        }
        Ok(())
    }

    async fn check_missing_argument(&self, argument: &str) -> Result<()> {
        let session = self.cf.run(&[self.suite.command.as_str()]).await?;
        session
            .say_err(Pattern::template(
                "Incorrect Usage: the required argument `{}` was not provided",
                &[argument],
            )?)
            .await?;
        session.say("NAME:").await?;
        session.exit(1).await
    }

    async fn check_environment(
        &mut self,
        violation: Violation,
        requirements: Requirements,
        args: &[String],
    ) -> Result<()> {
        let mut target = Target::default();
        if violation.needs_org() {
            let org = self.binding("org");
            self.cf.create_org(&org).await?;
            self.cleanups.register(Cleanup::Org(org.clone()));
            if requirements.space {
                let space = self.binding("space");
                self.cf.create_space_in(&org, &space).await?;
                target.space = Some(space);
            }
            target.org = Some(org);
        }

        let mut command = vec![self.suite.command.clone()];
        for arg in args {
            command.push(self.resolve(arg)?);
        }
        EnvironmentCheck::new(command, requirements)
            .verify(&self.cf, violation, &target, &self.cleanups)
            .await
    }

    /// Remove what the scenario created, as the admin of the seed session
    async fn teardown(&mut self) {
        self.ctx.clean_up(&self.cleanups).await;
    }
}

fn mismatch(session: &Session, reason: String) -> HarnessError {
    HarnessError::Mismatch {
        command: session.command_line().to_string(),
        reason,
        dump: session.dump(),
    }
}
