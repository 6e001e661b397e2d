use crate::env_check::{violations, Requirements, Violation};
use crate::fixtures::ResourceKind;
use crate::matcher::Pattern;
use crate::scenario::placeholder::{placeholders, resolve_pattern, Bindings};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Placeholders every scenario can use without declaring them
pub const BUILTIN_NAMES: [&str; 5] = ["org", "space", "app", "username", "api"];

// YAML structure for loading suites
#[derive(Debug, Deserialize)]
pub struct SuiteFile {
    pub command: String,
    /// Start scenarios from a logged-in session
    #[serde(default = "default_true")]
    pub login: bool,
    #[serde(default)]
    pub fixtures: Fixtures,
    /// Extra generated names, by resource kind
    #[serde(default)]
    pub names: BTreeMap<String, ResourceKind>,
    #[serde(default)]
    pub help: Option<HelpExpectation>,
    #[serde(default)]
    pub missing_argument: Option<String>,
    #[serde(default)]
    pub environment: Option<EnvironmentSpec>,
    #[serde(default)]
    pub scenarios: Vec<Node>,
}

fn default_true() -> bool {
    true
}

/// Resources created (and targeted) before every scenario of a suite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub org: bool,
    #[serde(default)]
    pub space: bool,
    #[serde(default)]
    pub app: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelpExpectation {
    pub description: String,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub see_also: Vec<String>,
    /// Category of `cf help -a` the command is listed under
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentSpec {
    #[serde(flatten)]
    pub requirements: Requirements,
    /// Arguments after the command name
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Node {
    pub when: String,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub before: Vec<StepDef>,
    #[serde(default)]
    pub after: Vec<StepDef>,
    #[serde(default)]
    pub scenarios: Vec<Node>,
    #[serde(default)]
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Case {
    pub it: String,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDef {
    #[serde(default)]
    pub cf: Option<Vec<String>>,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    #[serde(default)]
    pub say: Vec<String>,
    #[serde(default)]
    pub say_err: Vec<String>,
    #[serde(default)]
    pub not_say: Vec<String>,
    #[serde(default)]
    pub not_say_err: Vec<String>,
    #[serde(default)]
    pub exit: Option<i32>,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub fixture: Option<FixtureAction>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Prompt {
    pub expect: String,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureAction {
    Login,
    Logout,
    UnsetApi,
    ClearTarget,
    TargetOrg,
    TargetOrgAndSpace,
    CreateOrg,
    CreateSpace,
    CreateOrgAndSpace,
    DeleteOrg,
    DeleteSpace,
    CreateUser,
    DeleteUser,
    SetOrgRole,
    SetSpaceRole,
    SwitchToOrgRole,
    SwitchToSpaceRole,
    CreateOrgQuota,
    DeleteOrgQuota,
    CreateSpaceQuota,
    DeleteSpaceQuota,
    CreateServiceBroker,
    DeleteServiceBroker,
    EnableServiceAccess,
    CreateService,
    DeleteService,
    CreateServiceKey,
    DeleteServiceKey,
    PushApp,
    EnableFeatureFlag,
    DisableFeatureFlag,
}

impl FixtureAction {
    /// Minimum and maximum number of arguments; `None` means unbounded
    pub fn arity(self) -> (usize, Option<usize>) {
        use FixtureAction::*;
        match self {
            Login | Logout | UnsetApi | ClearTarget => (0, Some(0)),
            TargetOrg | CreateOrg | CreateSpace | DeleteOrg | DeleteSpace | DeleteUser
            | DeleteOrgQuota | DeleteSpaceQuota | EnableFeatureFlag | DisableFeatureFlag
            | DeleteServiceBroker | DeleteService => (1, Some(1)),
            CreateServiceBroker | EnableServiceAccess => (1, Some(2)),
            TargetOrgAndSpace | CreateOrgAndSpace | CreateUser | SwitchToOrgRole
            | CreateServiceKey | DeleteServiceKey => (2, Some(2)),
            SetOrgRole | SwitchToSpaceRole => (3, Some(3)),
            SetSpaceRole => (4, Some(4)),
            CreateOrgQuota | CreateSpaceQuota | PushApp => (1, None),
            // offering, plan, instance, then `cf create-service` flags
            CreateService => (3, None),
        }
    }
}

// Compiled structure for runtime use
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Cli(CliStep),
    Fixture(FixtureStep),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliStep {
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub env: BTreeMap<String, String>,
    pub prompts: Vec<Prompt>,
    pub say: Vec<String>,
    pub say_err: Vec<String>,
    pub not_say: Vec<String>,
    pub not_say_err: Vec<String>,
    pub exit: Option<i32>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureStep {
    pub action: FixtureAction,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeafKind {
    Steps {
        before: Vec<Step>,
        steps: Vec<Step>,
        after: Vec<Step>,
    },
    /// `cf COMMAND --help` against the expected help text
    Help(HelpExpectation),
    /// `cf COMMAND` without its required argument
    MissingArgument(String),
    /// `cf COMMAND ARGS...` in a session missing one precondition
    Environment {
        violation: Violation,
        requirements: Requirements,
        args: Vec<String>,
    },
}

/// One runnable scenario
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub name: String,
    pub pending: bool,
    pub kind: LeafKind,
}

impl Leaf {
    /// Whether the leaf talks to a platform (and so needs a login)
    pub fn needs_platform(&self, suite_login: bool) -> bool {
        match &self.kind {
            LeafKind::Steps { .. } => suite_login,
            LeafKind::Help(_) | LeafKind::MissingArgument(_) => false,
            LeafKind::Environment { .. } => true,
        }
    }
}

/// A validated suite, expanded into its leaves
#[derive(Debug, Clone)]
pub struct Suite {
    pub command: String,
    pub login: bool,
    pub fixtures: Fixtures,
    pub names: BTreeMap<String, ResourceKind>,
    pub leaves: Vec<Leaf>,
}

impl Suite {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read suite file: {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid suite: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: SuiteFile =
            serde_yaml::from_str(content).with_context(|| "Failed to parse YAML suite")?;
        file.compile()
    }

    /// Every name a placeholder may refer to
    pub fn known_names(&self) -> Vec<&str> {
        BUILTIN_NAMES
            .iter()
            .copied()
            .chain(self.names.keys().map(String::as_str))
            .collect()
    }
}

impl SuiteFile {
    pub fn compile(&self) -> Result<Suite> {
        if self.command.trim().is_empty() {
            return Err(anyhow!("Suite must name a command"));
        }
        if self.fixtures.space && !self.fixtures.org {
            return Err(anyhow!("fixtures.space requires fixtures.org"));
        }
        if self.fixtures.app && !self.fixtures.space {
            return Err(anyhow!("fixtures.app requires fixtures.space"));
        }
        for name in self.names.keys() {
            if BUILTIN_NAMES.contains(&name.as_str()) {
                return Err(anyhow!("names.{} shadows a built-in placeholder", name));
            }
        }

        let checker = Checker::new(&self.names);
        let mut leaves = Vec::new();

        if let Some(help) = &self.help {
            leaves.push(Leaf {
                name: format!("{} --help displays command usage", self.command),
                pending: false,
                kind: LeafKind::Help(help.clone()),
            });
        }

        if let Some(argument) = &self.missing_argument {
            leaves.push(Leaf {
                name: format!("{} when {} is not provided fails with usage", self.command, argument),
                pending: false,
                kind: LeafKind::MissingArgument(argument.clone()),
            });
        }

        if let Some(environment) = &self.environment {
            checker
                .check_all(&environment.args)
                .with_context(|| "Invalid environment.args")?;
            for violation in violations(environment.requirements) {
                leaves.push(Leaf {
                    name: format!("{} when {} fails", self.command, violation),
                    pending: false,
                    kind: LeafKind::Environment {
                        violation,
                        requirements: environment.requirements,
                        args: environment.args.clone(),
                    },
                });
            }
        }

        let mut path = vec![self.command.clone()];
        for node in &self.scenarios {
            expand(node, &checker, &mut path, &[], &[], false, &mut leaves)?;
        }

        Ok(Suite {
            command: self.command.clone(),
            login: self.login,
            fixtures: self.fixtures,
            names: self.names.clone(),
            leaves,
        })
    }
}

/// Walk a node depth-first; `before` hooks run outermost first, `after`
/// hooks innermost first.
fn expand(
    node: &Node,
    checker: &Checker,
    path: &mut Vec<String>,
    before: &[Step],
    after: &[Step],
    pending: bool,
    leaves: &mut Vec<Leaf>,
) -> Result<()> {
    path.push(format!("when {}", node.when));
    let context = path.join(" ");
    let pending = pending || node.pending;

    let mut node_before = before.to_vec();
    for step in &node.before {
        node_before.push(
            step.compile(checker)
                .with_context(|| format!("Invalid before step in \"{}\"", context))?,
        );
    }
    let mut node_after = Vec::new();
    for step in &node.after {
        node_after.push(
            step.compile(checker)
                .with_context(|| format!("Invalid after step in \"{}\"", context))?,
        );
    }
    node_after.extend_from_slice(after);

    for case in &node.cases {
        let name = format!("{} {}", context, case.it);
        let mut steps = Vec::with_capacity(case.steps.len());
        for (i, step) in case.steps.iter().enumerate() {
            steps.push(
                step.compile(checker)
                    .with_context(|| format!("Invalid step {} in \"{}\"", i + 1, name))?,
            );
        }
        leaves.push(Leaf {
            name,
            pending: pending || case.pending,
            kind: LeafKind::Steps {
                before: node_before.clone(),
                steps,
                after: node_after.clone(),
            },
        });
    }

    for child in &node.scenarios {
        expand(child, checker, path, &node_before, &node_after, pending, leaves)?;
    }

    path.pop();
    Ok(())
}

impl StepDef {
    pub fn compile(&self, checker: &Checker) -> Result<Step> {
        match (&self.cf, &self.fixture) {
            (Some(args), None) => self.compile_cli(args, checker).map(Step::Cli),
            (None, Some(action)) => self.compile_fixture(*action, checker).map(Step::Fixture),
            (Some(_), Some(_)) => Err(anyhow!("Step cannot have both 'cf' and 'fixture' fields")),
            (None, None) => Err(anyhow!("Step must have either 'cf' or 'fixture' field")),
        }
    }

    fn compile_cli(&self, args: &[String], checker: &Checker) -> Result<CliStep> {
        if self.name.is_some() || !self.args.is_empty() {
            return Err(anyhow!("'name' and 'args' only apply to fixture steps"));
        }
        checker.check_all(args)?;
        if let Some(stdin) = &self.stdin {
            checker.check(stdin)?;
        }
        if self.stdin.is_some() && !self.prompts.is_empty() {
            return Err(anyhow!("Step cannot have both 'stdin' and 'prompts'"));
        }
        for value in self.env.values() {
            checker.check(value)?;
        }
        for prompt in &self.prompts {
            checker.check_pattern(&prompt.expect)?;
            checker.check(&prompt.answer)?;
        }
        for pattern in self
            .say
            .iter()
            .chain(&self.say_err)
            .chain(&self.not_say)
            .chain(&self.not_say_err)
        {
            checker.check_pattern(pattern)?;
        }
        let timeout = self
            .timeout
            .as_deref()
            .map(crate::config::helper::parse_duration)
            .transpose()?;

        Ok(CliStep {
            args: args.to_vec(),
            stdin: self.stdin.clone(),
            env: self.env.clone(),
            prompts: self.prompts.clone(),
            say: self.say.clone(),
            say_err: self.say_err.clone(),
            not_say: self.not_say.clone(),
            not_say_err: self.not_say_err.clone(),
            exit: self.exit,
            timeout,
        })
    }

    fn compile_fixture(&self, action: FixtureAction, checker: &Checker) -> Result<FixtureStep> {
        let has_expectations = self.stdin.is_some()
            || !self.env.is_empty()
            || !self.prompts.is_empty()
            || !self.say.is_empty()
            || !self.say_err.is_empty()
            || !self.not_say.is_empty()
            || !self.not_say_err.is_empty()
            || self.exit.is_some()
            || self.timeout.is_some();
        if has_expectations {
            return Err(anyhow!("Fixture steps take only 'name' and 'args'"));
        }

        let mut args: Vec<String> = self.name.iter().cloned().collect();
        args.extend(self.args.iter().cloned());
        let (min, max) = action.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            return Err(anyhow!(
                "Fixture {:?} takes {} argument(s), got {}",
                action,
                match max {
                    Some(max) if max == min => min.to_string(),
                    Some(max) => format!("{}..{}", min, max),
                    None => format!("at least {}", min),
                },
                args.len()
            ));
        }
        checker.check_all(&args)?;
        Ok(FixtureStep { action, args })
    }
}

/// Validates placeholders and patterns against the names a suite declares
pub struct Checker {
    samples: Bindings,
}

impl Checker {
    pub fn new(names: &BTreeMap<String, ResourceKind>) -> Self {
        let samples = BUILTIN_NAMES
            .iter()
            .map(|name| name.to_string())
            .chain(names.keys().cloned())
            .map(|name| {
                let sample = format!("sample-{}", name);
                (name, sample)
            })
            .collect();
        Self { samples }
    }

    pub fn check(&self, template: &str) -> Result<()> {
        for name in placeholders(template).map_err(|e| anyhow!(e))? {
            if !self.samples.contains_key(name) {
                return Err(anyhow!("Unknown placeholder ${{{}}} in {:?}", name, template));
            }
        }
        Ok(())
    }

    pub fn check_all(&self, templates: &[String]) -> Result<()> {
        templates.iter().try_for_each(|t| self.check(t))
    }

    /// The template resolves and the result compiles as a regex
    pub fn check_pattern(&self, template: &str) -> Result<()> {
        self.check(template)?;
        let resolved = resolve_pattern(template, &self.samples).map_err(|e| anyhow!(e))?;
        Pattern::regex(&resolved).with_context(|| format!("Invalid pattern: {}", template))?;
        Ok(())
    }
}
