//! The "environment targeted correctly" check.
//!
//! Every command that needs a session fails the same way when a
//! precondition is missing. Which failures apply to a command follows from
//! a small table of requirements; each failure is provoked by tampering
//! with the scenario's CLI config, then asserted on the command's output.

use crate::cf::Cf;
use crate::error::{HarnessError, Result};
use crate::fixtures::{Cleanups, OrgRole, SpaceRole};
use serde::Deserialize;
use std::fmt;
use tracing::{info, warn};

/// Preconditions a command needs beyond an API and a login
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub org: bool,
    #[serde(default)]
    pub space: bool,
    /// Whether a read-only role is refused
    #[serde(default)]
    pub role_restricted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    NoApi,
    NotLoggedIn,
    NoOrg,
    NoSpace,
    InsufficientRole,
}

impl Violation {
    pub fn description(self) -> &'static str {
        match self {
            Violation::NoApi => "no API endpoint is set",
            Violation::NotLoggedIn => "not logged in",
            Violation::NoOrg => "no org is targeted",
            Violation::NoSpace => "no space is targeted",
            Violation::InsufficientRole => "the user has a read-only role",
        }
    }

    /// Error the CLI prints on stderr for this violation
    pub fn error_pattern(self) -> &'static str {
        match self {
            Violation::NoApi => {
                r"No API endpoint set\. Use 'cf login' or 'cf api' to target an endpoint\."
            }
            Violation::NotLoggedIn => {
                r"Not logged in\. Use 'cf login'( or 'cf login --sso')? to log in\."
            }
            Violation::NoOrg => r"No org targeted, use 'cf target -o ORG' to target an org\.",
            Violation::NoSpace => {
                r"No space targeted, use 'cf target -s SPACE' to target a space\."
            }
            Violation::InsufficientRole => r"You are not authorized to perform the requested action",
        }
    }

    /// Whether provoking this violation needs a real org to target
    pub fn needs_org(self) -> bool {
        matches!(self, Violation::NoSpace | Violation::InsufficientRole)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Violations a command with `requirements` must reject, in check order
pub fn violations(requirements: Requirements) -> Vec<Violation> {
    let mut out = vec![Violation::NoApi, Violation::NotLoggedIn];
    // a space can only be targeted inside an org
    if requirements.org || requirements.space {
        out.push(Violation::NoOrg);
    }
    if requirements.space {
        out.push(Violation::NoSpace);
    }
    if requirements.role_restricted {
        out.push(Violation::InsufficientRole);
    }
    out
}

/// Existing org (and space) the check may target
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub org: Option<String>,
    pub space: Option<String>,
}

/// One command crossed with its requirements
#[derive(Debug, Clone)]
pub struct EnvironmentCheck {
    pub args: Vec<String>,
    pub requirements: Requirements,
}

impl EnvironmentCheck {
    pub fn new(args: Vec<String>, requirements: Requirements) -> Self {
        Self { args, requirements }
    }

    pub fn violations(&self) -> Vec<Violation> {
        violations(self.requirements)
    }

    /// Put `cf` into the state `violation` describes, run the command and
    /// expect the matching failure.
    ///
    /// `cf` must start logged in; its home is left in the violated state.
    /// Users created to provoke the violation go into `cleanups` and are
    /// deleted again through the session `cf` started with.
    pub async fn verify(
        &self,
        cf: &Cf,
        violation: Violation,
        target: &Target,
        cleanups: &Cleanups,
    ) -> Result<()> {
        info!("Checking `{}` when {}", self.args.join(" "), violation);
        let admin_session = cf.config()?;
        let mark = cleanups.len();

        let outcome = match self.provoke(cf, violation, target, cleanups).await {
            Ok(()) => self.expect_failure(cf, violation).await,
            Err(e) => Err(e),
        };

        if cleanups.len() > mark {
            match Cf::with_config(cf.settings().clone(), &admin_session) {
                Ok(admin) => cleanups.remove_since(mark, &admin).await,
                // still registered, so the scenario's teardown removes them
                Err(e) => warn!("Cannot remove users created for the check: {}", e),
            }
        }
        outcome
    }

    async fn expect_failure(&self, cf: &Cf, violation: Violation) -> Result<()> {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let session = cf.run(&args).await?;
        session.say_err(violation.error_pattern()).await?;
        session.say("FAILED").await?;
        session.exit(1).await
    }

    async fn provoke(
        &self,
        cf: &Cf,
        violation: Violation,
        target: &Target,
        cleanups: &Cleanups,
    ) -> Result<()> {
        match violation {
            Violation::NoApi => {
                cf.set_config(|config| config.unset_api())?;
            }
            Violation::NotLoggedIn => {
                cf.set_config(|config| config.clear_tokens())?;
            }
            Violation::NoOrg => {
                cf.clear_target()?;
            }
            Violation::NoSpace => {
                cf.clear_target()?;
                cf.target_org(required(&target.org, "org")?).await?;
            }
            Violation::InsufficientRole => {
                let org = required(&target.org, "org")?;
                match (&target.space, self.requirements.space) {
                    (Some(space), true) => {
                        cf.switch_to_space_role(org, space, SpaceRole::SpaceAuditor, cleanups)
                            .await?;
                        cf.target_org_and_space(org, space).await?;
                    }
                    _ => {
                        cf.switch_to_org_role(org, OrgRole::OrgAuditor, cleanups)
                            .await?;
                        cf.target_org(org).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| HarnessError::Setup(format!("environment check needs an existing {}", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Pattern;

    #[test]
    fn test_decision_table() {
        let none = Requirements::default();
        assert_eq!(violations(none), vec![Violation::NoApi, Violation::NotLoggedIn]);

        let org = Requirements {
            org: true,
            ..Requirements::default()
        };
        assert_eq!(violations(org).last(), Some(&Violation::NoOrg));

        let space = Requirements {
            space: true,
            role_restricted: true,
            ..Requirements::default()
        };
        assert_eq!(
            violations(space),
            vec![
                Violation::NoApi,
                Violation::NotLoggedIn,
                Violation::NoOrg,
                Violation::NoSpace,
                Violation::InsufficientRole,
            ]
        );
    }

    #[test]
    fn test_error_patterns_match_cli_messages() {
        let cases = [
            (
                Violation::NoApi,
                "No API endpoint set. Use 'cf login' or 'cf api' to target an endpoint.",
            ),
            (
                Violation::NotLoggedIn,
                "Not logged in. Use 'cf login' or 'cf login --sso' to log in.",
            ),
            (Violation::NotLoggedIn, "Not logged in. Use 'cf login' to log in."),
            (
                Violation::NoOrg,
                "No org targeted, use 'cf target -o ORG' to target an org.",
            ),
            (
                Violation::NoSpace,
                "No space targeted, use 'cf target -s SPACE' to target a space.",
            ),
            (
                Violation::InsufficientRole,
                "You are not authorized to perform the requested action",
            ),
        ];
        for (violation, message) in cases {
            let pattern = Pattern::regex(violation.error_pattern()).unwrap();
            assert!(pattern.is_match(message.as_bytes()), "{:?}", violation);
        }
    }

    #[test]
    fn test_requirements_from_yaml() {
        let req: Requirements = serde_yaml::from_str("space: true").unwrap();
        assert!(req.space);
        assert!(!req.org);
        assert!(!req.role_restricted);
    }

    #[test]
    fn test_violations_needing_an_org() {
        assert!(Violation::NoSpace.needs_org());
        assert!(!Violation::NoApi.needs_org());
    }
}
