use cf_int::runner::{plan, Filter, Report, WorkerPool};
use cf_int::scenario::{self, run_leaf, Outcome, ScenarioContext, Suite};
use cf_int::{CfSettings, Timeouts};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A stand-in CLI that knows a handful of commands and nothing about a platform
const FAKE_CF: &str = r#"#!/bin/sh
case "$1" in
  help)
    cat <<'EOF'
GETTING STARTED:
   help,h             Show help
   version            Print the version

SPACES:
   allow-space-ssh    Allow SSH access for the space
EOF
    ;;
  version)
    echo "cf version 8.7.0+fake"
    ;;
  home)
    [ -d "$CF_HOME" ] && echo "home is $CF_HOME"
    ;;
  allow-space-ssh)
    if [ "$2" = "--help" ]; then
      cat <<'EOF'
NAME:
   allow-space-ssh - Allow SSH access for the space

USAGE:
   cf allow-space-ssh SPACE_NAME

SEE ALSO:
   enable-ssh, space-ssh-allowed, ssh, ssh-enabled
EOF
      exit 0
    fi
    if [ -z "$2" ]; then
      echo 'Incorrect Usage: the required argument `SPACE_NAME` was not provided' >&2
      echo
      echo "NAME:"
      echo "   allow-space-ssh - Allow SSH access for the space"
      exit 1
    fi
    echo "Not logged in. Use 'cf login' or 'cf login --sso' to log in." >&2
    echo "FAILED"
    exit 1
    ;;
  login)
    printf 'Email: '
    read -r email
    printf 'Password: '
    read -r password
    echo "Authenticating $email..."
    if [ "$password" = "secret" ]; then
      echo "OK"
      exit 0
    fi
    echo "Credentials were rejected, please try again."
    echo "FAILED"
    exit 1
    ;;
  *)
    echo "'$1' is not a registered command. See 'cf help -a'" >&2
    exit 1
    ;;
esac
"#;

fn fake_cf(dir: &Path) -> PathBuf {
    let path = dir.join("cf");
    fs::write(&path, FAKE_CF).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn offline_context(binary: PathBuf) -> ScenarioContext {
    let mut settings = CfSettings::offline(binary);
    settings.timeouts = Timeouts {
        eventually: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        consistently: Duration::from_millis(100),
    };
    ScenarioContext::offline(settings)
}

fn write_suite(dir: &Path, file: &str, content: &str) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, content).unwrap();
    path
}

const ALLOW_SPACE_SSH: &str = r#"
command: allow-space-ssh
help:
  description: Allow SSH access for the space
  usage: cf allow-space-ssh SPACE_NAME
  see_also: [enable-ssh, space-ssh-allowed, ssh, ssh-enabled]
  category: SPACES
missing_argument: SPACE_NAME
environment: { org: true, space: true, args: ['${space}'] }
scenarios:
  - when: the space exists
    cases:
      - it: enables ssh
        steps:
          - cf: [allow-space-ssh, '${space}']
            exit: 0
"#;

const OFFLINE: &str = r#"
command: login
login: false
scenarios:
  - when: credentials are prompted for
    cases:
      - it: logs in with the right password
        steps:
          - cf: [login]
            prompts:
              - { expect: 'Email: ', answer: '${username}' }
              - { expect: 'Password: ', answer: secret }
            say: ['Authenticating ${username}\.\.\.', OK]
            exit: 0
      - it: rejects a wrong password
        steps:
          - cf: [login]
            stdin: "${username}\nwrong\n"
            say: [Credentials were rejected, FAILED]
            not_say: ['^OK$']
            exit: 1
  - when: the command is unknown
    cases:
      - it: points at the help listing
        steps:
          - cf: [no-such-command]
            say_err: ["'no-such-command' is not a registered command"]
            exit: 1
      - it: uses an isolated home
        steps:
          - cf: [home]
            say: [home is /]
            exit: 0
      - it: is reported as a failure when expectations are wrong
        steps:
          - cf: [version]
            say: [this never shows up]
            timeout: 200ms
"#;

#[tokio::test]
async fn test_help_and_missing_argument_run_offline() {
    let dir = TempDir::new().unwrap();
    let ctx = offline_context(fake_cf(dir.path()));
    let suite = Suite::from_yaml(ALLOW_SPACE_SSH).unwrap();

    let by_name = |name: &str| {
        suite
            .leaves
            .iter()
            .find(|leaf| leaf.name == name)
            .unwrap_or_else(|| panic!("no leaf {:?}", name))
    };

    let help = by_name("allow-space-ssh --help displays command usage");
    assert_eq!(run_leaf(&ctx, &suite, help).await, Outcome::Passed);

    let missing = by_name("allow-space-ssh when SPACE_NAME is not provided fails with usage");
    assert_eq!(run_leaf(&ctx, &suite, missing).await, Outcome::Passed);

    // platform-bound leaves are skipped rather than failed
    for leaf in &suite.leaves {
        if leaf.needs_platform(suite.login) {
            assert!(matches!(
                run_leaf(&ctx, &suite, leaf).await,
                Outcome::Skipped(_)
            ));
        }
    }
}

#[tokio::test]
async fn test_help_mismatch_is_reported() {
    let dir = TempDir::new().unwrap();
    let ctx = offline_context(fake_cf(dir.path()));
    let suite = Suite::from_yaml(
        "command: allow-space-ssh\nhelp:\n  description: Enable SSH for the space\n",
    )
    .unwrap();

    match run_leaf(&ctx, &suite, &suite.leaves[0]).await {
        Outcome::Failed(reason) => {
            assert!(reason.contains("Allow SSH access for the space"));
            assert!(reason.contains("--- stdout ---"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_pool_runs_suites_from_directory() {
    let dir = TempDir::new().unwrap();
    let ctx = Arc::new(offline_context(fake_cf(dir.path())));

    let suites_dir = dir.path().join("suites");
    fs::create_dir(&suites_dir).unwrap();
    write_suite(&suites_dir, "allow-space-ssh.yaml", ALLOW_SPACE_SSH);
    write_suite(&suites_dir, "login.yml", OFFLINE);
    write_suite(&suites_dir, "notes.txt", "not a suite");

    let suites = scenario::load_suites(&[suites_dir]).unwrap();
    assert_eq!(suites.len(), 2);
    assert_eq!(suites[0].command, "allow-space-ssh");
    assert_eq!(suites[1].command, "login");

    let jobs = plan(suites, &Filter::default());
    let total = jobs.len();
    let results = WorkerPool::new(3, Duration::from_secs(60)).run(ctx, jobs).await;
    assert_eq!(results.len(), total);

    let outcome = |name: &str| {
        results
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.outcome.clone())
            .unwrap_or_else(|| panic!("no result {:?}", name))
    };
    assert_eq!(
        outcome("login when credentials are prompted for logs in with the right password"),
        Outcome::Passed
    );
    assert_eq!(
        outcome("login when credentials are prompted for rejects a wrong password"),
        Outcome::Passed
    );
    assert_eq!(
        outcome("login when the command is unknown points at the help listing"),
        Outcome::Passed
    );
    assert_eq!(
        outcome("login when the command is unknown uses an isolated home"),
        Outcome::Passed
    );
    assert!(outcome(
        "login when the command is unknown is reported as a failure when expectations are wrong"
    )
    .is_failure());
    assert!(matches!(
        outcome("allow-space-ssh when the space exists enables ssh"),
        Outcome::Skipped(_)
    ));

    let report = Report::new(results, Duration::from_secs(1));
    assert!(!report.success());
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.passed, 6);
    assert_eq!(report.failures().count(), 1);

    let json_path = dir.path().join("report.json");
    report.write_json(&json_path).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json["summary"]["total"], total);
}

#[tokio::test]
async fn test_focus_limits_the_run() {
    let dir = TempDir::new().unwrap();
    let ctx = Arc::new(offline_context(fake_cf(dir.path())));
    let suites = vec![Suite::from_yaml(OFFLINE).unwrap()];

    let filter = Filter::new(Some("password"), Some("wrong")).unwrap();
    let jobs = plan(suites, &filter);
    assert_eq!(jobs.len(), 1);

    let results = WorkerPool::new(1, Duration::from_secs(60)).run(ctx, jobs).await;
    assert_eq!(results[0].outcome, Outcome::Passed);
}

#[tokio::test]
async fn test_suite_timeout_marks_unfinished_scenarios() {
    let dir = TempDir::new().unwrap();
    let ctx = Arc::new(offline_context(fake_cf(dir.path())));
    let suite = Suite::from_yaml(
        r#"
command: login
login: false
scenarios:
  - when: the prompt is never answered
    cases:
      - it: hangs
        steps:
          - cf: [login]
            prompts:
              - { expect: 'Never shown', answer: x }
      - it: hangs too
        steps:
          - cf: [login]
            prompts:
              - { expect: 'Never shown', answer: x }
"#,
    )
    .unwrap();

    let jobs = plan(vec![suite], &Filter::default());
    let results = WorkerPool::new(1, Duration::from_millis(500))
        .run(ctx, jobs)
        .await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.outcome == Outcome::TimedOut));
}
