use cf_int::matcher::Pattern;
use cf_int::process::{run_to_completion, SessionBuilder, SIGNALED_EXIT_CODE};
use cf_int::{HarnessError, Timeouts};
use std::time::Duration;

fn timeouts() -> Timeouts {
    Timeouts {
        eventually: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        consistently: Duration::from_millis(200),
    }
}

fn sh(script: &str) -> SessionBuilder {
    SessionBuilder::new("sh")
        .args(["-c", script])
        .timeouts(timeouts())
}

#[tokio::test]
async fn test_matches_are_satisfied_in_declaration_order() {
    let session = SessionBuilder::new("sh")
        .args(["-c", "echo first; echo second; echo first-again"])
        .timeouts(timeouts().with_eventually(Duration::from_millis(300)))
        .start()
        .await
        .unwrap();
    session.say("first").await.unwrap();
    session.say("second").await.unwrap();
    session.say("first").await.unwrap();
    session.exit(0).await.unwrap();

    // everything has been consumed, so nothing can match again
    let err = session
        .say("second")
        .await
        .expect_err("cursor should be past `second`");
    assert!(matches!(err, HarnessError::Timeout { .. }));
}

#[tokio::test]
async fn test_out_of_order_expectation_fails_with_dump() {
    let session = SessionBuilder::new("sh")
        .args(["-c", "echo alpha; echo beta"])
        .timeouts(timeouts().with_eventually(Duration::from_millis(300)))
        .start()
        .await
        .unwrap();
    session.say("beta").await.unwrap();

    match session.say("alpha").await.unwrap_err() {
        HarnessError::Timeout {
            expectation, dump, ..
        } => {
            assert!(expectation.contains("alpha"));
            assert!(dump.contains("alpha\nbeta"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_streams_have_independent_cursors() {
    let session = sh("echo out-1; echo err-1 >&2; echo out-2; echo err-2 >&2")
        .start()
        .await
        .unwrap();
    session.say("out-2").await.unwrap();
    session.say_err("err-1").await.unwrap();
    session.say_err("err-2").await.unwrap();
    session.exit(0).await.unwrap();
}

#[tokio::test]
async fn test_output_arriving_late_is_matched() {
    let session = sh("sleep 0.3; echo Creating org; sleep 0.3; echo OK")
        .start()
        .await
        .unwrap();
    session.say("Creating org").await.unwrap();
    session.say("OK").await.unwrap();
    session.exit(0).await.unwrap();
}

#[tokio::test]
async fn test_should_not_say_holds_over_window() {
    let session = sh("echo fine; sleep 0.1; echo FAILED").start().await.unwrap();
    session.should_not_say("nothing-like-this").await.unwrap();

    let err = session.should_not_say("FAILED").await.unwrap_err();
    assert!(matches!(err, HarnessError::UnexpectedOutput { .. }));
}

#[tokio::test]
async fn test_stdin_bytes_are_delivered_then_closed() {
    let session = sh("read name; echo \"hello $name\"; cat")
        .stdin_bytes(b"ci-user\nrest\n".to_vec())
        .start()
        .await
        .unwrap();
    session.say("hello ci-user").await.unwrap();
    session.say("rest").await.unwrap();
    session.exit(0).await.unwrap();
}

#[tokio::test]
async fn test_interactive_prompts() {
    let session = sh(
        "printf 'Email: '; read email; printf 'Password: '; read password; \
         echo \"Authenticating $email\"; [ \"$password\" = secret ] && echo OK",
    )
    .interactive()
    .start()
    .await
    .unwrap();

    session.respond("Email: ", b"admin@example.com\n").await.unwrap();
    session.respond("Password: ", b"secret\n").await.unwrap();
    session.close_stdin().await;
    session.say("Authenticating admin@example.com").await.unwrap();
    session.say("OK").await.unwrap();
    session.exit(0).await.unwrap();
}

#[tokio::test]
async fn test_write_after_close_is_an_error() {
    let session = sh("cat").interactive().start().await.unwrap();
    session.close_stdin().await;
    let err = session.write_stdin(b"late\n").await.unwrap_err();
    assert!(matches!(err, HarnessError::StdinClosed(_)));
    session.exit(0).await.unwrap();
}

#[tokio::test]
async fn test_interrupt_hung_process() {
    let session = sh("echo started; exec sleep 30").start().await.unwrap();
    session.say("started").await.unwrap();
    session.interrupt().unwrap();
    assert_eq!(session.wait_for_exit().await.unwrap(), SIGNALED_EXIT_CODE);
}

#[tokio::test]
async fn test_hung_process_times_out() {
    let session = SessionBuilder::new("sh")
        .args(["-c", "echo waiting; exec sleep 30"])
        .timeouts(timeouts())
        .start()
        .await
        .unwrap();
    let err = session.wait(Duration::from_millis(200)).await.unwrap_err();
    match err {
        HarnessError::Timeout { dump, .. } => assert!(dump.contains("waiting")),
        other => panic!("unexpected error: {}", other),
    }
    session.terminate().unwrap();
}

#[tokio::test]
async fn test_env_overrides_and_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let session = sh("echo \"$CF_COLOR $(pwd)\"")
        .env("CF_COLOR", "false")
        .current_dir(dir.path())
        .start()
        .await
        .unwrap();
    session
        .say(Pattern::template("false {}", &[&dir.path().to_string_lossy()]).unwrap())
        .await
        .unwrap();
    session.exit(0).await.unwrap();
}

#[tokio::test]
async fn test_run_to_completion() {
    let (code, out, err) = run_to_completion(sh("echo out; echo err >&2; exit 2"))
        .await
        .unwrap();
    assert_eq!(code, 2);
    assert_eq!(out, "out\n");
    assert_eq!(err, "err\n");
}
