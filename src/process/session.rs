use super::buffer::Buffer;
use crate::error::{HarnessError, Result};
use crate::matcher::{consistently, eventually, IntoPattern, Pattern, Timeouts};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Exit code reported for a process terminated by a signal
pub const SIGNALED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Default)]
enum StdinMode {
    #[default]
    Closed,
    Bytes(Vec<u8>),
    Interactive,
}

/// Describes one subprocess invocation
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    current_dir: Option<PathBuf>,
    stdin: StdinMode,
    timeouts: Timeouts,
}

impl SessionBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            current_dir: None,
            stdin: StdinMode::Closed,
            timeouts: Timeouts::default(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Feed `input` on stdin at start, then close it
    pub fn stdin_bytes(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = StdinMode::Bytes(input.into());
        self
    }

    /// Keep stdin open for [`Session::write_stdin`] after prompts are seen
    pub fn interactive(mut self) -> Self {
        self.stdin = StdinMode::Interactive;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub async fn start(self) -> Result<Session> {
        let command_line = self.command_line();
        debug!("Starting session: {}", command_line);

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(match self.stdin {
                StdinMode::Closed => Stdio::null(),
                StdinMode::Bytes(_) | StdinMode::Interactive => Stdio::piped(),
            });
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| HarnessError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let pid = child.id();
        let out = Buffer::new();
        let err = Buffer::new();

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump(stdout, out.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump(stderr, err.clone())));
        }

        let stdin = match (self.stdin, child.stdin.take()) {
            (StdinMode::Bytes(input), Some(mut stdin)) => {
                tokio::spawn(async move {
                    if let Err(e) = stdin.write_all(&input).await {
                        debug!("Process closed stdin before all input was written: {}", e);
                    }
                    // dropping stdin sends EOF
                });
                None
            }
            (StdinMode::Interactive, stdin) => stdin,
            _ => None,
        };

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let watched_line = command_line.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill `{}`: {}", watched_line, e);
                    }
                    child.wait().await
                }
            };
            let code = match status {
                Ok(status) => status.code().unwrap_or(SIGNALED_EXIT_CODE),
                Err(e) => {
                    warn!("Failed to wait for `{}`: {}", watched_line, e);
                    SIGNALED_EXIT_CODE
                }
            };
            // exit is only observable once both streams are drained
            for reader in readers {
                let _ = reader.await;
            }
            debug!("Session `{}` exited with {}", watched_line, code);
            let _ = exit_tx.send(Some(code));
        });

        Ok(Session {
            command_line,
            pid,
            out,
            err,
            stdin: Mutex::new(stdin),
            exit_rx,
            kill_tx: Some(kill_tx),
            timeouts: self.timeouts,
        })
    }
}

async fn pump<R>(mut reader: R, buffer: Buffer)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer.append(&chunk[..n]),
            Err(e) => {
                debug!("Stream read failed: {}", e);
                break;
            }
        }
    }
    buffer.close();
}

/// A running (or finished) subprocess with captured output.
///
/// Dropping a session kills the process if it is still running.
#[derive(Debug)]
pub struct Session {
    command_line: String,
    pid: Option<u32>,
    out: Buffer,
    err: Buffer,
    stdin: Mutex<Option<ChildStdin>>,
    exit_rx: watch::Receiver<Option<i32>>,
    kill_tx: Option<oneshot::Sender<()>>,
    timeouts: Timeouts,
}

impl Session {
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn out(&self) -> &Buffer {
        &self.out
    }

    pub fn err(&self) -> &Buffer {
        &self.err
    }

    /// Exit code if the process already exited
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    /// Captured stdout and stderr, for failure reports
    pub fn dump(&self) -> String {
        format!(
            "--- stdout ---\n{}\n--- stderr ---\n{}",
            self.out.contents(),
            self.err.contents()
        )
    }

    /// Block until the process exits or `limit` elapses
    pub async fn wait(&self, limit: Duration) -> Result<i32> {
        let mut rx = self.exit_rx.clone();
        let waited = tokio::time::timeout(limit, async move {
            match rx.wait_for(Option::is_some).await {
                Ok(code) => (*code).unwrap_or(SIGNALED_EXIT_CODE),
                Err(_) => SIGNALED_EXIT_CODE,
            }
        })
        .await;

        waited.map_err(|_| self.timeout_error("process exit".to_string(), limit))
    }

    pub async fn wait_for_exit(&self) -> Result<i32> {
        self.wait(self.timeouts.eventually).await
    }

    /// Expect the process to exit with `expected`
    pub async fn exit(&self, expected: i32) -> Result<()> {
        let limit = self.timeouts.eventually;
        let actual = self
            .wait(limit)
            .await
            .map_err(|_| self.timeout_error(format!("exit code {}", expected), limit))?;
        if actual != expected {
            return Err(HarnessError::UnexpectedExit {
                command: self.command_line.clone(),
                expected,
                actual,
                dump: self.dump(),
            });
        }
        Ok(())
    }

    /// Expect stdout to eventually match past its read cursor
    pub async fn say(&self, pattern: impl IntoPattern) -> Result<()> {
        let pattern = pattern.into_pattern()?;
        self.eventually_say(&self.out, &pattern, "stdout").await
    }

    /// Expect stderr to eventually match past its read cursor
    pub async fn say_err(&self, pattern: impl IntoPattern) -> Result<()> {
        let pattern = pattern.into_pattern()?;
        self.eventually_say(&self.err, &pattern, "stderr").await
    }

    /// Expect stdout never to match during the consistently window
    pub async fn should_not_say(&self, pattern: impl IntoPattern) -> Result<()> {
        let pattern = pattern.into_pattern()?;
        self.consistently_silent(&self.out, &pattern).await
    }

    /// Expect stderr never to match during the consistently window
    pub async fn should_not_say_err(&self, pattern: impl IntoPattern) -> Result<()> {
        let pattern = pattern.into_pattern()?;
        self.consistently_silent(&self.err, &pattern).await
    }

    async fn eventually_say(&self, buffer: &Buffer, pattern: &Pattern, stream: &str) -> Result<()> {
        let timeouts = self.timeouts;
        let matched = eventually(timeouts.eventually, timeouts.poll_interval, || {
            buffer.say(pattern)
        })
        .await;
        if matched {
            return Ok(());
        }
        Err(self.timeout_error(
            format!(
                "{} to say {:?} (unread: {:?})",
                stream,
                pattern.as_str(),
                buffer.unread()
            ),
            timeouts.eventually,
        ))
    }

    async fn consistently_silent(&self, buffer: &Buffer, pattern: &Pattern) -> Result<()> {
        let timeouts = self.timeouts;
        let silent = consistently(timeouts.consistently, timeouts.poll_interval, || {
            !buffer.peek(pattern)
        })
        .await;
        if silent {
            return Ok(());
        }
        Err(HarnessError::UnexpectedOutput {
            command: self.command_line.clone(),
            pattern: pattern.as_str().to_string(),
            dump: self.dump(),
        })
    }

    /// Write to stdin of an interactive session
    pub async fn write_stdin(&self, input: &[u8]) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| HarnessError::StdinClosed(self.command_line.clone()))?;
        stdin.write_all(input).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Wait for `prompt` on stdout, then answer it
    pub async fn respond(&self, prompt: impl IntoPattern, input: &[u8]) -> Result<()> {
        self.say(prompt).await?;
        self.write_stdin(input).await
    }

    pub async fn close_stdin(&self) {
        self.stdin.lock().await.take();
    }

    pub fn interrupt(&self) -> Result<()> {
        self.signal(Signal::SIGINT)
    }

    pub fn terminate(&self) -> Result<()> {
        self.signal(Signal::SIGTERM)
    }

    pub fn kill(&self) -> Result<()> {
        self.signal(Signal::SIGKILL)
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        if self.exit_code().is_some() {
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };
        debug!("Sending {} to `{}`", signal, self.command_line);
        let pid = i32::try_from(pid)
            .map_err(|_| HarnessError::Setup(format!("pid {} out of range", pid)))?;
        kill(Pid::from_raw(pid), signal).map_err(|e| HarnessError::Io(e.into()))
    }

    fn timeout_error(&self, expectation: String, timeout: Duration) -> HarnessError {
        HarnessError::Timeout {
            command: self.command_line.clone(),
            expectation,
            timeout,
            dump: self.dump(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.exit_code().is_none() {
            if let Some(kill_tx) = self.kill_tx.take() {
                let _ = kill_tx.send(());
            }
        }
    }
}

/// Run a short-lived helper process to completion and collect its output
pub async fn run_to_completion(builder: SessionBuilder) -> Result<(i32, String, String)> {
    let session = builder.start().await?;
    let code = session.wait_for_exit().await?;
    Ok((code, session.out().contents(), session.err().contents()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> SessionBuilder {
        SessionBuilder::new("sh").args(["-c", script]).timeouts(Timeouts {
            eventually: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            consistently: Duration::from_millis(100),
        })
    }

    #[test]
    fn test_command_line() {
        let builder = SessionBuilder::new("cf").args(["target", "-o", "my-org"]);
        assert_eq!(builder.command_line(), "cf target -o my-org");
    }

    #[tokio::test]
    async fn test_exit_code_and_output() {
        let session = sh("echo hello; echo oops >&2; exit 3").start().await.unwrap();
        session.say("hello").await.unwrap();
        session.say_err("oops").await.unwrap();
        session.exit(3).await.unwrap();
        assert_eq!(session.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn test_unexpected_exit_carries_output() {
        let session = sh("echo some-output; exit 1").start().await.unwrap();
        let err = session.exit(0).await.unwrap_err();
        match err {
            HarnessError::UnexpectedExit {
                expected,
                actual,
                dump,
                ..
            } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
                assert!(dump.contains("some-output"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let result = SessionBuilder::new("/definitely/not/a/binary").start().await;
        assert!(matches!(result, Err(HarnessError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_killed_process_reports_signaled_code() {
        let session = sh("sleep 30").start().await.unwrap();
        session.kill().unwrap();
        assert_eq!(session.wait_for_exit().await.unwrap(), SIGNALED_EXIT_CODE);
    }
}
