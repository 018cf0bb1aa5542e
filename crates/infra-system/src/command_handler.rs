// External command handler
// Runs one child process per item with the item JSON on stdin and maps the
// exit status onto an Outcome.
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use conduit_core::application::ItemHandler;
use conduit_core::domain::Outcome;
use conduit_core::error::Result;

/// Exit code meaning "temporary failure, try again later" (sysexits EX_TEMPFAIL)
pub const EXIT_TEMPFAIL: i32 = 75;

/// Time a child gets to exit after SIGTERM before it is killed
const GRACEFUL_KILL_TIMEOUT: Duration = Duration::from_secs(2);

/// Trailing stderr kept for the drop reason
const STDERR_TAIL_BYTES: usize = 1024;

/// Command line and limits for a `CommandHandler`
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    /// Environment variables passed through from the daemon
    pub env_allowlist: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout,
            env_allowlist: vec!["PATH".to_string(), "HOME".to_string(), "USER".to_string()],
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

enum RunStatus {
    Exited { status: ExitStatus, stderr: String },
    TimedOut,
}

/// Item handler delegating to an external command
///
/// - exit 0: success
/// - exit 75, timeout, killed by signal, or command unavailable: retry
/// - any other exit code: drop
pub struct CommandHandler {
    spec: CommandSpec,
}

impl CommandHandler {
    /// Create a new command handler
    ///
    /// # Example
    /// ```ignore
    /// let handler = CommandHandler::new(
    ///     CommandSpec::new("/usr/local/bin/push-coverage", Duration::from_secs(60)),
    /// );
    /// ```
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    /// Filter environment variables to allowlist only
    fn filter_env(&self, env: &HashMap<String, String>) -> HashMap<String, String> {
        env.iter()
            .filter(|(k, _)| self.spec.env_allowlist.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn spawn(&self) -> std::io::Result<Child> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let mut command = Command::new(&self.spec.program);
        command
            .args(&self.spec.args)
            .env_clear()
            .envs(self.filter_env(&env))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.spec.working_dir {
            command.current_dir(dir);
        }
        command.spawn()
    }

    /// Spawn, feed stdin, wait with timeout
    ///
    /// Stdin is written on its own task so a child that never reads it, or
    /// blocks on a full stderr pipe, is still bounded by the timeout.
    async fn run(&self, input: Vec<u8>) -> std::io::Result<RunStatus> {
        let mut child = self.spawn()?;

        let stdin_writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                let written = stdin.write_all(&input).await;
                drop(stdin);
                match written {
                    // A command that ignores its input may exit before reading it
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
            })
        });

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        match timeout(self.spec.timeout, child.wait()).await {
            Ok(status) => {
                let status = status?;
                // Input still pending after exit is moot; a background
                // descendant may hold the pipes open indefinitely
                if let Some(writer) = stdin_writer {
                    if writer.is_finished() {
                        if let Ok(Err(e)) = writer.await {
                            warn!(program = %self.spec.program, error = %e, "Writing command input failed");
                        }
                    } else {
                        writer.abort();
                    }
                }
                let stderr = match stderr_reader {
                    Some(reader) => match timeout(GRACEFUL_KILL_TIMEOUT, reader).await {
                        Ok(Ok(buf)) => tail(&buf),
                        _ => String::new(),
                    },
                    None => String::new(),
                };
                Ok(RunStatus::Exited { status, stderr })
            }
            Err(_) => {
                if let Some(writer) = stdin_writer {
                    writer.abort();
                }
                kill_graceful(&mut child).await;
                Ok(RunStatus::TimedOut)
            }
        }
    }

    fn classify(&self, status: &RunStatus) -> Outcome {
        match status {
            RunStatus::TimedOut => Outcome::retry(format!(
                "{} timed out after {}ms",
                self.spec.program,
                self.spec.timeout.as_millis()
            )),
            RunStatus::Exited { status, stderr } => match status.code() {
                Some(0) => Outcome::Success,
                Some(EXIT_TEMPFAIL) => Outcome::retry(format!(
                    "{} reported a temporary failure: {}",
                    self.spec.program, stderr
                )),
                Some(code) => Outcome::drop_item(format!(
                    "{} exited with {}: {}",
                    self.spec.program, code, stderr
                )),
                None => Outcome::retry(format!("{} killed by signal", self.spec.program)),
            },
        }
    }
}

#[async_trait]
impl ItemHandler<serde_json::Value> for CommandHandler {
    async fn handle(&self, item: serde_json::Value) -> Result<Outcome> {
        let input = serde_json::to_vec(&item)?;
        let started = Instant::now();

        debug!(program = %self.spec.program, "Starting command");
        let status = match self.run(input).await {
            Ok(status) => status,
            Err(e) => {
                warn!(program = %self.spec.program, error = %e, "Command could not be run");
                return Ok(Outcome::retry(format!(
                    "{} unavailable: {}",
                    self.spec.program, e
                )));
            }
        };

        let outcome = self.classify(&status);
        info!(
            program = %self.spec.program,
            duration_ms = started.elapsed().as_millis() as u64,
            outcome = %outcome,
            "Command finished"
        );
        Ok(outcome)
    }
}

/// Last bytes of stderr, lossily decoded
fn tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

/// Kill process with SIGTERM first, then SIGKILL if needed
async fn kill_graceful(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        info!(pid = %pid, "Sending SIGTERM to timed out command");
        if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
            && timeout(GRACEFUL_KILL_TIMEOUT, child.wait()).await.is_ok()
        {
            return;
        }
        warn!(pid = %pid, "Command did not exit after SIGTERM, sending SIGKILL");
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill command");
    }
}
