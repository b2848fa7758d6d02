//! External process runner

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::RunError;
use crate::runner::command::{CommandRequest, CommandResult, RunOptions};
use crate::runner::gate::{ConcurrencyGate, DEFAULT_MAX_PARALLEL};

/// How long to keep draining output pipes once the process has exited.
/// Bounded because a backgrounded grandchild can hold a pipe open.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Runner options
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Maximum number of simultaneously spawned commands
    pub max_parallel: usize,

    /// Timeout applied when a request does not set one
    pub default_timeout: Duration,

    /// Working directory applied when a request does not set one
    pub working_dir: PathBuf,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            default_timeout: Duration::from_secs(15),
            working_dir: PathBuf::from("."),
        }
    }
}

/// Runs external commands behind a shared concurrency gate
#[derive(Debug)]
pub struct ProcessRunner {
    gate: ConcurrencyGate,
    options: RunnerOptions,
}

impl ProcessRunner {
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            gate: ConcurrencyGate::new(options.max_parallel),
            options,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Run a command and return its trimmed stdout, or a classified error.
    pub async fn run<I, S>(
        &self,
        program: &str,
        args: I,
        options: RunOptions,
    ) -> Result<String, RunError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut request = CommandRequest::new(program).args(args).envs(options.env);
        if let Some(dir) = options.working_dir {
            request = request.working_dir(dir);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        if let Some(label) = options.label {
            request = request.label(label);
        }

        let timeout = self.effective_timeout(&request);
        let result = self.execute(request).await?;
        result.into_output(program, timeout).inspect_err(|e| {
            error!(program, error = %e.friendly_message(), "command failed");
        })
    }

    /// Execute a command and report its raw outcome.
    ///
    /// Only a failure to start is returned as an error; timeouts and non-zero
    /// exits are reported through [`CommandResult`].
    pub async fn execute(&self, request: CommandRequest) -> Result<CommandResult, RunError> {
        let program = request.get_program().to_string();
        let working_dir = request
            .get_working_dir()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.options.working_dir.clone());
        let timeout = self.effective_timeout(&request);
        let label = request.get_label().unwrap_or(&program).to_string();

        let _permit = self.gate.acquire().await.map_err(|e| RunError::Spawn {
            program: program.clone(),
            source: std::io::Error::other(e),
        })?;

        info!(
            program = %program,
            args = ?request.get_args(),
            working_dir = %working_dir.display(),
            timeout_ms = timeout.as_millis() as u64,
            label = %label,
            "executing shell command"
        );

        let mut child = Command::new(&program)
            .args(request.get_args())
            .current_dir(&working_dir)
            .envs(request.get_env_overrides())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!(program = %program, args = ?request.get_args(), error = %e, "command failed to start");
                if e.kind() == std::io::ErrorKind::NotFound {
                    RunError::NotFound {
                        program: program.clone(),
                    }
                } else {
                    RunError::Spawn {
                        program: program.clone(),
                        source: e,
                    }
                }
            })?;

        let started = Instant::now();
        let stdout = OutputCapture::start(child.stdout.take());
        let stderr = OutputCapture::start(child.stderr.take());

        let (exit_code, timed_out) =
            wait_with_timeout(&mut child, timeout)
                .await
                .map_err(|e| RunError::Spawn {
                    program: program.clone(),
                    source: e,
                })?;

        let (stdout, stderr) = futures::join!(stdout.finish(), stderr.finish());
        let result = CommandResult {
            stdout,
            stderr,
            exit_code,
            timed_out,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if result.timed_out {
            error!(label = %label, elapsed_ms, "command timed out");
        } else if result.exit_code != 0 {
            warn!(
                label = %label,
                exit_code = result.exit_code,
                stderr = %result.stderr.trim(),
                elapsed_ms,
                "command exited with non-zero status"
            );
        } else {
            info!(label = %label, elapsed_ms, "command finished");
        }

        Ok(result)
    }

    fn effective_timeout(&self, request: &CommandRequest) -> Duration {
        request.get_timeout().unwrap_or(self.options.default_timeout)
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(RunnerOptions::default())
    }
}

/// Wait for the child, killing it once `timeout` elapses. A zero timeout waits forever.
async fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<(i32, bool)> {
    if timeout.is_zero() {
        let status = child.wait().await?;
        return Ok((status.code().unwrap_or(-1), false));
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => Ok((status?.code().unwrap_or(-1), false)),
        Err(_) => {
            if let Err(e) = child.start_kill() {
                warn!("failed to kill timed out process: {}", e);
            }
            let status = child.wait().await?;
            Ok((status.code().unwrap_or(-1), true))
        }
    }
}

/// Incrementally buffers one output stream of a child process
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl OutputCapture {
    fn start<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();

        let task = tokio::spawn(async move {
            let Some(mut stream) = stream else {
                return;
            };
            let mut chunk = [0u8; 4096];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                }
            }
        });

        Self { buffer, task }
    }

    async fn finish(self) -> String {
        let mut task = self.task;
        if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut task).await.is_err() {
            task.abort();
        }
        let bytes = self.buffer.lock().await;
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
