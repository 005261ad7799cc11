// Subprocess invoker implementation
// reason: async-trait, tokio for async process management
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info};

use atbridge_core::port::{InvokeError, ProcessInvoker, ProcessOutput};

/// Subprocess invoker
/// Runs the daemon's entry points as child processes, one at a time per call
#[derive(Debug, Clone, Default)]
pub struct SubprocessInvoker {
    timeout: Option<Duration>,
}

impl SubprocessInvoker {
    /// Create a new subprocess invoker without a deadline
    ///
    /// # Example
    /// ```ignore
    /// let invoker = SubprocessInvoker::new().with_timeout(Some(Duration::from_secs(10)));
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the child and fail with `InvokeError::Timeout` after `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Spawn child process with piped output (and piped input when given)
    fn spawn(
        &self,
        program: &str,
        args: &[String],
        has_stdin: bool,
    ) -> Result<Child, InvokeError> {
        Command::new(program)
            .args(args)
            .stdin(if has_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InvokeError::SpawnFailed {
                program: program.to_string(),
                source,
            })
    }

    /// Write stdin fully while collecting output, then wait for exit
    async fn communicate(
        program: &str,
        mut child: Child,
        stdin: Option<&[u8]>,
    ) -> Result<std::process::Output, InvokeError> {
        let io_error = |source: std::io::Error| InvokeError::Io {
            program: program.to_string(),
            source,
        };

        let writer = child.stdin.take();
        let feed = async move {
            if let (Some(mut pipe), Some(data)) = (writer, stdin) {
                pipe.write_all(data).await?;
                pipe.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        match fed {
            // The program may legitimately exit without reading its input;
            // its exit code tells the story
            Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(io_error(e)),
            _ => {}
        }
        output.map_err(io_error)
    }

    /// Convert a finished process into the port's output type
    fn build_output(output: std::process::Output) -> ProcessOutput {
        ProcessOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

#[async_trait]
impl ProcessInvoker for SubprocessInvoker {
    async fn invoke(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput, InvokeError> {
        let start_time = Instant::now();

        info!(
            program = %program,
            args = ?args,
            stdin_bytes = ?stdin.map(<[u8]>::len),
            timeout_ms = ?self.timeout.map(|t| t.as_millis()),
            "Starting subprocess"
        );

        let child = self.spawn(program, args, stdin.is_some())?;
        let finished = Self::communicate(program, child, stdin);

        let output = match self.timeout {
            // Dropping the future drops the child, which kills it
            Some(limit) => timeout(limit, finished).await.map_err(|_| InvokeError::Timeout {
                program: program.to_string(),
                timeout_ms: limit.as_millis() as u64,
            })??,
            None => finished.await?,
        };

        let result = Self::build_output(output);
        info!(
            program = %program,
            duration_ms = %start_time.elapsed().as_millis(),
            exit_code = ?result.exit_code,
            "Subprocess completed"
        );
        debug!(
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "Subprocess output captured"
        );

        Ok(result)
    }
}
