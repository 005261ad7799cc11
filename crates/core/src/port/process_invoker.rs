// Process Invoker Port
// Abstraction for running the daemon's entry points (at, atrm)

use async_trait::async_trait;
use thiserror::Error;

/// Everything a finished process left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn new(exit_code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Invocation errors (no exit code exists for any of these)
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("failed to start {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u64 },

    #[error("I/O error talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Process Invoker trait
///
/// Runs one program to completion: writes `stdin` fully (when given), then
/// returns exit code and captured output. No retries.
///
/// Implementations:
/// - SubprocessInvoker (infra-system): tokio child process, optional timeout
/// - mocks::ScriptedInvoker: canned outputs for tests
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    /// # Errors
    /// - InvokeError::SpawnFailed if the program cannot be started
    /// - InvokeError::Timeout if the configured deadline passes
    /// - InvokeError::Io if piping to or from the child fails
    async fn invoke(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput, InvokeError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One recorded invocation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCall {
        pub program: String,
        pub args: Vec<String>,
        pub stdin: Option<Vec<u8>>,
    }

    /// Canned reply for the next invocation
    #[derive(Debug, Clone)]
    pub enum MockReply {
        Output(ProcessOutput),
        /// Behave as if the program does not exist
        SpawnFailure,
    }

    /// Mock Process Invoker for testing
    ///
    /// Replies are consumed in order; once exhausted every call exits 0 with
    /// no output.
    #[derive(Default)]
    pub struct ScriptedInvoker {
        replies: Mutex<VecDeque<MockReply>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedInvoker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_replies(replies: impl IntoIterator<Item = MockReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Queue an exit code with stdout/stderr
        pub fn reply(&self, exit_code: i32, stdout: &str, stderr: &str) -> &Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(MockReply::Output(ProcessOutput::new(exit_code, stdout, stderr)));
            self
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ProcessInvoker for ScriptedInvoker {
        async fn invoke(
            &self,
            program: &str,
            args: &[String],
            stdin: Option<&[u8]>,
        ) -> Result<ProcessOutput, InvokeError> {
            self.calls.lock().unwrap().push(RecordedCall {
                program: program.to_string(),
                args: args.to_vec(),
                stdin: stdin.map(<[u8]>::to_vec),
            });

            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(MockReply::Output(output)) => Ok(output),
                Some(MockReply::SpawnFailure) => Err(InvokeError::SpawnFailed {
                    program: program.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock: no such program"),
                }),
                None => Ok(ProcessOutput::new(0, "", "")),
            }
        }
    }
}
