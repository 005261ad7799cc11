// Exit code classification for daemon invocations

use crate::error::{BridgeError, Result};
use crate::port::ProcessOutput;
use tracing::{debug, warn};

/// Exit code the daemon uses for "no such job / nothing matched"
pub const EXIT_NO_MATCH: i32 = 1;

/// Output of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Tri-state result of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Success(Captured),
    /// Nothing matched, and the caller declared that acceptable
    Empty,
    Fatal {
        exit_code: Option<i32>,
        stderr: Vec<u8>,
    },
}

/// Classify an exit code
///
/// - 0 → Success
/// - 1 with `empty_ok` → Empty
/// - anything else (1 without `empty_ok`, other codes, killed by signal) → Fatal
pub fn classify(output: ProcessOutput, empty_ok: bool) -> InvocationOutcome {
    match output.exit_code {
        Some(0) => InvocationOutcome::Success(Captured {
            stdout: output.stdout,
            stderr: output.stderr,
        }),
        Some(EXIT_NO_MATCH) if empty_ok => InvocationOutcome::Empty,
        exit_code => InvocationOutcome::Fatal {
            exit_code,
            stderr: output.stderr,
        },
    }
}

impl InvocationOutcome {
    /// `Ok(Some(..))` on success, `Ok(None)` on empty, `Err` on fatal
    pub fn into_result(self, program: &str) -> Result<Option<Captured>> {
        match self {
            InvocationOutcome::Success(captured) => Ok(Some(captured)),
            InvocationOutcome::Empty => {
                debug!(program = %program, "Invocation matched nothing");
                Ok(None)
            }
            InvocationOutcome::Fatal { exit_code, stderr } => {
                let stderr = String::from_utf8_lossy(&stderr).into_owned();
                warn!(
                    program = %program,
                    exit_code = ?exit_code,
                    stderr = %stderr.trim_end(),
                    "Invocation failed"
                );
                Err(BridgeError::ProcessExit {
                    program: program.to_string(),
                    exit_code,
                    stderr,
                })
            }
        }
    }
}
