// Submit Use Case

use crate::application::classifier::classify;
use crate::domain::{Job, ScheduleTime, ShellCommand};
use crate::error::{BridgeError, Result};
use crate::port::ProcessInvoker;
use tracing::{debug, info};

/// Prefix of the diagnostics `at` prints before its acknowledgment
const WARNING_PREFIX: &[u8] = b"warning:";

/// Execute submit use case
///
/// # Arguments
///
/// * `invoker` - Process invoker
/// * `at_program` - `at` binary
/// * `command` - Script piped to the daemon
/// * `time` - When to run it
pub async fn execute(
    invoker: &dyn ProcessInvoker,
    at_program: &str,
    command: &ShellCommand,
    time: &ScheduleTime,
) -> Result<Job> {
    let script = command.to_script();
    let time_argument = time.to_at_argument();

    info!(
        program = %at_program,
        time = %time_argument,
        script_bytes = script.len(),
        "Submitting job"
    );

    let output = invoker
        .invoke(at_program, &[time_argument], Some(&script))
        .await?;
    let captured = classify(output, false)
        .into_result(at_program)?
        .unwrap_or_default();

    let job = parse_acknowledgment(&captured.stderr)?;
    info!(job = %job.name(), time = %job.time(), "Job submitted");
    Ok(job)
}

/// Find the job line in what `at` printed on its error stream
///
/// `warning:` lines and blank lines are skipped; the first remaining line must
/// be a listing line.
pub fn parse_acknowledgment(stderr: &[u8]) -> Result<Job> {
    for line in stderr.split(|&b| b == b'\n') {
        if line.starts_with(WARNING_PREFIX) {
            debug!(line = %String::from_utf8_lossy(line), "Skipping at warning");
            continue;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        return Job::parse(line);
    }

    Err(BridgeError::MissingAcknowledgment {
        stderr: String::from_utf8_lossy(stderr).into_owned(),
    })
}
