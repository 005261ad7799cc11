// At Service - Core use cases for the at(1) queue

pub mod submit;

use crate::application::classifier::classify;
use crate::application::deferred::DeferredCall;
use crate::config::BridgeConfig;
use crate::domain::{Job, JobRef, JobSelection, ScheduleTime, ShellCommand};
use crate::error::{BridgeError, Result};
use crate::port::ProcessInvoker;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// At Service
///
/// Every operation runs exactly one external program and waits for it.
/// Nothing is cached between calls: the daemon owns all queue state.
pub struct AtService {
    invoker: Arc<dyn ProcessInvoker>,
    config: BridgeConfig,
}

impl AtService {
    pub fn new(invoker: Arc<dyn ProcessInvoker>, config: BridgeConfig) -> Self {
        Self { invoker, config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Lists all the jobs currently in the queue (`at -l`)
    ///
    /// A line that matches no listing grammar fails the whole call.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let program = self.config.at_program.as_str();
        let output = self.invoker.invoke(program, &["-l".to_string()], None).await?;
        let captured = classify(output, false)
            .into_result(program)?
            .unwrap_or_default();

        let jobs = captured
            .stdout
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty())
            .map(Job::parse)
            .collect::<Result<Vec<_>>>()?;

        debug!(count = jobs.len(), "Listed jobs");
        Ok(jobs)
    }

    /// Gets the full shell script associated with a job (`at -c <id>`)
    ///
    /// Returns `Ok(None)` if the job does not exist.
    pub async fn get_script(&self, job: impl Into<JobRef>) -> Result<Option<Vec<u8>>> {
        let job = job.into();
        let program = self.config.at_program.as_str();
        let args = ["-c".to_string(), job.into_name()];

        let output = self.invoker.invoke(program, &args, None).await?;
        Ok(classify(output, true)
            .into_result(program)?
            .map(|captured| captured.stdout))
    }

    /// Cancels one or multiple jobs in a single removal call
    ///
    /// Returns `true` on success, `false` if some jobs were not found (the
    /// daemon's exit code 1).
    pub async fn cancel(&self, jobs: impl Into<JobSelection>) -> Result<bool> {
        let jobs = jobs.into();
        if jobs.is_empty() {
            debug!("Nothing to cancel");
            return Ok(false);
        }

        let names = jobs.names().map(str::to_string);
        let (program, args): (&str, Vec<String>) = match &self.config.remove_program {
            Some(remove) => (remove.as_str(), names.collect()),
            None => (
                self.config.at_program.as_str(),
                std::iter::once("-r".to_string()).chain(names).collect(),
            ),
        };

        info!(program = %program, jobs = jobs.len(), "Cancelling jobs");
        let output = self.invoker.invoke(program, &args, None).await?;
        Ok(classify(output, true).into_result(program)?.is_some())
    }

    /// Submits a shell command to be run later
    ///
    /// `command` is either raw script bytes/text or a list of words (each
    /// escaped independently). `time` is an absolute timestamp or a relative
    /// `at` expression such as `"now + 1 minute"`.
    ///
    /// Note that `at` usually restores the working directory and environment
    /// variables when it runs the job.
    pub async fn submit_shell(
        &self,
        command: impl Into<ShellCommand>,
        time: impl Into<ScheduleTime>,
    ) -> Result<Job> {
        submit::execute(
            self.invoker.as_ref(),
            &self.config.at_program,
            &command.into(),
            &time.into(),
        )
        .await
    }

    /// Submits a deferred call to be run later by `runtime`
    ///
    /// The runtime is, in order: `runtime_override`, the configured runtime,
    /// the current executable. It must call
    /// [`dispatch`](crate::application::deferred::dispatch) on startup with a
    /// registry that knows the call's target.
    pub async fn submit_callable(
        &self,
        call: &DeferredCall,
        time: impl Into<ScheduleTime>,
        runtime_override: Option<&Path>,
    ) -> Result<Job> {
        let runtime = self.resolve_runtime(runtime_override)?;
        let words = call.command_words(&runtime)?;
        self.submit_shell(ShellCommand::Words(words), time).await
    }

    fn resolve_runtime(&self, runtime_override: Option<&Path>) -> Result<PathBuf> {
        if let Some(runtime) = runtime_override.or(self.config.runtime.as_deref()) {
            return Ok(runtime.to_path_buf());
        }
        std::env::current_exe()
            .map_err(|e| BridgeError::Config(format!("cannot locate current executable: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::deferred::DEFERRED_CALL_FLAG;
    use crate::domain::payload::CallablePayload;
    use crate::port::process_invoker::mocks::{MockReply, ScriptedInvoker};
    use crate::port::InvokeError;
    use chrono::NaiveDate;
    use serde_json::json;

    fn service(invoker: Arc<ScriptedInvoker>) -> AtService {
        AtService::new(invoker, BridgeConfig::default())
    }

    #[test]
    fn test_list_jobs_parses_every_line() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply(
            0,
            "19\tTue Jun 26 11:32:00 2018 a remram\n\n1\t2018-11-15 16:15 a root\n",
            "",
        );

        let jobs = tokio_test::block_on(service(invoker.clone()).list_jobs()).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name(), "19");
        assert_eq!(jobs[1].name(), "1");
        assert_eq!(invoker.calls()[0].program, "at");
        assert_eq!(invoker.calls()[0].args, vec!["-l"]);
    }

    #[test]
    fn test_list_jobs_empty_queue() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply(0, "", "");
        let jobs = tokio_test::block_on(service(invoker).list_jobs()).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_list_jobs_fails_on_any_bad_line() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply(0, "19\tTue Jun 26 11:32:00 2018 a remram\ngarbage line\n", "");
        let result = tokio_test::block_on(service(invoker).list_jobs());
        assert!(matches!(result, Err(BridgeError::Parse { line }) if line == "garbage line"));
    }

    #[test]
    fn test_list_jobs_spawn_failure() {
        let invoker = Arc::new(ScriptedInvoker::with_replies([MockReply::SpawnFailure]));
        let result = tokio_test::block_on(service(invoker).list_jobs());
        assert!(matches!(
            result,
            Err(BridgeError::Invoke(InvokeError::SpawnFailed { .. }))
        ));
    }

    #[test]
    fn test_get_script() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker
            .reply(0, "#!/bin/sh\necho one >/tmp/job1\n", "")
            .reply(1, "", "Cannot find jobid 99\n")
            .reply(2, "", "Only UID 0 can do that\n");
        let service = service(invoker.clone());

        let script = tokio_test::block_on(service.get_script("12")).unwrap();
        assert_eq!(script.unwrap(), b"#!/bin/sh\necho one >/tmp/job1\n".to_vec());
        assert_eq!(invoker.calls()[0].args, vec!["-c", "12"]);

        assert!(tokio_test::block_on(service.get_script("99")).unwrap().is_none());

        let job = Job::new("5", NaiveDate::from_ymd_opt(2018, 6, 26).unwrap().and_hms_opt(11, 0, 0).unwrap());
        match tokio_test::block_on(service.get_script(&job)) {
            Err(BridgeError::ProcessExit { exit_code, stderr, .. }) => {
                assert_eq!(exit_code, Some(2));
                assert!(stderr.contains("UID 0"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(invoker.calls()[2].args, vec!["-c", "5"]);
    }

    #[test]
    fn test_cancel_uses_single_call() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply(0, "", "").reply(1, "", "Cannot find jobid 7\n");
        let service = service(invoker.clone());

        assert!(tokio_test::block_on(service.cancel(vec!["3", "4"])).unwrap());
        assert!(!tokio_test::block_on(service.cancel("7")).unwrap());

        let calls = invoker.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "at");
        assert_eq!(calls[0].args, vec!["-r", "3", "4"]);
        assert_eq!(calls[1].args, vec!["-r", "7"]);
    }

    #[test]
    fn test_cancel_with_remove_program_and_fatal_exit() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply(3, "", "boom\n");
        let service = AtService::new(
            invoker.clone(),
            BridgeConfig::default().with_remove_program("atrm"),
        );

        let result = tokio_test::block_on(service.cancel(["1", "2"]));
        assert!(matches!(result, Err(BridgeError::ProcessExit { program, .. }) if program == "atrm"));
        assert_eq!(invoker.calls()[0].args, vec!["1", "2"]);
    }

    #[test]
    fn test_cancel_nothing_skips_invocation() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let cancelled = tokio_test::block_on(service(invoker.clone()).cancel(Vec::<String>::new()));
        assert!(!cancelled.unwrap());
        assert_eq!(invoker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_shell_words() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply(
            0,
            "",
            "warning: commands will be executed using /bin/sh\njob 20 at Tue Jun 26 11:37:00 2018\n",
        );
        let time = NaiveDate::from_ymd_opt(2018, 6, 26)
            .unwrap()
            .and_hms_opt(11, 37, 0)
            .unwrap();

        let job = service(invoker.clone())
            .submit_shell(vec!["echo", "hello $USER"], time)
            .await
            .unwrap();

        assert_eq!(job.name(), "20");
        assert_eq!(job.time(), time);
        let call = &invoker.calls()[0];
        assert_eq!(call.args, vec!["11:37 2018-06-26"]);
        assert_eq!(call.stdin.as_deref(), Some(&br#"echo "hello \$USER""#[..]));
    }

    #[tokio::test]
    async fn test_submit_shell_relative_time_and_failure() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply(1, "", "Garbled time\n");

        let result = service(invoker.clone())
            .submit_shell("echo one >/tmp/job1", "now + 1 minute")
            .await;

        assert!(matches!(result, Err(BridgeError::ProcessExit { exit_code: Some(1), .. })));
        let call = &invoker.calls()[0];
        assert_eq!(call.args, vec!["now + 1 minute"]);
        assert_eq!(call.stdin.as_deref(), Some(&b"echo one >/tmp/job1"[..]));
    }

    #[tokio::test]
    async fn test_submit_shell_without_ack() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply(0, "", "warning: commands will be executed using /bin/sh\n");
        let result = service(invoker).submit_shell("true", "now").await;
        assert!(matches!(result, Err(BridgeError::MissingAcknowledgment { .. })));
    }

    #[tokio::test]
    async fn test_submit_callable_builds_runtime_command() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.reply(0, "", "job 21 at Tue Jun 26 11:39:00 2018\n");
        let call = DeferredCall::named("fs.write")
            .unwrap()
            .arg("/tmp/job2")
            .kwarg("content", json!({"lines": ["a", "b"]}));

        let job = service(invoker.clone())
            .submit_callable(&call, "now + 2 minutes", Some(Path::new("/opt/my app/bin")))
            .await
            .unwrap();
        assert_eq!(job.name(), "21");

        let script = invoker.calls()[0].stdin.clone().unwrap();
        let script = String::from_utf8(script).unwrap();
        let words: Vec<&str> = script.split(' ').collect();
        // the runtime path has a space, so it is quoted and spans two words
        assert_eq!(words[0], "\"/opt/my");
        assert_eq!(words[1], "app/bin\"");
        assert_eq!(words[2], DEFERRED_CALL_FLAG);
        assert_eq!(words[3], "name=fs.write");

        let (args, kwargs) = CallablePayload::decode_arguments(words[4]).unwrap();
        assert_eq!(args, call.payload().args);
        assert_eq!(kwargs, call.payload().kwargs);
    }

    #[tokio::test]
    async fn test_submit_callable_prefers_override_over_config() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker
            .reply(0, "", "job 1 at 2018-11-15 16:15\n")
            .reply(0, "", "job 2 at 2018-11-15 16:15\n");
        let service = AtService::new(
            invoker.clone(),
            BridgeConfig::default().with_runtime("/usr/bin/configured"),
        );
        let call = DeferredCall::named("log.message").unwrap();

        service.submit_callable(&call, "now", None).await.unwrap();
        service
            .submit_callable(&call, "now", Some(Path::new("/usr/bin/override")))
            .await
            .unwrap();

        let calls = invoker.calls();
        assert!(calls[0].stdin.as_ref().unwrap().starts_with(b"/usr/bin/configured "));
        assert!(calls[1].stdin.as_ref().unwrap().starts_with(b"/usr/bin/override "));
    }
}
