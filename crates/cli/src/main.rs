//! atbridge CLI - schedule, inspect and cancel at(1) jobs
//!
//! The same binary is the runtime for deferred calls: when `at` runs a job
//! submitted with `atbridge call`, it re-invokes this executable with
//! `--deferred-call`, which is handled before any argument parsing.

mod callables;

use anyhow::{Context, Result};
use atbridge_core::application::{
    dispatch, AtService, CallableRegistry, DeferredCall, DeferredError,
};
use atbridge_core::domain::{Job, ScheduleTime, ShellCommand};
use atbridge_core::BridgeConfig;
use atbridge_infra_system::SubprocessInvoker;
use chrono::{DateTime, NaiveDateTime};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FORMAT_ENV: &str = "ATBRIDGE_LOG_FORMAT";

/// Layouts accepted by `--at` besides RFC 3339; anything else goes to `at` verbatim
const NAIVE_TIME_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

#[derive(Parser)]
#[command(name = "atbridge")]
#[command(about = "Drive the at(1) job scheduler", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// `at` binary (overrides ATBRIDGE_AT_PROGRAM)
    #[arg(long, global = true)]
    at_program: Option<String>,

    /// Dedicated removal binary such as `atrm` (overrides ATBRIDGE_REMOVE_PROGRAM)
    #[arg(long, global = true)]
    remove_program: Option<String>,

    /// Per-invocation timeout in milliseconds (overrides ATBRIDGE_TIMEOUT_MS)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// List pending jobs
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the script of a job
    Script {
        /// Job ID
        job_id: String,
    },

    /// Cancel one or more jobs
    Cancel {
        /// Job IDs
        #[arg(required = true)]
        job_ids: Vec<String>,
    },

    /// Submit a shell command
    Submit {
        /// When to run: RFC 3339, "YYYY-MM-DD HH:MM", or an at(1) expression
        #[arg(long = "at")]
        time: String,

        /// Raw script text, sent unescaped
        #[arg(long, conflicts_with = "words")]
        raw: Option<String>,

        /// Command words, each escaped for the shell
        #[arg(last = true)]
        words: Vec<String>,
    },

    /// Submit a call to a registered callable
    Call {
        /// When to run: RFC 3339, "YYYY-MM-DD HH:MM", or an at(1) expression
        #[arg(long = "at")]
        time: String,

        /// Dotted callable name (see `atbridge callables`)
        name: String,

        /// Positional argument as JSON (plain text is taken as a string)
        #[arg(long = "arg")]
        args: Vec<String>,

        /// Keyword argument as KEY=JSON
        #[arg(long = "kwarg")]
        kwargs: Vec<String>,

        /// Executable that will run the call (overrides ATBRIDGE_RUNTIME)
        #[arg(long)]
        runtime: Option<PathBuf>,
    },

    /// Submit a job that appends lines to a file
    Append {
        /// When to run: RFC 3339, "YYYY-MM-DD HH:MM", or an at(1) expression
        #[arg(long = "at")]
        time: String,

        /// File to append to
        path: PathBuf,

        /// Lines to append
        lines: Vec<String>,
    },

    /// List the callables this binary can run
    Callables,
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Time")]
    time: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.name().to_string(),
            time: job.time().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn init_logging() {
    let log_format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("atbridge=warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout belongs to command output
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn parse_schedule(input: &str) -> ScheduleTime {
    if let Ok(zoned) = DateTime::parse_from_rfc3339(input) {
        return ScheduleTime::Zoned(zoned);
    }
    NAIVE_TIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(input, layout).ok())
        .map(ScheduleTime::Naive)
        .unwrap_or_else(|| ScheduleTime::Relative(input.to_string()))
}

fn parse_json_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_kwarg(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("keyword argument {:?} is not KEY=VALUE", raw))?;
    Ok((key.to_string(), parse_json_arg(value)))
}

fn build_call(name: &str, args: &[String], kwargs: &[String]) -> Result<DeferredCall> {
    let mut call = DeferredCall::named(name)?.args(args.iter().map(|a| parse_json_arg(a)));
    for raw in kwargs {
        let (key, value) = parse_kwarg(raw)?;
        call = call.kwarg(key, value);
    }
    Ok(call)
}

/// Warn on `out` (stderr in practice) when `name` must come from another runtime
fn notice_external_callable(
    registry: &CallableRegistry,
    name: &str,
    out: &mut impl Write,
) -> std::io::Result<()> {
    if registry.contains(name) {
        return Ok(());
    }
    writeln!(
        out,
        "{}",
        format!("! {} is not built in; the runtime must provide it", name).yellow()
    )
}

fn print_submitted(job: &Job) {
    println!(
        "{}",
        format!("✓ Job {} scheduled for {}", job.name(), job.time()).green().bold()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let registry = callables::builtin_registry()?;
    if let Some(outcome) = dispatch(&registry, std::env::args_os()) {
        return match outcome {
            Ok(()) => Ok(()),
            // The callable's own error, as it raised it
            Err(DeferredError::Callable(e)) => Err(e),
            Err(e) => Err(e.into()),
        };
    }

    let cli = Cli::parse();

    let mut config = BridgeConfig::from_env()?;
    if let Some(program) = &cli.at_program {
        config = config.with_at_program(program);
    }
    if let Some(program) = &cli.remove_program {
        config = config.with_remove_program(program);
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_timeout_ms(timeout_ms);
    }
    debug!(config = ?config, "Configuration loaded");

    let invoker =
        SubprocessInvoker::new().with_timeout(config.timeout_ms.map(Duration::from_millis));
    let service = AtService::new(Arc::new(invoker), config);

    match cli.command {
        Commands::List { json } => {
            let jobs = service.list_jobs().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else if jobs.is_empty() {
                println!("{}", "No pending jobs".yellow());
            } else {
                let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Script { job_id } => match service.get_script(job_id.as_str()).await? {
            Some(script) => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&script)?;
                stdout.flush()?;
            }
            None => {
                eprintln!("{}", format!("✗ No such job: {}", job_id).red());
                std::process::exit(1);
            }
        },

        Commands::Cancel { job_ids } => {
            if service.cancel(job_ids.clone()).await? {
                println!(
                    "{}",
                    format!("✓ Cancelled {}", job_ids.join(", ")).green().bold()
                );
            } else {
                eprintln!("{}", "✗ None of the given jobs exist".red());
                std::process::exit(1);
            }
        }

        Commands::Submit { time, raw, words } => {
            let command = match raw {
                Some(text) => ShellCommand::from(text),
                None if words.is_empty() => anyhow::bail!("nothing to submit: give --raw or words after --"),
                None => ShellCommand::from(words),
            };
            let job = service.submit_shell(command, parse_schedule(&time)).await?;
            print_submitted(&job);
        }

        Commands::Call {
            time,
            name,
            args,
            kwargs,
            runtime,
        } => {
            notice_external_callable(&registry, &name, &mut std::io::stderr().lock())?;
            let call = build_call(&name, &args, &kwargs)?;
            let job = service
                .submit_callable(&call, parse_schedule(&time), runtime.as_deref())
                .await?;
            print_submitted(&job);
        }

        Commands::Append { time, path, lines } => {
            // at(1) restores the cwd, but the runtime may not
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()
                    .context("resolving the working directory")?
                    .join(path)
            };
            let call = DeferredCall::object(&callables::AppendLines { path })?.args(lines);
            let job = service.submit_callable(&call, parse_schedule(&time), None).await?;
            print_submitted(&job);
        }

        Commands::Callables => {
            println!("{}", "Callables".cyan().bold());
            for name in registry.names() {
                println!("  {} {}", "•".bold(), name);
            }
            println!("{}", "Task types".cyan().bold());
            for tag in registry.task_types() {
                println!("  {} {}", "•".bold(), tag);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_parse_schedule() {
        assert!(matches!(
            parse_schedule("2018-11-15T16:15:00+02:00"),
            ScheduleTime::Zoned(t) if t.offset().local_minus_utc() == 7200
        ));

        let naive = NaiveDate::from_ymd_opt(2018, 11, 15)
            .unwrap()
            .and_hms_opt(16, 15, 0)
            .unwrap();
        for input in ["2018-11-15T16:15", "2018-11-15 16:15"] {
            assert!(matches!(parse_schedule(input), ScheduleTime::Naive(t) if t == naive));
        }

        assert!(matches!(
            parse_schedule("now + 1 minute"),
            ScheduleTime::Relative(s) if s == "now + 1 minute"
        ));
    }

    #[test]
    fn test_json_arguments() {
        assert_eq!(parse_json_arg("3"), json!(3));
        assert_eq!(parse_json_arg("[1, \"a\"]"), json!([1, "a"]));
        assert_eq!(parse_json_arg("plain text"), json!("plain text"));
        assert_eq!(parse_kwarg("content=\"hi\"").unwrap(), ("content".to_string(), json!("hi")));
        assert_eq!(parse_kwarg("eq=a=b").unwrap(), ("eq".to_string(), json!("a=b")));
        assert!(parse_kwarg("no-equals").is_err());
    }

    #[test]
    fn test_build_call() {
        let call = build_call(
            "fs.write",
            &["/tmp/out".to_string()],
            &["content=\"hi\"".to_string()],
        )
        .unwrap();
        assert_eq!(call.payload().args, vec![json!("/tmp/out")]);
        assert_eq!(call.payload().kwargs["content"], json!("hi"));

        assert!(build_call("not a name", &[], &[]).is_err());
    }

    #[test]
    fn test_external_callable_notice() {
        let registry = callables::builtin_registry().unwrap();

        let mut out = Vec::new();
        notice_external_callable(&registry, "fs.write", &mut out).unwrap();
        assert!(out.is_empty());

        notice_external_callable(&registry, "app.cleanup", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("app.cleanup is not built in"));
    }

    #[test]
    fn test_cli_parses_submit_words() {
        let cli = Cli::try_parse_from([
            "atbridge", "submit", "--at", "now + 1 minute", "--", "echo", "a b",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit { time, raw, words } => {
                assert_eq!(time, "now + 1 minute");
                assert!(raw.is_none());
                assert_eq!(words, vec!["echo", "a b"]);
            }
            _ => panic!("expected submit"),
        }
    }
}
