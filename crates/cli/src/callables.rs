//! Built-in deferred callables
//!
//! These are what `atbridge call` can schedule out of the box, and what the
//! binary will run when the daemon re-invokes it with `--deferred-call`.

use anyhow::{bail, Context, Result};
use atbridge_core::application::{CallableRegistry, DeferredTask};
use atbridge_core::domain::{Kwargs, PositionalArgs};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

pub fn builtin_registry() -> Result<CallableRegistry> {
    let mut registry = CallableRegistry::new();
    registry
        .register("log.message", log_message)?
        .register("fs.touch", fs_touch)?
        .register("fs.write", fs_write)?;
    registry.register_task::<AppendLines>();
    Ok(registry)
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn path_arg(args: &PositionalArgs, kwargs: &Kwargs) -> Result<PathBuf> {
    args.first()
        .or_else(|| kwargs.get("path"))
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .context("expected a path as first argument or `path` keyword")
}

/// `log.message(parts...)` - emit the arguments as one log line
fn log_message(args: PositionalArgs, kwargs: Kwargs) -> Result<()> {
    let message = args.iter().map(text).collect::<Vec<_>>().join(" ");
    info!(message = %message, kwargs = ?kwargs, "Deferred log message");
    Ok(())
}

/// `fs.touch(path)` - create the file if missing
fn fs_touch(args: PositionalArgs, kwargs: Kwargs) -> Result<()> {
    let path = path_arg(&args, &kwargs)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("touching {}", path.display()))?;
    Ok(())
}

/// `fs.write(path, content)` - replace the file's content
fn fs_write(args: PositionalArgs, kwargs: Kwargs) -> Result<()> {
    let path = path_arg(&args, &kwargs)?;
    let content = match (args.get(1), kwargs.get("content")) {
        (Some(_), Some(_)) => bail!("content given both positionally and as keyword"),
        (Some(value), None) | (None, Some(value)) => text(value),
        (None, None) => String::new(),
    };
    std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))
}

/// Task object: append each argument as a line to `path`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLines {
    pub path: PathBuf,
}

impl DeferredTask for AppendLines {
    const TAG: &'static str = "fs.append";

    fn run(self, args: PositionalArgs, _kwargs: Kwargs) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        for line in &args {
            writeln!(file, "{}", text(line))?;
        }
        Ok(())
    }
}
