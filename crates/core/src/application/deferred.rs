//! Deferred calls - scheduling in-process logic through a shell-only daemon
//!
//! The daemon only ever runs shell commands. To run a callable later, the
//! submitting process builds a command that re-invokes a runtime executable
//! (by default the current one):
//!
//! ```text
//! <runtime> --deferred-call name=fs.touch W1siL3RtcC9qb2IyIl0se31d
//! ```
//!
//! At the scheduled time the runtime calls [`dispatch`] first thing in
//! `main`, which decodes the payload, resolves the target through a
//! [`CallableRegistry`] and runs it.
//!
//! # Trust
//!
//! Whoever can submit a deferred call can run any registered callable, with
//! arguments of their choosing, as the submitting user at the scheduled
//! time. Only accept callable submissions from trusted sources, and only
//! register callables you are willing to expose that way.

use crate::domain::error::ProtocolError;
use crate::domain::payload::{CallTarget, CallablePayload, Kwargs, PositionalArgs};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Inline-execute flag recognized by [`dispatch`]
pub const DEFERRED_CALL_FLAG: &str = "--deferred-call";

/// A registered function, called as `f(args, kwargs)`
pub type CallableFn = Box<dyn Fn(PositionalArgs, Kwargs) -> anyhow::Result<()> + Send + Sync>;

type Resolved<'r> = Box<dyn FnOnce(PositionalArgs, Kwargs) -> anyhow::Result<()> + 'r>;
type TaskFactory = Box<dyn Fn(Value) -> Result<Resolved<'static>, ProtocolError> + Send + Sync>;

/// A task object that travels inside the payload
///
/// The object's state is serialized at submission time and rebuilt in the
/// deferred process through the type registered under `TAG`.
pub trait DeferredTask: Serialize + DeserializeOwned + 'static {
    const TAG: &'static str;

    fn run(self, args: PositionalArgs, kwargs: Kwargs) -> anyhow::Result<()>;
}

#[derive(Serialize, Deserialize)]
struct TaskEnvelope {
    #[serde(rename = "type")]
    task_type: String,
    state: Value,
}

/// Errors of a deferred call
#[derive(Error, Debug)]
pub enum DeferredError {
    #[error("deferred call rejected: {0}")]
    Protocol(#[from] ProtocolError),

    /// The callable itself failed; its error is passed through untouched
    #[error(transparent)]
    Callable(anyhow::Error),
}

/// Callables a runtime is willing to run on behalf of deferred jobs
#[derive(Default)]
pub struct CallableRegistry {
    functions: BTreeMap<String, CallableFn>,
    tasks: BTreeMap<&'static str, TaskFactory>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under a dotted name such as `reports.send_digest`
    pub fn register<F>(&mut self, name: &str, function: F) -> Result<&mut Self, ProtocolError>
    where
        F: Fn(PositionalArgs, Kwargs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let target = CallTarget::name(name)?;
        if let CallTarget::Name(name) = target {
            self.functions.insert(name, Box::new(function));
        }
        Ok(self)
    }

    /// Register a task type so its serialized objects can be rebuilt
    pub fn register_task<T: DeferredTask>(&mut self) -> &mut Self {
        let factory: TaskFactory = Box::new(|state| {
            let task: T = serde_json::from_value(state)?;
            let run: Resolved<'static> = Box::new(move |args, kwargs| task.run(args, kwargs));
            Ok(run)
        });
        self.tasks.insert(T::TAG, factory);
        self
    }

    /// Registered function names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Registered task tags, sorted
    pub fn task_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tasks.keys().copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn resolve(&self, target: &CallTarget) -> Result<Resolved<'_>, ProtocolError> {
        match target {
            CallTarget::Name(name) => {
                let function = self
                    .functions
                    .get(name)
                    .ok_or_else(|| ProtocolError::UnknownCallable(name.clone()))?;
                let run: Resolved<'_> = Box::new(move |args, kwargs| function(args, kwargs));
                Ok(run)
            }
            CallTarget::Object(bytes) => {
                let envelope: TaskEnvelope = serde_json::from_slice(bytes)?;
                let factory = self
                    .tasks
                    .get(envelope.task_type.as_str())
                    .ok_or_else(|| ProtocolError::UnknownTaskType(envelope.task_type.clone()))?;
                let run: Resolved<'_> = factory(envelope.state)?;
                Ok(run)
            }
        }
    }

    /// Decode a snippet and argument blob, then run the target
    pub fn invoke(&self, snippet: &str, blob: &str) -> Result<(), DeferredError> {
        let (args, kwargs) = CallablePayload::decode_arguments(blob)?;
        let target = CallTarget::from_snippet(snippet)?;
        let run = self.resolve(&target)?;

        info!(
            target = %describe(&target),
            args = args.len(),
            kwargs = kwargs.len(),
            "Running deferred call"
        );
        run(args, kwargs).map_err(DeferredError::Callable)
    }
}

fn describe(target: &CallTarget) -> String {
    match target {
        CallTarget::Name(name) => name.clone(),
        CallTarget::Object(bytes) => format!("<object, {} bytes>", bytes.len()),
    }
}

/// Builder for the submission side
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredCall {
    payload: CallablePayload,
}

impl DeferredCall {
    /// Call a registered function by dotted name
    pub fn named(name: &str) -> Result<Self, ProtocolError> {
        Ok(Self {
            payload: CallablePayload::new(CallTarget::name(name)?),
        })
    }

    /// Carry a task object in the payload
    pub fn object<T: DeferredTask>(task: &T) -> Result<Self, ProtocolError> {
        let envelope = TaskEnvelope {
            task_type: T::TAG.to_string(),
            state: serde_json::to_value(task)?,
        };
        Ok(Self {
            payload: CallablePayload::new(CallTarget::Object(serde_json::to_vec(&envelope)?)),
        })
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.payload.args.push(value.into());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.payload.args.extend(values.into_iter().map(Into::into));
        self
    }

    /// Set a keyword argument (a repeated key replaces the earlier value)
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn payload(&self) -> &CallablePayload {
        &self.payload
    }

    /// `[<runtime>, --deferred-call, <snippet>, <blob>]`, ready for escaping
    pub fn command_words(&self, runtime: &Path) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let blob = self.payload.encode_arguments()?;
        Ok(vec![
            runtime.as_os_str().as_encoded_bytes().to_vec(),
            DEFERRED_CALL_FLAG.as_bytes().to_vec(),
            self.payload.target.to_snippet().into_bytes(),
            blob.into_bytes(),
        ])
    }
}

/// Entry point of the deferred process
///
/// Returns `None` when `argv` is not a deferred call (the program should
/// carry on with its normal `main`), otherwise the outcome of the call.
///
/// ```no_run
/// use atbridge_core::application::deferred::{dispatch, CallableRegistry};
///
/// let mut registry = CallableRegistry::new();
/// registry
///     .register("app.cleanup", |_args, _kwargs| Ok(()))
///     .unwrap();
/// if let Some(outcome) = dispatch(&registry, std::env::args_os()) {
///     std::process::exit(if outcome.is_ok() { 0 } else { 1 });
/// }
/// ```
pub fn dispatch<I, S>(registry: &CallableRegistry, argv: I) -> Option<Result<(), DeferredError>>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    if argv.get(1).map(|flag| flag != DEFERRED_CALL_FLAG).unwrap_or(true) {
        return None;
    }
    debug!(argc = argv.len(), "Deferred call requested");

    Some(dispatch_args(registry, &argv[2..]))
}

fn dispatch_args(registry: &CallableRegistry, rest: &[OsString]) -> Result<(), DeferredError> {
    let [snippet, blob] = rest else {
        return Err(ProtocolError::ArgumentCount(rest.len()).into());
    };
    let as_text = |arg: &OsString| {
        arg.to_str()
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::Encoding(format!("non UTF-8 argument {:?}", arg)))
    };
    registry.invoke(&as_text(snippet)?, &as_text(blob)?)
}
