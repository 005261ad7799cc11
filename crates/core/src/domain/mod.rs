// Domain Layer - the at(1) wire protocol, free of any process handling

pub mod error;
pub mod job;
pub mod payload;
pub mod shell;
pub mod time;

// Re-exports
pub use error::ProtocolError;
pub use job::{Job, JobRef, JobSelection};
pub use payload::{CallTarget, CallablePayload, Kwargs, PositionalArgs};
pub use shell::{join_words, shell_escape, ShellCommand};
pub use time::{format_at_time, format_in_zone, format_naive, parse_at_time, ScheduleTime};
