// Bridge configuration (env-driven, CLI flags override)

use crate::error::{BridgeError, Result};
use std::path::PathBuf;

/// Default program used for listing, submitting, dumping and removing jobs
pub const DEFAULT_AT_PROGRAM: &str = "at";

pub const ENV_AT_PROGRAM: &str = "ATBRIDGE_AT_PROGRAM";
pub const ENV_REMOVE_PROGRAM: &str = "ATBRIDGE_REMOVE_PROGRAM";
pub const ENV_RUNTIME: &str = "ATBRIDGE_RUNTIME";
pub const ENV_TIMEOUT_MS: &str = "ATBRIDGE_TIMEOUT_MS";

/// Where the daemon's entry points live and how long to wait for them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// `at` binary (list with `-l`, dump with `-c`, submit with a time)
    pub at_program: String,
    /// Dedicated removal binary such as `atrm`; `None` means `at -r`
    pub remove_program: Option<String>,
    /// Executable re-invoked by deferred callable jobs; `None` means the current one
    pub runtime: Option<PathBuf>,
    /// Per-invocation timeout, handed to the process invoker
    pub timeout_ms: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            at_program: DEFAULT_AT_PROGRAM.to_string(),
            remove_program: None,
            runtime: None,
            timeout_ms: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `ATBRIDGE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BridgeConfig::from_env`] with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(at) = lookup(ENV_AT_PROGRAM).filter(|s| !s.is_empty()) {
            config.at_program = expand_program(&at);
        }
        config.remove_program = lookup(ENV_REMOVE_PROGRAM)
            .filter(|s| !s.is_empty())
            .map(|s| expand_program(&s));
        config.runtime = lookup(ENV_RUNTIME)
            .filter(|s| !s.is_empty())
            .map(|s| PathBuf::from(expand_program(&s)));

        if let Some(raw) = lookup(ENV_TIMEOUT_MS).filter(|s| !s.is_empty()) {
            let timeout_ms = raw.trim().parse::<u64>().map_err(|e| {
                BridgeError::Config(format!("{} must be milliseconds, got {:?}: {}", ENV_TIMEOUT_MS, raw, e))
            })?;
            config.timeout_ms = Some(timeout_ms);
        }

        Ok(config)
    }

    pub fn with_at_program(mut self, program: impl AsRef<str>) -> Self {
        self.at_program = expand_program(program.as_ref());
        self
    }

    pub fn with_remove_program(mut self, program: impl AsRef<str>) -> Self {
        self.remove_program = Some(expand_program(program.as_ref()));
        self
    }

    pub fn with_runtime(mut self, runtime: impl Into<PathBuf>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Expand a leading `~` so config files and env vars can point at `~/bin/at`
fn expand_program(program: &str) -> String {
    shellexpand::tilde(program).into_owned()
}
