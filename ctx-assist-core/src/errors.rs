// ctx-assist-core/src/errors.rs
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Reasons an invocation of the external tool can fail.
///
/// `Cancelled` is kept apart from the process-level variants so callers can
/// skip alarming error text when the user aborted the request themselves.
#[derive(Error, Debug)]
pub enum InvocationError {
    /// Cancellation was already requested before anything was spawned.
    #[error("Cancelled")]
    Cancelled,

    /// The executable could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The wall-clock limit elapsed and the process was killed.
    #[error("'{program}' timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    /// Combined stdout and stderr grew past the capture limit.
    #[error("'{program}' produced more than {limit} bytes of output")]
    OutputLimit { program: String, limit: usize },

    /// The process exited with a nonzero status code.
    #[error("Command failed: {program} exited with status {code}")]
    Exit { program: String, code: i32 },

    /// The process was terminated without an exit code (usually a signal).
    #[error("Command failed: {program} was terminated{}", signal_suffix(.signal))]
    Terminated { program: String, signal: Option<i32> },

    /// Reading the process streams or waiting on it failed.
    #[error("I/O error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl InvocationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InvocationError::Cancelled)
    }

    /// Failures that come from the exit status alone, which the wrapper may
    /// normalize to success when the process still printed something.
    pub fn is_exit_status(&self) -> bool {
        matches!(
            self,
            InvocationError::Exit { .. } | InvocationError::Terminated { .. }
        )
    }
}

fn signal_suffix(signal: &Option<i32>) -> String {
    match signal {
        Some(sig) => format!(" by signal {}", sig),
        None => String::new(),
    }
}

/// Errors raised while loading or validating `ctx-assist.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration Error: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}
