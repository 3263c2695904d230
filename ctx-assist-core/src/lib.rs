// ctx-assist-core/src/lib.rs

#![doc = include_str!("../../README.md")]

pub mod cancellation;
pub mod config;
pub mod errors;
pub mod followup;
mod handlers;
pub mod host;
pub mod invocation;
pub mod router;
pub mod utils;


pub use cancellation::{CancellationRegistration, CancellationSource, TokenCancellation};
pub use config::AssistConfig;
pub use errors::{ConfigError, InvocationError};
pub use followup::{provide_followups, Followup};
pub use handlers::DEFAULT_HOOK_TOOL;
pub use host::{FixedWorkspace, ResponseStream, Settings, WorkspaceResolver};
pub use invocation::{
    invoke, CommandOutput, InvocationLimits, InvocationOutcome, InvocationRequest, Launcher,
    TokioLauncher,
};
pub use router::{ChatRequest, CommandTag, OperationResult, Router};
