// ctx-assist-core/src/followup.rs

//! Suggested next actions shown after a response.

use crate::router::{CommandTag, OperationResult};
use serde::Serialize;

/// A clickable suggestion: prompt text plus the command it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Followup {
    pub prompt: &'static str,
    pub command: CommandTag,
}

const fn followup(prompt: &'static str, command: CommandTag) -> Followup {
    Followup { prompt, command }
}

/// Suggestions for the operation that just ran. Pure and deterministic;
/// operations without a natural next step get none.
pub fn provide_followups(result: &OperationResult) -> Vec<Followup> {
    match result.command {
        CommandTag::Init => vec![
            followup("Show my context status", CommandTag::Status),
            followup("Generate copilot integration", CommandTag::Hook),
        ],
        CommandTag::Status => vec![
            followup("Detect context drift", CommandTag::Drift),
            followup("Load full context", CommandTag::Load),
        ],
        CommandTag::Drift => vec![
            followup("Sync context with codebase", CommandTag::Sync),
            followup("Show context status", CommandTag::Status),
        ],
        CommandTag::Help => vec![
            followup("Initialize project context", CommandTag::Init),
            followup("Show context status", CommandTag::Status),
        ],
        _ => Vec::new(),
    }
}
