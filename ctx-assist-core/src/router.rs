// ctx-assist-core/src/router.rs

//! Maps an inbound chat request to one of the `ctx` operations.
//!
//! A request either names an operation explicitly (`/status`) or carries
//! only free text, in which case a fixed-priority keyword scan picks the
//! operation, falling back to a static help table.

use crate::cancellation::CancellationSource;
use crate::handlers::{self, HandlerContext};
use crate::host::{resolve_executable, ResponseStream, Settings, WorkspaceResolver};
use crate::invocation::{InvocationLimits, Launcher};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) const NO_WORKSPACE_MESSAGE: &str =
    "**Error:** No workspace folder is open. Open a project folder first.";

pub(crate) const HELP_MESSAGE: &str = "## ctx — Persistent Context for AI\n\n\
Available commands:\n\n\
| Command | Description |\n\
|---------|-------------|\n\
| `/init` | Initialize `.context/` directory |\n\
| `/status` | Show context summary |\n\
| `/agent` | Print AI-ready context packet |\n\
| `/drift` | Detect stale or invalid context |\n\
| `/recall` | Browse session history |\n\
| `/hook` | Generate tool integration configs |\n\
| `/add` | Add task, decision, or learning |\n\
| `/load` | Output assembled context |\n\
| `/compact` | Archive completed tasks |\n\
| `/sync` | Reconcile context with codebase |\n\n\
Example: `/status` or `/add task Fix login bug`";

/// Identity of the operation that produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandTag {
    Init,
    Status,
    Agent,
    Drift,
    Recall,
    Hook,
    Add,
    Load,
    Compact,
    Sync,
    /// Free text matched no keyword; the help table was shown.
    Help,
    /// No operation ran (e.g. no workspace and no recognizable command).
    None,
}

impl CommandTag {
    /// Operations a request can name explicitly.
    pub const RECOGNIZED: [CommandTag; 10] = [
        CommandTag::Init,
        CommandTag::Status,
        CommandTag::Agent,
        CommandTag::Drift,
        CommandTag::Recall,
        CommandTag::Hook,
        CommandTag::Add,
        CommandTag::Load,
        CommandTag::Compact,
        CommandTag::Sync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandTag::Init => "init",
            CommandTag::Status => "status",
            CommandTag::Agent => "agent",
            CommandTag::Drift => "drift",
            CommandTag::Recall => "recall",
            CommandTag::Hook => "hook",
            CommandTag::Add => "add",
            CommandTag::Load => "load",
            CommandTag::Compact => "compact",
            CommandTag::Sync => "sync",
            CommandTag::Help => "help",
            CommandTag::None => "none",
        }
    }

    /// Parses an explicit command name. Only recognized operations parse;
    /// `help`, `none` and anything else yield `None`.
    pub fn parse(name: &str) -> Option<CommandTag> {
        let name = name.trim();
        Self::RECOGNIZED
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound request from the chat surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatRequest {
    /// Explicit command name, if the user picked one.
    pub command: Option<String>,
    /// Free text typed after (or instead of) the command.
    pub prompt: String,
}

impl ChatRequest {
    pub fn command(command: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            prompt: prompt.into(),
        }
    }

    pub fn freeform(prompt: impl Into<String>) -> Self {
        Self {
            command: None,
            prompt: prompt.into(),
        }
    }

    fn explicit_tag(&self) -> Option<CommandTag> {
        self.command.as_deref().and_then(CommandTag::parse)
    }
}

/// Produced once per routed request and handed to the follow-up step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub command: CommandTag,
}

impl OperationResult {
    pub fn new(command: CommandTag) -> Self {
        Self { command }
    }
}

/// Keyword families checked in order; the first hit wins.
const INTENT_KEYWORDS: &[(CommandTag, &[&str])] = &[
    (CommandTag::Init, &["init"]),
    (CommandTag::Status, &["status"]),
    (CommandTag::Drift, &["drift"]),
    (CommandTag::Recall, &["recall", "session", "history"]),
];

/// Guesses the operation behind free text by substring match.
pub fn infer_intent(prompt: &str) -> Option<CommandTag> {
    let prompt = prompt.trim().to_lowercase();
    INTENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| prompt.contains(keyword)))
        .map(|(tag, _)| *tag)
}

/// Dispatches chat requests to operation handlers.
pub struct Router {
    launcher: Arc<dyn Launcher>,
    workspace: Arc<dyn WorkspaceResolver>,
    settings: Arc<dyn Settings>,
    limits: InvocationLimits,
}

impl Router {
    pub fn new(
        launcher: Arc<dyn Launcher>,
        workspace: Arc<dyn WorkspaceResolver>,
        settings: Arc<dyn Settings>,
    ) -> Self {
        Self {
            launcher,
            workspace,
            settings,
            limits: InvocationLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: InvocationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Routes one request. Never fails: every handler renders its own errors
    /// into `stream` and still returns a tagged result.
    pub async fn route(
        &self,
        request: &ChatRequest,
        stream: &dyn ResponseStream,
        cancellation: Option<&dyn CancellationSource>,
    ) -> OperationResult {
        let Some(cwd) = self.workspace.workspace_root() else {
            warn!(command = ?request.command, "No workspace folder; not routing request.");
            stream.markdown(NO_WORKSPACE_MESSAGE);
            return OperationResult::new(request.explicit_tag().unwrap_or(CommandTag::None));
        };

        let ctx = HandlerContext {
            stream,
            cwd,
            cancellation,
            launcher: self.launcher.as_ref(),
            executable: resolve_executable(self.settings.as_ref()),
            limits: self.limits,
        };

        if let Some(tag) = request.explicit_tag() {
            info!(command = %tag, cwd = ?ctx.cwd, "Routing explicit command.");
            return handlers::dispatch(tag, &request.prompt, &ctx).await;
        }

        match infer_intent(&request.prompt) {
            Some(tag) => {
                info!(command = %tag, "Routing free-form request by keyword.");
                handlers::dispatch(tag, &request.prompt, &ctx).await
            }
            None => {
                debug!("No keyword matched; showing help.");
                stream.markdown(HELP_MESSAGE);
                OperationResult::new(CommandTag::Help)
            }
        }
    }
}
