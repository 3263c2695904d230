// ctx-assist-core/src/handlers.rs

//! One handler per `ctx` operation.
//!
//! Every handler follows the same template: announce progress, run `ctx`,
//! render the trimmed combined output, and on failure render an error block
//! instead of propagating. The returned tag identifies the handler even when
//! the tool failed.

use crate::cancellation::CancellationSource;
use crate::errors::InvocationError;
use crate::host::ResponseStream;
use crate::invocation::{invoke, InvocationLimits, InvocationOutcome, InvocationRequest, Launcher};
use crate::router::{CommandTag, OperationResult};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Makes `ctx` print plain text.
const NO_COLOR: &str = "--no-color";
/// Integration target used by `/hook` without arguments and by `/init`.
pub const DEFAULT_HOOK_TOOL: &str = "copilot";

pub(crate) const ADD_USAGE_MESSAGE: &str = "**Usage:** `/add <type> <content>`\n\n\
Types: `task`, `decision`, `learning`\n\n\
Example: `/add task Implement user authentication`";

pub(crate) const CANCELLED_MESSAGE: &str = "_Request cancelled._";

/// Everything a handler needs for one routed request.
pub(crate) struct HandlerContext<'a> {
    pub(crate) stream: &'a dyn ResponseStream,
    pub(crate) cwd: PathBuf,
    pub(crate) cancellation: Option<&'a dyn CancellationSource>,
    pub(crate) launcher: &'a dyn Launcher,
    pub(crate) executable: PathBuf,
    pub(crate) limits: InvocationLimits,
}

impl HandlerContext<'_> {
    async fn run_ctx<I, S>(&self, args: I) -> InvocationOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = InvocationRequest::new(self.executable.clone(), args)
            .current_dir(&self.cwd)
            .cancellation(self.cancellation)
            .limits(self.limits);
        invoke(self.launcher, request).await
    }
}

/// How a successful result is shown.
enum Rendering {
    /// Fenced code block, even when empty.
    Code,
    /// Fenced code block, or the given text when the tool printed nothing.
    CodeOr(String),
    /// Output is already markdown; pass it through.
    Markdown,
}

pub(crate) async fn dispatch(
    tag: CommandTag,
    prompt: &str,
    ctx: &HandlerContext<'_>,
) -> OperationResult {
    match tag {
        CommandTag::Init => handle_init(ctx).await,
        CommandTag::Status => {
            run_operation(
                ctx,
                tag,
                "Checking context status...",
                vec!["status", NO_COLOR],
                "get status",
                Rendering::Code,
            )
            .await
        }
        CommandTag::Agent => {
            run_operation(
                ctx,
                tag,
                "Generating AI-ready context packet...",
                vec!["agent"],
                "generate agent context",
                Rendering::Markdown,
            )
            .await
        }
        CommandTag::Drift => {
            run_operation(
                ctx,
                tag,
                "Detecting context drift...",
                vec!["drift", NO_COLOR],
                "detect drift",
                Rendering::Code,
            )
            .await
        }
        CommandTag::Recall => handle_recall(ctx, prompt).await,
        CommandTag::Hook => handle_hook(ctx, prompt).await,
        CommandTag::Add => handle_add(ctx, prompt).await,
        CommandTag::Load => {
            run_operation(
                ctx,
                tag,
                "Loading assembled context...",
                vec!["load"],
                "load context",
                Rendering::Markdown,
            )
            .await
        }
        CommandTag::Compact => {
            run_operation(
                ctx,
                tag,
                "Compacting context...",
                vec!["compact", NO_COLOR],
                "compact context",
                Rendering::CodeOr("Context compacted successfully.".to_string()),
            )
            .await
        }
        CommandTag::Sync => {
            run_operation(
                ctx,
                tag,
                "Syncing context with codebase...",
                vec!["sync", NO_COLOR],
                "sync context",
                Rendering::CodeOr("Context synced with codebase.".to_string()),
            )
            .await
        }
        CommandTag::Help | CommandTag::None => {
            // Not reachable through the router; nothing to run.
            warn!(command = %tag, "Dispatch called with a non-operation tag.");
            OperationResult::new(tag)
        }
    }
}

async fn run_operation<S: Into<String>>(
    ctx: &HandlerContext<'_>,
    tag: CommandTag,
    progress: &str,
    args: Vec<S>,
    action: &str,
    rendering: Rendering,
) -> OperationResult {
    ctx.stream.progress(progress);
    match ctx.run_ctx(args).await {
        Ok(output) => render_output(ctx.stream, &output.combined(), rendering),
        Err(err) => render_failure(ctx.stream, action, &err),
    }
    OperationResult::new(tag)
}

async fn handle_init(ctx: &HandlerContext<'_>) -> OperationResult {
    ctx.stream.progress("Initializing .context/ directory...");
    match ctx.run_ctx(["init", NO_COLOR]).await {
        Ok(output) => {
            let text = output.combined();
            if !text.is_empty() {
                ctx.stream.markdown(&code_block(&text));
            }
            generate_copilot_instructions(ctx).await;
            if text.is_empty() {
                ctx.stream.markdown(
                    "`.context/` directory initialized. Run `/status` to see your project context.",
                );
            }
        }
        Err(err) => render_failure(ctx.stream, "initialize context", &err),
    }
    OperationResult::new(CommandTag::Init)
}

/// Best-effort follow-on to `/init`: a failure becomes a note and never
/// fails the init itself.
async fn generate_copilot_instructions(ctx: &HandlerContext<'_>) {
    ctx.stream.progress("Generating Copilot instructions...");
    match ctx.run_ctx(hook_args(DEFAULT_HOOK_TOOL)).await {
        Ok(output) => {
            let text = output.combined();
            if text.is_empty() {
                ctx.stream.markdown(
                    "\n`.github/copilot-instructions.md` generated for Copilot context loading.",
                );
            } else {
                ctx.stream
                    .markdown(&format!("\n**Copilot integration:**\n{}", code_block(&text)));
            }
        }
        Err(err) => {
            debug!(error = %err, "Copilot hook generation failed after init.");
            ctx.stream.markdown(
                "\n> **Note:** Could not generate `.github/copilot-instructions.md`. \
                 Run `/hook copilot` manually.",
            );
        }
    }
}

async fn handle_recall(ctx: &HandlerContext<'_>, prompt: &str) -> OperationResult {
    let mut args = vec!["recall".to_string(), "list".to_string(), NO_COLOR.to_string()];
    let query = prompt.trim();
    if !query.is_empty() {
        args.push("--query".to_string());
        args.push(query.to_string());
    }
    let rendering = Rendering::CodeOr("No session history found.".to_string());
    run_operation(
        ctx,
        CommandTag::Recall,
        "Searching session history...",
        args,
        "recall sessions",
        rendering,
    )
    .await
}

async fn handle_hook(ctx: &HandlerContext<'_>, prompt: &str) -> OperationResult {
    let tool = match prompt.trim() {
        "" => DEFAULT_HOOK_TOOL,
        tool => tool,
    };
    let progress = format!("Generating {} integration config...", tool);
    let rendering = Rendering::CodeOr(format!("Integration config for **{}** generated.", tool));
    run_operation(
        ctx,
        CommandTag::Hook,
        &progress,
        hook_args(tool),
        "generate hook",
        rendering,
    )
    .await
}

async fn handle_add(ctx: &HandlerContext<'_>, prompt: &str) -> OperationResult {
    let mut tokens = prompt.split_whitespace();
    let Some(kind) = tokens.next() else {
        ctx.stream.markdown(ADD_USAGE_MESSAGE);
        return OperationResult::new(CommandTag::Add);
    };
    let content = tokens.collect::<Vec<_>>().join(" ");

    let mut args = vec!["add".to_string(), kind.to_string()];
    if !content.is_empty() {
        args.push(content.clone());
    }
    let progress = format!("Adding {}...", kind);
    let action = format!("add {}", kind);
    let rendering = Rendering::CodeOr(format!("Added **{}**: {}", kind, content));
    run_operation(ctx, CommandTag::Add, &progress, args, &action, rendering).await
}

fn hook_args(tool: &str) -> Vec<String> {
    vec![
        "hook".to_string(),
        tool.to_string(),
        "--write".to_string(),
        NO_COLOR.to_string(),
    ]
}

fn render_output(stream: &dyn ResponseStream, text: &str, rendering: Rendering) {
    match rendering {
        Rendering::Code => stream.markdown(&code_block(text)),
        Rendering::CodeOr(fallback) if text.is_empty() => stream.markdown(&fallback),
        Rendering::CodeOr(_) => stream.markdown(&code_block(text)),
        Rendering::Markdown => stream.markdown(text),
    }
}

fn render_failure(stream: &dyn ResponseStream, action: &str, err: &InvocationError) {
    if err.is_cancelled() {
        debug!(action = action, "Operation cancelled before it started.");
        stream.markdown(CANCELLED_MESSAGE);
        return;
    }
    warn!(action = action, error = %err, "ctx invocation failed.");
    stream.markdown(&format!(
        "**Error:** Failed to {}.\n\n{}",
        action,
        code_block(&err.to_string())
    ));
}

pub(crate) fn code_block(text: &str) -> String {
    format!("```\n{}\n```", text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_block() {
        assert_eq!(code_block("3 tasks pending"), "```\n3 tasks pending\n```");
    }

    #[test]
    fn test_hook_args() {
        assert_eq!(hook_args("cursor"), vec!["hook", "cursor", "--write", "--no-color"]);
    }
}
