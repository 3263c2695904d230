use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// ctx-assist: chat-style access to the `ctx` context tool.
/// Starts an interactive session by default, or answers a single request.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase message verbosity.
    ///
    /// Specify multiple times for more verbose output:
    ///  -v:  INFO level
    ///  -vv: DEBUG level
    ///  -vvv: TRACE level (most verbose)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Answer a single request non-interactively, e.g. "/status" or "show drift".
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Explicit command for the single request (status, drift, add, ...).
    /// The prompt, if any, becomes its payload.
    #[arg(short, long)]
    pub command: Option<String>,

    /// Project folder to run `ctx` in. Defaults to the directory holding
    /// `ctx-assist.toml`, or the current directory.
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Print the single response as JSON instead of rendered markdown.
    /// Only applies together with --prompt or --command.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn is_one_shot(&self) -> bool {
        self.prompt.is_some() || self.command.is_some()
    }
}
