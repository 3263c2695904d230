// ctx-assist-cli/src/main.rs
mod host;
mod input;
mod models;
mod project;
mod rendering;

use anyhow::{anyhow, Context, Result};
use colored::*;
use serde::Serialize;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};

use ctx_assist_core::{
    provide_followups, ChatRequest, CommandTag, FixedWorkspace, Followup, OperationResult, Router,
    TokenCancellation, TokioLauncher,
};

use crate::host::TerminalStream;
use crate::project::{load_project, Project, EXECUTABLE_ENV};
use crate::rendering::print_formatted;

use clap::Parser;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{
    fmt::{self, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const APP_DIR_NAME: &str = "ctx-assist";
const LOG_FILE_NAME: &str = "ctx-assist.log";
const HISTORY_FILE_NAME: &str = "cli_history.txt";

/// JSON shape of a one-shot response.
#[derive(Serialize)]
struct JsonResponse<'a> {
    command: CommandTag,
    markdown: &'a str,
    followups: Vec<Followup>,
}

fn app_dir() -> Option<PathBuf> {
    dirs::cache_dir()
        .or_else(dirs::runtime_dir)
        .or_else(|| Some(env::temp_dir()))
        .map(|d| d.join(APP_DIR_NAME))
}

fn build_router(project: &Project) -> Router {
    Router::new(
        Arc::new(TokioLauncher),
        Arc::new(FixedWorkspace(project.root.clone())),
        Arc::new(project.config.clone()),
    )
    .with_limits(project.config.limits())
}

/// Routes one request. Ctrl-C while it runs cancels the `ctx` process.
async fn answer(
    router: &Router,
    request: &ChatRequest,
    show_spinner: bool,
) -> (OperationResult, String) {
    let cancellation = TokenCancellation::new();
    let watcher = {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received; cancelling request.");
                cancellation.cancel();
            }
        })
    };

    let stream = TerminalStream::new(show_spinner);
    let result = router.route(request, &stream, Some(&cancellation)).await;
    watcher.abort();

    debug!(command = %result.command, "Request finished.");
    (result, stream.finish())
}

fn print_response(markdown: &str) {
    if let Err(e) = print_formatted(markdown) {
        error!("Failed to render response markdown: {}. Printing raw.", e);
        println!("{}", markdown);
    }
}

fn print_followups(result: &OperationResult) {
    let followups = provide_followups(result);
    if followups.is_empty() {
        return;
    }
    println!("\n{}", "Next:".bold());
    for followup in followups {
        println!(
            "  {:<10} {}",
            format!("/{}", followup.command).cyan(),
            followup.prompt.dimmed()
        );
    }
}

fn print_welcome_message(project: &Project) {
    println!("\n{}", "ctx-assist - Persistent Context for AI".cyan().bold());
    match &project.root {
        Some(root) => println!("{}: {}", "Workspace".cyan(), root.display()),
        None => println!("{}", "No workspace folder is open.".yellow()),
    }
    println!(
        "{}\n{}",
        "Type '/help' or a question to get started.".dimmed(),
        "Type 'exit', 'quit', Ctrl-D, or press Enter on an empty line to quit.".dimmed()
    );
    println!();
}

/// Answers a single request (non-interactive).
async fn run_single_turn(router: &Router, request: ChatRequest, json: bool) -> Result<()> {
    info!(command = ?request.command, prompt = %request.prompt, "Running non-interactive request.");
    let (result, markdown) = answer(router, &request, !json).await;

    if json {
        let response = JsonResponse {
            command: result.command,
            markdown: &markdown,
            followups: provide_followups(&result),
        };
        let rendered =
            serde_json::to_string_pretty(&response).context("Failed to serialize response")?;
        println!("{}", rendered);
    } else {
        print_response(&markdown);
        print_followups(&result);
    }
    Ok(())
}

/// Runs an interactive session using rustyline for a REPL experience.
async fn run_interactive(router: &Router, project: &Project) -> Result<()> {
    print_welcome_message(project);

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .edit_mode(rustyline::EditMode::Emacs)
        .auto_add_history(true)
        .build();
    let mut rl = DefaultEditor::with_config(rl_config)?;

    let history_dir =
        app_dir().ok_or_else(|| anyhow!("Could not determine cache directory for history file"))?;
    fs::create_dir_all(&history_dir).context("Failed to create history directory")?;
    let history_file_path = history_dir.join(HISTORY_FILE_NAME);
    if rl.load_history(&history_file_path).is_err() {
        debug!(
            path = %history_file_path.display(),
            "No previous CLI history found or error loading."
        );
    }

    let prompt = format!("{} ", ">".green().bold());

    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed_input = line.trim();
                let lowered = trimmed_input.to_lowercase();
                if trimmed_input.is_empty() || lowered == "exit" || lowered == "quit" {
                    info!("Exit command or empty line entered, exiting interactive mode.");
                    break;
                }

                let request = input::parse_line(trimmed_input);
                let (result, markdown) = answer(router, &request, true).await;
                println!();
                print_response(&markdown);
                print_followups(&result);
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".yellow());
                continue;
            }
            Err(ReadlineError::Eof) => {
                info!("EOF detected, exiting interactive mode.");
                break;
            }
            Err(err) => {
                error!("Readline error: {:?}", err);
                eprintln!("Error reading input: {}", err.to_string().red());
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&history_file_path) {
        warn!(path = %history_file_path.display(), error = %e, "Failed to save CLI history.");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    colored::control::set_override(true);

    dotenvy::dotenv().ok();
    let cli = models::cli::Cli::parse();

    // --- Logging Setup ---
    let default_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(default_level.into()));

    let Some(log_dir) = app_dir() else {
        eprintln!("{}", "Error: Could not determine a suitable directory for log files.".red());
        return ExitCode::FAILURE;
    };
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("{} Failed to create log directory {}: {}", "Error:".red(), log_dir.display(), e);
        return ExitCode::FAILURE;
    }
    let log_path = log_dir.join(LOG_FILE_NAME);
    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let time_format = match time::format_description::parse(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]",
    ) {
        Ok(desc) => desc,
        Err(e) => {
            eprintln!("{} Failed to parse log time format: {}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    };
    let local_timer = LocalTime::new(time_format);

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(local_timer.clone())
        .with_target(false)
        .with_level(true);
    let file_layer = fmt::layer()
        .with_writer(non_blocking_writer)
        .with_timer(local_timer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("{} Failed to initialize logging: {}", "Error:".red(), e);
        return ExitCode::FAILURE;
    }
    colored::control::unset_override();

    info!(
        "Logging initialized. Level determined by RUST_LOG or -v flags (default: {}). \
         Logging to stderr and {}",
        default_level,
        log_path.display()
    );
    // --- End Logging Setup ---

    let project = match env::current_dir()
        .context("Failed to get current directory")
        .and_then(|cwd| load_project(&cwd, cli.workspace.as_deref(), env::var(EXECUTABLE_ENV).ok()))
    {
        Ok(project) => project,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    };
    debug!(config = ?project.config, root = ?project.root, "Project resolved.");

    let router = build_router(&project);

    let result = if cli.is_one_shot() {
        let request = input::one_shot_request(cli.command.as_deref(), cli.prompt.as_deref());
        run_single_turn(&router, request, cli.json).await
    } else {
        if cli.json {
            warn!("--json only applies with --prompt or --command; ignoring.");
        }
        run_interactive(&router, &project).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Operation failed: {:#}", e);
            eprintln!("{} Operation failed: {:#}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}
