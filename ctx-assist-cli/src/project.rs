// ctx-assist-cli/src/project.rs
//! Project discovery and configuration loading for the terminal host.

use anyhow::{Context, Result};
use ctx_assist_core::AssistConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_FILENAME: &str = "ctx-assist.toml";
/// Environment variable that overrides `ctx.executable_path`.
pub const EXECUTABLE_ENV: &str = "CTX_ASSIST_CTX_PATH";

/// Walks up from `start` to the first directory holding [`CONFIG_FILENAME`].
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILENAME).is_file())
        .map(Path::to_path_buf)
}

/// Settings and workspace root for one session.
#[derive(Debug)]
pub struct Project {
    pub config: AssistConfig,
    /// `None` when the requested workspace does not exist.
    pub root: Option<PathBuf>,
}

/// Loads `ctx-assist.toml` (if any) above `start` and resolves the workspace.
///
/// An explicit `workspace` wins over the discovered root; a missing config
/// file means defaults, with `start` as the workspace.
pub fn load_project(
    start: &Path,
    workspace: Option<&Path>,
    executable_override: Option<String>,
) -> Result<Project> {
    let discovered = find_project_root(start);

    let config = match &discovered {
        Some(root) => {
            let config_path = root.join(CONFIG_FILENAME);
            info!("Found configuration file at: {:?}", config_path);
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            AssistConfig::from_toml_str(&content)
                .with_context(|| format!("Invalid configuration in {:?}", config_path))?
        }
        None => {
            debug!(start = ?start, "No {} found; using defaults.", CONFIG_FILENAME);
            AssistConfig::default()
        }
    };
    let config = config.with_executable_override(executable_override);

    let root = match workspace {
        Some(dir) if dir.is_dir() => Some(dir.to_path_buf()),
        Some(dir) => {
            debug!(workspace = ?dir, "Requested workspace is not a directory.");
            None
        }
        None => Some(discovered.unwrap_or_else(|| start.to_path_buf())),
    };

    Ok(Project { config, root })
}
