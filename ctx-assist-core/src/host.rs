// ctx-assist-core/src/host.rs

//! Capabilities the host application provides to the core.
//!
//! The router never reaches into a UI toolkit or settings store directly; it
//! is handed these small traits, so tests can pass recording doubles.

use std::path::{Path, PathBuf};

/// Executable name used when no override is configured. Resolved via `PATH`.
pub const DEFAULT_EXECUTABLE: &str = "ctx";

/// Where progress and the rendered response go.
pub trait ResponseStream: Send + Sync {
    /// Transient progress note. Fire-and-forget.
    fn progress(&self, message: &str);

    /// Appends markdown to the response.
    fn markdown(&self, text: &str);
}

/// Resolves the working directory for the current session.
pub trait WorkspaceResolver: Send + Sync {
    /// `None` when no project folder is open.
    fn workspace_root(&self) -> Option<PathBuf>;
}

/// Host settings the core reads.
pub trait Settings: Send + Sync {
    /// Configured path to the `ctx` executable, if any.
    fn executable_path(&self) -> Option<String>;
}

/// Returns the configured executable, or [`DEFAULT_EXECUTABLE`] when the
/// setting is absent or blank.
pub fn resolve_executable(settings: &dyn Settings) -> PathBuf {
    match settings.executable_path() {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
        _ => PathBuf::from(DEFAULT_EXECUTABLE),
    }
}

/// Workspace resolver with a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct FixedWorkspace(pub Option<PathBuf>);

impl FixedWorkspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self(Some(root.as_ref().to_path_buf()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl WorkspaceResolver for FixedWorkspace {
    fn workspace_root(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}
