// ctx-assist-core/src/config.rs

//! Handles configuration structures and parsing for the assistant.

use crate::errors::ConfigError;
use crate::host::Settings;
use crate::invocation::InvocationLimits;
use serde::Deserialize;
use std::time::Duration;

/// Contents of `ctx-assist.toml`. Every key is optional.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AssistConfig {
    #[serde(default)]
    pub ctx: CtxConfig,
}

/// The `[ctx]` table: how to run the external tool.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CtxConfig {
    #[serde(default)]
    pub executable_path: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_output_bytes: Option<usize>,
}

impl AssistConfig {
    pub fn from_toml_str(config_toml_content: &str) -> Result<AssistConfig, ConfigError> {
        let config: AssistConfig = match toml::from_str(config_toml_content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse TOML content");
                return Err(ConfigError::Parse(e));
            }
        };

        if let Some(path) = &config.ctx.executable_path {
            if path.trim().is_empty() {
                return Err(ConfigError::invalid("'ctx.executable_path' is empty."));
            }
        }
        if config.ctx.timeout_secs == Some(0) {
            return Err(ConfigError::invalid("'ctx.timeout_secs' must be greater than 0."));
        }
        if config.ctx.max_output_bytes == Some(0) {
            return Err(ConfigError::invalid(
                "'ctx.max_output_bytes' must be greater than 0.",
            ));
        }

        tracing::info!("Successfully parsed and validated assistant configuration.");
        Ok(config)
    }

    /// Replaces the configured executable, e.g. from an environment variable.
    pub fn with_executable_override(mut self, path: Option<String>) -> Self {
        if let Some(path) = path.filter(|p| !p.trim().is_empty()) {
            self.ctx.executable_path = Some(path);
        }
        self
    }

    /// Invocation bounds, falling back to the defaults for unset keys.
    pub fn limits(&self) -> InvocationLimits {
        let defaults = InvocationLimits::default();
        InvocationLimits {
            timeout: self
                .ctx
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_output_bytes: self.ctx.max_output_bytes.unwrap_or(defaults.max_output_bytes),
        }
    }
}

impl Settings for AssistConfig {
    fn executable_path(&self) -> Option<String> {
        self.ctx.executable_path.clone()
    }
}
