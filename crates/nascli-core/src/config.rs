//! Persistent configuration for nascli.
//!
//! Stored in `~/.nascli/config.json`. Every field has a default, so a missing
//! or partial file is fine.
//!
//! # Example
//!
//! ```no_run
//! use nascli_core::config::ShellConfig;
//!
//! let config = ShellConfig::load();
//! println!("remote calls time out after {}ms", config.remote_timeout_ms);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CONFIG_FILENAME: &str = "config.json";

/// `~/.nascli`, falling back to the working directory without a home.
pub fn nascli_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nascli")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// How many namespaces `-` can step back through.
    pub history_depth: usize,
    /// Deadline for each collaborator call.
    pub remote_timeout_ms: u64,
    /// Skip the rest of a line or script after a failed statement.
    pub abort_on_error: bool,
    pub output: OutputFormat,
    /// Prompt template; `{path}` is replaced by the current namespace.
    pub prompt: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            history_depth: 16,
            remote_timeout_ms: 30_000,
            abort_on_error: true,
            output: OutputFormat::Table,
            prompt: "{path}> ".to_string(),
        }
    }
}

impl ShellConfig {
    /// Load config from `~/.nascli/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        let path = nascli_dir().join(CONFIG_FILENAME);
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<ShellConfig>(&s).ok())
            .unwrap_or_default()
            .normalized()
    }

    fn normalized(mut self) -> Self {
        self.history_depth = self.history_depth.max(1);
        self.remote_timeout_ms = self.remote_timeout_ms.max(1);
        self
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn render_prompt(&self, path: &str) -> String {
        self.prompt.replace("{path}", path)
    }
}
