//! Configuration file support.
//!
//! All ouro data lives in a `.ouro/` directory:
//! - `.ouro/config.toml` - configuration file
//! - `.ouro/runs/` - one JSONL event log per invocation
//!
//! Config discovery searches for `.ouro/config.toml` starting from the
//! current directory and walking up to parent directories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use ouro_engine::RlmConfig;

/// The ouro data directory name.
pub const OURO_DIR: &str = ".ouro";
/// The config file name within the ouro directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Model selection.
    pub models: ModelsConfig,
    /// Per-agent loop limits.
    pub limits: LimitsConfig,
    /// Global usage ceilings.
    pub budget: BudgetConfig,
    /// Log output settings.
    pub log: LogConfig,
}

/// Model selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Model for the root agent.
    pub primary: String,
    /// Model for all spawned sub-agents.
    pub sub: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let defaults = RlmConfig::default();
        Self {
            primary: defaults.primary_model,
            sub: defaults.sub_model,
        }
    }
}

/// Per-agent loop limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum recursion depth (root = 0).
    pub max_depth: u32,
    /// Maximum LLM calls per agent.
    pub max_calls_per_subagent: u32,
    /// Character cap on execution output fed back into the transcript.
    pub truncate_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let defaults = RlmConfig::default();
        Self {
            max_depth: defaults.max_depth,
            max_calls_per_subagent: defaults.max_calls_per_subagent,
            truncate_len: defaults.truncate_len,
        }
    }
}

/// Global usage ceilings, checked after every LLM call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_money_spent: f64,
    pub max_prompt_tokens: u64,
    pub max_completion_tokens: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let defaults = RlmConfig::default();
        Self {
            max_money_spent: defaults.max_money_spent,
            max_prompt_tokens: defaults.max_prompt_tokens,
            max_completion_tokens: defaults.max_completion_tokens,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for run logs, relative to the `.ouro` directory unless
    /// absolute.
    pub dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("runs"),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find and load configuration from current or parent directories.
    ///
    /// Searches for `.ouro/config.toml` starting from `start` and walking up
    /// to parent directories. Returns the config and the `.ouro` directory.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let ouro_dir = dir.join(OURO_DIR);
            let config_path = ouro_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config, ouro_dir)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Flatten into the engine's config record.
    pub fn to_rlm_config(&self) -> RlmConfig {
        RlmConfig {
            primary_model: self.models.primary.clone(),
            sub_model: self.models.sub.clone(),
            max_depth: self.limits.max_depth,
            max_calls_per_subagent: self.limits.max_calls_per_subagent,
            truncate_len: self.limits.truncate_len,
            max_money_spent: self.budget.max_money_spent,
            max_completion_tokens: self.budget.max_completion_tokens,
            max_prompt_tokens: self.budget.max_prompt_tokens,
        }
    }

    /// Resolve the log directory relative to the `.ouro` directory.
    pub fn resolve_log_dir(&self, ouro_dir: Option<&Path>) -> PathBuf {
        if self.log.dir.is_absolute() {
            self.log.dir.clone()
        } else if let Some(dir) = ouro_dir {
            dir.join(&self.log.dir)
        } else {
            PathBuf::from(OURO_DIR).join(&self.log.dir)
        }
    }
}

/// Default config file contents written by `ouro init`.
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&Config::default()).expect("default config serializes")
}
