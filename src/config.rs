use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{VisualAgentError, VisualAgentResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub perception: PerceptionConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    /// Detector endpoint URL. Falls back to env var OMNIPARSER_API_URL.
    #[serde(default)]
    pub api_url: String,
    /// Bearer token stored in config.toml (falls back to env var OMNIPARSER_API_TOKEN).
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_bbox_threshold")]
    pub bbox_threshold: f64,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// API key stored in config.toml (falls back to env var OPENAI_API_KEY).
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Pause between consecutive actions, in milliseconds.
    #[serde(default = "default_action_pause_ms")]
    pub action_pause_ms: u64,
    #[serde(default = "default_true")]
    pub enable_overlay: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
}

fn default_bbox_threshold() -> f64 {
    0.001
}

fn default_iou_threshold() -> f64 {
    0.4
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_temperature() -> f64 {
    0.0
}

fn default_max_iterations() -> u32 {
    3
}

fn default_action_pause_ms() -> u64 {
    350
}

fn default_true() -> bool {
    true
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("runtime/runs")
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_token: String::new(),
            bbox_threshold: default_bbox_threshold(),
            iou_threshold: default_iou_threshold(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            action_pause_ms: default_action_pause_ms(),
            enable_overlay: default_true(),
            dry_run: false,
            runs_dir: default_runs_dir(),
        }
    }
}

fn resolve_config_path() -> VisualAgentResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(VisualAgentError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

/// Fills empty credential fields from the environment so secrets can
/// stay out of config.toml.
fn apply_env_fallbacks(config: &mut AgentConfig) {
    if config.perception.api_url.is_empty() {
        if let Ok(url) = std::env::var("OMNIPARSER_API_URL") {
            config.perception.api_url = url;
        }
    }
    if config.perception.api_token.is_empty() {
        if let Ok(token) = std::env::var("OMNIPARSER_API_TOKEN") {
            config.perception.api_token = token;
        }
    }
    if config.planner.api_key.is_empty() {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.planner.api_key = key;
        }
    }
}

pub fn load_config() -> VisualAgentResult<AgentConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let mut config: AgentConfig = toml::from_str(&content)?;
    apply_env_fallbacks(&mut config);
    tracing::info!(path = %path.display(), model = %config.planner.model, "config loaded");
    Ok(config)
}

/// Defaults plus environment credentials, for when no config.toml exists.
pub fn config_from_env() -> AgentConfig {
    let mut config = AgentConfig::default();
    apply_env_fallbacks(&mut config);
    config
}
