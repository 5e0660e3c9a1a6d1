use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{TapClawError, TapClawResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Extra app name → platform identifier entries, merged over the built-in table.
    #[serde(default)]
    pub apps: HashMap<String, String>,
    #[serde(default)]
    pub heuristics: HeuristicsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (env var TAPCLAW_<ID>_API_KEY wins).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Pause after click/type/scroll so the UI can update before the next capture.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Upper bound applied to every Wait action.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_swipe_duration_ms")]
    pub swipe_duration_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            max_wait_ms: default_max_wait_ms(),
            swipe_duration_ms: default_swipe_duration_ms(),
        }
    }
}

fn default_settle_delay_ms() -> u64 {
    400
}

fn default_max_wait_ms() -> u64 {
    10_000
}

fn default_swipe_duration_ms() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_elements: default_max_elements(),
        }
    }
}

fn default_max_depth() -> usize {
    30
}

fn default_max_elements() -> usize {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Longest a burst of screen changes may postpone a capture.
    #[serde(default = "default_debounce_max_ms")]
    pub debounce_max_ms: u64,
    /// Trailing conversation turns sent with each request.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    /// Top-K memory items sent with each request.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Append every turn to a JSONL transcript under the local data dir.
    #[serde(default)]
    pub persist_history: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            debounce_max_ms: default_debounce_max_ms(),
            history_turns: default_history_turns(),
            memory_limit: default_memory_limit(),
            inference_timeout_secs: default_inference_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            persist_history: false,
        }
    }
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_debounce_max_ms() -> u64 {
    2000
}

fn default_history_turns() -> usize {
    10
}

fn default_memory_limit() -> usize {
    8
}

fn default_inference_timeout_secs() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicsConfig {
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    /// Additional verbs treated like "open" by the heuristic responder.
    #[serde(default)]
    pub extra_open_verbs: Vec<String>,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            fallback_message: default_fallback_message(),
            extra_open_verbs: Vec::new(),
        }
    }
}

pub fn default_fallback_message() -> String {
    "Sorry, I couldn't work out what to do. Could you rephrase that?".to_string()
}

fn default_true() -> bool {
    true
}

fn resolve_config_path() -> TapClawResult<PathBuf> {
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

    Err(TapClawError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> TapClawResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> TapClawResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> TapClawResult<()> {
    let path = resolve_config_path()?;
    save_config_to(config, &path)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> TapClawResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
