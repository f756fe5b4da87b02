//! Persistent configuration (`~/.data-agent/config.json`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

pub const MAX_TOOL_CALLS_RANGE: (u32, u32) = (1, 32);
pub const ROW_LIMIT_RANGE: (u32, u32) = (1, 10_000);
pub const TIMEOUT_SECS_RANGE: (u64, u64) = (5, 3600);

/// Reasoning component endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// OpenAI-compatible base URL (Ollama by default).
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            temperature: 0.0,
            request_timeout_secs: 120,
            api_key: None,
        }
    }
}

/// Planning loop bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLoopSettings {
    /// Tool calls allowed per run.
    pub max_tool_calls: u32,
    /// Wall-clock deadline for one question, fallback run included.
    pub timeout_secs: u64,
    /// Row ceiling applied to every plan.
    pub row_limit: u32,
}

impl Default for AgentLoopSettings {
    fn default() -> Self {
        Self {
            max_tool_calls: 8,
            timeout_secs: 180,
            row_limit: 100,
        }
    }
}

impl AgentLoopSettings {
    pub fn clamped(&self) -> Self {
        Self {
            max_tool_calls: self
                .max_tool_calls
                .clamp(MAX_TOOL_CALLS_RANGE.0, MAX_TOOL_CALLS_RANGE.1),
            timeout_secs: self
                .timeout_secs
                .clamp(TIMEOUT_SECS_RANGE.0, TIMEOUT_SECS_RANGE.1),
            row_limit: self.row_limit.clamp(ROW_LIMIT_RANGE.0, ROW_LIMIT_RANGE.1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub model: ModelSettings,
    pub agent: AgentLoopSettings,
    pub database_path: PathBuf,
    pub server: ServerSettings,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            agent: AgentLoopSettings::default(),
            database_path: data_dir().join("data.sqlite"),
            server: ServerSettings::default(),
        }
    }
}

fn data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".data-agent")
}

/// Get the default config file path
pub fn get_config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Load settings from `path` (or the default location).
///
/// Missing or unreadable files fall back to defaults.
pub async fn load_settings(path: Option<&Path>) -> AgentSettings {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(get_config_path);

    let mut settings = match fs::read_to_string(&config_path).await {
        Ok(contents) => match serde_json::from_str::<AgentSettings>(&contents) {
            Ok(settings) => {
                tracing::info!("[Settings] Loaded from {}", config_path.display());
                settings
            }
            Err(e) => {
                tracing::warn!(
                    "[Settings] Failed to parse {}: {}, using defaults",
                    config_path.display(),
                    e
                );
                AgentSettings::default()
            }
        },
        Err(e) => {
            tracing::info!(
                "[Settings] No config file at {} ({}), using defaults",
                config_path.display(),
                e
            );
            AgentSettings::default()
        }
    };

    settings.agent = settings.agent.clamped();
    settings
}

/// Save settings to `path` (or the default location). Returns the written path.
pub async fn save_settings(settings: &AgentSettings, path: Option<&Path>) -> Result<PathBuf, String> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }
    }

    let contents = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;

    fs::write(&config_path, contents)
        .await
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    tracing::info!("[Settings] Saved to {}", config_path.display());
    Ok(config_path)
}
