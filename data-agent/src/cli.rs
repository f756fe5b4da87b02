//! Command-line argument parsing and launch configuration.
//!
//! Flags override the loaded settings for one launch only; `--write-config`
//! is the only way they get persisted.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::settings::{AgentSettings, MAX_TOOL_CALLS_RANGE, ROW_LIMIT_RANGE, TIMEOUT_SECS_RANGE};

/// CLI arguments for data-agent
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "data-agent",
    about = "Ask natural-language questions about uploaded tables"
)]
pub struct CliArgs {
    /// Settings file (defaults to ~/.data-agent/config.json)
    #[arg(long, value_name = "PATH", env = "DATA_AGENT_CONFIG")]
    pub config: Option<PathBuf>,
    /// Persist the effective settings (file + overrides) and exit
    #[arg(long)]
    pub write_config: bool,
    /// OpenAI-compatible model endpoint base URL
    #[arg(long, value_name = "URL", env = "DATA_AGENT_BASE_URL")]
    pub base_url: Option<String>,
    /// Model name sent with every request
    #[arg(long, value_name = "MODEL", env = "DATA_AGENT_MODEL")]
    pub model: Option<String>,
    /// Bearer token for the model endpoint
    #[arg(long, value_name = "KEY", env = "DATA_AGENT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Sampling temperature
    #[arg(long, value_name = "FLOAT", env = "DATA_AGENT_TEMPERATURE")]
    pub temperature: Option<f32>,
    /// Tool calls allowed per question
    #[arg(long, value_name = "INT", env = "DATA_AGENT_MAX_TOOL_CALLS")]
    pub max_tool_calls: Option<u32>,
    /// Wall-clock seconds allowed per question
    #[arg(long, value_name = "SECS", env = "DATA_AGENT_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
    /// Row ceiling applied to every query plan
    #[arg(long, value_name = "INT", env = "DATA_AGENT_ROW_LIMIT")]
    pub row_limit: Option<u32>,
    /// SQLite database holding uploaded tables
    #[arg(long, value_name = "PATH", env = "DATA_AGENT_DATABASE")]
    pub database: Option<PathBuf>,
    /// HTTP listen host
    #[arg(long, value_name = "HOST", env = "DATA_AGENT_HOST")]
    pub host: Option<String>,
    /// HTTP listen port
    #[arg(long, value_name = "PORT", env = "DATA_AGENT_PORT")]
    pub port: Option<u16>,
    /// Ingest a CSV/TSV/XLSX file into --topic and exit
    #[arg(long, value_name = "FILE", requires = "topic", conflicts_with = "ask")]
    pub ingest: Option<PathBuf>,
    /// Ask one question (string or @path/to/file) about --topic and exit
    #[arg(long, value_name = "QUESTION_OR_@FILE", requires = "topic")]
    pub ask: Option<String>,
    /// Conversation/topic id for --ingest and --ask
    #[arg(long, value_name = "ID")]
    pub topic: Option<String>,
}

/// What this launch does.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchMode {
    Ingest { file: PathBuf, topic: String },
    Ask { question: String, topic: String },
    WriteConfig,
    Serve,
}

/// Read a value that may be either a literal string or a @path reference to a file
pub fn read_value_or_file(raw: &str) -> Result<String, String> {
    if let Some(path) = raw.strip_prefix('@') {
        let contents = fs::read_to_string(Path::new(path))
            .map_err(|e| format!("Failed to read {}: {}", path, e))?;
        Ok(contents)
    } else {
        Ok(raw.to_string())
    }
}

/// Apply launch-time overrides. Numeric values are clamped to their allowed ranges.
pub fn apply_cli_overrides(args: &CliArgs, settings: &mut AgentSettings) {
    if let Some(url) = &args.base_url {
        settings.model.base_url = url.clone();
    }
    if let Some(model) = &args.model {
        settings.model.model = model.clone();
    }
    if let Some(key) = &args.api_key {
        settings.model.api_key = Some(key.clone()).filter(|k| !k.trim().is_empty());
    }
    if let Some(temperature) = args.temperature {
        settings.model.temperature = temperature.clamp(0.0, 2.0);
    }
    if let Some(max) = args.max_tool_calls {
        settings.agent.max_tool_calls = max.clamp(MAX_TOOL_CALLS_RANGE.0, MAX_TOOL_CALLS_RANGE.1);
    }
    if let Some(secs) = args.timeout_secs {
        settings.agent.timeout_secs = secs.clamp(TIMEOUT_SECS_RANGE.0, TIMEOUT_SECS_RANGE.1);
    }
    if let Some(limit) = args.row_limit {
        settings.agent.row_limit = limit.clamp(ROW_LIMIT_RANGE.0, ROW_LIMIT_RANGE.1);
    }
    if let Some(path) = &args.database {
        settings.database_path = path.clone();
    }
    if let Some(host) = &args.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    tracing::info!(
        "[Launch] model={} base_url={} max_tool_calls={} timeout={}s row_limit={}",
        settings.model.model,
        settings.model.base_url,
        settings.agent.max_tool_calls,
        settings.agent.timeout_secs,
        settings.agent.row_limit
    );
}

/// Resolve the launch mode from parsed arguments.
pub fn launch_mode(args: &CliArgs) -> Result<LaunchMode, String> {
    if args.write_config {
        return Ok(LaunchMode::WriteConfig);
    }

    let topic = args.topic.clone().filter(|t| !t.trim().is_empty());

    if let Some(file) = &args.ingest {
        let topic = topic.ok_or_else(|| "--ingest requires --topic".to_string())?;
        return Ok(LaunchMode::Ingest {
            file: file.clone(),
            topic,
        });
    }

    if let Some(raw) = &args.ask {
        let topic = topic.ok_or_else(|| "--ask requires --topic".to_string())?;
        let question = read_value_or_file(raw)?.trim().to_string();
        if question.is_empty() {
            return Err("--ask needs a non-empty question".to_string());
        }
        return Ok(LaunchMode::Ask { question, topic });
    }

    Ok(LaunchMode::Serve)
}
