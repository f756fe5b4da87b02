//! Plan-validate-execute data agent.
//!
//! Uploaded tables live in a SQLite file owned by the table store actor. A
//! question runs through the planning loop: the model discovers the schema,
//! proposes a structured plan, the plan is validated and executed as a
//! parameterized read-only SELECT, and the model's final text becomes the answer.

pub mod actors;
pub mod agentic_loop;
pub mod agentic_state;
pub mod answer_synthesizer;
pub mod cli;
pub mod column_relevance;
pub mod error;
pub mod ingest;
pub mod message_builders;
pub mod plan;
pub mod plan_validator;
pub mod protocol;
pub mod query_executor;
pub mod query_planner;
pub mod reasoning;
pub mod schema_registry;
pub mod server;
pub mod settings;
pub mod system_prompt;
pub mod tabular_parser;
pub mod tool_execution;
pub mod tool_parsing;
pub mod tool_registry;
pub mod tools;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use actors::TableStoreActor;
use agentic_loop::{run_agent, AgentHandles, AgentLoopConfig};
use cli::{apply_cli_overrides, launch_mode, CliArgs, LaunchMode};
use reasoning::OpenAICompatibleClient;
use server::AppState;
use settings::{load_settings, save_settings};

pub use agentic_loop::{run_agent_with_report, AgentAnswer, AgentReport};
pub use error::{AgentError, ExecutionError, ReasoningError, StoreError, ValidationError};

/// Run one launch of the binary.
pub async fn run(args: CliArgs) -> Result<(), String> {
    let mut settings = load_settings(args.config.as_deref()).await;
    apply_cli_overrides(&args, &mut settings);

    let mode = launch_mode(&args)?;
    if mode == LaunchMode::WriteConfig {
        let path = save_settings(&settings, args.config.as_deref()).await?;
        println!("{}", path.display());
        return Ok(());
    }

    let store_tx = TableStoreActor::start(settings.database_path.clone())
        .await
        .map_err(|e| format!("Failed to open {}: {}", settings.database_path.display(), e))?;

    match mode {
        LaunchMode::Ingest { file, topic } => {
            let report = ingest::ingest_file(&store_tx, &topic, &file)
                .await
                .map_err(|e| format!("Ingest failed: {}", e))?;
            let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
            println!("{}", json);
            Ok(())
        }
        LaunchMode::Ask { question, topic } => {
            let handles = build_handles(&settings, store_tx)?;
            let config = AgentLoopConfig::from(&settings.agent);
            let answer = run_agent(&handles, &config, &topic, &question).await;
            println!("{}", answer.answer);
            Ok(())
        }
        LaunchMode::Serve => {
            let handles = build_handles(&settings, store_tx)?;
            let state = AppState {
                handles,
                config: AgentLoopConfig::from(&settings.agent),
            };
            let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
                .parse()
                .map_err(|e| format!("Invalid listen address: {}", e))?;
            server::serve(state, addr)
                .await
                .map_err(|e| format!("Server error: {}", e))
        }
        LaunchMode::WriteConfig => Ok(()),
    }
}

fn build_handles(
    settings: &settings::AgentSettings,
    store_tx: tokio::sync::mpsc::Sender<actors::TableStoreMsg>,
) -> Result<AgentHandles, String> {
    let client = OpenAICompatibleClient::new(&settings.model).map_err(|e| e.to_string())?;
    tracing::info!(
        "[Launch] Reasoning via {} ({})",
        client.url(),
        settings.model.model
    );
    Ok(AgentHandles {
        reasoning: Arc::new(client),
        store_tx,
    })
}
