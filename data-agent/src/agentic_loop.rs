//! Planning Loop
//!
//! Drives the `AwaitModel -> AwaitTool -> AwaitModel ... -> Done` state machine
//! for one question:
//!
//! 1. Zero uploaded tables short-circuit to a fixed answer, no model call.
//! 2. The first run seeds the conversation with the question and its topic id.
//! 3. If that run ends without ever requesting a tool, the schema is fetched
//!    directly and injected as a pre-supplied `get_schema` result into a fresh
//!    conversation, and the loop runs exactly once more. That second run's
//!    outcome is final.
//!
//! The call budget and the wall-clock deadline are checked at the two
//! suspension points (model call, tool call).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

use crate::actors::table_store_actor::TableStoreMsg;
use crate::agentic_state::{AgentState, ConversationState, Termination, TraceEvent};
use crate::answer_synthesizer::{synthesize, NO_DATA_ANSWER, STORE_FAILURE_ANSWER, TIMEOUT_ANSWER};
use crate::error::AgentError;
use crate::message_builders::{
    create_assistant_message_with_tool_call, create_tool_result_message, system_message,
    user_message, PRELOADED_SCHEMA_CALL_ID,
};
use crate::protocol::{ChatMessage, OpenAITool, ParsedToolCall};
use crate::reasoning::ReasoningComponent;
use crate::schema_registry::SchemaRegistry;
use crate::settings::AgentLoopSettings;
use crate::system_prompt::{
    build_agent_instructions, build_preloaded_schema_note, build_topic_instruction,
};
use crate::tool_execution::ToolDispatcher;
use crate::tool_registry::{tool_definitions, GET_SCHEMA};
use crate::tools::{GetSchemaInput, GetSchemaOutput};

/// Bounds for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentLoopConfig {
    pub max_tool_calls: u32,
    pub timeout: Duration,
    pub row_limit: u32,
}

impl From<&AgentLoopSettings> for AgentLoopConfig {
    fn from(settings: &AgentLoopSettings) -> Self {
        let settings = settings.clamped();
        Self {
            max_tool_calls: settings.max_tool_calls,
            timeout: Duration::from_secs(settings.timeout_secs),
            row_limit: settings.row_limit,
        }
    }
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self::from(&AgentLoopSettings::default())
    }
}

/// Shared collaborators. Cheap to clone; one clone per concurrent question.
#[derive(Clone)]
pub struct AgentHandles {
    pub reasoning: Arc<dyn ReasoningComponent>,
    pub store_tx: mpsc::Sender<TableStoreMsg>,
}

/// What `run_agent` hands back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub answer: String,
}

/// Full outcome of a question, trace included. Server-side use only.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReport {
    pub answer: String,
    pub termination: Termination,
    pub fallback_used: bool,
    /// Trace of the authoritative run.
    pub trace: Vec<String>,
}

/// Answer `question` for `conversation_id`.
pub async fn run_agent(
    handles: &AgentHandles,
    config: &AgentLoopConfig,
    conversation_id: &str,
    question: &str,
) -> AgentAnswer {
    let report = run_agent_with_report(handles, config, conversation_id, question).await;
    AgentAnswer {
        answer: report.answer,
    }
}

/// Like `run_agent`, but also returns how the run ended and its trace.
pub async fn run_agent_with_report(
    handles: &AgentHandles,
    config: &AgentLoopConfig,
    conversation_id: &str,
    question: &str,
) -> AgentReport {
    let deadline = Instant::now() + config.timeout;
    let agent = AgentLoop::new(handles, config, conversation_id, question, deadline);

    tracing::info!(
        "[AgenticLoop] Question for topic '{}' (max_tool_calls={}, timeout={}s)",
        conversation_id,
        config.max_tool_calls,
        config.timeout.as_secs()
    );

    // Zero tables: nothing a plan could reference.
    let registry = SchemaRegistry::new(handles.store_tx.clone());
    match timeout_at(deadline, registry.lookup(conversation_id)).await {
        Err(_) => return agent.finish_without_run(Termination::TimedOut, TIMEOUT_ANSWER),
        Ok(Err(e)) => {
            tracing::warn!("[AgenticLoop] {}", AgentError::from(e));
            return agent.finish_without_run(Termination::StoreUnavailable, STORE_FAILURE_ANSWER);
        }
        Ok(Ok(schema)) if schema.is_empty() => {
            tracing::info!("[AgenticLoop] No tables for topic '{}'", conversation_id);
            let mut state = ConversationState::default();
            state.record(TraceEvent::NoTables);
            state.record(TraceEvent::Done {
                termination: Termination::Answered.as_str(),
            });
            log_trace("execution trace", &state);
            return AgentReport {
                answer: NO_DATA_ANSWER.to_string(),
                termination: Termination::Answered,
                fallback_used: false,
                trace: state.trace_tags(),
            };
        }
        Ok(Ok(_)) => {}
    }

    let mut first = ConversationState::new(vec![
        user_message(question),
        system_message(build_topic_instruction(conversation_id)),
    ]);
    let termination = agent.run(&mut first).await;
    log_trace("execution trace", &first);

    if termination != Termination::Answered || first.tool_was_requested() {
        return agent.report(&first, termination, false);
    }

    tracing::info!(
        "[AgenticLoop] {}; running fallback with preloaded schema",
        AgentError::PlannerProtocol
    );

    let mut second = match agent.preload_schema().await {
        Ok(state) => state,
        Err(termination) if termination == Termination::TimedOut => {
            return agent.report(&first, termination, false);
        }
        Err(_) => {
            // Schema fetch failed; keep the first run's answer.
            return agent.report(&first, Termination::Answered, false);
        }
    };
    let termination = agent.run(&mut second).await;
    log_trace("second run execution trace", &second);

    agent.report(&second, termination, true)
}

fn log_trace(label: &str, state: &ConversationState) {
    tracing::info!("[AgenticLoop] {}:", label);
    for tag in state.trace_tags() {
        tracing::info!("[AgenticLoop]    {}", tag);
    }
}

/// One question's loop context. Holds no mutable state; runs own their `ConversationState`.
struct AgentLoop<'a> {
    reasoning: &'a dyn ReasoningComponent,
    dispatcher: ToolDispatcher,
    tools: Vec<OpenAITool>,
    instructions: ChatMessage,
    max_tool_calls: u32,
    conversation_id: &'a str,
    question: &'a str,
    deadline: Instant,
}

impl<'a> AgentLoop<'a> {
    fn new(
        handles: &'a AgentHandles,
        config: &AgentLoopConfig,
        conversation_id: &'a str,
        question: &'a str,
        deadline: Instant,
    ) -> Self {
        Self {
            reasoning: handles.reasoning.as_ref(),
            dispatcher: ToolDispatcher::new(handles.store_tx.clone(), config.row_limit),
            tools: tool_definitions(),
            instructions: system_message(build_agent_instructions()),
            max_tool_calls: config.max_tool_calls,
            conversation_id,
            question,
            deadline,
        }
    }

    /// Run the state machine from `AwaitModel` until `Done`.
    async fn run(&self, state: &mut ConversationState) -> Termination {
        let mut current = AgentState::AwaitModel;
        loop {
            tracing::debug!(
                "[AgenticLoop] -> {} (tool calls so far: {})",
                current.name(),
                state.call_count
            );
            current = match current {
                AgentState::AwaitModel => self.await_model(state).await,
                AgentState::AwaitTool { call } => self.await_tool(state, call).await,
                AgentState::Done(termination) => {
                    state.record(TraceEvent::Done {
                        termination: termination.as_str(),
                    });
                    tracing::debug!(
                        "[AgenticLoop] Done ({}) after {} tool call(s)",
                        termination.as_str(),
                        state.call_count
                    );
                    return termination;
                }
            };
        }
    }

    async fn await_model(&self, state: &mut ConversationState) -> AgentState {
        state.record(TraceEvent::LlmCallStart);

        let mut request = Vec::with_capacity(state.messages.len() + 1);
        request.push(self.instructions.clone());
        request.extend(state.messages.iter().cloned());

        let replies = match timeout_at(self.deadline, self.reasoning.invoke(&request, &self.tools)).await {
            Err(_) => {
                tracing::warn!("[AgenticLoop] Deadline passed waiting for the model");
                state.record(TraceEvent::TimedOut);
                return AgentState::Done(Termination::TimedOut);
            }
            Ok(Err(e)) => {
                tracing::warn!("[AgenticLoop] {}", AgentError::from(e.clone()));
                state.record(TraceEvent::LlmCallFailed);
                return AgentState::Done(Termination::ReasoningFailed(e));
            }
            Ok(Ok(replies)) => replies,
        };
        state.record(TraceEvent::LlmCallDone {
            messages: replies.len(),
        });

        // Only the first requested call of the turn is honored.
        let requested = replies
            .iter()
            .find_map(|m| m.tool_calls.first().map(|call| (m.content.clone(), call.clone())));

        let Some((content, mut call)) = requested else {
            state.messages.extend(replies);
            return AgentState::Done(Termination::Answered);
        };

        if state.call_count >= self.max_tool_calls {
            tracing::warn!(
                "[AgenticLoop] Tool '{}' requested after {} call(s); budget exhausted",
                call.name,
                state.call_count
            );
            state.record(TraceEvent::BudgetExhausted {
                max_tool_calls: self.max_tool_calls,
            });
            return AgentState::Done(Termination::BudgetExhausted);
        }

        if call.id.as_deref().map(str::is_empty).unwrap_or(true) {
            call.id = Some(format!("call_{}", uuid::Uuid::new_v4().simple()));
        }
        state.call_count += 1;
        state
            .messages
            .push(create_assistant_message_with_tool_call(&content, &call));

        AgentState::AwaitTool { call }
    }

    async fn await_tool(&self, state: &mut ConversationState, call: ParsedToolCall) -> AgentState {
        state.record(TraceEvent::ToolStart {
            name: call.name.clone(),
        });
        tracing::info!(
            "[AgenticLoop] Tool call {}/{}: {}",
            state.call_count,
            self.max_tool_calls,
            call.name
        );

        let dispatch = self
            .dispatcher
            .dispatch(&call, self.conversation_id, self.question);
        let result = match timeout_at(self.deadline, dispatch).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("[AgenticLoop] Deadline passed while running '{}'", call.name);
                state.record(TraceEvent::TimedOut);
                return AgentState::Done(Termination::TimedOut);
            }
        };

        state.record(if result.is_error {
            TraceEvent::ToolFailed {
                name: call.name.clone(),
            }
        } else {
            TraceEvent::ToolDone {
                name: call.name.clone(),
            }
        });

        let call_id = call.id.as_deref().unwrap_or_default();
        state
            .messages
            .push(create_tool_result_message(call_id, &result.content));

        AgentState::AwaitModel
    }

    /// Fetch the schema directly and build the fallback conversation.
    async fn preload_schema(&self) -> Result<ConversationState, Termination> {
        let fetch = self.dispatcher.get_schema().execute(
            self.conversation_id,
            GetSchemaInput::default(),
            self.question,
        );
        let schema: GetSchemaOutput = match timeout_at(self.deadline, fetch).await {
            Err(_) => return Err(Termination::TimedOut),
            Ok(Err(e)) => {
                tracing::warn!("[AgenticLoop] Fallback schema fetch failed: {}", e);
                return Err(Termination::Answered);
            }
            Ok(Ok(schema)) => schema,
        };

        let payload = serde_json::to_string(&schema).map_err(|e| {
            tracing::warn!("[AgenticLoop] Failed to encode preloaded schema: {}", e);
            Termination::Answered
        })?;

        let preloaded_call = ParsedToolCall {
            id: Some(PRELOADED_SCHEMA_CALL_ID.to_string()),
            name: GET_SCHEMA.to_string(),
            arguments: serde_json::to_value(GetSchemaInput {
                topic_id: Some(self.conversation_id.to_string()),
            })
            .unwrap_or_default(),
            raw: String::new(),
        };

        let mut state = ConversationState::new(vec![
            user_message(self.question),
            system_message(build_preloaded_schema_note(self.conversation_id)),
            create_assistant_message_with_tool_call("", &preloaded_call),
            create_tool_result_message(PRELOADED_SCHEMA_CALL_ID, &payload),
        ]);
        state.record(TraceEvent::FallbackSchemaInjected {
            tables: schema.schema.len(),
        });
        Ok(state)
    }

    fn report(&self, state: &ConversationState, termination: Termination, fallback_used: bool) -> AgentReport {
        let answer = synthesize(&state.messages, &termination);
        tracing::info!(
            "[AgenticLoop] Finished: {} (fallback={}, tool calls={})",
            termination.as_str(),
            fallback_used,
            state.call_count
        );
        AgentReport {
            answer,
            termination,
            fallback_used,
            trace: state.trace_tags(),
        }
    }

    fn finish_without_run(&self, termination: Termination, answer: &str) -> AgentReport {
        let mut state = ConversationState::default();
        if termination == Termination::TimedOut {
            state.record(TraceEvent::TimedOut);
        }
        state.record(TraceEvent::Done {
            termination: termination.as_str(),
        });
        log_trace("execution trace", &state);
        AgentReport {
            answer: answer.to_string(),
            termination,
            fallback_used: false,
            trace: state.trace_tags(),
        }
    }
}
