//! Agentic State Machine - State Definitions
//!
//! States, terminal outcomes and trace events of the planning loop, plus the
//! per-question conversation state the loop owns.

use std::fmt;

use crate::error::ReasoningError;
use crate::protocol::{ChatMessage, ParsedToolCall};

/// Where the planning loop is.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    /// Waiting for the reasoning component's next output.
    AwaitModel,
    /// A tool was requested and is about to run.
    AwaitTool { call: ParsedToolCall },
    /// Terminal.
    Done(Termination),
}

impl AgentState {
    pub fn name(&self) -> &'static str {
        match self {
            AgentState::AwaitModel => "AwaitModel",
            AgentState::AwaitTool { .. } => "AwaitTool",
            AgentState::Done(_) => "Done",
        }
    }
}

/// How a loop run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The reasoning component replied without requesting a tool.
    Answered,
    /// A tool was requested after the call budget was spent.
    BudgetExhausted,
    /// The reasoning invocation itself failed.
    ReasoningFailed(ReasoningError),
    /// The wall-clock deadline passed at a suspension point.
    TimedOut,
    /// The schema/table store could not be reached before planning started.
    StoreUnavailable,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Answered => "answered",
            Termination::BudgetExhausted => "budget_exhausted",
            Termination::ReasoningFailed(_) => "reasoning_failed",
            Termination::TimedOut => "timed_out",
            Termination::StoreUnavailable => "store_unavailable",
        }
    }
}

/// One execution trace entry. `Display` gives the logged tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    LlmCallStart,
    LlmCallDone { messages: usize },
    LlmCallFailed,
    ToolStart { name: String },
    ToolDone { name: String },
    ToolFailed { name: String },
    BudgetExhausted { max_tool_calls: u32 },
    TimedOut,
    FallbackSchemaInjected { tables: usize },
    NoTables,
    Done { termination: &'static str },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::LlmCallStart => write!(f, "node:llmCall:start"),
            TraceEvent::LlmCallDone { messages } => {
                write!(f, "node:llmCall:done:messages={}", messages)
            }
            TraceEvent::LlmCallFailed => write!(f, "node:llmCall:error"),
            TraceEvent::ToolStart { name } => write!(f, "node:toolNode:start:{}", name),
            TraceEvent::ToolDone { name } => write!(f, "node:toolNode:done:{}", name),
            TraceEvent::ToolFailed { name } => write!(f, "node:toolNode:error:{}", name),
            TraceEvent::BudgetExhausted { max_tool_calls } => {
                write!(f, "budget:exhausted:max_tool_calls={}", max_tool_calls)
            }
            TraceEvent::TimedOut => write!(f, "deadline:timed_out"),
            TraceEvent::FallbackSchemaInjected { tables } => {
                write!(f, "fallback:schema_injected:tables={}", tables)
            }
            TraceEvent::NoTables => write!(f, "shortcut:no_tables"),
            TraceEvent::Done { termination } => write!(f, "done:{}", termination),
        }
    }
}

/// Messages, call counter and trace of one loop run. Never shared between questions.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub call_count: u32,
    pub trace: Vec<TraceEvent>,
}

impl ConversationState {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            call_count: 0,
            trace: Vec::new(),
        }
    }

    pub fn record(&mut self, event: TraceEvent) {
        tracing::debug!("[AgenticLoop] trace {}", event);
        self.trace.push(event);
    }

    /// Whether this run ever passed through `AwaitTool`.
    pub fn tool_was_requested(&self) -> bool {
        self.trace
            .iter()
            .any(|e| matches!(e, TraceEvent::ToolStart { .. } | TraceEvent::BudgetExhausted { .. }))
    }

    pub fn trace_tags(&self) -> Vec<String> {
        self.trace.iter().map(ToString::to_string).collect()
    }
}
