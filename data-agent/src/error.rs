//! Error taxonomy for the data agent.
//!
//! Validation and tool-naming failures are recovered inside the loop (they become
//! tool-result text the model can react to). Reasoning failures end the current
//! run. Storage failures surface either as `ExecutionError` (a query failed) or
//! `StoreError` (the store itself is unreachable or misbehaving).

use crate::query_executor::SqlParam;

/// Why a candidate plan was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("UnknownTable: '{table}' is not an uploaded table. Available tables: {}", .available.join(", "))]
    UnknownTable {
        table: String,
        available: Vec<String>,
    },

    #[error("UnknownColumn: '{column}' is not a column of '{table}'. Available columns: {}", .available.join(", "))]
    UnknownColumn {
        table: String,
        column: String,
        available: Vec<String>,
    },

    #[error("UnsupportedAggregate: '{agg}'. Allowed aggregates: COUNT, SUM, AVG, MIN, MAX")]
    UnsupportedAggregate { agg: String },

    #[error("UnsupportedOperator: '{op}'. Allowed operators: =, >, <, >=, <=, LIKE")]
    UnsupportedOperator { op: String },

    #[error("MalformedPlan: {reason}")]
    MalformedPlan { reason: String },
}

impl ValidationError {
    /// Short variant tag for logs and traces.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::UnknownTable { .. } => "UnknownTable",
            ValidationError::UnknownColumn { .. } => "UnknownColumn",
            ValidationError::UnsupportedAggregate { .. } => "UnsupportedAggregate",
            ValidationError::UnsupportedOperator { .. } => "UnsupportedOperator",
            ValidationError::MalformedPlan { .. } => "MalformedPlan",
        }
    }
}

/// A validated query that failed at the storage layer.
///
/// Carries the attempted SQL and bound parameters for diagnosis. Never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("ExecutionError: {message}")]
pub struct ExecutionError {
    pub message: String,
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Failure of the reasoning component invocation itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReasoningError {
    #[error("model request failed: {0}")]
    Transport(String),

    #[error("model endpoint returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("model response could not be read: {0}")]
    MalformedResponse(String),

    #[error("model call timed out")]
    Timeout,
}

/// Failure of the schema/table store boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("table store is not running")]
    Unavailable,

    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("ingest failed: {0}")]
    Ingest(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Loop-level failures. Logged, never shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("PlannerProtocolError: the model answered without requesting any tool")]
    PlannerProtocol,

    #[error("ReasoningComponentError: {0}")]
    Reasoning(#[from] ReasoningError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
