//! Tool Implementations
//!
//! - `get_schema`: tables and columns uploaded to the conversation
//! - `execute_query`: validate and run a structured query plan

pub mod execute_query;
pub mod get_schema;

pub use execute_query::{ExecuteQueryError, ExecuteQueryExecutor, ExecuteQueryOutput, ExecutedPlan};
pub use get_schema::{GetSchemaExecutor, GetSchemaInput, GetSchemaOutput};
