//! Query Executor
//!
//! Assembles a single parameterized `SELECT` from a `NormalizedPlan` and runs it
//! through the table store actor. There is no code path that assembles anything
//! other than a `SELECT`, and the store only accepts a `CompiledQuery`.

use rusqlite::types::{ToSql, ToSqlOutput};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::actors::table_store_actor::{Row, TableStoreMsg};
use crate::error::ExecutionError;
use crate::plan::escape_identifier;
use crate::plan_validator::{NormalizedPlan, Projection};

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlParam::Text(s) => s.to_sql(),
            SqlParam::Integer(i) => i.to_sql(),
            SqlParam::Real(f) => f.to_sql(),
        }
    }
}

/// SQL text plus its bind parameters.
///
/// Fields are private; `compile_select` is the only constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    sql: String,
    params: Vec<SqlParam>,
}

impl CompiledQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", escape_identifier(identifier))
}

/// Build `SELECT ... FROM <table> [WHERE ... AND ...] [GROUP BY ...] LIMIT n`.
pub fn compile_select(plan: &NormalizedPlan) -> CompiledQuery {
    let projections: Vec<String> = plan
        .select
        .iter()
        .map(|projection| match projection {
            Projection::Column(column) => quote(column),
            Projection::Aggregate { agg, column, alias } => {
                format!("{}({}) AS {}", agg.as_sql(), quote(column), quote(alias))
            }
        })
        .collect();

    let mut parts = vec![
        format!("SELECT {}", projections.join(", ")),
        format!("FROM {}", quote(&plan.table)),
    ];

    if !plan.filters.is_empty() {
        let conditions: Vec<String> = plan
            .filters
            .iter()
            .map(|f| format!("{} {} ?", quote(&f.column), f.op.as_sql()))
            .collect();
        parts.push(format!("WHERE {}", conditions.join(" AND ")));
    }

    if !plan.group_by.is_empty() {
        let columns: Vec<String> = plan.group_by.iter().map(|c| quote(c)).collect();
        parts.push(format!("GROUP BY {}", columns.join(", ")));
    }

    parts.push(format!("LIMIT {}", plan.limit));

    CompiledQuery {
        sql: parts.join(" "),
        params: plan.params(),
    }
}

/// Rows returned for an executed plan, with the statement that produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutput {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Runs normalized plans against the table store.
#[derive(Clone)]
pub struct QueryExecutor {
    store_tx: mpsc::Sender<TableStoreMsg>,
}

impl QueryExecutor {
    pub fn new(store_tx: mpsc::Sender<TableStoreMsg>) -> Self {
        Self { store_tx }
    }

    pub async fn execute(&self, plan: &NormalizedPlan) -> Result<QueryOutput, ExecutionError> {
        let query = compile_select(plan);
        let sql = query.sql().to_string();
        let params = query.params().to_vec();

        tracing::debug!("[QueryExecutor] {} params={:?}", sql, params);

        let failed = |message: String| ExecutionError {
            message,
            sql: sql.clone(),
            params: params.clone(),
        };

        let (tx, rx) = oneshot::channel();
        self.store_tx
            .send(TableStoreMsg::ExecuteSelect {
                query,
                respond_to: tx,
            })
            .await
            .map_err(|_| failed("table store is not running".to_string()))?;

        let result = rx
            .await
            .map_err(|_| failed("table store dropped the request".to_string()))?;

        match result {
            Ok(rows) => {
                tracing::debug!("[QueryExecutor] {} rows returned", rows.rows.len());
                Ok(QueryOutput {
                    sql,
                    params,
                    columns: rows.columns,
                    rows: rows.rows,
                })
            }
            Err(e) => {
                let err = failed(e.to_string());
                tracing::warn!(
                    "[QueryExecutor] query failed: {} sql={} params={:?}",
                    err.message,
                    err.sql,
                    err.params
                );
                Err(err)
            }
        }
    }
}
