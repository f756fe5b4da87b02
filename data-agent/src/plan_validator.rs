//! Plan Validator
//!
//! Checks a raw `QueryPlan` against the live schema of a conversation and produces a
//! `NormalizedPlan`: every identifier resolved against the schema and re-escaped,
//! every default made explicit, predicate values separated out as bind parameters.
//!
//! Rules run in a fixed order so the reported error is deterministic:
//! 1. table exists
//! 2. every referenced column exists in that table
//! 3. aggregate functions are supported
//! 4. comparison operators are supported

use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::plan::{escape_identifier, PredicateValue, QueryPlan, SelectItem};
use crate::query_executor::SqlParam;
use crate::schema_registry::SchemaEntry;

/// Wildcard accepted as "all columns", only as the sole `select` entry.
const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFn::Count),
            "SUM" => Some(AggregateFn::Sum),
            "AVG" => Some(AggregateFn::Avg),
            "MIN" => Some(AggregateFn::Min),
            "MAX" => Some(AggregateFn::Max),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComparisonOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "LIKE")]
    Like,
}

impl ComparisonOp {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "=" => Some(ComparisonOp::Eq),
            ">" => Some(ComparisonOp::Gt),
            "<" => Some(ComparisonOp::Lt),
            ">=" => Some(ComparisonOp::Ge),
            "<=" => Some(ComparisonOp::Le),
            "LIKE" => Some(ComparisonOp::Like),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Lt => "<",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Le => "<=",
            ComparisonOp::Like => "LIKE",
        }
    }
}

/// One output expression of a validated plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Projection {
    Column(String),
    Aggregate {
        agg: AggregateFn,
        column: String,
        alias: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub column: String,
    pub op: ComparisonOp,
    pub value: SqlParam,
}

/// A plan that passed validation. Only this shape reaches the SQL assembler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPlan {
    pub table: String,
    pub select: Vec<Projection>,
    #[serde(rename = "where")]
    pub filters: Vec<Filter>,
    pub group_by: Vec<String>,
    pub limit: u32,
}

impl NormalizedPlan {
    /// Bind parameters in WHERE-clause order.
    pub fn params(&self) -> Vec<SqlParam> {
        self.filters.iter().map(|f| f.value.clone()).collect()
    }
}

/// Validate `plan` against `schema`, resolving the limit against `ceiling`.
pub fn validate(
    plan: &QueryPlan,
    schema: &[SchemaEntry],
    ceiling: u32,
) -> Result<NormalizedPlan, ValidationError> {
    // Rule 1: table
    let entry = schema
        .iter()
        .find(|e| e.table == plan.table)
        .ok_or_else(|| ValidationError::UnknownTable {
            table: plan.table.clone(),
            available: schema.iter().map(|e| e.table.clone()).collect(),
        })?;

    let select_all = plan.select.is_empty()
        || (plan.select.len() == 1
            && matches!(&plan.select[0], SelectItem::Column(c) if c.trim() == WILDCARD));

    // Rule 2: every column reference, in plan order
    let check_column = |column: &str| -> Result<(), ValidationError> {
        if entry.columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(ValidationError::UnknownColumn {
                table: entry.table.clone(),
                column: column.to_string(),
                available: entry.columns.clone(),
            })
        }
    };

    if !select_all {
        for item in &plan.select {
            match item {
                SelectItem::Column(column) => check_column(column)?,
                SelectItem::Aggregate(spec) => check_column(&spec.column)?,
            }
        }
    }
    for predicate in &plan.filters {
        check_column(&predicate.column)?;
    }
    for column in &plan.group_by {
        check_column(column)?;
    }

    // Rule 3: aggregates
    let mut select = Vec::new();
    if select_all {
        select.extend(
            entry
                .columns
                .iter()
                .map(|c| Projection::Column(escape_identifier(c))),
        );
    } else {
        for item in &plan.select {
            match item {
                SelectItem::Column(column) => {
                    select.push(Projection::Column(escape_identifier(column)))
                }
                SelectItem::Aggregate(spec) => {
                    let agg = AggregateFn::parse(&spec.agg).ok_or_else(|| {
                        ValidationError::UnsupportedAggregate {
                            agg: spec.agg.clone(),
                        }
                    })?;
                    let column = escape_identifier(&spec.column);
                    let alias = resolve_alias(agg, &column, spec.alias.as_deref());
                    select.push(Projection::Aggregate { agg, column, alias });
                }
            }
        }
    }

    // Rule 4: operators
    let mut filters = Vec::with_capacity(plan.filters.len());
    for predicate in &plan.filters {
        let op = ComparisonOp::parse(&predicate.op).ok_or_else(|| {
            ValidationError::UnsupportedOperator {
                op: predicate.op.clone(),
            }
        })?;
        filters.push(Filter {
            column: escape_identifier(&predicate.column),
            op,
            value: bind_value(&predicate.value),
        });
    }

    Ok(NormalizedPlan {
        table: escape_identifier(&entry.table),
        select,
        filters,
        group_by: plan.group_by.iter().map(|c| escape_identifier(c)).collect(),
        limit: resolve_limit(plan.limit.as_ref(), ceiling),
    })
}

/// `<lowercase agg>_<column>` unless a usable alias was supplied.
fn resolve_alias(agg: AggregateFn, column: &str, requested: Option<&str>) -> String {
    if let Some(requested) = requested {
        let escaped = escape_identifier(requested.trim());
        if !escaped.is_empty() {
            return escaped;
        }
    }
    format!("{}_{}", agg.as_sql().to_ascii_lowercase(), column)
}

/// Positive integers are honoured up to the ceiling; everything else is the ceiling.
pub fn resolve_limit(raw: Option<&Value>, ceiling: u32) -> u32 {
    let ceiling = ceiling.max(1);
    match raw.and_then(Value::as_u64) {
        Some(n) if n > 0 => n.min(ceiling as u64) as u32,
        _ => ceiling,
    }
}

fn bind_value(value: &PredicateValue) -> SqlParam {
    match value {
        PredicateValue::Text(s) => SqlParam::Text(s.clone()),
        PredicateValue::Number(n) => match n.as_i64() {
            Some(i) => SqlParam::Integer(i),
            None => SqlParam::Real(n.as_f64().unwrap_or(0.0)),
        },
    }
}
