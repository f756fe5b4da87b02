//! Query plan shapes.
//!
//! `QueryPlan` is the strict, untrusted shape a reasoning component proposes through
//! the `execute_query` tool. Only the Plan Validator turns it into something the
//! executor will run.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex");
}

// ============ Identifiers ============

/// Check that a name is a plain identifier (`[A-Za-z0-9_]+`).
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Re-escape a name into the identifier character class.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`. Applied to identifiers even
/// after validation, right before they are quoted into SQL.
pub fn escape_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Turn an arbitrary header or file stem into a usable identifier.
///
/// - non-identifier characters become `_`
/// - a leading digit gets a `c_` prefix
/// - an empty result becomes `fallback`
pub fn sanitize_identifier(name: &str, fallback: &str) -> String {
    let escaped = escape_identifier(name.trim());
    if escaped.is_empty() {
        return fallback.to_string();
    }
    if escaped.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("c_{}", escaped);
    }
    escaped
}

// ============ Raw plan (untrusted) ============

/// Plan proposed by the reasoning component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryPlan {
    pub table: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub select: Vec<SelectItem>,
    #[serde(default, rename = "where", deserialize_with = "null_as_empty")]
    pub filters: Vec<Predicate>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub group_by: Vec<String>,
    /// Kept raw so the validator can apply the limit defaulting rules explicitly.
    #[serde(default)]
    pub limit: Option<Value>,
}

/// Models often send `null` for a list they mean to leave empty.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// One `select` entry: a plain column name or an aggregate object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectItem {
    Column(String),
    Aggregate(AggregateSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateSpec {
    pub agg: String,
    pub column: String,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Predicate {
    pub column: String,
    #[serde(default = "default_op")]
    pub op: String,
    pub value: PredicateValue,
}

fn default_op() -> String {
    "=".to_string()
}

/// Predicate values are plain strings or numbers, nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateValue {
    Number(serde_json::Number),
    Text(String),
}

impl QueryPlan {
    /// Parse `execute_query` arguments into a plan.
    ///
    /// Accepted: the plan object, `{"plan": {...}}`, or either encoded as a JSON string.
    pub fn from_tool_arguments(arguments: &Value) -> Result<Self, ValidationError> {
        let unwrapped = unwrap_plan_argument(arguments)?;
        serde_json::from_value::<QueryPlan>(unwrapped).map_err(|e| ValidationError::MalformedPlan {
            reason: e.to_string(),
        })
    }
}

fn unwrap_plan_argument(arguments: &Value) -> Result<Value, ValidationError> {
    let value = match arguments {
        Value::String(encoded) => {
            serde_json::from_str::<Value>(encoded).map_err(|e| ValidationError::MalformedPlan {
                reason: format!("plan string is not valid JSON: {}", e),
            })?
        }
        other => other.clone(),
    };

    match value {
        Value::Object(ref map) if map.len() == 1 && map.contains_key("plan") => {
            match map.get("plan") {
                Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded).map_err(|e| {
                    ValidationError::MalformedPlan {
                        reason: format!("plan string is not valid JSON: {}", e),
                    }
                }),
                Some(inner @ Value::Object(_)) => Ok(inner.clone()),
                _ => Err(ValidationError::MalformedPlan {
                    reason: "'plan' must be an object".to_string(),
                }),
            }
        }
        Value::Object(_) => Ok(value),
        _ => Err(ValidationError::MalformedPlan {
            reason: "plan must be a JSON object".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("sales_2025"));
        assert!(is_valid_identifier("A1"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("drop table"));
        assert!(!is_valid_identifier("x\"; --"));
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("revenue"), "revenue");
        assert_eq!(escape_identifier("a\"b"), "a_b");
        assert_eq!(escape_identifier("col-1 x"), "col_1_x");
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("Unit Price", "col_0"), "Unit_Price");
        assert_eq!(sanitize_identifier("2024 total", "col_0"), "c_2024_total");
        assert_eq!(sanitize_identifier("   ", "col_3"), "col_3");
    }

    #[test]
    fn test_parse_plan_with_aggregate_and_column() {
        let args = json!({
            "table": "sales",
            "select": ["region", {"agg": "SUM", "column": "revenue", "alias": "total"}],
            "where": [{"column": "region", "op": "=", "value": "west"}],
            "group_by": ["region"],
            "limit": 10
        });
        let plan = QueryPlan::from_tool_arguments(&args).unwrap();
        assert_eq!(plan.table, "sales");
        assert_eq!(plan.select.len(), 2);
        assert!(matches!(plan.select[0], SelectItem::Column(ref c) if c == "region"));
        assert!(matches!(plan.select[1], SelectItem::Aggregate(_)));
        assert_eq!(plan.filters[0].value, PredicateValue::Text("west".to_string()));
        assert_eq!(plan.limit, Some(json!(10)));
    }

    #[test]
    fn test_parse_plan_wrapped_and_encoded() {
        let wrapped = json!({"plan": {"table": "sales"}});
        assert_eq!(QueryPlan::from_tool_arguments(&wrapped).unwrap().table, "sales");

        let encoded = json!("{\"table\": \"sales\", \"limit\": 5}");
        assert_eq!(QueryPlan::from_tool_arguments(&encoded).unwrap().table, "sales");

        let wrapped_encoded = json!({"plan": "{\"table\": \"sales\"}"});
        assert_eq!(QueryPlan::from_tool_arguments(&wrapped_encoded).unwrap().table, "sales");
    }

    #[test]
    fn test_null_lists_read_as_empty() {
        let args = json!({"table": "sales", "select": null, "where": null, "group_by": null});
        let plan = QueryPlan::from_tool_arguments(&args).unwrap();
        assert!(plan.select.is_empty());
        assert!(plan.filters.is_empty());
        assert!(plan.group_by.is_empty());

        let args = json!({"table": "sales", "where": "region = 'west'"});
        assert!(matches!(
            QueryPlan::from_tool_arguments(&args),
            Err(ValidationError::MalformedPlan { .. })
        ));
    }

    #[test]
    fn test_predicate_op_defaults_to_equals() {
        let args = json!({"table": "t", "where": [{"column": "a", "value": 3}]});
        let plan = QueryPlan::from_tool_arguments(&args).unwrap();
        assert_eq!(plan.filters[0].op, "=");
        assert!(matches!(plan.filters[0].value, PredicateValue::Number(_)));
    }

    #[test]
    fn test_reject_unknown_keys_and_bad_values() {
        let extra = json!({"table": "t", "order_by": ["a"]});
        assert!(matches!(
            QueryPlan::from_tool_arguments(&extra),
            Err(ValidationError::MalformedPlan { .. })
        ));

        let bool_value = json!({"table": "t", "where": [{"column": "a", "value": true}]});
        assert!(matches!(
            QueryPlan::from_tool_arguments(&bool_value),
            Err(ValidationError::MalformedPlan { .. })
        ));

        let missing_table = json!({"select": ["a"]});
        assert!(QueryPlan::from_tool_arguments(&missing_table).is_err());

        let not_object = json!(["t"]);
        assert!(QueryPlan::from_tool_arguments(&not_object).is_err());
    }
}
