use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row: column name to value
pub type Row = Map<String, Value>;

/// The single normalized shape of any query outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Present for mutations, absent for pure reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    /// When set the operation failed, whatever else the result holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// How a result must be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome<'a> {
    Failed(&'a str),
    /// Successful, zero rows
    Empty { affected_rows: Option<u64> },
    Rows(usize),
}

impl QueryResult {
    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            affected_rows: None,
            error: None,
        }
    }

    pub fn affected(count: u64) -> Self {
        Self {
            affected_rows: Some(count),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn outcome(&self) -> QueryOutcome<'_> {
        if let Some(error) = &self.error {
            QueryOutcome::Failed(error)
        } else if self.rows.is_empty() {
            QueryOutcome::Empty {
                affected_rows: self.affected_rows,
            }
        } else {
            QueryOutcome::Rows(self.rows.len())
        }
    }

    /// Rendered cells in column order, or `None` for a failed result
    pub fn table(&self) -> Option<Vec<Vec<String>>> {
        if !self.is_success() {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|row| {
                    self.columns
                        .iter()
                        .map(|column| row.get(column).map(render_value).unwrap_or_default())
                        .collect()
                })
                .collect(),
        )
    }

    /// Build a result from the loosely typed wire shape.
    ///
    /// Missing or malformed `columns`/`rows` become empty sequences;
    /// `affected_rows` and `error` are kept as received.
    pub fn from_wire(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self::failed("backend returned a malformed query result");
        };

        let columns = match object.remove("columns") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(name),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        let rows = match object.remove("rows") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(row) => Some(row),
                    other => {
                        tracing::debug!("dropping non-object row: {}", other);
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        let affected_rows = object.get("affected_rows").and_then(Value::as_u64);

        let error = match object.get("error") {
            Some(Value::String(message)) => Some(message.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        let error = match (error, object.get("success").and_then(Value::as_bool)) {
            (None, Some(false)) => Some("query failed".to_string()),
            (error, _) => error,
        };

        Self {
            columns,
            rows,
            affected_rows,
            error,
        }
    }

    /// Wire shape produced by the local drivers
    pub fn to_wire(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()));
        if let Value::Object(object) = &mut value {
            object.insert("success".into(), Value::Bool(self.is_success()));
        }
        value
    }
}

/// Text rendering of one cell; nested values become compact JSON
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_from_wire_well_formed() {
        let result = QueryResult::from_wire(json!({
            "columns": ["id", "name"],
            "rows": [{"id": 1, "name": "a"}, {"id": 2, "name": null}],
            "success": true
        }));
        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.affected_rows, None);
        assert_eq!(result.outcome(), QueryOutcome::Rows(2));
    }

    #[test]
    fn test_from_wire_coerces_malformed_fields() {
        let result = QueryResult::from_wire(json!({
            "columns": "id",
            "rows": [{"id": 1}, 7, "x"],
            "affected_rows": 3
        }));
        assert!(result.columns.is_empty());
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.affected_rows, Some(3));
        assert!(result.is_success());

        let result = QueryResult::from_wire(json!({}));
        assert!(result.columns.is_empty());
        assert!(result.rows.is_empty());
        assert!(result.is_success());
    }

    #[test]
    fn test_from_wire_non_object_is_failure() {
        assert!(!QueryResult::from_wire(json!([1, 2])).is_success());
        assert!(!QueryResult::from_wire(Value::Null).is_success());
    }

    #[test]
    fn test_from_wire_unsuccessful_without_message() {
        let result = QueryResult::from_wire(json!({"success": false, "columns": [], "rows": []}));
        assert_eq!(result.error.as_deref(), Some("query failed"));
    }

    #[test]
    fn test_error_wins_over_rows() {
        let result = QueryResult::from_wire(json!({
            "columns": ["id"],
            "rows": [{"id": 1}],
            "affected_rows": 1,
            "error": "constraint violated"
        }));
        assert_eq!(result.outcome(), QueryOutcome::Failed("constraint violated"));
        assert_eq!(result.table(), None);
    }

    #[test]
    fn test_empty_result_is_not_failure() {
        let result = QueryResult::with_rows(vec!["id".into()], Vec::new());
        assert_eq!(result.outcome(), QueryOutcome::Empty { affected_rows: None });

        let result = QueryResult::affected(4);
        assert_eq!(
            result.outcome(),
            QueryOutcome::Empty {
                affected_rows: Some(4)
            }
        );
    }

    #[test]
    fn test_table_renders_nested_values() {
        let result = QueryResult::with_rows(
            vec!["_id".into(), "tags".into(), "missing".into()],
            vec![row(json!({"_id": "abc", "tags": ["a", {"b": 1}]}))],
        );
        let table = result.table().unwrap();
        assert_eq!(table, vec![vec!["abc".to_string(), r#"["a",{"b":1}]"#.to_string(), String::new()]]);

        let nested = json!({"tags": ["a", {"b": 1}]});
        let reparsed: Value = serde_json::from_str(&render_value(&nested)).unwrap();
        assert_eq!(reparsed, nested);
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(render_value(&Value::Null), "NULL");
        assert_eq!(render_value(&json!(1.5)), "1.5");
        assert_eq!(render_value(&json!(true)), "true");
        assert_eq!(render_value(&json!("text")), "text");
    }

    #[test]
    fn test_wire_round_trip() {
        let result = QueryResult::with_rows(vec!["id".into()], vec![row(json!({"id": 1}))]);
        let wire = result.to_wire();
        assert_eq!(wire["success"], true);
        assert_eq!(QueryResult::from_wire(wire), result);
    }
}
