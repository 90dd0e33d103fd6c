//! Tabular view of a decoded JSON payload
//!
//! The request body is expected to be an array of rows, each row an array of
//! scalars. Anything else in field position is kept as [`Field::Nested`] and
//! rendered as JSON text when written out.

use crate::{Error, Result};
use serde_json::Value;
use std::borrow::Cow;

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
    /// Object or array found where a scalar was expected
    Nested(Value),
}

impl Field {
    /// Text written into the CSV cell
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Field::Text(s) => Cow::Borrowed(s.as_str()),
            Field::Number(n) => Cow::Owned(n.to_string()),
            Field::Bool(true) => Cow::Borrowed("true"),
            Field::Bool(false) => Cow::Borrowed("false"),
            Field::Null => Cow::Borrowed(""),
            Field::Nested(value) => Cow::Owned(nested_text(value)),
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, Field::Nested(_))
    }
}

impl From<Value> for Field {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Field::Text(s),
            Value::Number(n) => Field::Number(n),
            Value::Bool(b) => Field::Bool(b),
            Value::Null => Field::Null,
            nested @ (Value::Array(_) | Value::Object(_)) => Field::Nested(nested),
        }
    }
}

// serde_json only fails here on non-string map keys, which a decoded Value
// cannot contain, but the cell must always get some text.
fn nested_text(value: &Value) -> String {
    match serde_json::to_string(value) {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(error = %err, "nested field rendered with Display fallback");
            format!("{}", value)
        }
    }
}

/// One output line
pub type Row = Vec<Field>;

/// Ordered rows; lengths may differ between rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    /// Decode a raw request body
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| Error::MalformedInput(format!("invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Convert an already decoded value. Every element of the top-level
    /// array must itself be an array.
    pub fn from_value(value: Value) -> Result<Self> {
        let rows = match value {
            Value::Array(rows) => rows,
            other => {
                return Err(Error::MalformedInput(format!(
                    "expected an array of rows, found {}",
                    kind(&other)
                )))
            }
        };

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| match row {
                Value::Array(fields) => Ok(fields.into_iter().map(Field::from).collect()),
                other => Err(Error::MalformedInput(format!(
                    "row {} is {}, expected an array",
                    idx,
                    kind(&other)
                ))),
            })
            .collect::<Result<Vec<Row>>>()?;

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of fields holding objects or arrays
    pub fn nested_fields(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .filter(|f| f.is_nested())
            .count()
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_rows_in_order() {
        let table = Table::from_json(br#"[["Luke","Jedi"],["Vader","Sith"]]"#).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0][0], Field::Text("Luke".into()));
        assert_eq!(table.rows()[1][1], Field::Text("Sith".into()));
    }

    #[test]
    fn test_ragged_rows_allowed() {
        let table = Table::from_json(br#"[[1], [1, 2, 3], []]"#).unwrap();
        let widths: Vec<usize> = table.rows().iter().map(|r| r.len()).collect();
        assert_eq!(widths, vec![1, 3, 0]);
    }

    #[test]
    fn test_empty_array() {
        let table = Table::from_json(b"[]").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_non_array_top_level() {
        let bodies: [&[u8]; 4] = [br#"{"a":1}"#, br#""hello""#, b"42", b"null"];
        for body in bodies {
            match Table::from_json(body) {
                Err(Error::MalformedInput(msg)) => assert!(msg.starts_with("expected an array")),
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }

    #[test]
    fn test_non_array_row() {
        let err = Table::from_json(br#"[["ok"], "nope"]"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed input: row 1 is a string, expected an array"
        );
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            Table::from_json(b"[[1,2"),
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(Table::from_json(b""), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_field_text() {
        assert_eq!(Field::from(json!("x")).as_text(), "x");
        assert_eq!(Field::from(json!(42)).as_text(), "42");
        assert_eq!(Field::from(json!(-2.5)).as_text(), "-2.5");
        assert_eq!(Field::from(json!(true)).as_text(), "true");
        assert_eq!(Field::from(json!(false)).as_text(), "false");
        assert_eq!(Field::from(json!(null)).as_text(), "");
    }

    #[test]
    fn test_numbers_keep_their_source_text() {
        let body = b"[[12345678901234567890123, 1.10, 1e400, 0.1e1, -0]]";
        let table = Table::from_json(body).unwrap();
        let cells: Vec<String> = table.rows()[0]
            .iter()
            .map(|f| f.as_text().into_owned())
            .collect();
        assert_eq!(cells, vec!["12345678901234567890123", "1.10", "1e400", "0.1e1", "-0"]);
    }

    #[test]
    fn test_nested_keeps_key_order() {
        let table = Table::from_json(br#"[[{"z":1,"a":[1,2]}, [3]]]"#).unwrap();
        assert_eq!(table.nested_fields(), 2);
        assert_eq!(table.rows()[0][0].as_text(), r#"{"z":1,"a":[1,2]}"#);
        assert_eq!(table.rows()[0][1].as_text(), "[3]");
    }
}
