//! Mapping between Rowflow values and SQLite storage classes.
//!
//! Booleans are stored as 0/1 integers. Datetimes are stored as RFC 3339
//! text and lists and structures as JSON text, which is also what
//! `json_each` expects for list parameters. Reading back yields the
//! storage class type, so those round trip as integers and strings.

use rusqlite::types::{Value as SqlValue, ValueRef};

use rowflow_types::{DataType, Entry, Value};

pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::DateTime(_) | Value::List(_) | Value::Structure(_) => SqlValue::Text(value.to_string()),
    }
}

/// Build an entry from one result column. Nulls carry no type information
/// and are typed as nullable strings.
pub(crate) fn entry_from_sql(name: &str, value: ValueRef<'_>) -> Entry {
    match value {
        ValueRef::Null => Entry::null(name, DataType::String),
        ValueRef::Integer(v) => Entry::integer(name, v),
        ValueRef::Real(v) => Entry::float(name, v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Entry::string(name, String::from_utf8_lossy(bytes))
        }
    }
}

/// Column affinity used when creating a table for `data_type`.
pub(crate) fn column_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Integer | DataType::Boolean => "INTEGER",
        DataType::Float => "REAL",
        DataType::String | DataType::DateTime | DataType::List(_) | DataType::Structure(_) => "TEXT",
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Null, SqlValue::Null)]
    #[case(Value::Integer(-3), SqlValue::Integer(-3))]
    #[case(Value::Float(1.5), SqlValue::Real(1.5))]
    #[case(Value::Boolean(true), SqlValue::Integer(1))]
    #[case(Value::String("x".into()), SqlValue::Text("x".into()))]
    #[case(Value::List(vec![Value::Integer(1), Value::Integer(2)]), SqlValue::Text("[1,2]".into()))]
    fn values_map_to_storage_classes(#[case] value: Value, #[case] expected: SqlValue) {
        assert_eq!(to_sql(&value), expected);
    }

    #[test]
    fn null_column_reads_as_nullable_string() {
        let entry = entry_from_sql("n", ValueRef::Null);
        assert!(entry.is_null());
        assert!(entry.is_nullable());
        assert_eq!(entry.data_type(), &DataType::String);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
