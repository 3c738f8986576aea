//! Short constructors for building pipelines in code.
//!
//! ```
//! use rowflow_engine::dsl::{from_rows, lit, r#ref, to_memory};
//! use rowflow_engine::Pipeline;
//! use rowflow_types::{Entry, Row, Rows};
//!
//! let rows = Rows::new(vec![Row::new(vec![Entry::integer("a", 1)]).unwrap()]);
//! let (sink, handle) = to_memory();
//! let pipeline = Pipeline::builder()
//!     .read(from_rows(rows))
//!     .with_entry("b", r#ref("a").plus(lit(41)))
//!     .write(sink)
//!     .build()
//!     .unwrap();
//! # let _ = (pipeline, handle);
//! ```

use rowflow_types::{DataType, Rows, Value};

use crate::expr::Expression;
use crate::extract::RowsExtractor;
use crate::load::{MemoryHandle, MemoryLoader, OutputConfig, OutputFormat, OutputLoader};

/// Reference to the entry `name` of the row being evaluated.
pub fn r#ref(name: impl Into<String>) -> Expression {
    Expression::reference(name)
}

/// Literal; the type is inferred from the value.
pub fn lit(value: impl Into<Value>) -> Expression {
    Expression::literal(value)
}

/// Typed null literal.
#[must_use]
pub fn null(data_type: DataType) -> Expression {
    Expression::typed_null(data_type)
}

#[must_use]
pub fn from_rows(rows: Rows) -> RowsExtractor {
    RowsExtractor::new(rows)
}

/// ASCII table output to stdout. `truncate` cuts long values.
#[must_use]
pub fn to_output(truncate: Option<usize>) -> OutputLoader {
    OutputLoader::new(OutputConfig {
        truncate,
        format: OutputFormat::Table,
    })
}

/// In-memory sink and the handle to inspect what it received.
#[must_use]
pub fn to_memory() -> (MemoryLoader, MemoryHandle) {
    let loader = MemoryLoader::new();
    let handle = loader.handle();
    (loader, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflow_types::{Entry, Row};

    #[test]
    fn str_operands_are_references_and_numbers_are_literals() {
        let row = Row::new(vec![Entry::integer("a", 2), Entry::integer("b", 3)]).unwrap();
        assert_eq!(
            r#ref("a").plus("b").eval(&row).unwrap().value(),
            &Value::Integer(5)
        );
        assert_eq!(
            r#ref("a").plus(lit("b")).to_string(),
            "a + 'b'"
        );
        assert_eq!(r#ref("a").times(10).eval(&row).unwrap().value(), &Value::Integer(20));
    }

    #[test]
    fn typed_null_keeps_type() {
        let row = Row::new(vec![Entry::integer("a", 2)]).unwrap();
        let entry = r#ref("a").plus(null(DataType::Integer)).eval(&row).unwrap();
        assert!(entry.is_null());
        assert_eq!(entry.data_type(), &DataType::Integer);
    }
}
