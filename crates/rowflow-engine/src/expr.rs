//! Expression trees evaluated against a single row.
//!
//! An [`Expression`] is an immutable tree of field references, literals and
//! operators. Evaluation is pure: the same row always yields the same entry
//! or the same [`EvalError`]. Operators propagate nulls, so any null operand
//! produces a null result of the operator's type.
//!
//! Trees are usually built through the chainable methods on [`Expression`]
//! starting from [`crate::dsl::r#ref`] or [`crate::dsl::lit`].

use std::fmt;

use serde::{Deserialize, Serialize};

use rowflow_types::{DataType, Entry, Row, Value};

/// Failure evaluating an expression against a row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("field '{field}' not found in row")]
    MissingField { field: String },

    #[error("operator '{op}' cannot be applied to {operands}")]
    TypeMismatch { op: &'static str, operands: String },

    #[error("arithmetic error in '{op}': {message}")]
    Arithmetic { op: &'static str, message: String },
}

impl EvalError {
    fn mismatch(op: &'static str, left: &Entry, right: &Entry) -> Self {
        Self::TypeMismatch {
            op,
            operands: format!("{} and {}", left.data_type(), right.data_type()),
        }
    }

    fn arithmetic(op: BinaryOp, message: &str) -> Self {
        Self::Arithmetic {
            op: op.symbol(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Plus,
    Minus,
    Times,
    Div,
    Modulo,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

enum OpClass {
    Arithmetic,
    Comparison,
    Logical,
}

impl BinaryOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Times => "*",
            Self::Div => "/",
            Self::Modulo => "%",
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    fn class(self) -> OpClass {
        match self {
            Self::Plus | Self::Minus | Self::Times | Self::Div | Self::Modulo => {
                OpClass::Arithmetic
            }
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq => {
                OpClass::Comparison
            }
            Self::And | Self::Or => OpClass::Logical,
        }
    }
}

/// Immutable expression tree.
///
/// Serializable so it can travel inside transformer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expression {
    Reference {
        name: String,
    },
    Literal {
        value: Value,
        data_type: DataType,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Not {
        operand: Box<Expression>,
    },
    IsNull {
        operand: Box<Expression>,
        negated: bool,
    },
}

#[allow(clippy::should_implement_trait)]
impl Expression {
    #[must_use]
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference { name: name.into() }
    }

    /// Literal whose type is inferred from the value. A bare null literal
    /// is typed as `String`; use [`Expression::typed_null`] otherwise.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        let value = value.into();
        let data_type = value.data_type().unwrap_or(DataType::String);
        Self::Literal { value, data_type }
    }

    #[must_use]
    pub fn typed_null(data_type: DataType) -> Self {
        Self::Literal {
            value: Value::Null,
            data_type,
        }
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expression>) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    #[must_use]
    pub fn plus(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Plus, other)
    }

    #[must_use]
    pub fn minus(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Minus, other)
    }

    #[must_use]
    pub fn times(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Times, other)
    }

    /// Always yields a `Float`.
    #[must_use]
    pub fn div(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Div, other)
    }

    #[must_use]
    pub fn modulo(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Modulo, other)
    }

    #[must_use]
    pub fn eq(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    #[must_use]
    pub fn not_eq(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::NotEq, other)
    }

    #[must_use]
    pub fn lt(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    #[must_use]
    pub fn lt_eq(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::LtEq, other)
    }

    #[must_use]
    pub fn gt(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    #[must_use]
    pub fn gt_eq(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::GtEq, other)
    }

    #[must_use]
    pub fn and(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    #[must_use]
    pub fn or(self, other: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    #[must_use]
    pub fn not(self) -> Self {
        Self::Not {
            operand: Box::new(self),
        }
    }

    #[must_use]
    pub fn is_null(self) -> Self {
        Self::IsNull {
            operand: Box::new(self),
            negated: false,
        }
    }

    #[must_use]
    pub fn is_not_null(self) -> Self {
        Self::IsNull {
            operand: Box::new(self),
            negated: true,
        }
    }

    /// Evaluate against `row`. The result entry is named after the
    /// expression's display form, e.g. `a + b`.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] on a missing field, an operand of the wrong
    /// type, integer overflow, or division by zero.
    pub fn eval(&self, row: &Row) -> Result<Entry, EvalError> {
        match self {
            Self::Reference { name } => {
                row.get(name)
                    .cloned()
                    .ok_or_else(|| EvalError::MissingField {
                        field: name.clone(),
                    })
            }
            Self::Literal { value, data_type } => {
                build(self, data_type.clone(), value.is_null(), value.clone(), "literal")
            }
            Self::Binary { op, left, right } => {
                let left = left.eval(row)?;
                let right = right.eval(row)?;
                let (data_type, value) = match op.class() {
                    OpClass::Arithmetic => arithmetic(*op, &left, &right)?,
                    OpClass::Comparison => comparison(*op, &left, &right)?,
                    OpClass::Logical => logical(*op, &left, &right)?,
                };
                let nullable = left.is_nullable() || right.is_nullable() || value.is_null();
                build(self, data_type, nullable, value, op.symbol())
            }
            Self::Not { operand } => {
                let inner = operand.eval(row)?;
                let value = match inner.value() {
                    Value::Null if *inner.data_type() == DataType::Boolean => Value::Null,
                    Value::Boolean(b) => Value::Boolean(!b),
                    _ => {
                        return Err(EvalError::TypeMismatch {
                            op: "NOT",
                            operands: inner.data_type().to_string(),
                        })
                    }
                };
                build(self, DataType::Boolean, inner.is_nullable(), value, "NOT")
            }
            Self::IsNull { operand, negated } => {
                let inner = operand.eval(row)?;
                let value = Value::Boolean(inner.is_null() != *negated);
                build(self, DataType::Boolean, false, value, "IS NULL")
            }
        }
    }

    /// Evaluate as a row predicate. `None` means the condition was null.
    ///
    /// # Errors
    ///
    /// Propagates [`EvalError`]s and rejects non-boolean results.
    pub fn eval_predicate(&self, row: &Row) -> Result<Option<bool>, EvalError> {
        let entry = self.eval(row)?;
        match entry.value() {
            Value::Boolean(b) => Ok(Some(*b)),
            Value::Null if *entry.data_type() == DataType::Boolean => Ok(None),
            _ => Err(EvalError::TypeMismatch {
                op: "predicate",
                operands: entry.data_type().to_string(),
            }),
        }
    }
}

fn build(
    expr: &Expression,
    data_type: DataType,
    nullable: bool,
    value: Value,
    op: &'static str,
) -> Result<Entry, EvalError> {
    Entry::new(expr.to_string(), data_type, nullable, value).map_err(|e| {
        EvalError::TypeMismatch {
            op,
            operands: e.to_string(),
        }
    })
}

fn arithmetic(op: BinaryOp, left: &Entry, right: &Entry) -> Result<(DataType, Value), EvalError> {
    if !left.data_type().is_numeric() || !right.data_type().is_numeric() {
        return Err(EvalError::mismatch(op.symbol(), left, right));
    }
    let integral = op != BinaryOp::Div
        && *left.data_type() == DataType::Integer
        && *right.data_type() == DataType::Integer;
    let data_type = if integral {
        DataType::Integer
    } else {
        DataType::Float
    };
    if left.is_null() || right.is_null() {
        return Ok((data_type, Value::Null));
    }
    let value = match (left.value(), right.value()) {
        (Value::Integer(a), Value::Integer(b)) if integral => {
            Value::Integer(integer_op(op, *a, *b)?)
        }
        (a, b) => {
            let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
                return Err(EvalError::mismatch(op.symbol(), left, right));
            };
            Value::Float(float_op(op, a, b)?)
        }
    };
    Ok((data_type, value))
}

fn integer_op(op: BinaryOp, a: i64, b: i64) -> Result<i64, EvalError> {
    let result = match op {
        BinaryOp::Plus => a.checked_add(b),
        BinaryOp::Minus => a.checked_sub(b),
        BinaryOp::Times => a.checked_mul(b),
        BinaryOp::Modulo => {
            if b == 0 {
                return Err(EvalError::arithmetic(op, "modulo by zero"));
            }
            a.checked_rem(b)
        }
        _ => return Err(EvalError::arithmetic(op, "not an integer operator")),
    };
    result.ok_or_else(|| EvalError::arithmetic(op, "integer overflow"))
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Result<f64, EvalError> {
    let result = match op {
        BinaryOp::Plus => a + b,
        BinaryOp::Minus => a - b,
        BinaryOp::Times => a * b,
        BinaryOp::Div | BinaryOp::Modulo if b == 0.0 => {
            return Err(EvalError::arithmetic(op, "division by zero"));
        }
        BinaryOp::Div => a / b,
        BinaryOp::Modulo => a % b,
        _ => return Err(EvalError::arithmetic(op, "not a numeric operator")),
    };
    if result.is_finite() {
        Ok(result)
    } else {
        Err(EvalError::arithmetic(op, "result is not finite"))
    }
}

fn comparison(op: BinaryOp, left: &Entry, right: &Entry) -> Result<(DataType, Value), EvalError> {
    let (lt, rt) = (left.data_type(), right.data_type());
    let comparable = (lt.is_numeric() && rt.is_numeric())
        || (lt == rt
            && match lt {
                DataType::List(_) | DataType::Structure(_) => {
                    matches!(op, BinaryOp::Eq | BinaryOp::NotEq)
                }
                _ => true,
            });
    if !comparable {
        return Err(EvalError::mismatch(op.symbol(), left, right));
    }
    if left.is_null() || right.is_null() {
        return Ok((DataType::Boolean, Value::Null));
    }
    let ordering = match (left.value(), right.value()) {
        (l @ (Value::List(_) | Value::Structure(_)), r) => {
            (l == r).then_some(std::cmp::Ordering::Equal)
        }
        (l, r) => l.compare(r),
    };
    let result = match op {
        BinaryOp::Eq => ordering.is_some_and(std::cmp::Ordering::is_eq),
        BinaryOp::NotEq => !ordering.is_some_and(std::cmp::Ordering::is_eq),
        BinaryOp::Lt => ordering.is_some_and(std::cmp::Ordering::is_lt),
        BinaryOp::LtEq => ordering.is_some_and(std::cmp::Ordering::is_le),
        BinaryOp::Gt => ordering.is_some_and(std::cmp::Ordering::is_gt),
        BinaryOp::GtEq => ordering.is_some_and(std::cmp::Ordering::is_ge),
        _ => return Err(EvalError::mismatch(op.symbol(), left, right)),
    };
    Ok((DataType::Boolean, Value::Boolean(result)))
}

fn logical(op: BinaryOp, left: &Entry, right: &Entry) -> Result<(DataType, Value), EvalError> {
    if *left.data_type() != DataType::Boolean || *right.data_type() != DataType::Boolean {
        return Err(EvalError::mismatch(op.symbol(), left, right));
    }
    let value = match (left.value(), right.value()) {
        (Value::Boolean(a), Value::Boolean(b)) => Value::Boolean(match op {
            BinaryOp::And => *a && *b,
            _ => *a || *b,
        }),
        _ => Value::Null,
    };
    Ok((DataType::Boolean, value))
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference { name } => f.write_str(name),
            Self::Literal {
                value: Value::String(s),
                ..
            } => write!(f, "'{s}'"),
            Self::Literal { value, .. } => write!(f, "{value}"),
            Self::Binary { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right)
            }
            Self::Not { operand } => {
                f.write_str("NOT ")?;
                write_operand(f, operand)
            }
            Self::IsNull { operand, negated } => {
                write_operand(f, operand)?;
                f.write_str(if *negated { " IS NOT NULL" } else { " IS NULL" })
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expression) -> fmt::Result {
    match expr {
        Expression::Binary { .. } | Expression::IsNull { .. } => write!(f, "({expr})"),
        _ => write!(f, "{expr}"),
    }
}

/// Strings are field references.
impl From<&str> for Expression {
    fn from(name: &str) -> Self {
        Self::reference(name)
    }
}

impl From<String> for Expression {
    fn from(name: String) -> Self {
        Self::reference(name)
    }
}

impl From<i64> for Expression {
    fn from(v: i64) -> Self {
        Self::literal(v)
    }
}

impl From<i32> for Expression {
    fn from(v: i32) -> Self {
        Self::literal(v)
    }
}

impl From<f64> for Expression {
    fn from(v: f64) -> Self {
        Self::literal(v)
    }
}

impl From<bool> for Expression {
    fn from(v: bool) -> Self {
        Self::literal(v)
    }
}

impl From<Value> for Expression {
    fn from(v: Value) -> Self {
        Self::literal(v)
    }
}
