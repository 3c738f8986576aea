//! Type tags and typed values carried by entries.
//!
//! [`DataType`] is the declared shape of an entry and [`Value`] is the
//! runtime payload. Both are closed sum types so every consumer matches
//! them exhaustively.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::schema::Definition;

/// Declared type of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum DataType {
    Integer,
    Float,
    String,
    Boolean,
    DateTime,
    /// Homogeneous list; list items may be null.
    List(Box<DataType>),
    /// Nested entries, in declaration order.
    Structure(Vec<Definition>),
}

impl DataType {
    /// Returns `true` for `Integer` and `Float`.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Whether a non-null `value` satisfies this type.
    ///
    /// `Value::Null` is never accepted here; nullability is a property of
    /// the entry, not of the type.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Integer, Value::Integer(_))
            | (Self::Float, Value::Float(_))
            | (Self::String, Value::String(_))
            | (Self::Boolean, Value::Boolean(_))
            | (Self::DateTime, Value::DateTime(_)) => true,
            (Self::List(inner), Value::List(items)) => items
                .iter()
                .all(|item| item.is_null() || inner.accepts(item)),
            (Self::Structure(fields), Value::Structure(entries)) => {
                fields.len() == entries.len()
                    && fields.iter().zip(entries).all(|(field, entry)| {
                        field.name == entry.name()
                            && field.data_type == *entry.data_type()
                            && (field.nullable || !entry.is_null())
                    })
            }
            (
                Self::Integer
                | Self::Float
                | Self::String
                | Self::Boolean
                | Self::DateTime
                | Self::List(_)
                | Self::Structure(_),
                _,
            ) => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::String => f.write_str("string"),
            Self::Boolean => f.write_str("boolean"),
            Self::DateTime => f.write_str("datetime"),
            Self::List(inner) => write!(f, "list<{inner}>"),
            Self::Structure(fields) => {
                f.write_str("structure{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: ", field.name)?;
                    if field.nullable {
                        f.write_str("?")?;
                    }
                    write!(f, "{}", field.data_type)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Runtime value of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
    Structure(Vec<Entry>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Type of a non-null value. List element types come from the first
    /// non-null item and default to `String` for lists of nulls.
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(DataType::Integer),
            Self::Float(_) => Some(DataType::Float),
            Self::String(_) => Some(DataType::String),
            Self::Boolean(_) => Some(DataType::Boolean),
            Self::DateTime(_) => Some(DataType::DateTime),
            Self::List(items) => Some(DataType::List(Box::new(
                items
                    .iter()
                    .find_map(Self::data_type)
                    .unwrap_or(DataType::String),
            ))),
            Self::Structure(entries) => Some(DataType::Structure(
                entries.iter().map(Entry::definition).collect(),
            )),
        }
    }

    /// Short kind name used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::DateTime(_) => "datetime",
            Self::List(_) => "list",
            Self::Structure(_) => "structure",
        }
    }

    /// Numeric view of the value, promoting integers to floats.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Null
            | Self::String(_)
            | Self::Boolean(_)
            | Self::DateTime(_)
            | Self::List(_)
            | Self::Structure(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert into a plain JSON value (lossy for datetimes, which become
    /// RFC 3339 strings).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::DateTime(dt) => {
                serde_json::Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Structure(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|entry| (entry.name().to_string(), entry.value().to_json()))
                    .collect(),
            ),
        }
    }

    /// Orders values of the same kind; integers and floats compare
    /// numerically. Values of unrelated kinds (and nulls) are unordered.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Integer(_) | Self::Float(_), Self::Integer(_) | Self::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order over every value, used for sorting.
    ///
    /// Numbers come first and compare exactly across integers and floats
    /// (an integer sorts before an equal float, `NaN` after every number),
    /// then strings, booleans, datetimes, lists, structures, and `Null`.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => cmp_floats(*a, *b),
            (Self::Integer(a), Self::Float(b)) => cmp_int_float(*a, *b),
            (Self::Float(a), Self::Integer(b)) => cmp_int_float(*b, *a).reverse(),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.total_cmp(y))
                .find(|ord| ord.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Self::Structure(a), Self::Structure(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    x.name()
                        .cmp(y.name())
                        .then_with(|| x.value().total_cmp(y.value()))
                })
                .find(|ord| ord.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Self::Integer(_) | Self::Float(_) => 0,
            Self::String(_) => 1,
            Self::Boolean(_) => 2,
            Self::DateTime(_) => 3,
            Self::List(_) => 4,
            Self::Structure(_) => 5,
            Self::Null => 6,
        }
    }
}

/// Numeric order with `NaN` last; `-0.0` before `0.0`.
fn cmp_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => a.total_cmp(&b),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a
            .partial_cmp(&b)
            .filter(|ord| ord.is_ne())
            .unwrap_or_else(|| a.total_cmp(&b)),
    }
}

/// Exact integer/float comparison; ties put the integer first.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() || f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    // `whole` is within i64 range here, so the cast is exact.
    let whole_int = whole as i64;
    i.cmp(&whole_int).then_with(|| {
        if f - whole < 0.0 {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::DateTime(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::List(_) | Self::Structure(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}
