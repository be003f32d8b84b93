//! Values an observed attribute can hold.
//!
//! Event sources publish heterogeneous attribute values: flags, counters,
//! readings, enum-like states rendered as strings, spectra and structured
//! payloads. `Value` covers them with plain equality, which is all the
//! query filters need.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The payload of an attribute change event.
///
/// Equality is structural and type-strict: `Int(1)` and `Float(1.0)` are
/// different values, as are `"1"` and `1`.
///
/// ```
/// use changeprobe::Value;
///
/// assert_eq!(Value::from(42), Value::Int(42));
/// assert_eq!(Value::from(vec![0.5, 1.5]).to_string(), "[0.5, 1.5]");
/// assert_eq!(Value::from(None::<i64>), Value::Null);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// A flag.
    Bool(bool),
    /// Any integer attribute, including enum-coded states.
    Int(i64),
    /// A reading.
    Float(f64),
    /// Free text or a state spelled out.
    String(String),
    /// A spectrum or any other sequence.
    List(Vec<Value>),
    /// A JSON payload kept as-is.
    Structured(serde_json::Value),
    /// No value: the source sent nothing, or reported an error.
    #[default]
    Null,
}

impl Value {
    /// Whether there is no value.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The integer code, for `Int` values.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text used when matching the value against a pattern.
    ///
    /// Strings are returned without quotes; everything else uses its
    /// `Display` rendering.
    #[must_use]
    pub fn match_text(&self) -> String {
        match self {
            Self::String(v) => v.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Structured(v) => write!(f, "{v}"),
            Self::Null => f.write_str("null"),
        }
    }
}

macro_rules! value_from {
    ($variant:ident: $($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )+
    };
}

value_from!(Bool: bool);
value_from!(Int: i8, i16, i32, i64, u8, u16, u32);
value_from!(Float: f32, f64);
value_from!(String: String, &str);
value_from!(Structured: serde_json::Value);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
