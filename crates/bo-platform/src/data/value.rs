//! Bound parameter values
//!
//! Every variant carries an `Option` so that a NULL is still bound with the
//! column's SQL type.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Timestamp(Option<DateTime<Utc>>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        match self {
            Self::Bool(v) => v.is_none(),
            Self::Int(v) => v.is_none(),
            Self::Float(v) => v.is_none(),
            Self::Text(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(Some(s)) => Some(s),
            _ => None,
        }
    }

    /// Ordering between two non-null values of compatible types.
    ///
    /// Returns `None` when either side is NULL, mirroring SQL where any
    /// comparison with NULL is unknown.
    pub fn compare(&self, other: &SqlValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(Some(a)), Self::Bool(Some(b))) => Some(a.cmp(b)),
            (Self::Int(Some(a)), Self::Int(Some(b))) => Some(a.cmp(b)),
            (Self::Float(Some(a)), Self::Float(Some(b))) => a.partial_cmp(b),
            (Self::Int(Some(a)), Self::Float(Some(b))) => (*a as f64).partial_cmp(b),
            (Self::Float(Some(a)), Self::Int(Some(b))) => a.partial_cmp(&(*b as f64)),
            (Self::Text(Some(a)), Self::Text(Some(b))) => Some(a.cmp(b)),
            (Self::Timestamp(Some(a)), Self::Timestamp(Some(b))) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::$variant(Some(value.into()))
                }
            }

            impl From<Option<$ty>> for SqlValue {
                fn from(value: Option<$ty>) -> Self {
                    SqlValue::$variant(value.map(Into::into))
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    f64 => Float,
    String => Text,
    DateTime<Utc> => Timestamp,
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(Some(value.to_string()))
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(Some(value.clone()))
    }
}
