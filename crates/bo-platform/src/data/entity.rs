//! Entity Model
//!
//! Base shape shared by every persisted record: a key, the audit block and the
//! soft-delete flag. Concrete entities describe their own columns so the
//! repositories can stay generic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use std::fmt::{Debug, Display};
use utoipa::ToSchema;

use super::value::SqlValue;
use crate::shared::tsid::TsidGenerator;

/// Audit columns, in write order
pub const AUDIT_COLUMNS: &[&str] = &["created_at", "created_by", "updated_at", "updated_by", "is_deleted"];

pub const ID_COLUMN: &str = "id";
pub const IS_DELETED_COLUMN: &str = "is_deleted";

/// Audit fields carried by every entity.
///
/// `created_*` are written once by the generic service and never changed;
/// `updated_*` are stamped on every later mutation, soft delete included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub is_deleted: bool,
}

impl Audit {
    pub fn values(&self) -> Vec<SqlValue> {
        vec![
            self.created_at.into(),
            self.created_by.clone().into(),
            self.updated_at.into(),
            self.updated_by.clone().into(),
            self.is_deleted.into(),
        ]
    }

    pub fn field(&self, column: &str) -> Option<SqlValue> {
        let value: SqlValue = match column {
            "created_at" => self.created_at.into(),
            "created_by" => self.created_by.as_str().into(),
            "updated_at" => self.updated_at.into(),
            "updated_by" => self.updated_by.clone().into(),
            "is_deleted" => self.is_deleted.into(),
            _ => return None,
        };
        Some(value)
    }
}

/// Key type of an entity.
///
/// Opaque string keys are minted on the client as TSIDs; numeric keys are
/// assigned by the store and read back after the insert.
pub trait EntityKey: Clone + Debug + Display + PartialEq + PartialOrd + Send + Sync + 'static {
    /// A freshly generated key, or `None` when the store assigns it
    fn mint() -> Option<Self>;

    fn is_unset(&self) -> bool;

    fn to_sql(&self) -> SqlValue;

    /// Convert a store-generated sequence value into a key
    fn from_generated(value: i64) -> Option<Self>;

    /// Parse the `Display` form back, used for pagination cursors
    fn parse(value: &str) -> Option<Self>;
}

impl EntityKey for String {
    fn mint() -> Option<Self> {
        Some(TsidGenerator::generate())
    }

    fn is_unset(&self) -> bool {
        self.is_empty()
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Text(Some(self.clone()))
    }

    fn from_generated(_value: i64) -> Option<Self> {
        None
    }

    fn parse(value: &str) -> Option<Self> {
        (!value.is_empty()).then(|| value.to_string())
    }
}

impl EntityKey for i64 {
    fn mint() -> Option<Self> {
        None
    }

    fn is_unset(&self) -> bool {
        *self <= 0
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Int(Some(*self))
    }

    fn from_generated(value: i64) -> Option<Self> {
        Some(value)
    }

    fn parse(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

/// A persisted record.
///
/// `columns()` and `values()` must line up; neither includes the key or the
/// audit block, which the repositories handle themselves.
pub trait Entity: Clone + Debug + Send + Sync + Unpin + 'static + for<'r> sqlx::FromRow<'r, PgRow> {
    type Key: EntityKey;

    /// Table name
    const TABLE: &'static str;

    /// Cache key prefix; every cached read for this entity starts with it
    const CACHE_PREFIX: &'static str;

    fn id(&self) -> &Self::Key;

    fn set_id(&mut self, id: Self::Key);

    fn audit(&self) -> &Audit;

    fn audit_mut(&mut self) -> &mut Audit;

    fn columns() -> &'static [&'static str];

    fn values(&self) -> Vec<SqlValue>;

    /// Value of a single column, used when filters are evaluated in memory
    fn field(&self, column: &str) -> Option<SqlValue> {
        if column == ID_COLUMN {
            return Some(self.id().to_sql());
        }
        if let Some(value) = self.audit().field(column) {
            return Some(value);
        }
        let index = Self::columns().iter().position(|c| *c == column)?;
        let mut values = self.values();
        (index < values.len()).then(|| values.swap_remove(index))
    }

    fn is_deleted(&self) -> bool {
        self.audit().is_deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_keys_are_minted() {
        let key = String::mint().unwrap();
        assert!(!key.is_unset());
        assert!(TsidGenerator::is_valid(&key));
        assert!(String::new().is_unset());
    }

    #[test]
    fn test_numeric_keys_come_from_the_store() {
        assert_eq!(i64::mint(), None);
        assert!(0i64.is_unset());
        assert_eq!(i64::from_generated(7), Some(7));
        assert_eq!(i64::parse("42"), Some(42));
        assert_eq!(i64::parse("forty-two"), None);
    }

    #[test]
    fn test_audit_field_lookup() {
        let audit = Audit {
            created_by: "alice".to_string(),
            is_deleted: true,
            ..Default::default()
        };
        assert_eq!(audit.field("created_by"), Some(SqlValue::from("alice")));
        assert_eq!(audit.field("is_deleted"), Some(SqlValue::Bool(Some(true))));
        assert_eq!(audit.field("updated_by"), Some(SqlValue::Text(None)));
        assert_eq!(audit.field("name"), None);
    }
}
