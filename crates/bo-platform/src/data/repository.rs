//! Generic Repository contract
//!
//! One implementation per storage engine, shared by every entity. Each call
//! is a single operation; there is no transaction spanning calls.

use async_trait::async_trait;

use super::entity::Entity;
use super::filter::Filter;
use super::value::SqlValue;
use crate::shared::error::Result;

/// Zero-based offset page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_index: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page_index: u32, page_size: u32) -> Self {
        Self { page_index, page_size }
    }

    pub fn offset(&self) -> u64 {
        self.page_index as u64 * self.page_size as u64
    }

    pub fn limit(&self) -> u64 {
        self.page_size as u64
    }
}

#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Record by key, soft-deleted or not
    async fn get_by_id(&self, id: &E::Key) -> Result<Option<E>>;

    /// First record matching the filter, ordered by key
    async fn get_single(&self, filter: &Filter<E>) -> Result<Option<E>>;

    /// Every record not flagged as deleted, ordered by key
    async fn get_all(&self) -> Result<Vec<E>>;

    async fn find(&self, filter: &Filter<E>) -> Result<Vec<E>>;

    /// One page of matching records plus the total match count
    async fn find_page(&self, filter: &Filter<E>, page: PageRequest) -> Result<(Vec<E>, u64)>;

    /// Up to `limit` matching records whose key sorts after `after`
    async fn find_after(&self, filter: &Filter<E>, after: Option<&E::Key>, limit: u32) -> Result<Vec<E>>;

    /// Persist a new record and return its key.
    ///
    /// Opaque string keys are minted here when still unset; numeric keys
    /// are assigned by the store.
    async fn insert(&self, entity: &E) -> Result<E::Key>;

    /// Overwrite the record with the same key; `false` when none exists
    async fn update(&self, entity: &E) -> Result<bool>;

    /// Overwrite the record with the same key only while the stored record
    /// still matches `expected`, as one atomic step. `false` when it doesn't
    /// or none exists.
    async fn update_where(&self, entity: &E, expected: &Filter<E>) -> Result<bool>;

    /// Physically remove the record; `false` when none exists
    async fn delete(&self, entity: &E) -> Result<bool>;

    /// Call a set-returning stored procedure, one JSON object per row
    async fn execute_procedure(&self, name: &str, params: &[SqlValue]) -> Result<Vec<serde_json::Value>>;

    async fn execute_procedure_paged(
        &self,
        name: &str,
        params: &[SqlValue],
        page: PageRequest,
    ) -> Result<(Vec<serde_json::Value>, u64)>;
}

/// Validate a (possibly schema-qualified) routine name
pub(crate) fn is_valid_routine_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
