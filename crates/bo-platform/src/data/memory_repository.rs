//! In-memory Repository
//!
//! [`Repository`] backed by a vector behind a `parking_lot::RwLock`. Filters
//! are evaluated with [`Filter::matches`]. Used in dev mode and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;

use super::entity::{Entity, EntityKey};
use super::filter::Filter;
use super::repository::{is_valid_routine_name, PageRequest, Repository};
use super::value::SqlValue;
use crate::shared::error::{PlatformError, Result};

/// Stand-in for a stored procedure: parameters in, JSON rows out
pub type ProcedureHandler = Arc<dyn Fn(&[SqlValue]) -> Result<Vec<serde_json::Value>> + Send + Sync>;

pub struct MemoryRepository<E: Entity> {
    rows: RwLock<Vec<E>>,
    sequence: AtomicI64,
    procedures: DashMap<String, ProcedureHandler>,
}

impl<E: Entity> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemoryRepository<E> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            sequence: AtomicI64::new(0),
            procedures: DashMap::new(),
        }
    }

    /// Register the handler invoked for `execute_procedure(name, ..)`
    pub fn register_procedure<F>(&self, name: &str, handler: F)
    where
        F: Fn(&[SqlValue]) -> Result<Vec<serde_json::Value>> + Send + Sync + 'static,
    {
        self.procedures.insert(name.to_ascii_lowercase(), Arc::new(handler));
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn matching(&self, filter: &Filter<E>) -> Vec<E> {
        let mut rows: Vec<E> = self
            .rows
            .read()
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id().partial_cmp(b.id()).unwrap_or(Ordering::Equal));
        rows
    }

    fn procedure(&self, name: &str) -> Result<ProcedureHandler> {
        if !is_valid_routine_name(name) {
            return Err(PlatformError::validation(format!("Invalid procedure name: {}", name)));
        }
        self.procedures
            .get(&name.to_ascii_lowercase())
            .map(|handler| Arc::clone(handler.value()))
            .ok_or_else(|| PlatformError::internal(format!("Procedure not registered: {}", name)))
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryRepository<E> {
    async fn get_by_id(&self, id: &E::Key) -> Result<Option<E>> {
        Ok(self.rows.read().iter().find(|row| row.id() == id).cloned())
    }

    async fn get_single(&self, filter: &Filter<E>) -> Result<Option<E>> {
        Ok(self.matching(filter).into_iter().next())
    }

    async fn get_all(&self) -> Result<Vec<E>> {
        Ok(self.matching(&Filter::not_deleted()))
    }

    async fn find(&self, filter: &Filter<E>) -> Result<Vec<E>> {
        Ok(self.matching(filter))
    }

    async fn find_page(&self, filter: &Filter<E>, page: PageRequest) -> Result<(Vec<E>, u64)> {
        let rows = self.matching(filter);
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok((items, total))
    }

    async fn find_after(&self, filter: &Filter<E>, after: Option<&E::Key>, limit: u32) -> Result<Vec<E>> {
        let rows = self
            .matching(filter)
            .into_iter()
            .filter(|row| match after {
                Some(key) => row.id().partial_cmp(key) == Some(Ordering::Greater),
                None => true,
            })
            .take(limit.max(1) as usize)
            .collect();
        Ok(rows)
    }

    async fn insert(&self, entity: &E) -> Result<E::Key> {
        let mut entity = entity.clone();
        if entity.id().is_unset() {
            let key = E::Key::mint()
                .or_else(|| E::Key::from_generated(self.sequence.fetch_add(1, AtomicOrdering::SeqCst) + 1))
                .ok_or_else(|| PlatformError::internal(format!("No key available for {}", E::TABLE)))?;
            entity.set_id(key);
        }

        let mut rows = self.rows.write();
        if rows.iter().any(|row| row.id() == entity.id()) {
            return Err(PlatformError::conflict(
                "DUPLICATE_KEY",
                format!("{} with id {} already exists", E::CACHE_PREFIX, entity.id()),
            ));
        }
        let key = entity.id().clone();
        rows.push(entity);
        Ok(key)
    }

    async fn update(&self, entity: &E) -> Result<bool> {
        let mut rows = self.rows.write();
        match rows.iter_mut().find(|row| row.id() == entity.id()) {
            Some(row) => {
                *row = entity.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_where(&self, entity: &E, expected: &Filter<E>) -> Result<bool> {
        let mut rows = self.rows.write();
        match rows.iter_mut().find(|row| row.id() == entity.id()) {
            Some(row) if expected.matches(row) => {
                *row = entity.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, entity: &E) -> Result<bool> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|row| row.id() != entity.id());
        Ok(rows.len() < before)
    }

    async fn execute_procedure(&self, name: &str, params: &[SqlValue]) -> Result<Vec<serde_json::Value>> {
        let handler = self.procedure(name)?;
        handler(params)
    }

    async fn execute_procedure_paged(
        &self,
        name: &str,
        params: &[SqlValue],
        page: PageRequest,
    ) -> Result<(Vec<serde_json::Value>, u64)> {
        let handler = self.procedure(name)?;
        let rows = handler(params)?;
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok((items, total))
    }
}
