//! Generic Service
//!
//! Cache-aside reads and write-through invalidation over a [`Repository`],
//! with audit stamping from the current [`IdentityContext`].
//!
//! Every write that succeeds drops all cache entries under the entity's
//! prefix (`<CACHE_PREFIX>_`). Reads other than `get_all` and `find_cached`
//! go straight to the repository.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::entity::{Entity, EntityKey};
use super::filter::Filter;
use super::repository::{PageRequest, Repository};
use super::value::SqlValue;
use crate::cache::{cache_key, cache_key_with_params, prefix_of, CacheEntryOptions, CacheStore};
use crate::identity::IdentityContext;
use crate::shared::api_common::{CursorPage, PagedResult};
use crate::shared::error::{PlatformError, Result};

/// Audit actor used when there is neither an identity nor an explicit actor
pub const SYSTEM_ACTOR: &str = "System";

pub struct GenericService<E: Entity> {
    repository: Arc<dyn Repository<E>>,
    cache: Arc<CacheStore>,
}

impl<E: Entity> Clone for GenericService<E> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<E: Entity> GenericService<E> {
    pub fn new(repository: Arc<dyn Repository<E>>, cache: Arc<CacheStore>) -> Self {
        Self { repository, cache }
    }

    pub fn repository(&self) -> &Arc<dyn Repository<E>> {
        &self.repository
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Every non-deleted record, served from cache after the first call
    pub async fn get_all<D: From<E>>(&self) -> Result<Vec<D>> {
        let key = cache_key(E::CACHE_PREFIX, "GetAll");
        let repository = Arc::clone(&self.repository);
        let rows: Arc<Vec<E>> = self
            .cache
            .get_or_create(&key, CacheEntryOptions::default(), || async move {
                repository.get_all().await.map(Arc::new)
            })
            .await?;

        Ok(rows.iter().cloned().map(D::from).collect())
    }

    pub async fn get_by_id<D: From<E>>(&self, id: &E::Key) -> Result<Option<D>> {
        Ok(self.repository.get_by_id(id).await?.map(D::from))
    }

    pub async fn get_single<D: From<E>>(&self, filter: &Filter<E>) -> Result<Option<D>> {
        Ok(self.repository.get_single(filter).await?.map(D::from))
    }

    pub async fn find<D: From<E>>(&self, filter: &Filter<E>) -> Result<Vec<D>> {
        Ok(self.repository.find(filter).await?.into_iter().map(D::from).collect())
    }

    /// `find` cached under `<Prefix>_<operation>_<hash of params>` for at most
    /// `ttl`. `params` must identify `filter`; writes drop the entry early.
    pub async fn find_cached<D, P>(&self, operation: &str, params: &P, filter: &Filter<E>, ttl: Duration) -> Result<Vec<D>>
    where
        D: From<E>,
        P: Serialize + ?Sized,
    {
        let key = cache_key_with_params(E::CACHE_PREFIX, operation, params)?;
        let rows: Arc<Vec<E>> = self
            .cache
            .get_or_create(&key, CacheEntryOptions::with_ttl(ttl), || async {
                self.repository.find(filter).await.map(Arc::new)
            })
            .await?;

        Ok(rows.iter().cloned().map(D::from).collect())
    }

    /// Offset page over non-deleted records matching `filter`
    pub async fn get_page<D: From<E>>(&self, filter: Filter<E>, page: PageRequest) -> Result<PagedResult<D>> {
        let filter = filter.and(Filter::not_deleted());
        let (rows, total) = self.repository.find_page(&filter, page).await?;
        let items = rows.into_iter().map(D::from).collect();
        Ok(PagedResult::new(items, page.page_index, page.page_size, total))
    }

    /// Keyset page over non-deleted records. The cursor is the last key seen.
    pub async fn get_cursor_page<D: From<E>>(
        &self,
        filter: Filter<E>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<CursorPage<D>> {
        let after = match cursor.map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => Some(
                E::Key::parse(raw).ok_or_else(|| PlatformError::validation(format!("Invalid cursor: {}", raw)))?,
            ),
            None => None,
        };

        let limit = limit.max(1);
        let filter = filter.and(Filter::not_deleted());
        let mut rows = self.repository.find_after(&filter, after.as_ref(), limit + 1).await?;

        let has_more = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        let next_cursor = if has_more {
            rows.last().map(|row| row.id().to_string())
        } else {
            None
        };

        Ok(CursorPage {
            items: rows.into_iter().map(D::from).collect(),
            next_cursor,
            has_more,
        })
    }

    /// Insert `entity`, stamping the creation audit fields.
    ///
    /// `created_by` is the current identity's username, else `actor`, else
    /// [`SYSTEM_ACTOR`].
    pub async fn create(&self, mut entity: E, actor: Option<&str>) -> Result<E> {
        let audit = entity.audit_mut();
        audit.created_at = Utc::now();
        audit.created_by = resolve_actor(actor);
        audit.updated_at = None;
        audit.updated_by = None;
        audit.is_deleted = false;

        if entity.id().is_unset() {
            if let Some(key) = E::Key::mint() {
                entity.set_id(key);
            }
        }

        let key = self.repository.insert(&entity).await?;
        entity.set_id(key);
        self.invalidate_cache();

        debug!(entity = E::CACHE_PREFIX, id = %entity.id(), "Entity created");
        Ok(entity)
    }

    /// Overwrite an existing record.
    ///
    /// Fails with `NotFound` before writing anything when the key is unknown.
    /// Creation audit fields and the deleted flag are taken from the stored
    /// record, whatever the caller sent.
    pub async fn update(&self, mut entity: E, actor: Option<&str>) -> Result<E> {
        self.stamp_update(&mut entity, actor).await?;

        if !self.repository.update(&entity).await? {
            return Err(PlatformError::not_found(E::CACHE_PREFIX, entity.id()));
        }
        self.invalidate_cache();

        debug!(entity = E::CACHE_PREFIX, id = %entity.id(), "Entity updated");
        Ok(entity)
    }

    /// [`update`](Self::update) applied only while the stored record still
    /// matches `expected`, checked and written as one step by the repository.
    ///
    /// `Ok(false)` when the stored record no longer matches; nothing is
    /// written then.
    pub async fn update_if(&self, mut entity: E, expected: &Filter<E>, actor: Option<&str>) -> Result<bool> {
        self.stamp_update(&mut entity, actor).await?;

        if !self.repository.update_where(&entity, expected).await? {
            debug!(entity = E::CACHE_PREFIX, id = %entity.id(), "Conditional update not applied");
            return Ok(false);
        }
        self.invalidate_cache();

        debug!(entity = E::CACHE_PREFIX, id = %entity.id(), "Entity updated");
        Ok(true)
    }

    async fn stamp_update(&self, entity: &mut E, actor: Option<&str>) -> Result<()> {
        let existing = self
            .repository
            .get_by_id(entity.id())
            .await?
            .ok_or_else(|| PlatformError::not_found(E::CACHE_PREFIX, entity.id()))?;

        let stored = existing.audit();
        let audit = entity.audit_mut();
        audit.created_at = stored.created_at;
        audit.created_by = stored.created_by.clone();
        audit.is_deleted = stored.is_deleted;
        audit.updated_at = Some(Utc::now());
        audit.updated_by = Some(resolve_actor(actor));
        Ok(())
    }

    /// Flag the record as deleted. A missing record counts as already deleted.
    pub async fn soft_delete(&self, id: &E::Key, actor: Option<&str>) -> Result<()> {
        let Some(mut entity) = self.repository.get_by_id(id).await? else {
            return Ok(());
        };

        let audit = entity.audit_mut();
        audit.is_deleted = true;
        audit.updated_at = Some(Utc::now());
        audit.updated_by = Some(resolve_actor(actor));

        if !self.repository.update(&entity).await? {
            // removed between the read and the write; still gone, still success
            debug!(entity = E::CACHE_PREFIX, id = %id, "Soft delete found no row to flag");
        }
        self.invalidate_cache();

        debug!(entity = E::CACHE_PREFIX, id = %id, "Entity soft-deleted");
        Ok(())
    }

    /// Physically remove the record. A missing record is not an error.
    pub async fn hard_delete(&self, id: &E::Key) -> Result<()> {
        let Some(entity) = self.repository.get_by_id(id).await? else {
            return Ok(());
        };

        if !self.repository.delete(&entity).await? {
            debug!(entity = E::CACHE_PREFIX, id = %id, "Hard delete found no row to remove");
        }
        self.invalidate_cache();

        debug!(entity = E::CACHE_PREFIX, id = %id, "Entity deleted");
        Ok(())
    }

    /// Run a stored procedure and decode each row into `T`
    pub async fn procedure<T: DeserializeOwned>(&self, name: &str, params: &[SqlValue]) -> Result<Vec<T>> {
        let rows = self.repository.execute_procedure(name, params).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(PlatformError::from))
            .collect()
    }

    pub async fn procedure_page<T: DeserializeOwned>(
        &self,
        name: &str,
        params: &[SqlValue],
        page: PageRequest,
    ) -> Result<PagedResult<T>> {
        let (rows, total) = self.repository.execute_procedure_paged(name, params, page).await?;
        let items = rows
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(PlatformError::from))
            .collect::<Result<Vec<T>>>()?;
        Ok(PagedResult::new(items, page.page_index, page.page_size, total))
    }

    /// Drop every cached read for this entity
    pub fn invalidate_cache(&self) -> usize {
        self.cache.invalidate_prefix(&prefix_of(E::CACHE_PREFIX))
    }
}

fn resolve_actor(actor: Option<&str>) -> String {
    IdentityContext::current()
        .map(|identity| identity.username.clone())
        .filter(|name| !name.is_empty())
        .or_else(|| actor.filter(|a| !a.is_empty()).map(str::to_string))
        .unwrap_or_else(|| SYSTEM_ACTOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::entity::Audit;
    use crate::data::filter::Column;
    use crate::data::memory_repository::MemoryRepository;

    #[derive(Debug, Clone, sqlx::FromRow)]
    struct Note {
        id: String,
        body: String,
        #[sqlx(flatten)]
        audit: Audit,
    }

    impl Note {
        const BODY: Column<Note, String> = Column::new("body");

        fn new(body: &str) -> Self {
            Self {
                id: String::new(),
                body: body.to_string(),
                audit: Audit::default(),
            }
        }
    }

    impl Entity for Note {
        type Key = String;
        const TABLE: &'static str = "notes";
        const CACHE_PREFIX: &'static str = "Note";

        fn id(&self) -> &String {
            &self.id
        }
        fn set_id(&mut self, id: String) {
            self.id = id;
        }
        fn audit(&self) -> &Audit {
            &self.audit
        }
        fn audit_mut(&mut self) -> &mut Audit {
            &mut self.audit
        }
        fn columns() -> &'static [&'static str] {
            &["body"]
        }
        fn values(&self) -> Vec<SqlValue> {
            vec![self.body.as_str().into()]
        }
    }

    fn service() -> GenericService<Note> {
        GenericService::new(Arc::new(MemoryRepository::<Note>::new()), Arc::new(CacheStore::new()))
    }

    #[tokio::test]
    async fn test_actor_precedence() {
        let service = service();

        let by_system = service.create(Note::new("a"), None).await.unwrap();
        assert_eq!(by_system.audit.created_by, SYSTEM_ACTOR);

        let by_actor = service.create(Note::new("b"), Some("importer")).await.unwrap();
        assert_eq!(by_actor.audit.created_by, "importer");

        let identity = Arc::new(IdentityContext::new("u1", "alice"));
        let by_identity = IdentityContext::scope(Some(identity), service.create(Note::new("c"), Some("importer")))
            .await
            .unwrap();
        assert_eq!(by_identity.audit.created_by, "alice");
    }

    #[tokio::test]
    async fn test_string_keys_are_minted_on_create() {
        let service = service();
        let note = service.create(Note::new("hello"), None).await.unwrap();

        assert!(!note.id.is_empty());
        let found: Option<Note> = service.get_by_id(&note.id).await.unwrap();
        assert_eq!(found.map(|n| n.body), Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_cursor_pages_walk_the_whole_set() {
        let service = service();
        for i in 0..5 {
            service.create(Note::new(&format!("n{}", i)), None).await.unwrap();
        }

        let first: CursorPage<Note> = service.get_cursor_page(Filter::all(), None, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.has_more);

        let second: CursorPage<Note> = service
            .get_cursor_page(Filter::all(), first.next_cursor.as_deref(), 2)
            .await
            .unwrap();
        let third: CursorPage<Note> = service
            .get_cursor_page(Filter::all(), second.next_cursor.as_deref(), 2)
            .await
            .unwrap();

        assert_eq!(third.items.len(), 1);
        assert!(!third.has_more);
        assert!(third.next_cursor.is_none());
        assert_ne!(first.items[0].id, second.items[0].id);
    }

    #[tokio::test]
    async fn test_update_if_applies_only_while_expected_holds() {
        let service = service();
        let note = service.create(Note::new("draft"), None).await.unwrap();

        let mut first = note.clone();
        first.body = "first".to_string();
        let mut second = note.clone();
        second.body = "second".to_string();

        let expected = Note::BODY.eq("draft");
        assert!(service.update_if(first, &expected, None).await.unwrap());
        assert!(!service.update_if(second, &expected, None).await.unwrap());

        let stored: Option<Note> = service.get_by_id(&note.id).await.unwrap();
        let stored = stored.unwrap();
        assert_eq!(stored.body, "first");
        assert_eq!(stored.audit.created_by, SYSTEM_ACTOR);
        assert!(stored.audit.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_page_skips_soft_deleted() {
        let service = service();
        let keep = service.create(Note::new("keep"), None).await.unwrap();
        let gone = service.create(Note::new("gone"), None).await.unwrap();
        service.soft_delete(&gone.id, None).await.unwrap();

        let page: PagedResult<Note> = service.get_page(Filter::all(), PageRequest::new(0, 10)).await.unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].id, keep.id);

        // still reachable by key
        let raw: Option<Note> = service.get_by_id(&gone.id).await.unwrap();
        assert!(raw.unwrap().audit.is_deleted);

        let matched: Vec<Note> = service.find(&Note::BODY.eq("gone")).await.unwrap();
        assert_eq!(matched.len(), 1);
    }
}
