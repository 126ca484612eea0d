//! Generic Service and Permission Engine Integration Tests
//!
//! Cache-aside reads, audit stamping and permission evaluation against the
//! in-memory repository.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use bo_platform::data::SqlValue;
use bo_platform::{
    CacheStore, Department, Filter, GenericService, IdentityContext, MemoryRepository, PageRequest, Permission,
    PermissionEngine, PlatformError, Repository, RolePermission,
};

/// Repository wrapper counting full-table reads. A full-table read can be
/// held after it has taken its snapshot, until `release_read` is called, and
/// a record can be made to vanish right after it is looked up.
struct CountingRepository<E: bo_platform::Entity> {
    inner: MemoryRepository<E>,
    get_all_calls: AtomicUsize,
    writes: AtomicUsize,
    hold_next_read: AtomicBool,
    read_taken: Notify,
    read_released: Notify,
    vanish_after_lookup: AtomicBool,
}

impl<E: bo_platform::Entity> CountingRepository<E> {
    fn new() -> Self {
        Self {
            inner: MemoryRepository::new(),
            get_all_calls: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            hold_next_read: AtomicBool::new(false),
            read_taken: Notify::new(),
            read_released: Notify::new(),
            vanish_after_lookup: AtomicBool::new(false),
        }
    }

    fn hold_next_read(&self) {
        self.hold_next_read.store(true, Ordering::SeqCst);
    }

    fn vanish_after_next_lookup(&self) {
        self.vanish_after_lookup.store(true, Ordering::SeqCst);
    }

    fn release_read(&self) {
        self.read_released.notify_one();
    }

    fn get_all_calls(&self) -> usize {
        self.get_all_calls.load(Ordering::SeqCst)
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: bo_platform::Entity> Repository<E> for CountingRepository<E> {
    async fn get_by_id(&self, id: &E::Key) -> bo_platform::Result<Option<E>> {
        let row = self.inner.get_by_id(id).await?;
        if let Some(found) = &row {
            if self.vanish_after_lookup.swap(false, Ordering::SeqCst) {
                self.inner.delete(found).await?;
            }
        }
        Ok(row)
    }

    async fn get_single(&self, filter: &Filter<E>) -> bo_platform::Result<Option<E>> {
        self.inner.get_single(filter).await
    }

    async fn get_all(&self) -> bo_platform::Result<Vec<E>> {
        self.get_all_calls.fetch_add(1, Ordering::SeqCst);
        let rows = self.inner.get_all().await?;
        if self.hold_next_read.swap(false, Ordering::SeqCst) {
            self.read_taken.notify_one();
            self.read_released.notified().await;
        }
        Ok(rows)
    }

    async fn find(&self, filter: &Filter<E>) -> bo_platform::Result<Vec<E>> {
        self.inner.find(filter).await
    }

    async fn find_page(&self, filter: &Filter<E>, page: PageRequest) -> bo_platform::Result<(Vec<E>, u64)> {
        self.inner.find_page(filter, page).await
    }

    async fn find_after(&self, filter: &Filter<E>, after: Option<&E::Key>, limit: u32) -> bo_platform::Result<Vec<E>> {
        self.inner.find_after(filter, after, limit).await
    }

    async fn insert(&self, entity: &E) -> bo_platform::Result<E::Key> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(entity).await
    }

    async fn update(&self, entity: &E) -> bo_platform::Result<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update(entity).await
    }

    async fn update_where(&self, entity: &E, expected: &Filter<E>) -> bo_platform::Result<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_where(entity, expected).await
    }

    async fn delete(&self, entity: &E) -> bo_platform::Result<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(entity).await
    }

    async fn execute_procedure(&self, name: &str, params: &[SqlValue]) -> bo_platform::Result<Vec<serde_json::Value>> {
        self.inner.execute_procedure(name, params).await
    }

    async fn execute_procedure_paged(
        &self,
        name: &str,
        params: &[SqlValue],
        page: PageRequest,
    ) -> bo_platform::Result<(Vec<serde_json::Value>, u64)> {
        self.inner.execute_procedure_paged(name, params, page).await
    }
}

fn department(code: &str, name: &str) -> Department {
    Department::new(code, name)
}

mod cache_tests {
    use super::*;

    fn setup() -> (Arc<CountingRepository<Department>>, GenericService<Department>) {
        let repository = Arc::new(CountingRepository::<Department>::new());
        let service = GenericService::new(repository.clone(), Arc::new(CacheStore::new()));
        (repository, service)
    }

    #[tokio::test]
    async fn test_read_taken_before_a_write_is_not_cached() {
        let (repository, service) = setup();
        repository.hold_next_read();

        let reader = {
            let service = service.clone();
            tokio::spawn(async move { service.get_all::<Department>().await.unwrap().len() })
        };
        repository.read_taken.notified().await;
        service.create(department("D1", "Sales"), None).await.unwrap();
        repository.release_read();

        // the held read answers with its own snapshot, but must not be cached
        assert_eq!(reader.await.unwrap(), 0);
        let after: Vec<Department> = service.get_all().await.unwrap();
        assert_eq!(after.len(), 1);
    }

    #[tokio::test]
    async fn test_second_get_all_is_served_from_cache() {
        let (repository, service) = setup();
        service.create(department("D1", "Sales"), None).await.unwrap();

        let first: Vec<Department> = service.get_all().await.unwrap();
        let second: Vec<Department> = service.get_all().await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(repository.get_all_calls(), 1);
    }

    #[tokio::test]
    async fn test_every_write_forces_a_refetch() {
        let (repository, service) = setup();

        let _: Vec<Department> = service.get_all().await.unwrap();
        let mut created = service.create(department("D1", "Sales"), None).await.unwrap();
        let after_create: Vec<Department> = service.get_all().await.unwrap();
        assert_eq!(after_create.len(), 1);
        assert_eq!(repository.get_all_calls(), 2);

        created.name = "Sales & Marketing".to_string();
        service.update(created.clone(), None).await.unwrap();
        let after_update: Vec<Department> = service.get_all().await.unwrap();
        assert_eq!(after_update[0].name, "Sales & Marketing");
        assert_eq!(repository.get_all_calls(), 3);

        service.soft_delete(&created.id, None).await.unwrap();
        let after_delete: Vec<Department> = service.get_all().await.unwrap();
        assert!(after_delete.is_empty());
        assert_eq!(repository.get_all_calls(), 4);
    }

    #[tokio::test]
    async fn test_writes_on_other_entities_keep_the_cache() {
        let cache = Arc::new(CacheStore::new());
        let departments_repo = Arc::new(CountingRepository::<Department>::new());
        let departments = GenericService::new(departments_repo.clone(), Arc::clone(&cache));
        let role_permissions: GenericService<RolePermission> =
            GenericService::new(Arc::new(MemoryRepository::new()), Arc::clone(&cache));

        let _: Vec<Department> = departments.get_all().await.unwrap();
        role_permissions
            .create(RolePermission::new(1, "Viewer", "Department", Permission::VIEW), None)
            .await
            .unwrap();
        let _: Vec<Department> = departments.get_all().await.unwrap();

        assert_eq!(departments_repo.get_all_calls(), 1);
    }
}

mod audit_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_stamps_creation_fields() {
        let service: GenericService<Department> =
            GenericService::new(Arc::new(MemoryRepository::new()), Arc::new(CacheStore::new()));

        let created = service.create(department("D1", "Sales"), Some("importer")).await.unwrap();

        assert!(!created.id.is_empty());
        assert_eq!(created.audit.created_by, "importer");
        assert!(created.audit.updated_at.is_none());
        assert!(created.audit.updated_by.is_none());
        assert!(!created.audit.is_deleted);
    }

    #[tokio::test]
    async fn test_identity_wins_over_explicit_actor() {
        let service: GenericService<Department> =
            GenericService::new(Arc::new(MemoryRepository::new()), Arc::new(CacheStore::new()));
        let identity = Arc::new(IdentityContext::new("U1", "jdoe"));

        let created = IdentityContext::scope(Some(identity), service.create(department("D1", "Sales"), Some("importer")))
            .await
            .unwrap();
        assert_eq!(created.audit.created_by, "jdoe");

        let anonymous = service.create(department("D2", "Support"), None).await.unwrap();
        assert_eq!(anonymous.audit.created_by, "System");
    }

    #[tokio::test]
    async fn test_update_keeps_creation_fields() {
        let service: GenericService<Department> =
            GenericService::new(Arc::new(MemoryRepository::new()), Arc::new(CacheStore::new()));
        let created = service.create(department("D1", "Sales"), Some("alice")).await.unwrap();

        let mut changed = created.clone();
        changed.name = "Sales EMEA".to_string();
        changed.audit.created_by = "mallory".to_string();
        changed.audit.is_deleted = true;
        let updated = service.update(changed, Some("bob")).await.unwrap();

        assert_eq!(updated.audit.created_at, created.audit.created_at);
        assert_eq!(updated.audit.created_by, "alice");
        assert!(!updated.audit.is_deleted);
        assert_eq!(updated.audit.updated_by.as_deref(), Some("bob"));
        assert!(updated.audit.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_update_of_missing_record_writes_nothing() {
        let repository = Arc::new(CountingRepository::<Department>::new());
        let service = GenericService::new(repository.clone(), Arc::new(CacheStore::new()));

        let mut ghost = department("D1", "Ghost");
        ghost.id = "MISSING".to_string();
        let err = service.update(ghost, None).await.unwrap_err();

        assert!(matches!(err, PlatformError::NotFound { .. }));
        assert_eq!(repository.writes(), 0);
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_record_retrievable() {
        let service: GenericService<Department> =
            GenericService::new(Arc::new(MemoryRepository::new()), Arc::new(CacheStore::new()));
        let created = service.create(department("D1", "Sales"), None).await.unwrap();

        service.soft_delete(&created.id, Some("alice")).await.unwrap();
        let stored: Department = service.get_by_id(&created.id).await.unwrap().unwrap();
        assert!(stored.audit.is_deleted);
        assert_eq!(stored.audit.updated_by.as_deref(), Some("alice"));

        // missing ids are a no-op
        service.soft_delete(&"MISSING".to_string(), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_hard_delete_removes_record() {
        let service: GenericService<Department> =
            GenericService::new(Arc::new(MemoryRepository::new()), Arc::new(CacheStore::new()));
        let created = service.create(department("D1", "Sales"), None).await.unwrap();

        service.hard_delete(&created.id).await.unwrap();
        let stored: Option<Department> = service.get_by_id(&created.id).await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_delete_of_a_record_removed_mid_call_succeeds() {
        let repository = Arc::new(CountingRepository::<Department>::new());
        let service = GenericService::new(repository.clone(), Arc::new(CacheStore::new()));
        let first = service.create(department("D1", "Sales"), None).await.unwrap();
        let second = service.create(department("D2", "Support"), None).await.unwrap();
        assert_eq!(service.get_all::<Department>().await.unwrap().len(), 2);

        repository.vanish_after_next_lookup();
        service.soft_delete(&first.id, None).await.unwrap();
        let stored: Option<Department> = service.get_by_id(&first.id).await.unwrap();
        assert!(stored.is_none());

        repository.vanish_after_next_lookup();
        service.hard_delete(&second.id).await.unwrap();

        // the cached list is dropped even though neither write touched a row
        assert!(service.get_all::<Department>().await.unwrap().is_empty());
    }
}

mod permission_tests {
    use super::*;

    async fn engine_with(entries: Vec<RolePermission>) -> PermissionEngine {
        let service: GenericService<RolePermission> =
            GenericService::new(Arc::new(MemoryRepository::new()), Arc::new(CacheStore::new()));
        for entry in entries {
            service.create(entry, None).await.unwrap();
        }
        PermissionEngine::new(service, "SuperAdmin")
    }

    #[tokio::test]
    async fn test_super_admin_bypasses_the_matrix() {
        let engine = engine_with(vec![RolePermission::new(1, "SuperAdmin", "Department", Permission::VIEW)]).await;
        let admin = IdentityContext::new("U1", "root").with_role_codes(["superadmin"]);

        assert!(engine.is_granted(&admin, "Department.Delete").await.unwrap());
        assert!(engine.is_granted(&admin, "Anything.Approve").await.unwrap());
    }

    #[tokio::test]
    async fn test_subset_rule() {
        let engine = engine_with(vec![RolePermission::new(
            5,
            "Editor",
            "Department",
            Permission::VIEW | Permission::EDIT,
        )])
        .await;
        let editor = IdentityContext::new("U2", "jdoe").with_roles([5]);

        assert!(engine.is_granted(&editor, "Department.View").await.unwrap());
        assert!(engine.is_granted(&editor, "Department.Edit").await.unwrap());
        assert!(!engine.is_granted(&editor, "Department.Delete").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_entry_denies() {
        let engine = engine_with(vec![RolePermission::new(5, "Editor", "Department", Permission::ALL)]).await;
        let editor = IdentityContext::new("U2", "jdoe").with_roles([5]);

        assert!(!engine.is_granted(&editor, "Menu.View").await.unwrap());
    }

    #[tokio::test]
    async fn test_role_codes_are_consulted_after_ids() {
        let engine = engine_with(vec![RolePermission::new(9, "Auditor", "Report", Permission::VIEW)]).await;
        let auditor = IdentityContext::new("U3", "audit").with_roles([4]).with_role_codes(["Auditor"]);

        assert!(engine.is_granted(&auditor, "Report.View").await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_policy_needs_all() {
        let engine = engine_with(vec![
            RolePermission::new(5, "Editor", "Department", Permission::VIEW | Permission::EDIT),
            RolePermission::new(6, "Owner", "Menu", Permission::ALL),
        ])
        .await;
        let editor = IdentityContext::new("U2", "jdoe").with_roles([5]);
        let owner = IdentityContext::new("U4", "own").with_roles([6]);

        assert!(!engine.is_granted(&editor, "Department").await.unwrap());
        assert!(!engine.is_granted(&editor, "Department.Bogus").await.unwrap());
        assert!(engine.is_granted(&owner, "Menu.Bogus").await.unwrap());
    }

    #[tokio::test]
    async fn test_authorize_distinguishes_anonymous_and_denied() {
        let engine = engine_with(vec![]).await;
        let user = IdentityContext::new("U5", "nobody");

        let anonymous = engine.authorize(None, "Department.View").await.unwrap_err();
        assert_eq!(anonymous.status().as_u16(), 401);

        let denied = engine.authorize(Some(&user), "Department.View").await.unwrap_err();
        assert_eq!(denied.status().as_u16(), 403);
    }

    #[tokio::test]
    async fn test_matrix_write_is_visible_on_next_check() {
        let service: GenericService<RolePermission> =
            GenericService::new(Arc::new(MemoryRepository::new()), Arc::new(CacheStore::new()));
        let engine = PermissionEngine::new(service.clone(), "SuperAdmin");
        let viewer = IdentityContext::new("U6", "view").with_roles([3]);

        assert!(!engine.is_granted(&viewer, "Department.View").await.unwrap());
        service
            .create(RolePermission::new(3, "Viewer", "Department", Permission::VIEW), None)
            .await
            .unwrap();
        assert!(engine.is_granted(&viewer, "Department.View").await.unwrap());
    }
}
