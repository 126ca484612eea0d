//! Permission Engine
//!
//! Evaluates `<Module>.<Permission>` policies against the caller's roles.
//! Each role's entries are loaded once, pinned in the cache under
//! `RolePermission_Id_<id>` or `RolePermission_Code_<code>`, and kept until
//! a role-permission write invalidates the `RolePermission_` prefix.
//!
//! Evaluation order:
//! 1. a role code equal to the super-admin code grants everything
//! 2. entries of each numeric role id
//! 3. entries of each role code
//!
//! Nothing matching means denied.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::entity::RolePermission;
use super::flags::Permission;
use super::policy::{PolicyProvider, PolicyRequirement};
use crate::cache::{cache_key, prefix_of, CacheEntryOptions, CacheStore};
use crate::data::{Entity, Filter, GenericService};
use crate::identity::IdentityContext;
use crate::shared::error::{PlatformError, Result};

type RoleEntries = Arc<Vec<RolePermission>>;

pub struct PermissionEngine {
    entries: GenericService<RolePermission>,
    cache: Arc<CacheStore>,
    policies: PolicyProvider,
    super_admin_code: String,
}

impl PermissionEngine {
    pub fn new(entries: GenericService<RolePermission>, super_admin_code: impl Into<String>) -> Self {
        let cache = Arc::clone(entries.cache());
        Self {
            entries,
            cache,
            policies: PolicyProvider::new(),
            super_admin_code: super_admin_code.into(),
        }
    }

    pub fn super_admin_code(&self) -> &str {
        &self.super_admin_code
    }

    pub fn is_super_admin(&self, identity: &IdentityContext) -> bool {
        identity.has_role_code(&self.super_admin_code)
    }

    /// Whether `identity` satisfies the named policy
    pub async fn is_granted(&self, identity: &IdentityContext, policy: &str) -> Result<bool> {
        let requirement = self.policies.get(policy);
        self.satisfies(identity, &requirement).await
    }

    pub async fn satisfies(&self, identity: &IdentityContext, requirement: &PolicyRequirement) -> Result<bool> {
        if self.is_super_admin(identity) {
            return Ok(true);
        }

        for role_id in &identity.roles {
            if grants(&self.entries_for_role_id(*role_id).await?, requirement) {
                return Ok(true);
            }
        }

        for role_code in &identity.role_codes {
            if grants(&self.entries_for_role_code(role_code).await?, requirement) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// `Unauthorized` without an identity, `Forbidden` when the policy is
    /// not satisfied
    pub async fn authorize(&self, identity: Option<&IdentityContext>, policy: &str) -> Result<()> {
        let Some(identity) = identity else {
            return Err(PlatformError::unauthorized("Authentication required"));
        };

        if self.is_granted(identity, policy).await? {
            Ok(())
        } else {
            debug!(user_id = %identity.user_id, policy, "Permission denied");
            Err(PlatformError::forbidden(format!("Missing permission: {}", policy)))
        }
    }

    /// [`authorize`](Self::authorize) against the identity of the current request
    pub async fn authorize_current(&self, policy: &str) -> Result<()> {
        let identity = IdentityContext::current();
        self.authorize(identity.as_deref(), policy).await
    }

    /// Union of the caller's masks per module
    pub async fn effective_permissions(&self, identity: &IdentityContext) -> Result<BTreeMap<String, Permission>> {
        let mut modules: BTreeMap<String, Permission> = BTreeMap::new();

        let mut sources: Vec<RoleEntries> = Vec::new();
        for role_id in &identity.roles {
            sources.push(self.entries_for_role_id(*role_id).await?);
        }
        for role_code in &identity.role_codes {
            sources.push(self.entries_for_role_code(role_code).await?);
        }

        for entry in sources.iter().flat_map(|entries| entries.iter()) {
            *modules.entry(entry.module.clone()).or_insert_with(Permission::empty) |= entry.mask();
        }
        Ok(modules)
    }

    /// Drop every cached permission matrix
    pub fn invalidate(&self) -> usize {
        self.cache.invalidate_prefix(&prefix_of(RolePermission::CACHE_PREFIX))
    }

    async fn entries_for_role_id(&self, role_id: i64) -> Result<RoleEntries> {
        let key = cache_key(RolePermission::CACHE_PREFIX, &format!("Id_{}", role_id));
        self.load(&key, RolePermission::ROLE_ID.eq(role_id)).await
    }

    async fn entries_for_role_code(&self, role_code: &str) -> Result<RoleEntries> {
        let key = cache_key(RolePermission::CACHE_PREFIX, &format!("Code_{}", role_code));
        self.load(&key, RolePermission::ROLE_CODE.eq(role_code)).await
    }

    async fn load(&self, key: &str, filter: Filter<RolePermission>) -> Result<RoleEntries> {
        let filter = filter.and(Filter::not_deleted());
        self.cache
            .get_or_create(key, CacheEntryOptions::never_remove(), || async {
                let rows: Vec<RolePermission> = self.entries.find(&filter).await?;
                debug!(key, entries = rows.len(), "Role permissions loaded");
                Ok::<_, PlatformError>(Arc::new(rows))
            })
            .await
    }
}

/// An entry for the module grants when it holds every required bit, or when
/// it holds the full `ALL` mask. An empty requirement is only met by `ALL`.
fn grants(entries: &[RolePermission], requirement: &PolicyRequirement) -> bool {
    entries
        .iter()
        .filter(|entry| entry.module.eq_ignore_ascii_case(&requirement.module))
        .any(|entry| {
            let mask = entry.mask();
            (!requirement.permission.is_empty() && mask.contains(requirement.permission)) || mask == Permission::ALL
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryRepository, Repository};

    fn entry(role_id: i64, code: &str, module: &str, permission: Permission) -> RolePermission {
        RolePermission::new(role_id, code, module, permission)
    }

    #[test]
    fn test_grant_rule() {
        let entries = vec![entry(1, "Editor", "Department", Permission::VIEW | Permission::EDIT)];

        assert!(grants(&entries, &PolicyRequirement::parse("Department.View")));
        assert!(grants(&entries, &PolicyRequirement::parse("department.edit")));
        assert!(!grants(&entries, &PolicyRequirement::parse("Department.Delete")));
        assert!(!grants(&entries, &PolicyRequirement::parse("Department.View,Delete")));
        assert!(!grants(&entries, &PolicyRequirement::parse("Menu.View")));
        assert!(!grants(&entries, &PolicyRequirement::parse("Department.Bogus")));
    }

    #[test]
    fn test_all_mask_satisfies_empty_requirement() {
        let entries = vec![entry(1, "Owner", "Department", Permission::ALL)];
        assert!(grants(&entries, &PolicyRequirement::parse("Department.Bogus")));
        assert!(grants(&entries, &PolicyRequirement::parse("Department.Approve")));
    }

    #[tokio::test]
    async fn test_cached_matrix_survives_until_invalidated() {
        let repository = Arc::new(MemoryRepository::<RolePermission>::new());
        let cache = Arc::new(CacheStore::new());
        let service = GenericService::new(repository.clone(), Arc::clone(&cache));
        let engine = PermissionEngine::new(service.clone(), "SuperAdmin");
        let identity = IdentityContext::new("U1", "jdoe").with_roles([7]);

        assert!(!engine.is_granted(&identity, "Menu.View").await.unwrap());
        assert!(cache.contains("RolePermission_Id_7"));

        // written behind the service's back: the pinned matrix is stale
        repository
            .insert(&entry(7, "Viewer", "Menu", Permission::VIEW))
            .await
            .unwrap();
        assert!(!engine.is_granted(&identity, "Menu.View").await.unwrap());

        assert_eq!(engine.invalidate(), 1);
        assert!(engine.is_granted(&identity, "Menu.View").await.unwrap());
    }

    #[tokio::test]
    async fn test_effective_permissions_merge_roles() {
        let cache = Arc::new(CacheStore::new());
        let service = GenericService::new(Arc::new(MemoryRepository::<RolePermission>::new()), cache);
        service.create(entry(1, "Viewer", "Menu", Permission::VIEW), None).await.unwrap();
        service.create(entry(2, "Editor", "Menu", Permission::EDIT), None).await.unwrap();
        service.create(entry(2, "Editor", "Department", Permission::CREATE), None).await.unwrap();

        let engine = PermissionEngine::new(service, "SuperAdmin");
        let identity = IdentityContext::new("U1", "jdoe").with_roles([1, 2]);
        let effective = engine.effective_permissions(&identity).await.unwrap();

        assert_eq!(effective["Menu"], Permission::VIEW | Permission::EDIT);
        assert_eq!(effective["Department"], Permission::CREATE);
    }
}
