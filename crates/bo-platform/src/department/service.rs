//! Department Service
//!
//! Business rules on top of the generic service: unique codes, an existing
//! parent, and no deletion while children remain.

use std::time::Duration;
use tracing::info;

use super::entity::Department;
use crate::data::{Filter, GenericService, PageRequest};
use crate::shared::api_common::{CursorPage, PagedResult};
use crate::shared::error::{PlatformError, Result};
use crate::shared::tsid::TsidGenerator;

pub const DEPARTMENT_CODE_EXISTS: &str = "DEPARTMENT_CODE_EXISTS";
pub const DEPARTMENT_PARENT_NOT_FOUND: &str = "DEPARTMENT_PARENT_NOT_FOUND";
pub const DEPARTMENT_HAS_CHILDREN: &str = "DEPARTMENT_HAS_CHILDREN";

/// Input for create
#[derive(Debug, Clone, Default)]
pub struct NewDepartment {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
}

/// Input for update; the position in the tree does not change
#[derive(Debug, Clone, Default)]
pub struct DepartmentChanges {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
}

/// Lifetime of a cached descendants list when none is configured
pub const DEFAULT_DESCENDANTS_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct DepartmentService {
    departments: GenericService<Department>,
    descendants_ttl: Duration,
}

impl DepartmentService {
    pub fn new(departments: GenericService<Department>) -> Self {
        Self {
            departments,
            descendants_ttl: DEFAULT_DESCENDANTS_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.descendants_ttl = ttl;
        self
    }

    pub async fn get(&self, id: &str) -> Result<Department> {
        self.departments
            .get_by_id(&id.to_string())
            .await?
            .filter(|d: &Department| !d.audit.is_deleted)
            .ok_or_else(|| PlatformError::not_found("Department", id))
    }

    pub async fn get_all(&self) -> Result<Vec<Department>> {
        self.departments.get_all().await
    }

    pub async fn page(&self, search: Option<&str>, page: PageRequest) -> Result<PagedResult<Department>> {
        self.departments.get_page(search_filter(search), page).await
    }

    pub async fn cursor_page(&self, search: Option<&str>, cursor: Option<&str>, limit: u32) -> Result<CursorPage<Department>> {
        self.departments.get_cursor_page(search_filter(search), cursor, limit).await
    }

    /// Every non-deleted department below `id`, nearest first
    pub async fn descendants(&self, id: &str) -> Result<Vec<Department>> {
        let root = self.get(id).await?;
        let filter = Department::PATH
            .starts_with(root.path.clone())
            .and(!Filter::<Department>::id_eq(&root.id))
            .and(Filter::not_deleted());

        let mut rows: Vec<Department> = self
            .departments
            .find_cached("Descendants", &root.path, &filter, self.descendants_ttl)
            .await?;
        rows.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.path.cmp(&b.path)));
        Ok(rows)
    }

    pub async fn create(&self, input: NewDepartment) -> Result<Department> {
        let code = input.code.trim().to_string();
        let name = input.name.trim().to_string();
        validate(&code, &name)?;
        self.ensure_code_free(&code, None).await?;

        let parent = match input.parent_id.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(parent_id) => Some(self.get(parent_id).await.map_err(|_| {
                PlatformError::business(
                    DEPARTMENT_PARENT_NOT_FOUND,
                    format!("Parent department '{}' not found", parent_id),
                )
            })?),
            None => None,
        };

        // the path embeds the key, so it is minted here rather than by the service
        let id = TsidGenerator::generate();
        let mut department = Department::new(code.clone(), name);
        department.description = input.description.filter(|d| !d.trim().is_empty());
        department.path = Department::child_path(parent.as_ref(), &id);
        department.parent_id = parent.map(|p| p.id);
        department.id = id;

        let created = self
            .departments
            .create(department, None)
            .await
            .map_err(|e| code_conflict(e, &code))?;
        info!(department_id = %created.id, code = %created.code, "Department created");
        Ok(created)
    }

    pub async fn update(&self, id: &str, changes: DepartmentChanges) -> Result<Department> {
        let code = changes.code.trim().to_string();
        let name = changes.name.trim().to_string();
        validate(&code, &name)?;

        let mut department = self.get(id).await?;
        self.ensure_code_free(&code, Some(id)).await?;

        department.code = code.clone();
        department.name = name;
        department.description = changes.description.filter(|d| !d.trim().is_empty());

        self.departments
            .update(department, None)
            .await
            .map_err(|e| code_conflict(e, &code))
    }

    /// Soft delete; refused while non-deleted children exist
    pub async fn delete(&self, id: &str) -> Result<()> {
        let children = Department::PARENT_ID
            .eq(id.to_string())
            .and(Filter::not_deleted());
        let child: Option<Department> = self.departments.get_single(&children).await?;
        if child.is_some() {
            return Err(PlatformError::business(
                DEPARTMENT_HAS_CHILDREN,
                "Department has child departments and cannot be deleted",
            ));
        }

        self.departments.soft_delete(&id.to_string(), None).await?;
        info!(department_id = %id, "Department deleted");
        Ok(())
    }

    async fn ensure_code_free(&self, code: &str, except_id: Option<&str>) -> Result<()> {
        let mut filter = Department::CODE.eq_ignore_case(code).and(Filter::not_deleted());
        if let Some(id) = except_id {
            filter = filter.and(!Filter::<Department>::id_eq(&id.to_string()));
        }

        let existing: Option<Department> = self.departments.get_single(&filter).await?;
        match existing {
            Some(_) => Err(code_taken(code)),
            None => Ok(()),
        }
    }
}

fn code_taken(code: &str) -> PlatformError {
    PlatformError::business(DEPARTMENT_CODE_EXISTS, format!("Department code '{}' already exists", code))
}

/// A concurrent writer can claim the code after the lookup; the unique
/// index on `LOWER(code)` reports that here
fn code_conflict(err: PlatformError, code: &str) -> PlatformError {
    match &err {
        PlatformError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => code_taken(code),
        _ => err,
    }
}

fn validate(code: &str, name: &str) -> Result<()> {
    if code.is_empty() {
        return Err(PlatformError::validation("Department code is required"));
    }
    if code.len() > 50 {
        return Err(PlatformError::validation("Department code must be at most 50 characters"));
    }
    if name.is_empty() {
        return Err(PlatformError::validation("Department name is required"));
    }
    Ok(())
}

fn search_filter(search: Option<&str>) -> Filter<Department> {
    match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(term) => Department::CODE.contains(term).or(Department::NAME.contains(term)),
        None => Filter::all(),
    }
}
