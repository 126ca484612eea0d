//! Department Entity
//!
//! Departments form a tree stored as a materialized path: a root's path is
//! `/<id>/`, a child's is its parent's path followed by `<id>/`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::data::{Audit, Column, Entity, SqlValue};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    /// TSID
    pub id: String,
    /// Unique among non-deleted departments
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub path: String,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

impl Department {
    pub const CODE: Column<Department, String> = Column::new("code");
    pub const NAME: Column<Department, String> = Column::new("name");
    pub const PARENT_ID: Column<Department, Option<String>> = Column::new("parent_id");
    pub const PATH: Column<Department, String> = Column::new("path");

    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            code: code.into(),
            name: name.into(),
            description: None,
            parent_id: None,
            path: String::new(),
            audit: Audit::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Path of a department with this id placed under `parent`
    pub fn child_path(parent: Option<&Department>, id: &str) -> String {
        match parent {
            Some(parent) => format!("{}{}/", parent.path, id),
            None => format!("/{}/", id),
        }
    }

    /// Nesting depth, 1 for a root
    pub fn depth(&self) -> usize {
        self.path.split('/').filter(|segment| !segment.is_empty()).count()
    }
}

impl Entity for Department {
    type Key = String;
    const TABLE: &'static str = "departments";
    const CACHE_PREFIX: &'static str = "Department";

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
        &["code", "name", "description", "parent_id", "path"]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.code.as_str().into(),
            self.name.as_str().into(),
            self.description.clone().into(),
            self.parent_id.clone().into(),
            self.path.as_str().into(),
        ]
    }
}
