//! Department reference module

pub mod api;
pub mod entity;
pub mod service;

pub use api::{departments_router, DepartmentsState};
pub use entity::Department;
pub use service::{
    DepartmentChanges, DepartmentService, NewDepartment, DEFAULT_DESCENDANTS_TTL, DEPARTMENT_CODE_EXISTS,
    DEPARTMENT_HAS_CHILDREN, DEPARTMENT_PARENT_NOT_FOUND,
};
