//! Generic data access
//!
//! Entity model, typed filters, the repository contract with its PostgreSQL
//! and in-memory implementations, and the cache-aware generic service.

pub mod entity;
pub mod filter;
pub mod memory_repository;
pub mod pg_repository;
pub mod repository;
pub mod service;
pub mod value;

pub use entity::{Audit, Entity, EntityKey, AUDIT_COLUMNS, ID_COLUMN, IS_DELETED_COLUMN};
pub use filter::{Column, Filter};
pub use memory_repository::{MemoryRepository, ProcedureHandler};
pub use pg_repository::PgRepository;
pub use repository::{PageRequest, Repository};
pub use service::{GenericService, SYSTEM_ACTOR};
pub use value::SqlValue;
