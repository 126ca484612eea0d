//! Request-scoped caller identity

pub mod context;

pub use context::{split_role_codes, IdentityContext, Language};
