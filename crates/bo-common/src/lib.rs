//! Backoffice Common
//!
//! Pieces shared by the platform server and its clients:
//! - `logging`: tracing-subscriber bootstrap
//! - `envelope`: the JSON response and pagination envelopes

pub mod envelope;
pub mod logging;

pub use envelope::{ApiResponse, CursorPage, PagedResult};
