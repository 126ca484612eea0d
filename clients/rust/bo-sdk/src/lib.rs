//! # Backoffice SDK for Rust
//!
//! Client for the Backoffice Platform REST API.
//!
//! - **Token wait**: bounded wait for an identity token before a request is issued
//! - **Typed errors**: non-2xx responses become [`SdkError::Http`] with status,
//!   message and error code from the response envelope
//! - **Notifications**: the `message` of successful mutations is forwarded to a
//!   [`Notifier`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bo_sdk::{ApiClient, ClientConfig, SharedToken};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let token = SharedToken::new();
//!     let client = ApiClient::new(ClientConfig::new("http://localhost:8080"), token.clone())?;
//!
//!     token.set("eyJ...").await;
//!     let departments: Value = client.get("/api/departments/all").await?;
//!     println!("{}", departments);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod notify;
pub mod token;

pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::{Result, SdkError};
pub use notify::{Notifier, NoopNotifier, TracingNotifier};
pub use token::{SharedToken, TokenProvider, TokenSource};
