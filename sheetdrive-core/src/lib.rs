//! # sheetdrive-core
//!
//! Core library for sheetdrive - a file store and plan tracker kept in a
//! spreadsheet.
//!
//! This library provides:
//! - A resilient request executor over the spreadsheet service (retry,
//!   backoff, service-account auth shared by concurrent callers)
//! - A cell codec between spreadsheet grids and typed records
//! - A virtual file store, one column per file, with layout repair and
//!   legacy migration
//! - A markdown plan with task state transitions
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Requests flow through three layers:
//! - **Sheets:** the remote API as a trait, with an HTTP and an in-memory
//!   implementation
//! - **Executor:** one authenticated handle, every call retried under the
//!   configured policy and mapped to a typed [`Error`]
//! - **Store / Plan:** files and plans built on executor calls
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sheetdrive_core::auth::CredentialSources;
//! use sheetdrive_core::executor::ServiceAccountConnector;
//! use sheetdrive_core::{Config, FileStore, PlanTracker, RequestExecutor};
//!
//! # async fn run() -> sheetdrive_core::Result<()> {
//! let config = Config::load()?;
//! let sources = CredentialSources::from_config(&config.auth);
//! let connector = ServiceAccountConnector::new(&sources, "spreadsheet-id", &config)?;
//! let executor = Arc::new(RequestExecutor::new(Arc::new(connector), config.retry.policy()));
//!
//! let store = FileStore::connect(executor, config.store.clone()).await?;
//! let plan = PlanTracker::new(store);
//! if let Some(task) = plan.next_task().await? {
//!     println!("next: {} {}", task.step, task.title);
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use executor::RequestExecutor;
pub use plan::{Plan, PlanTracker};
pub use store::{FileStore, InitOutcome};
pub use types::*;

// Public modules
pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod plan;
pub mod retry;
pub mod sheets;
pub mod store;
pub mod types;
