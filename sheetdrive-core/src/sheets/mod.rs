//! Spreadsheet service abstraction
//!
//! [`SheetsApi`] is the range-oriented surface the rest of the crate talks
//! to. [`HttpSheets`] speaks the REST protocol; [`MemorySheets`] keeps an
//! in-process grid for tests and embedding.
//!
//! Implementations report failures as [`RemoteError`] and never retry on
//! their own: classification and retries belong to
//! [`RequestExecutor`](crate::executor::RequestExecutor).

mod http;
mod memory;

pub(crate) use http::transport_error;
pub use http::HttpSheets;
pub use memory::MemorySheets;

use std::time::Duration;

use async_trait::async_trait;

use crate::codec::{A1Range, CellValue};

/// Rows of cells, row-major.
pub type Grid = Vec<Vec<CellValue>>;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// A tab and its provisioned grid size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub title: String,
    pub sheet_id: i64,
    pub rows: usize,
    pub columns: usize,
}

/// Structural changes applied through a single batch update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetRequest {
    AddSheet {
        title: String,
        rows: usize,
        columns: usize,
    },
    DeleteSheet {
        title: String,
    },
    /// Remove columns `start..end` (0-based, end exclusive), shifting the rest left
    DeleteColumns {
        sheet: String,
        start: usize,
        end: usize,
    },
    AppendColumns {
        sheet: String,
        count: usize,
    },
    AppendRows {
        sheet: String,
        count: usize,
    },
}

/// A failed remote call, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// HTTP status, when the service answered
    pub status: Option<u16>,
    /// Transport error code (`ETIMEDOUT`, `ECONNRESET`, ...), when it did not
    pub code: Option<String>,
    pub message: String,
    /// Server-requested wait before the next attempt
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn transport(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: Some(code.into()),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.status, &self.code) {
            (Some(status), _) => write!(f, "HTTP {}: {}", status, self.message),
            (None, Some(code)) => write!(f, "{}: {}", code, self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Range-oriented access to one spreadsheet.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Tabs in display order.
    async fn sheets(&self) -> RemoteResult<Vec<SheetInfo>>;

    /// Values in `range`, with trailing empty rows and cells omitted.
    async fn get_values(&self, range: &A1Range) -> RemoteResult<Grid>;

    /// Overwrite cells starting at the range's top-left corner.
    async fn update_values(&self, range: &A1Range, rows: Grid) -> RemoteResult<()>;

    /// Write rows after the last non-empty row of the range's table.
    async fn append_values(&self, range: &A1Range, rows: Grid) -> RemoteResult<()>;

    async fn clear_values(&self, range: &A1Range) -> RemoteResult<()>;

    /// Apply all requests or none.
    async fn batch_update(&self, requests: Vec<SheetRequest>) -> RemoteResult<()>;
}
