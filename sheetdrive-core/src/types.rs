//! Core domain types for sheetdrive
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Store** | One spreadsheet tab holding files, one slot (column) per file |
//! | **Slot** | The 12 cells holding a single file's metadata and content |
//! | **StoredFile** | A named document plus its metadata |
//! | **Plan** | The markdown task tracker kept in the store's plan file |
//!
//! Content length and hash are derived from content. They are carried on
//! [`FileMeta`] for display but never taken from a caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// File status
// ============================================

/// Lifecycle state of a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    #[default]
    Active,
    Archived,
    Deprecated,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Active => "active",
            FileStatus::Archived => "archived",
            FileStatus::Deprecated => "deprecated",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(FileStatus::Active),
            "archived" => Ok(FileStatus::Archived),
            "deprecated" => Ok(FileStatus::Deprecated),
            _ => Err(format!("unknown file status: {}", s)),
        }
    }
}

// ============================================
// Stored files
// ============================================

/// Everything about a file except its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Unique within the store
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Logical path, informational only
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: FileStatus,
    /// Name of another file this one depends on. Not checked on write.
    pub depends_on: Option<String>,
    /// Content length in UTF-16 code units, as `LEN` counts (derived)
    pub content_length: usize,
    /// Writes with longer content are rejected
    pub max_content_length: Option<usize>,
    /// Content checksum, 8 upper-case hex digits (derived)
    pub hash: String,
}

/// A file with its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    #[serde(flatten)]
    pub meta: FileMeta,
    pub content: String,
}

impl StoredFile {
    pub fn name(&self) -> &str {
        &self.meta.name
    }
}

/// A file's dependency that names no existing file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingDependency {
    pub file: String,
    pub depends_on: String,
}

// ============================================
// Writes
// ============================================

/// A create or overwrite request.
///
/// Unset optional fields keep their stored value on overwrite and take
/// defaults on create. Clearing a dependency takes `depends_on("")`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileWrite {
    pub name: String,
    pub content: String,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub path: Option<String>,
    pub status: Option<FileStatus>,
    pub depends_on: Option<String>,
    pub max_content_length: Option<usize>,
}

impl FileWrite {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn status(mut self, status: FileStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on = Some(name.into());
        self
    }

    pub fn max_content_length(mut self, max: usize) -> Self {
        self.max_content_length = Some(max);
        self
    }
}
