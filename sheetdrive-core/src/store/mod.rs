//! Virtual file store
//!
//! Files live in one spreadsheet tab, one column per file, under a label
//! column of 12 fixed fields (see [`schema::LABELS`]). Each write of a file
//! is a single range update of its column; content length and hash are
//! written as live formulas and recomputed locally on every read.
//!
//! Layout detection runs once in [`FileStore::open`]. [`FileStore::initialize`]
//! then brings any older or damaged layout into shape:
//!
//! - **columnar** (current): nothing to do unless forced
//! - **row-wise** (previous generation): transposed into columns
//! - **unrecognized**: files salvaged heuristically, or seeded if none
//! - **missing**: tab created and seeded with an identity file and a plan
//! - **legacy** two-cell tab: migrated into files, then the tab is deleted

mod migrate;
pub mod schema;

pub use migrate::{IDENTITY_PLACEHOLDER, STARTER_PLAN};
pub use schema::Layout;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::codec::{A1Range, WriteData};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::executor::RequestExecutor;
use crate::sheets::{Grid, SheetRequest};
use crate::types::{DanglingDependency, FileMeta, FileWrite, StoredFile};

use schema::{find_tab, FIELD_COUNT};

/// What [`FileStore::initialize`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InitOutcome {
    /// Layout was already canonical; nothing written
    AlreadyValid,
    /// Existing files were rewritten under the canonical layout
    Repaired { salvaged: usize },
    /// Nothing salvageable; default files were created
    Seeded { files: Vec<String> },
    /// Legacy two-cell tab converted and removed
    MigratedLegacy,
}

impl InitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitOutcome::AlreadyValid => "already_valid",
            InitOutcome::Repaired { .. } => "repaired",
            InitOutcome::Seeded { .. } => "seeded",
            InitOutcome::MigratedLegacy => "migrated_legacy",
        }
    }
}

impl std::fmt::Display for InitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Slots of the current layout.
struct Slots {
    files: Vec<(usize, StoredFile)>,
    /// First column past everything in use
    next_column: usize,
}

impl Slots {
    fn find(&self, name: &str) -> Option<&(usize, StoredFile)> {
        self.files.iter().find(|(_, f)| f.meta.name == name)
    }
}

/// CRUD over files in a spreadsheet tab.
#[derive(Clone)]
pub struct FileStore {
    executor: Arc<RequestExecutor>,
    config: StoreConfig,
    layout: Layout,
}

impl FileStore {
    /// Detect the spreadsheet's layout. Nothing is written.
    pub async fn open(executor: Arc<RequestExecutor>, config: StoreConfig) -> Result<Self> {
        let mut store = Self {
            executor,
            config,
            layout: Layout::Missing,
        };
        store.layout = store.detect().await?;
        tracing::info!(sheet = %store.config.sheet, layout = %store.layout, "Opened file store");
        Ok(store)
    }

    /// Open and bring the layout into shape in one step.
    pub async fn connect(executor: Arc<RequestExecutor>, config: StoreConfig) -> Result<Self> {
        let mut store = Self::open(executor, config).await?;
        store.initialize(false).await?;
        Ok(store)
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    async fn detect(&self) -> Result<Layout> {
        let tabs = self.executor.list_sheets().await?;
        if find_tab(&tabs, &self.config.legacy_sheet).is_some() {
            return Ok(Layout::Legacy);
        }
        if find_tab(&tabs, &self.config.sheet).is_none() {
            return Ok(Layout::Missing);
        }
        let grid = self.read_tab(&self.config.sheet).await?;
        Ok(schema::detect_store(Some(&grid)))
    }

    async fn read_tab(&self, title: &str) -> Result<Grid> {
        self.executor.read_range(&A1Range::sheet(title)).await
    }

    /// Validate the layout and repair it if needed. Running this against a
    /// canonical layout is a no-op unless `force` is set.
    pub async fn initialize(&mut self, force: bool) -> Result<InitOutcome> {
        let now = schema::now();
        let outcome = match self.layout {
            Layout::Legacy => {
                self.migrate_legacy().await?;
                InitOutcome::MigratedLegacy
            }
            Layout::Columnar if !force => {
                tracing::debug!(sheet = %self.config.sheet, "Store layout already valid");
                InitOutcome::AlreadyValid
            }
            Layout::Columnar => {
                let slots = self.read_slots().await?;
                self.rebuild(migrate::salvage_slots(slots.files)).await?
            }
            Layout::RowWise => {
                let grid = self.read_tab(&self.config.sheet).await?;
                tracing::info!("Transposing row-per-file layout into columns");
                self.rebuild(migrate::salvage_rows(&grid, now)).await?
            }
            Layout::Unrecognized => {
                let grid = self.read_tab(&self.config.sheet).await?;
                self.rebuild(migrate::salvage_columns(&grid, now)).await?
            }
            Layout::Missing => {
                self.add_store_tab(2).await?;
                self.rebuild(Vec::new()).await?
            }
        };

        self.layout = Layout::Columnar;
        if outcome != InitOutcome::AlreadyValid {
            tracing::info!(sheet = %self.config.sheet, outcome = %outcome, "Initialized file store");
        }
        Ok(outcome)
    }

    /// Rewrite the store from `files`, or seed it when there are none. A
    /// store rebuilt without a plan file gets the starter plan.
    async fn rebuild(&self, mut files: Vec<StoredFile>) -> Result<InitOutcome> {
        if files.is_empty() {
            let seeds = migrate::seed_files(&self.config, schema::now());
            self.write_layout(&seeds).await?;
            return Ok(InitOutcome::Seeded {
                files: seeds.into_iter().map(|f| f.meta.name).collect(),
            });
        }
        let salvaged = files.len();
        migrate::ensure_plan(&mut files, &self.config, schema::now());
        self.write_layout(&files).await?;
        Ok(InitOutcome::Repaired { salvaged })
    }

    /// Convert the legacy two-cell tab into files and delete it.
    ///
    /// Returns false when there is no legacy tab. Existing files in the
    /// store tab are kept; identity and plan are overwritten by the legacy
    /// text unless that text is empty.
    pub async fn migrate_legacy(&mut self) -> Result<bool> {
        let tabs = self.executor.list_sheets().await?;
        if find_tab(&tabs, &self.config.legacy_sheet).is_none() {
            return Ok(false);
        }
        let now = schema::now();

        let legacy = self.read_tab(&self.config.legacy_sheet).await?;
        let (identity, plan) = migrate::legacy_contents(&legacy);
        tracing::info!(
            legacy_sheet = %self.config.legacy_sheet,
            identity_chars = identity.chars().count(),
            plan_chars = plan.chars().count(),
            "Migrating legacy layout"
        );

        let existing = if find_tab(&tabs, &self.config.sheet).is_some() {
            let grid = self.read_tab(&self.config.sheet).await?;
            match schema::detect_store(Some(&grid)) {
                Layout::Columnar => {
                    let slots = schema::slot_columns(&grid)
                        .into_iter()
                        .filter_map(|(col, cells)| schema::decode_slot(&cells).map(|f| (col, f)))
                        .collect();
                    migrate::salvage_slots(slots)
                }
                Layout::RowWise => migrate::salvage_rows(&grid, now),
                _ => migrate::salvage_columns(&grid, now),
            }
        } else {
            self.add_store_tab(2).await?;
            Vec::new()
        };

        let files = migrate::merge_legacy(existing, &identity, &plan, &self.config, now);
        self.write_layout(&files).await?;
        self.executor
            .batch_update(vec![SheetRequest::DeleteSheet {
                title: self.config.legacy_sheet.clone(),
            }])
            .await?;

        self.layout = Layout::Columnar;
        tracing::info!(files = files.len(), "Legacy layout migrated");
        Ok(true)
    }

    async fn add_store_tab(&self, files: usize) -> Result<()> {
        tracing::info!(sheet = %self.config.sheet, "Creating store tab");
        self.executor
            .batch_update(vec![SheetRequest::AddSheet {
                title: self.config.sheet.clone(),
                rows: FIELD_COUNT,
                columns: files + 1,
            }])
            .await
    }

    /// Grow the store tab to at least `rows` x `columns`.
    async fn ensure_grid(&self, rows: usize, columns: usize) -> Result<()> {
        let tabs = self.executor.list_sheets().await?;
        let Some(tab) = find_tab(&tabs, &self.config.sheet) else {
            return Err(Error::Validation {
                message: format!("store tab '{}' does not exist", self.config.sheet),
                suggestion: Some("run `sheetdrive init`".to_string()),
            });
        };

        let mut requests = Vec::new();
        if tab.rows < rows {
            requests.push(SheetRequest::AppendRows {
                sheet: tab.title.clone(),
                count: rows - tab.rows,
            });
        }
        if tab.columns < columns {
            requests.push(SheetRequest::AppendColumns {
                sheet: tab.title.clone(),
                count: columns - tab.columns,
            });
        }
        if requests.is_empty() {
            return Ok(());
        }
        tracing::debug!(rows, columns, "Growing store grid");
        self.executor.batch_update(requests).await
    }

    /// Replace the whole store tab with the label column and `files` in one
    /// range update. Cells of the previous contents outside the new layout
    /// are blanked by the same update.
    async fn write_layout(&self, files: &[StoredFile]) -> Result<()> {
        let sheet = &self.config.sheet;
        let previous = self.read_tab(sheet).await?;
        let height = FIELD_COUNT.max(previous.len());
        let width = (files.len() + 1).max(previous.iter().map(Vec::len).max().unwrap_or(0));

        let grid = migrate::pad_grid(migrate::layout_grid(files), height, width);
        self.ensure_grid(height, width).await?;
        let range = A1Range::block(sheet, 0, 0, width - 1, height - 1);
        self.executor.write_range(&range, WriteData::Grid(grid)).await
    }

    fn require_columnar(&self) -> Result<()> {
        if self.layout == Layout::Columnar {
            return Ok(());
        }
        Err(Error::Validation {
            message: format!("file store layout is {}", self.layout),
            suggestion: Some("run `sheetdrive init` to repair or migrate it".to_string()),
        })
    }

    async fn read_slots(&self) -> Result<Slots> {
        self.require_columnar()?;
        let range = A1Range::rows(&self.config.sheet, 0, FIELD_COUNT - 1);
        let grid = self.executor.read_range(&range).await?;

        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        let files = schema::slot_columns(&grid)
            .into_iter()
            .filter_map(|(col, cells)| schema::decode_slot(&cells).map(|f| (col, f)))
            .collect();
        Ok(Slots {
            files,
            next_column: width.max(1),
        })
    }

    /// Metadata of every file, in slot order.
    pub async fn list(&self) -> Result<Vec<FileMeta>> {
        let slots = self.read_slots().await?;
        Ok(slots.files.into_iter().map(|(_, f)| f.meta).collect())
    }

    /// A file with its content, or `None` if there is no such file.
    pub async fn read(&self, name: &str) -> Result<Option<StoredFile>> {
        let slots = self.read_slots().await?;
        Ok(slots
            .files
            .into_iter()
            .find(|(_, f)| f.meta.name == name)
            .map(|(_, f)| f))
    }

    /// Write a new file; fails if the name is taken.
    pub async fn create(&self, write: FileWrite) -> Result<StoredFile> {
        self.put(write, true).await
    }

    /// Create or overwrite a file.
    pub async fn write(&self, write: FileWrite) -> Result<StoredFile> {
        self.put(write, false).await
    }

    async fn put(&self, write: FileWrite, must_be_new: bool) -> Result<StoredFile> {
        validate_name(&write.name)?;
        validate_metadata(&write)?;
        let slots = self.read_slots().await?;
        let now = schema::now();

        let (col, file) = match slots.find(&write.name) {
            Some(_) if must_be_new => {
                return Err(Error::validation(
                    format!("file '{}' already exists", write.name),
                    "use write to overwrite it",
                ));
            }
            Some((col, current)) => (*col, migrate::merge(current, write, now)),
            None => (slots.next_column, migrate::new_file(write, now)),
        };

        if let Some(max) = file.meta.max_content_length {
            if file.meta.content_length > max {
                return Err(Error::validation(
                    format!(
                        "content of '{}' is {} units long, limit is {}",
                        file.meta.name, file.meta.content_length, max
                    ),
                    "shorten the content or raise the file's max length",
                ));
            }
        }

        self.ensure_grid(FIELD_COUNT, col + 1).await?;
        let range = A1Range::block(&self.config.sheet, col, 0, col, FIELD_COUNT - 1);
        self.executor
            .write_range(&range, WriteData::Grid(schema::encode_slot(&file, col)))
            .await?;

        tracing::info!(
            name = %file.meta.name,
            column = %crate::codec::column_letter(col),
            chars = file.meta.content_length,
            "Wrote file"
        );
        Ok(file)
    }

    /// Remove a file's column. Returns false if there was no such file.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        if self.config.is_protected(name) {
            return Err(Error::ProtectedFile(name.to_string()));
        }
        let slots = self.read_slots().await?;
        let Some((col, _)) = slots.find(name) else {
            tracing::debug!(name, "Delete of missing file");
            return Ok(false);
        };

        self.executor
            .batch_update(vec![SheetRequest::DeleteColumns {
                sheet: self.config.sheet.clone(),
                start: *col,
                end: col + 1,
            }])
            .await?;
        tracing::info!(name, "Deleted file");
        Ok(true)
    }

    /// Files whose dependency names no existing file.
    pub async fn check_dependencies(&self) -> Result<Vec<DanglingDependency>> {
        let files = self.list().await?;
        let names: HashSet<&str> = files.iter().map(|f| f.name.as_str()).collect();
        Ok(files
            .iter()
            .filter_map(|f| {
                let dep = f.depends_on.as_deref()?;
                (!names.contains(dep)).then(|| DanglingDependency {
                    file: f.name.clone(),
                    depends_on: dep.to_string(),
                })
            })
            .collect())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("file name is empty", "pass a name such as notes.md"));
    }
    if name.trim() != name || name.contains(['\n', '\r']) {
        return Err(Error::validation(
            format!("file name {:?} has surrounding whitespace or line breaks", name),
            "use a single-line name without leading or trailing spaces",
        ));
    }
    Ok(())
}

/// Tags share one comma-joined cell and the dependency cell is read back
/// trimmed, so anything that would not survive that is refused.
fn validate_metadata(write: &FileWrite) -> Result<()> {
    for tag in write.tags.iter().flatten() {
        if tag.is_empty() || tag.trim() != tag || tag.contains([',', '\n', '\r']) {
            return Err(Error::validation(
                format!("tag {:?} cannot be stored", tag),
                "use non-empty tags without commas or surrounding spaces",
            ));
        }
    }
    if let Some(dep) = &write.depends_on {
        if !dep.is_empty() && (dep.trim() != dep || dep.contains(['\n', '\r'])) {
            return Err(Error::validation(
                format!("dependency {:?} has surrounding whitespace or line breaks", dep),
                "name the file exactly, e.g. agent.md",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CellValue;
    use crate::retry::RetryPolicy;
    use crate::sheets::{MemorySheets, SheetsApi};
    use crate::types::FileStatus;

    fn executor(api: &Arc<MemorySheets>) -> Arc<RequestExecutor> {
        Arc::new(RequestExecutor::from_api(api.clone(), RetryPolicy::immediate(2)))
    }

    async fn fresh_store() -> (Arc<MemorySheets>, FileStore) {
        let api = Arc::new(MemorySheets::new());
        let store = FileStore::connect(executor(&api), StoreConfig::default())
            .await
            .unwrap();
        (api, store)
    }

    #[tokio::test]
    async fn test_missing_tab_is_seeded() {
        let api = Arc::new(MemorySheets::new());
        let mut store = FileStore::open(executor(&api), StoreConfig::default())
            .await
            .unwrap();
        assert_eq!(store.layout(), Layout::Missing);

        let outcome = store.initialize(false).await.unwrap();
        assert_eq!(
            outcome,
            InitOutcome::Seeded {
                files: vec!["plan.md".to_string(), "agent.md".to_string()]
            }
        );
        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["plan.md", "agent.md"]);
    }

    #[tokio::test]
    async fn test_write_appends_columns_past_grid() {
        let (api, store) = fresh_store().await;
        let before = api.sheets().await.unwrap()[0].columns;
        store.write(FileWrite::new("extra.md", "x")).await.unwrap();
        let after = api.sheets().await.unwrap()[0].columns;
        assert_eq!(after, before + 1);
        assert_eq!(store.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_rejects_existing_name() {
        let (_, store) = fresh_store().await;
        let err = store
            .create(FileWrite::new("agent.md", "again"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_created_and_metadata() {
        let (_, store) = fresh_store().await;
        let first = store
            .write(
                FileWrite::new("notes.md", "one")
                    .description("scratch")
                    .status(FileStatus::Archived),
            )
            .await
            .unwrap();
        let second = store.write(FileWrite::new("notes.md", "two")).await.unwrap();

        assert_eq!(second.meta.created_at, first.meta.created_at);
        assert!(second.meta.updated_at >= first.meta.updated_at);
        assert_eq!(second.meta.description, "scratch");
        assert_eq!(second.meta.status, FileStatus::Archived);

        let read = store.read("notes.md").await.unwrap().unwrap();
        assert_eq!(read, second);
    }

    #[tokio::test]
    async fn test_overwrite_is_single_column_update() {
        let (api, store) = fresh_store().await;
        store.write(FileWrite::new("a.md", "1")).await.unwrap();
        let grid = api.snapshot("AGENTFS").unwrap();
        let col = grid[0].iter().position(|c| c == &CellValue::text("a.md")).unwrap();

        let calls = api.calls();
        store.write(FileWrite::new("a.md", "2")).await.unwrap();
        // read slots, grid check, one update
        assert_eq!(api.calls() - calls, 3);
        assert_eq!(api.snapshot("AGENTFS").unwrap()[11][col], CellValue::text("2"));
    }

    #[tokio::test]
    async fn test_max_content_length_enforced() {
        let (_, store) = fresh_store().await;
        store
            .write(FileWrite::new("short.md", "ok").max_content_length(3))
            .await
            .unwrap();
        let err = store
            .write(FileWrite::new("short.md", "too long"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(store.read("short.md").await.unwrap().unwrap().content, "ok");
    }

    #[tokio::test]
    async fn test_delete_protected_and_missing() {
        let (_, store) = fresh_store().await;
        assert!(matches!(
            store.delete("plan.md").await,
            Err(Error::ProtectedFile(_))
        ));
        assert!(!store.delete("nope.md").await.unwrap());
        assert!(store.delete("agent.md").await.unwrap());
        assert!(store.read("agent.md").await.unwrap().is_none());
        assert!(store.read("plan.md").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_check_dependencies() {
        let (_, store) = fresh_store().await;
        store
            .write(FileWrite::new("a.md", "x").depends_on("agent.md"))
            .await
            .unwrap();
        store
            .write(FileWrite::new("b.md", "x").depends_on("ghost.md"))
            .await
            .unwrap();
        let dangling = store.check_dependencies().await.unwrap();
        assert_eq!(
            dangling,
            vec![DanglingDependency {
                file: "b.md".into(),
                depends_on: "ghost.md".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_invalid_layout_blocks_crud() {
        let api = Arc::new(MemorySheets::new().with_sheet("AGENTFS"));
        api.seed(&A1Range::parse("AGENTFS!A1").unwrap(), vec![vec![CellValue::text("junk")]])
            .unwrap();
        let store = FileStore::open(executor(&api), StoreConfig::default())
            .await
            .unwrap();
        assert_eq!(store.layout(), Layout::Unrecognized);
        assert!(matches!(store.list().await, Err(Error::Validation { .. })));
    }

    #[tokio::test]
    async fn test_bad_names_rejected() {
        let (_, store) = fresh_store().await;
        for name in ["", "  ", " padded.md", "two\nlines.md"] {
            assert!(
                store.write(FileWrite::new(name, "x")).await.is_err(),
                "{:?} should be rejected",
                name
            );
        }
    }
}
