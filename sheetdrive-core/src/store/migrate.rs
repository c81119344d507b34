//! Repair and migration helpers
//!
//! Pure functions that turn whatever a tab currently holds into files
//! ready to be rewritten under the canonical column layout.

use chrono::{DateTime, Utc};

use super::schema::{self, decode_slot, FIELD_COUNT, LABELS, LEGACY_LABELS};
use crate::codec::CellValue;
use crate::config::StoreConfig;
use crate::sheets::Grid;
use crate::types::{FileMeta, FileWrite, StoredFile};

pub const IDENTITY_PLACEHOLDER: &str = "# Agent\n\n\
Describe who this agent is, what it works on and how it should behave.\n";

/// Plan written into a freshly seeded store.
pub const STARTER_PLAN: &str = "# Getting started
**Goal:** Replace this plan with real work.

## Phase 1: Setup
- [ ] 1.1 Describe the agent in agent.md
- [ ] 1.2 Create a plan for the first piece of work

## Notes
";

/// A new file from a write request, timestamps set to `now`.
pub fn new_file(write: FileWrite, now: DateTime<Utc>) -> StoredFile {
    let content = write.content;
    StoredFile {
        meta: FileMeta {
            path: write.path.unwrap_or_else(|| format!("/{}", write.name)),
            name: write.name,
            description: write.description.unwrap_or_default(),
            tags: write.tags.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            status: write.status.unwrap_or_default(),
            depends_on: write.depends_on.filter(|d| !d.trim().is_empty()),
            content_length: schema::content_length(&content),
            max_content_length: write.max_content_length,
            hash: schema::content_checksum(&content),
        },
        content,
    }
}

/// Apply an overwrite to an existing file. Unset fields keep their value;
/// the creation time is preserved.
pub fn merge(current: &StoredFile, write: FileWrite, now: DateTime<Utc>) -> StoredFile {
    let old = &current.meta;
    let content = write.content;
    StoredFile {
        meta: FileMeta {
            name: old.name.clone(),
            description: write.description.unwrap_or_else(|| old.description.clone()),
            tags: write.tags.unwrap_or_else(|| old.tags.clone()),
            path: write.path.unwrap_or_else(|| old.path.clone()),
            created_at: old.created_at,
            updated_at: now,
            status: write.status.unwrap_or(old.status),
            depends_on: match write.depends_on {
                Some(dep) if dep.trim().is_empty() => None,
                Some(dep) => Some(dep),
                None => old.depends_on.clone(),
            },
            content_length: schema::content_length(&content),
            max_content_length: write.max_content_length.or(old.max_content_length),
            hash: schema::content_checksum(&content),
        },
        content,
    }
}

/// Identity document and starter plan for an empty store.
pub fn seed_files(config: &StoreConfig, now: DateTime<Utc>) -> Vec<StoredFile> {
    vec![
        plan_file(config, STARTER_PLAN, now),
        identity_file(config, IDENTITY_PLACEHOLDER, now),
    ]
}

fn identity_file(config: &StoreConfig, content: &str, now: DateTime<Utc>) -> StoredFile {
    new_file(
        FileWrite::new(config.identity_file.as_str(), content)
            .description("Agent identity")
            .tags(["identity"]),
        now,
    )
}

fn plan_file(config: &StoreConfig, content: &str, now: DateTime<Utc>) -> StoredFile {
    new_file(
        FileWrite::new(config.plan_file.as_str(), content)
            .description("Current plan")
            .tags(["plan"]),
        now,
    )
}

/// A header cell that names a document: one line, not a field label, with
/// a short alphanumeric extension.
pub fn looks_like_document_name(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.len() > 128 || value.contains('\n') {
        return false;
    }
    if LABELS.iter().any(|l| l.eq_ignore_ascii_case(value)) {
        return false;
    }
    match value.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.trim().is_empty()
                && (1..=10).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Row of each label in column A, falling back to the canonical row for
/// labels that cannot be found.
fn label_rows(grid: &Grid) -> [usize; FIELD_COUNT] {
    let mut rows = [0usize; FIELD_COUNT];
    for (field, label) in LABELS.iter().enumerate() {
        rows[field] = grid
            .iter()
            .position(|row| {
                row.first()
                    .is_some_and(|c| c.to_display().trim().eq_ignore_ascii_case(label))
            })
            .unwrap_or(field);
    }
    rows
}

fn cell(grid: &Grid, row: usize, col: usize) -> CellValue {
    grid.get(row)
        .and_then(|r| r.get(col))
        .cloned()
        .unwrap_or_default()
}

fn stamp_missing_times(mut file: StoredFile, now: DateTime<Utc>) -> StoredFile {
    if file.meta.created_at == DateTime::<Utc>::default() {
        file.meta.created_at = now;
        file.meta.updated_at = now;
    }
    file
}

/// Salvage files from a column-oriented tab whose labels are damaged.
///
/// Only columns whose name cell looks like a document name are kept;
/// column A is considered too unless it holds the name label.
pub fn salvage_columns(grid: &Grid, now: DateTime<Utc>) -> Vec<StoredFile> {
    let rows = label_rows(grid);
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let first = match grid.get(rows[schema::NAME]).and_then(|r| r.first()) {
        Some(c) if c.to_display().trim().eq_ignore_ascii_case(LABELS[schema::NAME]) => 1,
        _ => 0,
    };

    let mut files: Vec<StoredFile> = Vec::new();
    for col in first..width {
        let name = cell(grid, rows[schema::NAME], col).to_display();
        if !looks_like_document_name(&name) {
            continue;
        }
        let cells: Vec<CellValue> = rows.iter().map(|&row| cell(grid, row, col)).collect();
        if let Some(file) = decode_slot(&cells) {
            push_unique(&mut files, stamp_missing_times(file, now));
        }
    }
    files
}

/// Files of a valid column layout, in slot order.
pub fn salvage_slots(slots: Vec<(usize, StoredFile)>) -> Vec<StoredFile> {
    let mut files = Vec::new();
    for (_, file) in slots {
        push_unique(&mut files, file);
    }
    files
}

/// Transpose the previous row-per-file generation: labels across row 1,
/// one file per following row whose name cell looks like a document name.
pub fn salvage_rows(grid: &Grid, now: DateTime<Utc>) -> Vec<StoredFile> {
    let mut files = Vec::new();
    for row in grid.iter().skip(1) {
        let name = row.get(schema::NAME).map(CellValue::to_display).unwrap_or_default();
        if !looks_like_document_name(&name) {
            continue;
        }
        let cells: Vec<CellValue> = (0..FIELD_COUNT)
            .map(|i| row.get(i).cloned().unwrap_or_default())
            .collect();
        if let Some(file) = decode_slot(&cells) {
            push_unique(&mut files, stamp_missing_times(file, now));
        }
    }
    files
}

/// First occurrence of a name wins.
fn push_unique(files: &mut Vec<StoredFile>, file: StoredFile) {
    if files.iter().any(|f| f.meta.name == file.meta.name) {
        tracing::warn!(name = %file.meta.name, "Dropping duplicate file during repair");
        return;
    }
    files.push(file);
}

/// Identity and plan text of the legacy two-cell tab (`A2`, `B2`).
pub fn legacy_contents(grid: &Grid) -> (String, String) {
    let labels_ok = LEGACY_LABELS
        .iter()
        .enumerate()
        .all(|(col, label)| cell(grid, 0, col).to_display().trim().eq_ignore_ascii_case(label));
    if !labels_ok {
        tracing::warn!("Legacy tab labels differ from AGENT/PLAN; migrating row 2 anyway");
    }
    (cell(grid, 1, 0).to_display(), cell(grid, 1, 1).to_display())
}

/// Fold the legacy identity and plan into `files`, plan first.
///
/// Empty legacy cells keep the corresponding existing file, or fall back to
/// the seed content when there is none.
pub fn merge_legacy(
    mut files: Vec<StoredFile>,
    identity: &str,
    plan: &str,
    config: &StoreConfig,
    now: DateTime<Utc>,
) -> Vec<StoredFile> {
    let mut take = |name: &str| -> Option<StoredFile> {
        let idx = files.iter().position(|f| f.meta.name == name)?;
        Some(files.remove(idx))
    };
    let old_plan = take(&config.plan_file);
    let old_identity = take(&config.identity_file);

    let plan = match (plan.trim().is_empty(), old_plan) {
        (false, Some(old)) => merge(&old, FileWrite::new(old.meta.name.as_str(), plan), now),
        (false, None) => plan_file(config, plan, now),
        (true, Some(old)) => old,
        (true, None) => plan_file(config, STARTER_PLAN, now),
    };
    let identity = match (identity.trim().is_empty(), old_identity) {
        (false, Some(old)) => merge(&old, FileWrite::new(old.meta.name.as_str(), identity), now),
        (false, None) => identity_file(config, identity, now),
        (true, Some(old)) => old,
        (true, None) => identity_file(config, IDENTITY_PLACEHOLDER, now),
    };

    let mut merged = vec![plan, identity];
    merged.extend(files);
    merged
}

/// Put a starter plan in the first slot when `files` has no plan file.
pub fn ensure_plan(files: &mut Vec<StoredFile>, config: &StoreConfig, now: DateTime<Utc>) {
    if files.iter().any(|f| f.meta.name == config.plan_file) {
        return;
    }
    files.insert(0, plan_file(config, STARTER_PLAN, now));
}

/// Rows `1..=12` of a freshly written store: label column plus one column
/// per file.
pub fn layout_grid(files: &[StoredFile]) -> Grid {
    let mut grid = schema::label_column();
    for (i, file) in files.iter().enumerate() {
        let column = schema::encode_slot(file, i + 1);
        for (row, cells) in grid.iter_mut().zip(column) {
            row.extend(cells);
        }
    }
    grid
}

/// Extend `grid` to `height` x `width` with blank cells.
pub fn pad_grid(mut grid: Grid, height: usize, width: usize) -> Grid {
    grid.resize_with(height.max(grid.len()), Vec::new);
    for row in &mut grid {
        if row.len() < width {
            row.resize(width, CellValue::text(""));
        }
    }
    grid
}
