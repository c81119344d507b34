//! Slot layout of the file store
//!
//! Labels sit in column A, rows 1..12 of the store tab; file `n` (1-based)
//! occupies column `n + 1`. The previous generation stored one file per row
//! with the labels across row 1.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, TimeZone, Utc};

use crate::codec::{column_letter, CellValue};
use crate::sheets::{Grid, SheetInfo};
use crate::types::{FileMeta, FileStatus, StoredFile};

/// Field labels in slot order.
pub const LABELS: [&str; 12] = [
    "FILE",
    "DESC",
    "TAGS",
    "Path",
    "CreatedTS",
    "UpdatedTS",
    "Status",
    "DependsOn",
    "ContextLen",
    "MaxCtxLen",
    "Hash",
    "MDContent",
];

pub const FIELD_COUNT: usize = LABELS.len();

pub const NAME: usize = 0;
pub const DESC: usize = 1;
pub const TAGS: usize = 2;
pub const PATH: usize = 3;
pub const CREATED: usize = 4;
pub const UPDATED: usize = 5;
pub const STATUS: usize = 6;
pub const DEPENDS_ON: usize = 7;
pub const CONTEXT_LEN: usize = 8;
pub const MAX_CTX_LEN: usize = 9;
pub const HASH: usize = 10;
pub const CONTENT: usize = 11;

/// Legacy two-cell tab labels (`A1`, `B1`).
pub const LEGACY_LABELS: [&str; 2] = ["AGENT", "PLAN"];

const CHECKSUM_MODULUS: u64 = 2_147_483_647;

/// Weighted checksum: Σ unit(i)·i (1-based) mod 2147483647, as 8
/// upper-case hex digits.
///
/// Units are UTF-16 code units, which is what the sheet's `MID` and
/// `UNICODE` see, so a character outside the BMP contributes both of its
/// surrogates.
pub fn content_checksum(content: &str) -> String {
    let sum = content
        .encode_utf16()
        .enumerate()
        .fold(0u64, |acc, (i, unit)| {
            let term = (u64::from(unit) * (i as u64 + 1)) % CHECKSUM_MODULUS;
            (acc + term) % CHECKSUM_MODULUS
        });
    format!("{:08X}", sum)
}

/// Length as `LEN` reports it, in UTF-16 code units.
pub fn content_length(content: &str) -> usize {
    content.encode_utf16().count()
}

/// `=LEN(B12)` for the slot in column `col`.
pub fn length_formula(col: usize) -> String {
    format!("=LEN({}{})", column_letter(col), CONTENT + 1)
}

/// Same checksum as [`content_checksum`], evaluated by the sheet.
pub fn hash_formula(col: usize) -> String {
    let cell = format!("{}{}", column_letter(col), CONTENT + 1);
    format!(
        "=IF(LEN({c})=0,\"00000000\",DEC2HEX(MOD(SUMPRODUCT(UNICODE(MID({c},SEQUENCE(LEN({c})),1)),SEQUENCE(LEN({c}))),{m}),8))",
        c = cell,
        m = CHECKSUM_MODULUS
    )
}

pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Timestamps come back as text, or as a date serial when someone edited
/// the cell by hand.
pub fn parse_timestamp(cell: &CellValue) -> Option<DateTime<Utc>> {
    match cell {
        CellValue::Text(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        CellValue::Number(serial) if serial.is_finite() => {
            let epoch = Utc.with_ymd_and_hms(1899, 12, 30, 0, 0, 0).single()?;
            let millis = (serial * 86_400_000.0).round() as i64;
            Some(epoch + Duration::milliseconds(millis))
        }
        _ => None,
    }
}

pub fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}

pub fn split_tags(cell: &CellValue) -> Vec<String> {
    cell.to_display()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Cells of the label column, top to bottom.
pub fn label_column() -> Grid {
    LABELS.iter().map(|l| vec![CellValue::text(*l)]).collect()
}

/// Cells for one slot, top to bottom, ready for a single range update.
pub fn encode_slot(file: &StoredFile, col: usize) -> Grid {
    let meta = &file.meta;
    let mut cells = vec![CellValue::Empty; FIELD_COUNT];
    cells[NAME] = CellValue::text(meta.name.as_str());
    cells[DESC] = CellValue::text(meta.description.as_str());
    cells[TAGS] = CellValue::text(join_tags(&meta.tags));
    cells[PATH] = CellValue::text(meta.path.as_str());
    cells[CREATED] = CellValue::text(format_timestamp(&meta.created_at));
    cells[UPDATED] = CellValue::text(format_timestamp(&meta.updated_at));
    cells[STATUS] = CellValue::text(meta.status.as_str());
    cells[DEPENDS_ON] = CellValue::text(meta.depends_on.clone().unwrap_or_default());
    cells[CONTEXT_LEN] = CellValue::formula(length_formula(col));
    cells[MAX_CTX_LEN] = match meta.max_content_length {
        Some(max) => CellValue::Number(max as f64),
        None => CellValue::text(""),
    };
    cells[HASH] = CellValue::formula(hash_formula(col));
    cells[CONTENT] = CellValue::text(file.content.as_str());
    cells.into_iter().map(|c| vec![c]).collect()
}

/// Decode one slot's cells (in label order). Blank names yield `None`.
///
/// Length and hash are recomputed from content; whatever the sheet holds
/// in those rows is ignored.
pub fn decode_slot(cells: &[CellValue]) -> Option<StoredFile> {
    let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
    let text = |i: usize| cell(i).to_display();

    let name = text(NAME).trim().to_string();
    if name.is_empty() {
        return None;
    }

    let content = text(CONTENT);
    let updated_at = parse_timestamp(&cell(UPDATED));
    let created_at = parse_timestamp(&cell(CREATED))
        .or(updated_at)
        .unwrap_or_default();
    let depends_on = Some(text(DEPENDS_ON).trim().to_string()).filter(|d| !d.is_empty());
    let max_content_length = match cell(MAX_CTX_LEN) {
        CellValue::Number(n) if n >= 0.0 => Some(n as usize),
        CellValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    };

    Some(StoredFile {
        meta: FileMeta {
            name,
            description: text(DESC),
            tags: split_tags(&cell(TAGS)),
            path: text(PATH),
            created_at,
            updated_at: updated_at.unwrap_or(created_at),
            status: text(STATUS).parse().unwrap_or(FileStatus::Active),
            depends_on,
            content_length: content_length(&content),
            max_content_length,
            hash: content_checksum(&content),
        },
        content,
    })
}

/// Slots of a column-layout read: column `c >= 1` of `grid` becomes one
/// cell list in label order. Returns `(column, cells)` pairs.
pub fn slot_columns(grid: &Grid) -> Vec<(usize, Vec<CellValue>)> {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    (1..width)
        .map(|col| {
            let cells = (0..FIELD_COUNT)
                .map(|row| {
                    grid.get(row)
                        .and_then(|r| r.get(col))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect();
            (col, cells)
        })
        .collect()
}

/// How the spreadsheet is organized, decided once when the store opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Current generation: labels down column A
    Columnar,
    /// Previous generation: labels across row 1, one file per row
    RowWise,
    /// Two-cell identity/plan tab, predating the file store
    Legacy,
    /// Store tab exists but its labels match neither generation
    Unrecognized,
    /// No store tab
    Missing,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Columnar => "columnar",
            Layout::RowWise => "row_wise",
            Layout::Legacy => "legacy",
            Layout::Unrecognized => "unrecognized",
            Layout::Missing => "missing",
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn label_matches(cell: Option<&CellValue>, label: &str) -> bool {
    cell.map(|c| c.to_display().trim() == label).unwrap_or(false)
}

/// Labels exactly in column A, rows 1..12.
pub fn is_columnar(grid: &Grid) -> bool {
    LABELS
        .iter()
        .enumerate()
        .all(|(row, label)| label_matches(grid.get(row).and_then(|r| r.first()), label))
}

/// Labels exactly across row 1, columns A..L.
pub fn is_row_wise(grid: &Grid) -> bool {
    let Some(header) = grid.first() else {
        return false;
    };
    LABELS
        .iter()
        .enumerate()
        .all(|(col, label)| label_matches(header.get(col), label))
}

/// Classify the store tab from its top-left block. `grid` is `None` when
/// the tab does not exist.
pub fn detect_store(grid: Option<&Grid>) -> Layout {
    match grid {
        None => Layout::Missing,
        Some(grid) if is_columnar(grid) => Layout::Columnar,
        Some(grid) if is_row_wise(grid) => Layout::RowWise,
        Some(_) => Layout::Unrecognized,
    }
}

pub fn find_tab<'a>(tabs: &'a [SheetInfo], title: &str) -> Option<&'a SheetInfo> {
    tabs.iter().find(|t| t.title == title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        assert_eq!(content_checksum(""), "00000000");
        // 'a' = 97 at position 1
        assert_eq!(content_checksum("a"), "00000061");
        // 97*1 + 98*2 = 293
        assert_eq!(content_checksum("ab"), "00000125");
        assert_ne!(content_checksum("ab"), content_checksum("ba"));
        assert_eq!(content_checksum("héllo").len(), 8);
        // U+1F600 is the surrogate pair D83D DE00.
        assert_eq!(content_checksum("😀"), "0002943D");
        assert_eq!(content_length("😀"), 2);
        assert_eq!(content_length("é😀"), 3);
    }

    #[test]
    fn test_formulas_reference_content_cell() {
        assert_eq!(length_formula(1), "=LEN(B12)");
        let hash = hash_formula(27);
        assert!(hash.starts_with("=IF(LEN(AB12)=0"));
        assert!(hash.contains("2147483647"));
    }

    #[test]
    fn test_slot_round_trip() {
        let ts = now();
        let file = StoredFile {
            meta: FileMeta {
                name: "notes.md".into(),
                description: "scratch".into(),
                tags: vec!["a".into(), "b c".into()],
                path: "/notes.md".into(),
                created_at: ts,
                updated_at: ts,
                status: FileStatus::Archived,
                depends_on: Some("agent.md".into()),
                content_length: 5,
                max_content_length: Some(100),
                hash: content_checksum("hello"),
            },
            content: "hello".into(),
        };
        let column: Vec<CellValue> = encode_slot(&file, 2).into_iter().flatten().collect();
        assert_eq!(column.len(), FIELD_COUNT);
        assert_eq!(column[CONTEXT_LEN], CellValue::formula("=LEN(C12)"));

        let decoded = decode_slot(&column).unwrap();
        assert_eq!(decoded, file);
    }

    #[test]
    fn test_decode_ignores_stored_derived_values() {
        let mut cells = vec![CellValue::Empty; FIELD_COUNT];
        cells[NAME] = CellValue::text("x.md");
        cells[CONTEXT_LEN] = CellValue::Number(999.0);
        cells[HASH] = CellValue::text("DEADBEEF");
        cells[CONTENT] = CellValue::text("abc");
        let file = decode_slot(&cells).unwrap();
        assert_eq!(file.meta.content_length, 3);
        assert_eq!(file.meta.hash, content_checksum("abc"));
        assert_eq!(file.meta.status, FileStatus::Active);
        assert!(file.meta.depends_on.is_none());
    }

    #[test]
    fn test_blank_name_is_empty_slot() {
        assert!(decode_slot(&[CellValue::text("  ")]).is_none());
        assert!(decode_slot(&[]).is_none());
    }

    #[test]
    fn test_date_serial_timestamp() {
        let ts = parse_timestamp(&CellValue::Number(45292.5)).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-01-01T12:00:00.000Z");
    }

    #[test]
    fn test_detect_layouts() {
        assert_eq!(detect_store(None), Layout::Missing);
        assert_eq!(detect_store(Some(&label_column())), Layout::Columnar);

        let row: Grid = vec![LABELS.iter().map(|l| CellValue::text(*l)).collect()];
        assert_eq!(detect_store(Some(&row)), Layout::RowWise);

        let mut damaged = label_column();
        damaged[3] = vec![CellValue::text("PATH")];
        assert_eq!(detect_store(Some(&damaged)), Layout::Unrecognized);
        assert_eq!(detect_store(Some(&Vec::new())), Layout::Unrecognized);
    }

    #[test]
    fn test_slot_columns_pads_short_rows() {
        let grid: Grid = vec![
            vec![CellValue::text("FILE"), CellValue::text("a.md"), CellValue::text("b.md")],
            vec![CellValue::text("DESC"), CellValue::text("first")],
        ];
        let slots = slot_columns(&grid);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].0, 1);
        assert_eq!(slots[0].1[DESC], CellValue::text("first"));
        assert_eq!(slots[1].1[DESC], CellValue::Empty);
        assert_eq!(slots[1].1.len(), FIELD_COUNT);
    }
}
