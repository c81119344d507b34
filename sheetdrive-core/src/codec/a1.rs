//! A1 range notation
//!
//! Supported forms: `A1`, `A1:C3`, `A:C`, `1:12`, `A2:C` (open-ended rows),
//! a bare tab name for the whole tab, and any of those prefixed by a tab
//! name (`Tab!A1`, `'My Tab'!A1:B2`). Indices are 0-based internally.

use crate::error::{Error, Result};

/// Largest column the service addresses (`ZZZ`).
const MAX_COLUMN: usize = 18_277;

/// Convert a 0-based column index to its letters (`0` → `A`, `26` → `AA`).
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Convert column letters to a 0-based index. Case-insensitive.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut n = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        n = n * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    Some(n - 1)
}

/// One end of a range. Either part may be absent (`A` or `3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub col: Option<usize>,
    pub row: Option<usize>,
}

impl CellRef {
    pub fn cell(col: usize, row: usize) -> Self {
        Self {
            col: Some(col),
            row: Some(row),
        }
    }

    fn parse(token: &str, whole: &str) -> Result<Self> {
        let token = token.replace('$', "");
        let split = token
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(token.len());
        let (letters, digits) = token.split_at(split);

        if letters.is_empty() && digits.is_empty() {
            return Err(bad_range(whole, "a cell reference is empty"));
        }

        let col = if letters.is_empty() {
            None
        } else {
            let col = column_index(letters)
                .ok_or_else(|| bad_range(whole, &format!("'{}' is not a column", letters)))?;
            if col > MAX_COLUMN {
                return Err(bad_range(whole, "column is beyond ZZZ"));
            }
            Some(col)
        };

        let row = if digits.is_empty() {
            None
        } else {
            let row: usize = digits
                .parse()
                .map_err(|_| bad_range(whole, &format!("'{}' is not a row number", digits)))?;
            if row == 0 {
                return Err(bad_range(whole, "rows start at 1"));
            }
            Some(row - 1)
        };

        Ok(Self { col, row })
    }

    fn kind(&self) -> RefKind {
        match (self.col, self.row) {
            (Some(_), Some(_)) => RefKind::Cell,
            (Some(_), None) => RefKind::Column,
            (None, Some(_)) => RefKind::Row,
            (None, None) => RefKind::Row,
        }
    }
}

impl std::fmt::Display for CellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(col) = self.col {
            write!(f, "{}", column_letter(col))?;
        }
        if let Some(row) = self.row {
            write!(f, "{}", row + 1)?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum RefKind {
    Cell,
    Column,
    Row,
}

/// Normalized, inclusive bounds of a range. `None` ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridBounds {
    pub row_start: usize,
    pub row_end: Option<usize>,
    pub col_start: usize,
    pub col_end: Option<usize>,
}

/// A parsed A1 range, optionally bound to a tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: Option<String>,
    /// `None` addresses the whole tab.
    pub start: Option<CellRef>,
    pub end: Option<CellRef>,
}

impl A1Range {
    /// The whole tab.
    pub fn sheet(sheet: &str) -> Self {
        Self {
            sheet: Some(sheet.to_string()),
            start: None,
            end: None,
        }
    }

    /// A rectangular block, 0-based inclusive.
    pub fn block(sheet: &str, col_start: usize, row_start: usize, col_end: usize, row_end: usize) -> Self {
        Self {
            sheet: Some(sheet.to_string()),
            start: Some(CellRef::cell(col_start, row_start)),
            end: Some(CellRef::cell(col_end, row_end)),
        }
    }

    /// Whole rows, 0-based inclusive (`1:12`).
    pub fn rows(sheet: &str, row_start: usize, row_end: usize) -> Self {
        Self {
            sheet: Some(sheet.to_string()),
            start: Some(CellRef {
                col: None,
                row: Some(row_start),
            }),
            end: Some(CellRef {
                col: None,
                row: Some(row_end),
            }),
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::validation(
                "range is empty",
                "use A1 notation such as Sheet1!A1:C10",
            ));
        }

        let (sheet, refs) = match split_sheet(input)? {
            Split::Whole(sheet) => return Ok(Self::sheet(&sheet)),
            Split::Bare => {
                // No '!': either a bare reference or a bare tab name.
                return match parse_refs(input, input) {
                    Ok((start, end)) => Ok(Self {
                        sheet: None,
                        start: Some(start),
                        end,
                    }),
                    Err(_) => Ok(Self::sheet(input)),
                };
            }
            Split::Refs(sheet, refs) => (sheet, refs),
        };

        if refs.is_empty() {
            return Err(bad_range(input, "nothing follows '!'"));
        }
        let (start, end) = parse_refs(refs, input)?;
        Ok(Self {
            sheet: Some(sheet),
            start: Some(start),
            end,
        })
    }

    pub fn bounds(&self) -> GridBounds {
        let Some(start) = self.start else {
            return GridBounds {
                row_start: 0,
                row_end: None,
                col_start: 0,
                col_end: None,
            };
        };
        let end = self.end.unwrap_or(start);

        let (row_start, row_end) = order(start.row.unwrap_or(0), end.row);
        let (col_start, col_end) = order(start.col.unwrap_or(0), end.col);
        GridBounds {
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    pub fn with_sheet(mut self, sheet: &str) -> Self {
        self.sheet = Some(sheet.to_string());
        self
    }
}

fn order(start: usize, end: Option<usize>) -> (usize, Option<usize>) {
    match end {
        Some(end) if end < start => (end, Some(start)),
        other => (start, other),
    }
}

impl std::fmt::Display for A1Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}", quote_sheet(sheet))?;
            if self.start.is_some() {
                write!(f, "!")?;
            }
        }
        if let Some(start) = &self.start {
            write!(f, "{}", start)?;
            if let Some(end) = &self.end {
                write!(f, ":{}", end)?;
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for A1Range {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        A1Range::parse(s)
    }
}

enum Split<'a> {
    /// No tab prefix at all
    Bare,
    /// A quoted tab name with nothing after it
    Whole(String),
    Refs(String, &'a str),
}

/// Split `Tab!refs` into its parts.
fn split_sheet(input: &str) -> Result<Split<'_>> {
    if let Some(rest) = input.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    name.push('\'');
                    chars.next();
                    continue;
                }
                let after = &rest[i + 1..];
                if after.is_empty() {
                    return Ok(Split::Whole(name));
                }
                return match after.strip_prefix('!') {
                    Some(refs) => Ok(Split::Refs(name, refs)),
                    None => Err(bad_range(input, "expected '!' after the quoted tab name")),
                };
            }
            name.push(c);
        }
        return Err(Error::validation(
            format!("range '{}' has an unterminated tab name", input),
            "close the tab name with a quote, e.g. 'My Tab'!A1",
        ));
    }

    match input.split_once('!') {
        Some((sheet, refs)) if !sheet.is_empty() => Ok(Split::Refs(sheet.to_string(), refs)),
        Some(_) => Err(bad_range(input, "the tab name before '!' is empty")),
        None => Ok(Split::Bare),
    }
}

fn parse_refs(refs: &str, whole: &str) -> Result<(CellRef, Option<CellRef>)> {
    match refs.split_once(':') {
        None => {
            let cell = CellRef::parse(refs, whole)?;
            if cell.kind() != RefKind::Cell {
                return Err(bad_range(whole, "a single reference needs a column and a row"));
            }
            Ok((cell, None))
        }
        Some((a, b)) => {
            if a.is_empty() || b.is_empty() {
                return Err(bad_range(whole, "both ends of ':' are required"));
            }
            let start = CellRef::parse(a, whole)?;
            let end = CellRef::parse(b, whole)?;
            let compatible = match start.kind() {
                RefKind::Cell => end.kind() != RefKind::Row,
                kind => kind == end.kind() || end.kind() == RefKind::Cell,
            };
            if !compatible {
                return Err(bad_range(whole, "range ends mix column-only and row-only references"));
            }
            Ok((start, Some(end)))
        }
    }
}

fn quote_sheet(sheet: &str) -> String {
    let plain = sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !sheet.chars().next().is_some_and(|c| c.is_ascii_digit())
        && A1Range::parse(sheet).map(|r| r.start.is_none()).unwrap_or(true);
    if plain {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}

fn bad_range(input: &str, reason: &str) -> Error {
    Error::validation(
        format!("invalid range '{}': {}", input, reason),
        "use A1 notation such as Sheet1!A1:C10, Sheet1!A:C or 'My Tab'!1:12",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("aa"), Some(26));
        assert_eq!(column_index("ZZZ"), Some(MAX_COLUMN));
        assert_eq!(column_index("A1"), None);
        assert_eq!(column_index(""), None);
    }

    #[test]
    fn test_parse_block() {
        let range = A1Range::parse("Files!B1:C12").unwrap();
        assert_eq!(range.sheet.as_deref(), Some("Files"));
        let b = range.bounds();
        assert_eq!((b.row_start, b.row_end), (0, Some(11)));
        assert_eq!((b.col_start, b.col_end), (1, Some(2)));
        assert_eq!(range.to_string(), "Files!B1:C12");
    }

    #[test]
    fn test_parse_open_forms() {
        let rows = A1Range::parse("AGENTFS!1:12").unwrap();
        let b = rows.bounds();
        assert_eq!((b.row_start, b.row_end, b.col_end), (0, Some(11), None));

        let cols = A1Range::parse("AGENTFS!A:C").unwrap();
        let b = cols.bounds();
        assert_eq!((b.col_start, b.col_end, b.row_end), (0, Some(2), None));

        let open = A1Range::parse("Data!A2:C").unwrap();
        let b = open.bounds();
        assert_eq!((b.row_start, b.row_end), (1, None));
    }

    #[test]
    fn test_parse_quoted_sheet() {
        let range = A1Range::parse("'My Tab'!A1").unwrap();
        assert_eq!(range.sheet.as_deref(), Some("My Tab"));
        assert_eq!(range.to_string(), "'My Tab'!A1");

        let range = A1Range::parse("'It''s'!A1:B2").unwrap();
        assert_eq!(range.sheet.as_deref(), Some("It's"));
        assert_eq!(range.to_string(), "'It''s'!A1:B2");

        let whole = A1Range::parse("'My Tab'").unwrap();
        assert_eq!(whole.sheet.as_deref(), Some("My Tab"));
        assert!(whole.start.is_none());
    }

    #[test]
    fn test_bare_forms() {
        let cell = A1Range::parse("C3").unwrap();
        assert!(cell.sheet.is_none());
        assert_eq!(cell.start, Some(CellRef::cell(2, 2)));

        let whole = A1Range::parse("Sheet1").unwrap();
        assert_eq!(whole.sheet.as_deref(), Some("Sheet1"));
        assert!(whole.start.is_none());
    }

    #[test]
    fn test_reversed_block_is_normalized() {
        let b = A1Range::parse("S!C3:A1").unwrap().bounds();
        assert_eq!((b.row_start, b.row_end), (0, Some(2)));
        assert_eq!((b.col_start, b.col_end), (0, Some(2)));
    }

    #[test]
    fn test_invalid_ranges() {
        for bad in ["", "S!", "S!A0", "S!A1:", "!A1", "S!A:1", "'Tab!A1", "S!1A", "'Tab'A1"] {
            let err = A1Range::parse(bad).unwrap_err();
            assert!(
                matches!(err, Error::Validation { suggestion: Some(_), .. }),
                "{} should be rejected with a suggestion",
                bad
            );
        }
    }

    #[test]
    fn test_quoting_when_needed() {
        assert_eq!(A1Range::block("A1", 0, 0, 0, 0).to_string(), "'A1'!A1:A1");
        assert_eq!(A1Range::sheet("Sheet 2").to_string(), "'Sheet 2'");
        assert_eq!(A1Range::rows("AGENTFS", 0, 11).to_string(), "AGENTFS!1:12");
    }
}
