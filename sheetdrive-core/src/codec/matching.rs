//! Condition matching over cells and records

use super::records::Record;
use super::value::CellValue;

/// How a query value is compared with a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Type-aware equality
    #[default]
    Strict,
    /// Case-insensitive substring; `""` and `0` both mean "empty"
    Loose,
}

/// `column` must match `value` under the filter's mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub value: CellValue,
}

impl Condition {
    pub fn new(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

pub fn matches(cell: &CellValue, query: &CellValue, mode: MatchMode) -> bool {
    match mode {
        MatchMode::Strict => strict_eq(cell, query),
        MatchMode::Loose => loose_match(cell, query),
    }
}

/// Records satisfying every condition. A condition naming a column the
/// record lacks is compared against [`CellValue::Empty`].
pub fn filter_records<'a>(
    records: &'a [Record],
    conditions: &[Condition],
    mode: MatchMode,
) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|record| {
            conditions.iter().all(|cond| {
                let cell = record.get(&cond.column).unwrap_or(&CellValue::Empty);
                matches(cell, &cond.value, mode)
            })
        })
        .collect()
}

fn strict_eq(cell: &CellValue, query: &CellValue) -> bool {
    use CellValue::*;

    match (cell, query) {
        // A blank cell reads back as null or as "" depending on its position
        // in the row, so the two are the same value here.
        (Empty, Empty) => true,
        (Empty, Text(s)) | (Text(s), Empty) => s.is_empty(),
        (Empty, _) | (_, Empty) => false,
        (Number(a), Number(b)) => a == b,
        // Numeric coercion only with a numeric side and no empty string.
        (Number(n), Text(s)) | (Text(s), Number(n)) => {
            !s.is_empty() && s.trim().parse::<f64>().is_ok_and(|parsed| parsed == *n)
        }
        (Text(a), Text(b)) | (Formula(a), Formula(b)) => a == b,
        (Bool(a), Bool(b)) => a == b,
        _ => false,
    }
}

fn is_empty_like(value: &CellValue) -> bool {
    match value {
        CellValue::Empty => true,
        CellValue::Text(s) => s.is_empty(),
        CellValue::Number(n) => *n == 0.0,
        _ => false,
    }
}

fn loose_match(cell: &CellValue, query: &CellValue) -> bool {
    if is_empty_like(query) {
        return is_empty_like(cell);
    }
    cell.to_display()
        .to_lowercase()
        .contains(&query.to_display().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_vs_empty_string() {
        let zero = CellValue::Number(0.0);
        let empty = CellValue::text("");
        assert!(!matches(&zero, &empty, MatchMode::Strict));
        assert!(matches(&zero, &empty, MatchMode::Loose));
        assert!(matches(&empty, &zero, MatchMode::Loose));
    }

    #[test]
    fn test_strict_numeric_coercion() {
        assert!(matches(&CellValue::Number(5.0), &CellValue::text("5"), MatchMode::Strict));
        assert!(matches(&CellValue::text("2.50"), &CellValue::Number(2.5), MatchMode::Strict));
        assert!(!matches(&CellValue::text("5"), &CellValue::text("5.0"), MatchMode::Strict));
        assert!(!matches(&CellValue::Number(5.0), &CellValue::text("five"), MatchMode::Strict));
    }

    #[test]
    fn test_strict_null_only_matches_blank() {
        assert!(matches(&CellValue::Empty, &CellValue::Empty, MatchMode::Strict));
        assert!(matches(&CellValue::Empty, &CellValue::text(""), MatchMode::Strict));
        assert!(matches(&CellValue::text(""), &CellValue::Empty, MatchMode::Strict));
        assert!(matches(&CellValue::text(""), &CellValue::text(""), MatchMode::Strict));
        assert!(!matches(&CellValue::Empty, &CellValue::text(" "), MatchMode::Strict));
        assert!(!matches(&CellValue::Number(0.0), &CellValue::Empty, MatchMode::Strict));
        assert!(!matches(&CellValue::Bool(false), &CellValue::Empty, MatchMode::Strict));
    }

    #[test]
    fn test_strict_is_case_sensitive() {
        assert!(!matches(&CellValue::text("Active"), &CellValue::text("active"), MatchMode::Strict));
        assert!(!matches(&CellValue::Bool(true), &CellValue::text("true"), MatchMode::Strict));
    }

    #[test]
    fn test_loose_substring() {
        let cell = CellValue::text("Quarterly Report.md");
        assert!(matches(&cell, &CellValue::text("report"), MatchMode::Loose));
        assert!(!matches(&cell, &CellValue::text("summary"), MatchMode::Loose));
        assert!(!matches(&cell, &CellValue::text(""), MatchMode::Loose));
        assert!(matches(&CellValue::Number(120.0), &CellValue::text("12"), MatchMode::Loose));
    }

    #[test]
    fn test_filter_records() {
        let mut a = Record::new();
        a.insert("status".into(), CellValue::text("active"));
        a.insert("size".into(), CellValue::Number(10.0));
        let mut b = Record::new();
        b.insert("status".into(), CellValue::text("archived"));

        let records = vec![a, b];
        let hits = filter_records(
            &records,
            &[Condition::new("status", "active"), Condition::new("size", "10")],
            MatchMode::Strict,
        );
        assert_eq!(hits.len(), 1);

        let hits = filter_records(&records, &[Condition::new("size", "")], MatchMode::Loose);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["status"], CellValue::text("archived"));
    }
}
