//! Row ↔ record conversion and write-data normalization

use indexmap::IndexMap;

use super::value::CellValue;

/// One row keyed by header, in header order.
pub type Record = IndexMap<String, CellValue>;

/// Map a row onto headers. Cells the row does not reach become
/// [`CellValue::Empty`] rather than missing keys.
pub fn row_to_record(headers: &[String], row: &[CellValue]) -> Record {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| (header.clone(), row.get(i).cloned().unwrap_or_default()))
        .collect()
}

pub fn rows_to_records(headers: &[String], rows: &[Vec<CellValue>]) -> Vec<Record> {
    rows.iter().map(|row| row_to_record(headers, row)).collect()
}

/// Treat the first row as headers and the rest as records.
pub fn grid_to_records(grid: &[Vec<CellValue>]) -> (Vec<String>, Vec<Record>) {
    let Some((first, rest)) = grid.split_first() else {
        return (Vec::new(), Vec::new());
    };
    let headers: Vec<String> = first.iter().map(CellValue::to_display).collect();
    let records = rows_to_records(&headers, rest);
    (headers, records)
}

/// Flatten a record in header order; absent or null values become `""`.
pub fn record_to_row(headers: &[String], record: &Record) -> Vec<CellValue> {
    headers
        .iter()
        .map(|header| match record.get(header) {
            None | Some(CellValue::Empty) => CellValue::text(""),
            Some(value) => value.clone(),
        })
        .collect()
}

/// How to produce a header row when writing records.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Headers {
    /// Use these headers, in this order
    Explicit(Vec<String>),
    /// Take the keys of the first record
    #[default]
    Auto,
    /// Write data rows only, ordered by the first record's keys
    Suppressed,
}

/// Data accepted by range writes.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteData {
    /// Raw cells, written as given
    Grid(Vec<Vec<CellValue>>),
    /// Uniform records, flattened to rows
    Records { records: Vec<Record>, headers: Headers },
}

impl WriteData {
    pub fn records(records: Vec<Record>) -> Self {
        WriteData::Records {
            records,
            headers: Headers::Auto,
        }
    }

    /// Normalize to a grid of rows.
    pub fn into_rows(self) -> Vec<Vec<CellValue>> {
        match self {
            WriteData::Grid(rows) => rows,
            WriteData::Records { records, headers } => {
                let (columns, emit_header) = match headers {
                    Headers::Explicit(columns) => (columns, true),
                    Headers::Auto => (first_keys(&records), true),
                    Headers::Suppressed => (first_keys(&records), false),
                };
                if columns.is_empty() {
                    return Vec::new();
                }

                let mut rows = Vec::with_capacity(records.len() + 1);
                if emit_header {
                    rows.push(columns.iter().map(|c| CellValue::text(c.as_str())).collect());
                }
                rows.extend(records.iter().map(|record| record_to_row(&columns, record)));
                rows
            }
        }
    }
}

fn first_keys(records: &[Record]) -> Vec<String> {
    records
        .first()
        .map(|record| record.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_short_row_fills_nulls() {
        let record = row_to_record(
            &headers(&["name", "age", "city"]),
            &[CellValue::text("ada"), CellValue::Number(36.0)],
        );
        assert_eq!(record.len(), 3);
        assert_eq!(record["city"], CellValue::Empty);
        assert_eq!(record.keys().collect::<Vec<_>>(), ["name", "age", "city"]);
    }

    #[test]
    fn test_grid_to_records() {
        let grid = vec![
            vec![CellValue::text("id"), CellValue::text("title")],
            vec![CellValue::Number(1.0), CellValue::text("first")],
            vec![CellValue::Number(2.0)],
        ];
        let (hdrs, records) = grid_to_records(&grid);
        assert_eq!(hdrs, headers(&["id", "title"]));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["title"], CellValue::Empty);

        let (hdrs, records) = grid_to_records(&[]);
        assert!(hdrs.is_empty() && records.is_empty());
    }

    #[test]
    fn test_records_auto_headers() {
        let mut a = Record::new();
        a.insert("b".into(), CellValue::Number(1.0));
        a.insert("a".into(), CellValue::Empty);
        let mut b = Record::new();
        b.insert("a".into(), CellValue::text("x"));

        let rows = WriteData::records(vec![a, b]).into_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![CellValue::text("b"), CellValue::text("a")]);
        assert_eq!(rows[1], vec![CellValue::Number(1.0), CellValue::text("")]);
        assert_eq!(rows[2], vec![CellValue::text(""), CellValue::text("x")]);
    }

    #[test]
    fn test_records_explicit_and_suppressed_headers() {
        let mut rec = Record::new();
        rec.insert("a".into(), CellValue::text("1"));
        rec.insert("b".into(), CellValue::text("2"));

        let rows = WriteData::Records {
            records: vec![rec.clone()],
            headers: Headers::Explicit(headers(&["b", "z"])),
        }
        .into_rows();
        assert_eq!(rows[0], vec![CellValue::text("b"), CellValue::text("z")]);
        assert_eq!(rows[1], vec![CellValue::text("2"), CellValue::text("")]);

        let rows = WriteData::Records {
            records: vec![rec],
            headers: Headers::Suppressed,
        }
        .into_rows();
        assert_eq!(rows, vec![vec![CellValue::text("1"), CellValue::text("2")]]);
    }

    #[test]
    fn test_empty_records_produce_no_rows() {
        assert!(WriteData::records(vec![]).into_rows().is_empty());
    }
}
