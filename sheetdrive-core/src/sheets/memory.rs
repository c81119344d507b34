//! In-process spreadsheet
//!
//! Honors A1 ranges and provisioned grid sizes the way the hosted service
//! does (writes outside the grid fail with 400, unknown tabs fail to parse),
//! and can be told to fail upcoming calls so retry behavior is testable.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{Grid, RemoteError, RemoteResult, SheetInfo, SheetRequest, SheetsApi};
use crate::codec::{A1Range, CellValue, GridBounds};

/// Default grid of a freshly added tab.
const DEFAULT_ROWS: usize = 1000;
const DEFAULT_COLUMNS: usize = 26;

#[derive(Debug, Clone)]
struct Tab {
    title: String,
    sheet_id: i64,
    rows: usize,
    columns: usize,
    cells: Vec<Vec<CellValue>>,
}

impl Tab {
    fn get(&self, row: usize, col: usize) -> CellValue {
        self.cells
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or_default()
    }

    fn set(&mut self, row: usize, col: usize, value: CellValue) {
        if self.cells.len() <= row {
            self.cells.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.cells[row];
        if cells.len() <= col {
            cells.resize(col + 1, CellValue::Empty);
        }
        cells[col] = if value.is_blank() {
            CellValue::Empty
        } else {
            value
        };
    }

    fn info(&self) -> SheetInfo {
        SheetInfo {
            title: self.title.clone(),
            sheet_id: self.sheet_id,
            rows: self.rows,
            columns: self.columns,
        }
    }

    /// Clamp `bounds` to the grid, or fail if it starts outside it.
    fn clamp(&self, range: &A1Range, bounds: GridBounds) -> RemoteResult<(usize, usize, usize, usize)> {
        if bounds.row_start >= self.rows || bounds.col_start >= self.columns {
            return Err(self.grid_limit_error(range));
        }
        let row_end = bounds.row_end.unwrap_or(self.rows - 1).min(self.rows - 1);
        let col_end = bounds.col_end.unwrap_or(self.columns - 1).min(self.columns - 1);
        Ok((bounds.row_start, row_end, bounds.col_start, col_end))
    }

    fn grid_limit_error(&self, range: &A1Range) -> RemoteError {
        RemoteError::status(
            400,
            format!(
                "Range ({}) exceeds grid limits. Max rows: {}, max columns: {}",
                range, self.rows, self.columns
            ),
        )
    }

    fn last_used_row(&self, col_start: usize, col_end: usize) -> Option<usize> {
        self.cells.iter().enumerate().rev().find_map(|(i, row)| {
            let used = row
                .iter()
                .enumerate()
                .any(|(c, v)| c >= col_start && c <= col_end && !v.is_blank());
            used.then_some(i)
        })
    }

    fn delete_columns(&mut self, start: usize, end: usize) {
        for row in &mut self.cells {
            if start < row.len() {
                row.drain(start..end.min(row.len()));
            }
        }
        self.columns -= end - start;
    }
}

#[derive(Debug, Default, Clone)]
struct State {
    tabs: Vec<Tab>,
    next_id: i64,
}

impl State {
    fn tab_index(&self, range: &A1Range) -> RemoteResult<usize> {
        match &range.sheet {
            None if !self.tabs.is_empty() => Ok(0),
            None => Err(unparseable(range)),
            Some(title) => self
                .tabs
                .iter()
                .position(|t| &t.title == title)
                .ok_or_else(|| unparseable(range)),
        }
    }

    fn tab_by_title(&mut self, title: &str) -> RemoteResult<&mut Tab> {
        self.tabs
            .iter_mut()
            .find(|t| t.title == title)
            .ok_or_else(|| RemoteError::status(400, format!("No grid with title: {}", title)))
    }

    fn add_tab(&mut self, title: &str, rows: usize, columns: usize) -> RemoteResult<()> {
        if self.tabs.iter().any(|t| t.title == title) {
            return Err(RemoteError::status(
                400,
                format!(
                    "A sheet with the name \"{}\" already exists. Please enter another name.",
                    title
                ),
            ));
        }
        self.next_id += 1;
        self.tabs.push(Tab {
            title: title.to_string(),
            sheet_id: self.next_id,
            rows,
            columns,
            cells: Vec::new(),
        });
        Ok(())
    }

    fn read(&self, range: &A1Range) -> RemoteResult<Grid> {
        let tab = &self.tabs[self.tab_index(range)?];
        let (r0, r1, c0, c1) = tab.clamp(range, range.bounds())?;

        let mut grid: Grid = (r0..=r1)
            .map(|r| {
                let mut row: Vec<CellValue> = (c0..=c1).map(|c| tab.get(r, c)).collect();
                while row.last().is_some_and(CellValue::is_blank) {
                    row.pop();
                }
                row
            })
            .collect();
        while grid.last().is_some_and(|row| row.is_empty()) {
            grid.pop();
        }
        Ok(grid)
    }

    fn write(&mut self, range: &A1Range, rows: Grid) -> RemoteResult<()> {
        let idx = self.tab_index(range)?;
        let tab = &mut self.tabs[idx];
        let bounds = range.bounds();
        // A single cell is an anchor; values may extend past it.
        let (row_limit, col_limit) = match range.end {
            None => (None, None),
            Some(_) => (bounds.row_end, bounds.col_end),
        };

        // Validate every cell before touching any.
        for (i, row) in rows.iter().enumerate() {
            let r = bounds.row_start + i;
            if row_limit.is_some_and(|end| r > end) {
                return Err(RemoteError::status(
                    400,
                    format!(
                        "Requested writing within range [{}], but tried writing to row [{}]",
                        range,
                        r + 1
                    ),
                ));
            }
            let c = bounds.col_start + row.len().saturating_sub(1);
            if !row.is_empty() && col_limit.is_some_and(|end| c > end) {
                return Err(RemoteError::status(
                    400,
                    format!(
                        "Requested writing within range [{}], but tried writing to column [{}]",
                        range,
                        crate::codec::column_letter(c)
                    ),
                ));
            }
            if r >= tab.rows || (!row.is_empty() && c >= tab.columns) {
                return Err(tab.grid_limit_error(range));
            }
        }

        for (i, row) in rows.into_iter().enumerate() {
            for (j, value) in row.into_iter().enumerate() {
                tab.set(bounds.row_start + i, bounds.col_start + j, value);
            }
        }
        Ok(())
    }

    fn append(&mut self, range: &A1Range, rows: Grid) -> RemoteResult<()> {
        let idx = self.tab_index(range)?;
        let tab = &mut self.tabs[idx];
        let bounds = range.bounds();
        let col_end = bounds.col_end.unwrap_or(tab.columns.saturating_sub(1));

        let widest = rows.iter().map(Vec::len).max().unwrap_or(0);
        if widest > 0 && bounds.col_start + widest > tab.columns {
            return Err(tab.grid_limit_error(range));
        }

        let first = tab
            .last_used_row(bounds.col_start, col_end)
            .map(|r| (r + 1).max(bounds.row_start))
            .unwrap_or(bounds.row_start);
        // Appends insert rows as needed.
        tab.rows = tab.rows.max(first + rows.len());

        for (i, row) in rows.into_iter().enumerate() {
            for (j, value) in row.into_iter().enumerate() {
                tab.set(first + i, bounds.col_start + j, value);
            }
        }
        Ok(())
    }

    fn clear(&mut self, range: &A1Range) -> RemoteResult<()> {
        let idx = self.tab_index(range)?;
        let tab = &mut self.tabs[idx];
        let Ok((r0, r1, c0, c1)) = tab.clamp(range, range.bounds()) else {
            return Ok(());
        };
        for r in r0..=r1.min(tab.cells.len().saturating_sub(1)) {
            for c in c0..=c1 {
                if tab.cells.get(r).is_some_and(|row| c < row.len()) {
                    tab.set(r, c, CellValue::Empty);
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, request: SheetRequest) -> RemoteResult<()> {
        match request {
            SheetRequest::AddSheet {
                title,
                rows,
                columns,
            } => self.add_tab(&title, rows, columns),
            SheetRequest::DeleteSheet { title } => {
                let before = self.tabs.len();
                self.tabs.retain(|t| t.title != title);
                if self.tabs.len() == before {
                    return Err(RemoteError::status(
                        400,
                        format!("No grid with title: {}", title),
                    ));
                }
                Ok(())
            }
            SheetRequest::DeleteColumns { sheet, start, end } => {
                let tab = self.tab_by_title(&sheet)?;
                if start >= end || end > tab.columns {
                    return Err(RemoteError::status(
                        400,
                        format!("Invalid column range {}..{} on {}", start, end, sheet),
                    ));
                }
                tab.delete_columns(start, end);
                Ok(())
            }
            SheetRequest::AppendColumns { sheet, count } => {
                self.tab_by_title(&sheet)?.columns += count;
                Ok(())
            }
            SheetRequest::AppendRows { sheet, count } => {
                self.tab_by_title(&sheet)?.rows += count;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Default)]
struct Control {
    failures: VecDeque<RemoteError>,
    calls: usize,
}

/// An in-memory spreadsheet.
#[derive(Debug, Default)]
pub struct MemorySheets {
    state: Mutex<State>,
    control: Mutex<Control>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: add a tab with the default grid size.
    pub fn with_sheet(self, title: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            let _ = state.add_tab(title, DEFAULT_ROWS, DEFAULT_COLUMNS);
        }
        self
    }

    /// Write cells directly, bypassing failure injection and call counting.
    pub fn seed(&self, range: &A1Range, rows: Grid) -> RemoteResult<()> {
        self.lock_state()?.write(range, rows)
    }

    /// Current values of a whole tab, trimmed like a read.
    pub fn snapshot(&self, title: &str) -> Option<Grid> {
        let state = self.state.lock().ok()?;
        state.read(&A1Range::sheet(title)).ok()
    }

    pub fn has_sheet(&self, title: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.tabs.iter().any(|t| t.title == title))
            .unwrap_or(false)
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.fail_times(1, error);
    }

    /// Fail the next `times` calls with `error`.
    pub fn fail_times(&self, times: usize, error: RemoteError) {
        if let Ok(mut control) = self.control.lock() {
            control
                .failures
                .extend(std::iter::repeat(error).take(times));
        }
    }

    /// Number of API calls made so far (including failed ones).
    pub fn calls(&self) -> usize {
        self.control.lock().map(|c| c.calls).unwrap_or(0)
    }

    fn lock_state(&self) -> RemoteResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| RemoteError::other(format!("memory sheet poisoned: {}", e)))
    }

    /// Count the call and pop an injected failure, if any.
    fn enter(&self) -> RemoteResult<()> {
        let mut control = self
            .control
            .lock()
            .map_err(|e| RemoteError::other(format!("memory sheet poisoned: {}", e)))?;
        control.calls += 1;
        match control.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SheetsApi for MemorySheets {
    async fn sheets(&self) -> RemoteResult<Vec<SheetInfo>> {
        self.enter()?;
        Ok(self.lock_state()?.tabs.iter().map(Tab::info).collect())
    }

    async fn get_values(&self, range: &A1Range) -> RemoteResult<Grid> {
        self.enter()?;
        self.lock_state()?.read(range)
    }

    async fn update_values(&self, range: &A1Range, rows: Grid) -> RemoteResult<()> {
        self.enter()?;
        self.lock_state()?.write(range, rows)
    }

    async fn append_values(&self, range: &A1Range, rows: Grid) -> RemoteResult<()> {
        self.enter()?;
        self.lock_state()?.append(range, rows)
    }

    async fn clear_values(&self, range: &A1Range) -> RemoteResult<()> {
        self.enter()?;
        self.lock_state()?.clear(range)
    }

    async fn batch_update(&self, requests: Vec<SheetRequest>) -> RemoteResult<()> {
        self.enter()?;
        let mut state = self.lock_state()?;
        let mut staged = state.clone();
        for request in requests {
            staged.apply(request)?;
        }
        *state = staged;
        Ok(())
    }
}

fn unparseable(range: &A1Range) -> RemoteError {
    RemoteError::status(400, format!("Unable to parse range: {}", range))
}
