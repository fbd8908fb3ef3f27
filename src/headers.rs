//! Header canonicalization and header-row detection.
//!
//! Spreadsheets exported by humans rarely start with a clean header line:
//! titles, report dates and blank rows come first, and the header itself may
//! repeat labels or leave cells empty. This module picks the header row out of
//! a raw [`Grid`], makes its labels unique, and builds the order-preserving
//! schema key used to recognise a file shape across uploads.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::data::{CellValue, Grid, is_numeric_text};

/// Joins canonical headers inside one file's schema key.
pub const SCHEMA_KEY_SEPARATOR: char = '\u{1f}';

const HEADER_SCAN_ROWS: usize = 20;
const MIN_HEADER_CELLS: usize = 2;
const MIN_TEXT_RATIO: f64 = 0.6;

/// One ingested file: unique headers plus its data rows, aligned by position.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub header_row_index: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SourceFile {
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub fn canonicalize_headers<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    headers
        .iter()
        .map(|h| h.as_ref().trim().to_lowercase())
        .collect()
}

pub fn schema_key_from_headers<S: AsRef<str>>(headers: &[S]) -> String {
    canonicalize_headers(headers).join(&SCHEMA_KEY_SEPARATOR.to_string())
}

/// Index of the first plausible header row within the first rows of `grid`.
///
/// A row qualifies when it has at least two non-empty cells, at least two
/// distinct values ignoring case, and at least 60% of its cells are not
/// numbers. Falls back to row 0 when nothing qualifies.
pub fn pick_header_row_index(grid: &Grid) -> usize {
    for (idx, row) in grid.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let cells = row
            .iter()
            .map(CellValue::trimmed)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        if cells.len() < MIN_HEADER_CELLS {
            continue;
        }
        let distinct = cells
            .iter()
            .map(|s| s.to_lowercase())
            .collect::<HashSet<_>>();
        if distinct.len() < MIN_HEADER_CELLS {
            continue;
        }
        let textual = row
            .iter()
            .filter(|cell| !cell.is_blank())
            .filter(|cell| match cell {
                CellValue::Number(_) => false,
                other => !is_numeric_text(&other.trimmed()),
            })
            .count();
        if (textual as f64) / (cells.len() as f64) < MIN_TEXT_RATIO {
            continue;
        }
        debug!("Header row detected at index {idx}");
        return idx;
    }
    debug!("No header row candidate found; defaulting to row 0");
    0
}

/// Deduplicates header labels case-insensitively: `name`, `name_2`, `name_3`.
///
/// Empty labels become `unnamed_<position>` (1-based).
pub fn make_unique_headers<S: AsRef<str>>(raw_headers: &[S]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw_headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let trimmed = header.as_ref().trim();
            let base = if trimmed.is_empty() {
                format!("unnamed_{}", idx + 1)
            } else {
                trimmed.to_string()
            };
            let count = seen.entry(base.to_lowercase()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}_{count}")
            }
        })
        .collect()
}

/// Builds a [`SourceFile`] from `grid` using the row at `header_row_index`.
///
/// The index is clamped into the grid. Rows after the header keep one cell
/// per header; rows with no non-blank cell are dropped.
pub fn build_source_file(name: &str, grid: &Grid, header_row_index: usize) -> SourceFile {
    let header_row_index = header_row_index.min(grid.len().saturating_sub(1));
    let raw_headers = grid
        .get(header_row_index)
        .map(|row| row.iter().map(CellValue::trimmed).collect::<Vec<_>>())
        .unwrap_or_default();
    let headers = make_unique_headers(&raw_headers);

    let rows = grid
        .iter()
        .skip(header_row_index + 1)
        .filter_map(|row| {
            let cells = (0..headers.len())
                .map(|col| row.get(col).cloned().unwrap_or_default())
                .collect::<Vec<_>>();
            cells.iter().any(|c| !c.is_blank()).then_some(cells)
        })
        .collect::<Vec<_>>();

    debug!(
        "Built '{name}' with {} header(s) and {} data row(s) from header row {header_row_index}",
        headers.len(),
        rows.len()
    );
    SourceFile {
        name: name.to_string(),
        header_row_index,
        headers,
        rows,
    }
}

/// Detects the header row and builds the file in one step.
pub fn ingest_grid(name: &str, grid: &Grid) -> SourceFile {
    build_source_file(name, grid, pick_header_row_index(grid))
}
