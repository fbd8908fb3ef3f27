//! Append and Join execution over mapped source files.
//!
//! Append stacks every data row of every file in upload order. Join folds rows
//! sharing a normalized key into one output row: the first non-empty value
//! seen for a field wins and later files can only fill gaps. Join refuses to
//! run at all when any file has no column bound to the join key.

use std::collections::HashMap;

use log::{debug, info};
use thiserror::Error;

use crate::{
    headers::SourceFile,
    join_key::normalize_join_key,
    mapping::MappingResult,
    transform::{Locale, apply_transformations},
};

pub const APPEND_SOURCE_FIELD: &str = "_source_file";
pub const JOIN_SOURCE_FIELD: &str = "_source_files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeMode {
    Append,
    Join { key: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("Join mode requires a join key field")]
    JoinKeyRequired,
    #[error("Join key '{key}' is not mapped in: {}", .files.join(", "))]
    MissingJoinKeyMapping { key: String, files: Vec<String> },
}

/// One output row; `values` line up with the unified schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    pub values: Vec<String>,
    pub sources: Vec<String>,
}

impl MergedRow {
    fn blank(width: usize) -> Self {
        Self {
            values: vec![String::new(); width],
            sources: Vec::new(),
        }
    }

    pub fn provenance(&self) -> String {
        self.sources.join(",")
    }

    fn add_source(&mut self, file_name: &str) {
        if !self.sources.iter().any(|s| s == file_name) {
            self.sources.push(file_name.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutput {
    pub fields: Vec<String>,
    pub provenance_field: &'static str,
    pub rows: Vec<MergedRow>,
}

impl MergeOutput {
    pub fn headers(&self) -> Vec<String> {
        let mut headers = self.fields.clone();
        headers.push(self.provenance_field.to_string());
        headers
    }

    pub fn records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|row| {
            let mut record = row.values.clone();
            record.push(row.provenance());
            record
        })
    }

    /// Value of `field` in row `row`, if both exist.
    pub fn value(&self, row: usize, field: &str) -> Option<&str> {
        let idx = self.fields.iter().position(|f| f == field)?;
        self.rows.get(row).map(|r| r.values[idx].as_str())
    }
}

/// Files whose mapping binds no header to `key`.
pub fn join_key_missing_files(
    files: &[SourceFile],
    result: &MappingResult,
    key: &str,
) -> Vec<String> {
    files
        .iter()
        .filter(|file| result.original_header(&file.name, key).is_none())
        .map(|file| file.name.clone())
        .collect()
}

pub fn merge(
    files: &[SourceFile],
    result: &MappingResult,
    mode: &MergeMode,
    locale: Locale,
) -> Result<MergeOutput, MergeError> {
    match mode {
        MergeMode::Append => Ok(append(files, result, locale)),
        MergeMode::Join { key } => join(files, result, key, locale),
    }
}

/// Column index in `file` for each unified field, `None` when unmapped.
fn column_plan(file: &SourceFile, result: &MappingResult) -> Vec<Option<usize>> {
    result
        .unified_schema
        .iter()
        .map(|field| {
            result
                .original_header(&file.name, field)
                .and_then(|header| file.column_index(header))
        })
        .collect()
}

pub fn append(files: &[SourceFile], result: &MappingResult, locale: Locale) -> MergeOutput {
    let fields = &result.unified_schema;
    let mut rows = Vec::with_capacity(files.iter().map(SourceFile::row_count).sum());
    for file in files {
        let plan = column_plan(file, result);
        for row_idx in 0..file.row_count() {
            let values = plan
                .iter()
                .map(|col| {
                    col.and_then(|c| file.cell(row_idx, c))
                        .map(|cell| cell.as_display())
                        .unwrap_or_default()
                })
                .collect();
            let mut row = MergedRow {
                values,
                sources: vec![file.name.clone()],
            };
            apply_transformations(&mut row, fields, result.transformations.as_ref(), locale);
            rows.push(row);
        }
        debug!("Appended {} row(s) from '{}'", file.row_count(), file.name);
    }
    info!("Append produced {} row(s) from {} file(s)", rows.len(), files.len());
    MergeOutput {
        fields: fields.clone(),
        provenance_field: APPEND_SOURCE_FIELD,
        rows,
    }
}

pub fn join(
    files: &[SourceFile],
    result: &MappingResult,
    key: &str,
    locale: Locale,
) -> Result<MergeOutput, MergeError> {
    if key.is_empty() {
        return Err(MergeError::JoinKeyRequired);
    }
    let missing = join_key_missing_files(files, result, key);
    if !missing.is_empty() {
        return Err(MergeError::MissingJoinKeyMapping {
            key: key.to_string(),
            files: missing,
        });
    }

    let fields = &result.unified_schema;
    let key_idx = fields.iter().position(|f| f == key);
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut rows: Vec<MergedRow> = Vec::new();
    let mut skipped = 0usize;

    for file in files {
        let plan = column_plan(file, result);
        let key_column = result
            .original_header(&file.name, key)
            .and_then(|header| file.column_index(header));
        for row_idx in 0..file.row_count() {
            let key_cell = key_column.and_then(|c| file.cell(row_idx, c));
            let join_value = normalize_join_key(key_cell, key);
            if join_value.is_empty() {
                skipped += 1;
                continue;
            }
            let slot = *index.entry(join_value.clone()).or_insert_with(|| {
                rows.push(MergedRow::blank(fields.len()));
                rows.len() - 1
            });
            let merged = &mut rows[slot];
            merged.add_source(&file.name);

            for (field_idx, col) in plan.iter().enumerate() {
                if !merged.values[field_idx].is_empty() {
                    continue;
                }
                let value = if Some(field_idx) == key_idx {
                    join_value.clone()
                } else {
                    match col.and_then(|c| file.cell(row_idx, c)) {
                        Some(cell) => cell.trimmed(),
                        None => continue,
                    }
                };
                merged.values[field_idx] = value;
            }
        }
    }

    for row in &mut rows {
        apply_transformations(row, fields, result.transformations.as_ref(), locale);
    }
    info!(
        "Join on '{key}' produced {} row(s) from {} file(s); skipped {skipped} keyless row(s)",
        rows.len(),
        files.len()
    );
    Ok(MergeOutput {
        fields: fields.clone(),
        provenance_field: JOIN_SOURCE_FIELD,
        rows,
    })
}
