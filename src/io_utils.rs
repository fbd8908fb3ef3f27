//! I/O utilities: grid ingestion, encodings, delimiters, and output writers.
//!
//! - **Ingestion**: CSV/TSV files are read header-less and flexible so title
//!   rows and ragged lines survive until header detection; `.json` inputs are
//!   read as an array of row arrays with typed cells.
//! - **Delimiter resolution**: extension-based (`.tsv` → tab, otherwise comma)
//!   with manual override.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    collections::HashSet,
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    data::{CellValue, Grid},
    headers::{SourceFile, build_source_file, pick_header_row_index},
    merge::MergeOutput,
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>) -> u8 {
    if let Some(delim) = provided {
        return delim;
    }
    match path.and_then(|p| p.extension()).and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    }
}

/// Display name of an input, as it appears in provenance columns.
pub fn file_display_name(path: &Path) -> String {
    if is_dash(path) {
        return "stdin".to_string();
    }
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Display names for a batch of inputs, suffixed (`orders_2.csv`) where
/// files from different directories share a name.
pub fn unique_display_names(paths: &[PathBuf]) -> Vec<String> {
    let mut taken = HashSet::new();
    paths
        .iter()
        .map(|path| {
            let base = file_display_name(path);
            let mut name = base.clone();
            let mut ordinal = 1;
            while !taken.insert(name.clone()) {
                ordinal += 1;
                name = match base.rsplit_once('.') {
                    Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{ordinal}.{ext}"),
                    _ => format!("{base}_{ordinal}"),
                };
            }
            name
        })
        .collect()
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    Ok(if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    })
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads a delimited file as a raw grid: no header handling, ragged rows allowed.
pub fn read_csv_grid<R: Read>(
    reader: R,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Grid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(reader);
    reader
        .byte_records()
        .enumerate()
        .map(|(idx, record)| -> Result<Vec<CellValue>> {
            let record = record.with_context(|| format!("Reading row {}", idx + 1))?;
            let decoded = decode_record(&record, encoding)
                .with_context(|| format!("Decoding row {}", idx + 1))?;
            Ok(decoded.into_iter().map(CellValue::from).collect())
        })
        .collect()
}

/// Parses a JSON array of row arrays. Numbers stay numeric, `null` is empty,
/// and booleans become text.
pub fn parse_json_grid(raw: &str) -> Result<Grid> {
    let rows: Vec<Vec<serde_json::Value>> =
        serde_json::from_str(raw).context("Expected a JSON array of row arrays")?;
    Ok(rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    serde_json::Value::Null => CellValue::Empty,
                    serde_json::Value::Number(n) => {
                        n.as_f64().map(CellValue::Number).unwrap_or_default()
                    }
                    serde_json::Value::String(s) => CellValue::from(s),
                    other => CellValue::Text(other.to_string()),
                })
                .collect()
        })
        .collect())
}

pub fn read_grid(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Grid> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let raw = fs::read_to_string(path).with_context(|| format!("Reading {path:?}"))?;
        parse_json_grid(&raw).with_context(|| format!("Parsing grid from {path:?}"))
    } else {
        read_csv_grid(open_input(path)?, delimiter, encoding)
            .with_context(|| format!("Reading grid from {path:?}"))
    }
}

/// Reads one input as `name` and builds its [`SourceFile`]; `header_row`
/// overrides detection. An empty input yields a file with no headers or rows.
pub fn load_source(
    path: &Path,
    name: &str,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
    header_row: Option<usize>,
) -> Result<SourceFile> {
    let delimiter = resolve_input_delimiter(path, delimiter);
    let grid = read_grid(path, delimiter, encoding)?;
    if grid.is_empty() {
        warn!("Input {path:?} contains no rows");
    }
    let header_row = header_row.unwrap_or_else(|| pick_header_row_index(&grid));
    let file = build_source_file(name, &grid, header_row);
    debug!(
        "Loaded {:?}: header row {}, {} column(s), {} data row(s)",
        path,
        file.header_row_index,
        file.headers.len(),
        file.row_count()
    );
    Ok(file)
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    })
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(open_output(path)?))
}

pub fn write_merge_output<W: Write>(
    writer: &mut csv::Writer<W>,
    output: &MergeOutput,
) -> Result<usize> {
    writer
        .write_record(output.headers())
        .context("Writing output headers")?;
    let mut rows = 0usize;
    for (idx, record) in output.records().enumerate() {
        writer
            .write_record(&record)
            .with_context(|| format!("Writing output row {}", idx + 1))?;
        rows += 1;
    }
    writer.flush().context("Flushing output writer")?;
    Ok(rows)
}

pub fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let mut out = open_output(path)?;
    serde_json::to_writer_pretty(&mut out, value).context("Writing JSON output")?;
    writeln!(out).context("Writing JSON output")?;
    out.flush().context("Flushing JSON output")
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Reading {path:?}"))?;
    serde_json::from_str(&raw).with_context(|| format!("Parsing JSON from {path:?}"))
}
