//! Unify spreadsheets whose headers differ into one standard table.
//!
//! The pipeline: [`headers`] picks and cleans each file's header row,
//! [`mapping`] (or a stored [`template`]) assigns headers to a unified schema,
//! and [`merge`] appends or joins the mapped rows.

pub mod analyze;
pub mod cli;
pub mod data;
pub mod export;
pub mod headers;
pub mod io_utils;
pub mod join_key;
pub mod mapping;
pub mod merge;
pub mod storage;
pub mod template;
pub mod template_cmd;
pub mod transform;

use std::{env, path::PathBuf, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, info, warn};
use serde::Serialize;

use crate::{
    cli::{Cli, Commands, InputArgs, StoreArgs},
    headers::SourceFile,
    storage::DirStore,
    template::TemplateStore,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_unify", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Analyze(args) => analyze::execute(&args),
        Commands::Export(args) => export::execute(&args),
        Commands::Template(args) => template_cmd::execute(&args),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeReport<'a> {
    file_name: &'a str,
    header_row_index: usize,
    headers: &'a [String],
    row_count: usize,
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    let files = load_inputs(&args.input)?;
    let report = files
        .iter()
        .map(|file| ProbeReport {
            file_name: &file.name,
            header_row_index: file.header_row_index,
            headers: &file.headers,
            row_count: file.row_count(),
        })
        .collect::<Vec<_>>();
    io_utils::write_json(args.output.as_deref(), &report)
}

/// Reads every input in command-line order under a batch-unique name.
pub(crate) fn load_inputs(args: &InputArgs) -> Result<Vec<SourceFile>> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let names = io_utils::unique_display_names(&args.inputs);
    let batch = args
        .inputs
        .iter()
        .map(PathBuf::as_path)
        .zip(names.iter().map(String::as_str))
        .collect::<Vec<_>>();
    let unmatched = cli::unmatched_header_rows(&args.header_rows, &batch);
    if !unmatched.is_empty() {
        return Err(anyhow!(
            "--header-row names no loaded input: {}",
            unmatched.join(", ")
        ));
    }

    batch
        .into_iter()
        .map(|(path, name)| {
            if io_utils::file_display_name(path) != name {
                warn!("Input {path:?} shares its file name with another input; using '{name}'");
            }
            let header_row = cli::header_row_for(&args.header_rows, path, name);
            let file = io_utils::load_source(path, name, args.delimiter, encoding, header_row)
                .with_context(|| format!("Loading {path:?}"))?;
            info!(
                "Loaded '{}': {} header(s) at row {}, {} data row(s)",
                file.name,
                file.headers.len(),
                file.header_row_index,
                file.row_count()
            );
            Ok(file)
        })
        .collect()
}

pub(crate) fn open_template_store(args: &StoreArgs) -> TemplateStore<DirStore> {
    TemplateStore::new(DirStore::new(&args.store), args.template_limit)
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
