use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::{ExportArgs, MergeModeArg},
    io_utils,
    join_key::pick_default_join_key,
    mapping::MappingResult,
    merge::{MergeMode, merge},
};

pub fn execute(args: &ExportArgs) -> Result<()> {
    let files = crate::load_inputs(&args.input)?;
    let result: MappingResult = io_utils::read_json(&args.mapping)
        .with_context(|| format!("Loading mapping {:?}", args.mapping))?;

    let mode = match args.mode {
        MergeModeArg::Append => MergeMode::Append,
        MergeModeArg::Join => MergeMode::Join {
            key: args
                .key
                .clone()
                .unwrap_or_else(|| pick_default_join_key(&result.unified_schema)),
        },
    };
    let output = merge(&files, &result, &mode, args.lang)?;

    let delimiter =
        io_utils::resolve_output_delimiter(args.output.as_deref(), args.output_delimiter);
    let mut writer = io_utils::open_csv_writer(args.output.as_deref(), delimiter)?;
    let rows = io_utils::write_merge_output(&mut writer, &output)?;
    info!("Wrote {rows} row(s) with {} column(s)", output.fields.len() + 1);
    Ok(())
}
