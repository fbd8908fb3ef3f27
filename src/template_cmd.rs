use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use log::info;
use serde::Serialize;

use crate::{
    cli::{TemplateArgs, TemplateCommands, TemplateSaveArgs},
    io_utils,
    mapping::{FileHeaders, MappingResult},
    template::MappingTemplate,
};

pub fn execute(args: &TemplateArgs) -> Result<()> {
    match &args.command {
        TemplateCommands::Save(save) => execute_save(args, save),
        TemplateCommands::List => execute_list(args),
        TemplateCommands::Clear => {
            crate::open_template_store(&args.store).clear()?;
            info!("Cleared stored templates in {:?}", args.store.store);
            Ok(())
        }
    }
}

fn execute_save(args: &TemplateArgs, save: &TemplateSaveArgs) -> Result<()> {
    let files = crate::load_inputs(&save.input)?;
    let headers = files.iter().map(FileHeaders::from).collect::<Vec<_>>();
    let result: MappingResult = io_utils::read_json(&save.mapping)
        .with_context(|| format!("Loading mapping {:?}", save.mapping))?;

    let now = crate::now_millis();
    let name = save
        .name
        .clone()
        .unwrap_or_else(|| format!("Mapping template {}", format_timestamp(now)));
    let template = MappingTemplate::from_result(&name, &headers, &result, now)?;
    crate::open_template_store(&args.store).remember(template)?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateSummary<'a> {
    id: &'a str,
    name: &'a str,
    files: usize,
    fields: usize,
    use_count: u64,
    last_used: String,
}

fn execute_list(args: &TemplateArgs) -> Result<()> {
    let mut templates = crate::open_template_store(&args.store).load()?;
    templates.sort_by_key(|t| std::cmp::Reverse(t.last_used_at.unwrap_or(t.updated_at)));
    let summaries = templates
        .iter()
        .map(|t| TemplateSummary {
            id: &t.id,
            name: &t.name,
            files: t.file_schemas.len(),
            fields: t.unified_schema.len(),
            use_count: t.use_count,
            last_used: format_timestamp(t.last_used_at.unwrap_or(t.updated_at)),
        })
        .collect::<Vec<_>>();
    io_utils::write_json(None, &summaries)
}

fn format_timestamp(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_in_utc() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13");
    }
}
