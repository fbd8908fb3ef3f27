use anyhow::{Context, Result, anyhow};
use log::info;

use crate::{
    cli::{AnalyzeArgs, parse_mapping_override},
    io_utils,
    join_key::pick_default_join_key,
    mapping::{
        FileHeaders, MappingResult, MappingSuggester, ResponseFileSuggester, resolve_mapping,
    },
    template::apply_template_to_files,
    transform::parse_derived_fields,
};

pub fn execute(args: &AnalyzeArgs) -> Result<()> {
    let files = crate::load_inputs(&args.input)?;
    let headers = files.iter().map(FileHeaders::from).collect::<Vec<_>>();

    let mut result = if args.no_templates {
        suggest(args, &headers)
    } else {
        let mut store = crate::open_template_store(&args.store);
        match store.find_match(&headers)? {
            Some(template) => {
                let used = store.record_use(&template, crate::now_millis())?;
                info!(
                    "Applied template '{}' (used {} time(s))",
                    used.name, used.use_count
                );
                apply_template_to_files(&used, &headers)
            }
            None => suggest(args, &headers),
        }
    };

    for raw in &args.overrides {
        let (file, field, header) = parse_mapping_override(raw).map_err(anyhow::Error::msg)?;
        let target = headers
            .iter()
            .find(|h| h.file_name == file)
            .ok_or_else(|| anyhow!("Override '{raw}' names no loaded input '{file}'"))?;
        result
            .set_mapping(target, &field, &header)
            .with_context(|| format!("Applying override '{raw}'"))?;
    }
    for derived in parse_derived_fields(&args.derives)? {
        result.add_derived_field(&derived.name, &derived.logic);
    }

    info!(
        "Unified schema has {} field(s); default join key '{}'",
        result.unified_schema.len(),
        pick_default_join_key(&result.unified_schema)
    );
    io_utils::write_json(args.output.as_deref(), &result)
}

fn suggest(args: &AnalyzeArgs, headers: &[FileHeaders]) -> MappingResult {
    let remote = args.ai_response.as_ref().map(ResponseFileSuggester::new);
    resolve_mapping(remote.as_ref().map(|r| r as &dyn MappingSuggester), headers)
}
