use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{template::DEFAULT_TEMPLATE_LIMIT, transform::Locale};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Unify differently-labelled spreadsheets into one standard table",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect the header row of each input and list its unique headers
    Probe(ProbeArgs),
    /// Build a unified schema and per-file field mapping for a batch of inputs
    Analyze(AnalyzeArgs),
    /// Merge inputs into one table by appending rows or joining on a key
    Export(ExportArgs),
    /// Save, list, or clear learned mapping templates
    Template(TemplateArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input CSV, TSV, or JSON grid file (repeat for each file)
    #[arg(short = 'i', long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    /// Force the 0-based header row: `N` for every input, `FILE=N` for one
    #[arg(long = "header-row", value_parser = parse_header_row, action = clap::ArgAction::Append)]
    pub header_rows: Vec<HeaderRowOverride>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Directory holding learned mapping templates
    #[arg(long = "store", default_value = ".csv-unify")]
    pub store: PathBuf,
    /// Maximum number of templates kept; least recently used are dropped
    #[arg(long = "template-limit", default_value_t = DEFAULT_TEMPLATE_LIMIT)]
    pub template_limit: usize,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Output JSON file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Destination mapping JSON file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Mapping suggestion previously returned by the AI mapping service
    #[arg(long = "ai-response")]
    pub ai_response: Option<PathBuf>,
    /// Ignore stored templates even when one matches
    #[arg(long = "no-templates")]
    pub no_templates: bool,
    /// Override one binding: `file:field=header` (empty header clears it)
    #[arg(long = "map", action = clap::ArgAction::Append)]
    pub overrides: Vec<String>,
    /// Add a derived field using `field=logic`
    #[arg(long = "derive", action = clap::ArgAction::Append)]
    pub derives: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
#[value(rename_all = "kebab-case")]
pub enum MergeModeArg {
    Append,
    #[default]
    Join,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Mapping JSON produced by `analyze`
    #[arg(short = 'm', long = "mapping")]
    pub mapping: PathBuf,
    /// Merge strategy
    #[arg(long = "mode", value_enum, default_value = "join")]
    pub mode: MergeModeArg,
    /// Unified field used as join key (defaults to the best identifying field)
    #[arg(short = 'k', long = "key")]
    pub key: Option<String>,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Delimiter to use for output (defaults by output extension)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Language for derived labels such as carrier names
    #[arg(long = "lang", value_enum, default_value = "en")]
    pub lang: Locale,
}

#[derive(Debug, Args)]
pub struct TemplateArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    #[command(subcommand)]
    pub command: TemplateCommands,
}

#[derive(Debug, Subcommand)]
pub enum TemplateCommands {
    /// Remember a confirmed mapping for the given inputs
    Save(TemplateSaveArgs),
    /// List stored templates, most recently used first
    List,
    /// Remove every stored template
    Clear,
}

#[derive(Debug, Args)]
pub struct TemplateSaveArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Mapping JSON to remember
    #[arg(short = 'm', long = "mapping")]
    pub mapping: PathBuf,
    /// Template display name (defaults to a dated name)
    #[arg(long)]
    pub name: Option<String>,
}

/// A forced header row, for one input (`file`) or for all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRowOverride {
    pub file: Option<String>,
    pub index: usize,
}

impl HeaderRowOverride {
    fn matches(&self, path: &Path, name: &str) -> bool {
        self.file
            .as_deref()
            .is_some_and(|file| file == name || Path::new(file) == path)
    }
}

pub fn parse_header_row(value: &str) -> Result<HeaderRowOverride, String> {
    let (file, index) = match value.rsplit_once('=') {
        Some((file, index)) => {
            let file = file.trim();
            if file.is_empty() {
                return Err(format!("Header row '{value}' must look like N or FILE=N"));
            }
            (Some(file.to_string()), index)
        }
        None => (None, value),
    };
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("Header row '{value}' needs a 0-based row number"))?;
    Ok(HeaderRowOverride { file, index })
}

/// Header row forced for the input at `path` loaded as `name`.
///
/// An override naming the file (by display name or as given on the command
/// line) beats a bare `N`; among equals the last one wins.
pub fn header_row_for(overrides: &[HeaderRowOverride], path: &Path, name: &str) -> Option<usize> {
    overrides
        .iter()
        .rev()
        .find(|o| o.matches(path, name))
        .or_else(|| overrides.iter().rev().find(|o| o.file.is_none()))
        .map(|o| o.index)
}

/// Per-file overrides that name none of the loaded inputs.
pub fn unmatched_header_rows<'a>(
    overrides: &'a [HeaderRowOverride],
    inputs: &[(&Path, &str)],
) -> Vec<&'a str> {
    overrides
        .iter()
        .filter(|o| !inputs.iter().any(|(path, name)| o.matches(path, name)))
        .filter_map(|o| o.file.as_deref())
        .collect()
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

/// Splits a `file:field=header` override.
pub fn parse_mapping_override(value: &str) -> Result<(String, String, String), String> {
    let (target, header) = value
        .split_once('=')
        .ok_or_else(|| format!("Override '{value}' must look like file:field=header"))?;
    let (file, field) = target
        .rsplit_once(':')
        .ok_or_else(|| format!("Override '{value}' must name a file and a field"))?;
    let (file, field) = (file.trim(), field.trim());
    if file.is_empty() || field.is_empty() {
        return Err(format!("Override '{value}' must name a file and a field"));
    }
    Ok((file.to_string(), field.to_string(), header.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiters_accept_names_and_single_chars() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert_eq!(parse_delimiter("#"), Ok(b'#'));
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn overrides_split_on_last_colon() {
        assert_eq!(
            parse_mapping_override("C:/data/a.csv:email = Mail "),
            Ok(("C:/data/a.csv".into(), "email".into(), "Mail".into()))
        );
        assert_eq!(
            parse_mapping_override("a.csv:email="),
            Ok(("a.csv".into(), "email".into(), String::new()))
        );
        assert!(parse_mapping_override("a.csv=Mail").is_err());
        assert!(parse_mapping_override(":email=Mail").is_err());
    }

    #[test]
    fn header_rows_accept_global_and_per_file_forms() {
        assert_eq!(
            parse_header_row("2"),
            Ok(HeaderRowOverride {
                file: None,
                index: 2
            })
        );
        assert_eq!(
            parse_header_row("crm.csv=1"),
            Ok(HeaderRowOverride {
                file: Some("crm.csv".into()),
                index: 1
            })
        );
        assert!(parse_header_row("=1").is_err());
        assert!(parse_header_row("crm.csv=first").is_err());
    }

    #[test]
    fn per_file_header_row_beats_the_global_one() {
        let overrides = ["0", "jan/crm.csv=1", "shop.csv=3"]
            .map(|raw| parse_header_row(raw).unwrap())
            .to_vec();
        let crm = Path::new("jan/crm.csv");
        let shop = Path::new("data/shop.csv");
        let other = Path::new("other.csv");
        assert_eq!(header_row_for(&overrides, crm, "crm.csv"), Some(1));
        assert_eq!(header_row_for(&overrides, shop, "shop.csv"), Some(3));
        assert_eq!(header_row_for(&overrides, other, "other.csv"), Some(0));
        assert_eq!(header_row_for(&overrides[1..], other, "other.csv"), None);
        assert_eq!(
            unmatched_header_rows(&overrides, &[(crm, "crm.csv"), (other, "other.csv")]),
            vec!["shop.csv"]
        );
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
