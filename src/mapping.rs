//! Unified schema mapping: result types, the rule-based mapper, and the
//! strategy seam between a remote suggestion service and the local fallback.
//!
//! Both strategies produce the same [`MappingResult`] shape, so downstream
//! code never needs to know which one answered. [`resolve_mapping`] is the
//! single decision point: it asks the remote strategy first and silently
//! substitutes the rule-based result when the remote answer is missing,
//! fails, or is structurally unusable.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::PathBuf,
    sync::LazyLock,
};

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::headers::SourceFile;

/// Unified field name -> original header in one file (`None` when absent).
pub type FieldMapping = BTreeMap<String, Option<String>>;

/// Unified field name -> natural-language derivation logic.
pub type Transformations = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileHeaders {
    pub file_name: String,
    pub headers: Vec<String>,
}

impl From<&SourceFile> for FileHeaders {
    fn from(file: &SourceFile) -> Self {
        FileHeaders {
            file_name: file.name.clone(),
            headers: file.headers.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMapping {
    pub file_name: String,
    pub mapping: FieldMapping,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MappingResult {
    #[serde(default)]
    pub unified_schema: Vec<String>,
    #[serde(default)]
    pub mappings: Vec<FileMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformations: Option<Transformations>,
}

impl MappingResult {
    pub fn mapping_for(&self, file_name: &str) -> Option<&FieldMapping> {
        self.mappings
            .iter()
            .find(|m| m.file_name == file_name)
            .map(|m| &m.mapping)
    }

    /// Original header bound to `field` in `file_name`; empty bindings count as absent.
    pub fn original_header(&self, file_name: &str, field: &str) -> Option<&str> {
        self.mapping_for(file_name)
            .and_then(|m| m.get(field))
            .and_then(|h| h.as_deref())
            .filter(|h| !h.is_empty())
    }

    /// Rebinds one unified field for `file`. An empty header clears the binding;
    /// any other header must be one of the file's own headers.
    pub fn set_mapping(&mut self, file: &FileHeaders, field: &str, header: &str) -> Result<()> {
        let file_name = file.file_name.as_str();
        if !self.unified_schema.iter().any(|f| f == field) {
            return Err(anyhow!("Field '{field}' is not part of the unified schema"));
        }
        if !header.is_empty() && !file.headers.iter().any(|h| h == header) {
            return Err(anyhow!(
                "File '{file_name}' has no header '{header}' (headers: {})",
                file.headers.join(", ")
            ));
        }
        let entry = self
            .mappings
            .iter_mut()
            .find(|m| m.file_name == file_name)
            .ok_or_else(|| anyhow!("No mapping exists for file '{file_name}'"))?;
        let value = (!header.is_empty()).then(|| header.to_string());
        entry.mapping.insert(field.to_string(), value);
        Ok(())
    }

    /// Adds a derived field fed only by a transformation, never by a source column.
    pub fn add_derived_field(&mut self, field: &str, logic: &str) {
        if !self.unified_schema.iter().any(|f| f == field) {
            self.unified_schema.push(field.to_string());
            for entry in &mut self.mappings {
                entry.mapping.insert(field.to_string(), None);
            }
        }
        self.transformations
            .get_or_insert_with(BTreeMap::new)
            .insert(field.to_string(), logic.to_string());
    }

    /// Usable when it names at least one unified field.
    pub fn is_structurally_valid(&self) -> bool {
        !self.unified_schema.is_empty()
    }

    /// Drops duplicate schema fields and gives every uploaded file a mapping
    /// restricted to the schema.
    fn conform_to(mut self, files: &[FileHeaders]) -> Self {
        let mut seen = HashSet::new();
        self.unified_schema.retain(|f| seen.insert(f.clone()));
        let by_name = self
            .mappings
            .into_iter()
            .map(|m| (m.file_name, m.mapping))
            .collect::<HashMap<_, _>>();
        self.mappings = files
            .iter()
            .map(|file| {
                let existing = by_name.get(&file.file_name);
                let mapping = self
                    .unified_schema
                    .iter()
                    .map(|field| {
                        let header = existing
                            .and_then(|m| m.get(field))
                            .cloned()
                            .flatten()
                            .filter(|h| !h.is_empty());
                        (field.clone(), header)
                    })
                    .collect();
                FileMapping {
                    file_name: file.file_name.clone(),
                    mapping,
                }
            })
            .collect();
        self
    }
}

/// Bilingual keyword rules, checked in order against a lowercased header.
fn keyword_field(s: &str) -> Option<&'static str> {
    let field = if s.contains("customer id")
        || (s.contains("客户") && s.contains("编号"))
        || s == "customer_id"
    {
        "customer_id"
    } else if s.contains("order no")
        || s.contains("order number")
        || (s.contains("订单") && s.contains('号'))
    {
        "order_id"
    } else if s.contains("serial") || (s.contains("序列") && s.contains('号')) {
        "serial_number"
    } else if s.contains("email") || s.contains("邮箱") {
        "email"
    } else if s.contains("phone")
        || s.contains("mobile")
        || s.contains("手机号")
        || s.contains("电话")
    {
        "phone_number"
    } else if s == "name" || s.contains(" full name") || s.contains("姓名") {
        "name"
    } else if s.contains("city") || s.contains("城市") {
        "city"
    } else if s.contains("date") || s.contains("日期") || s.contains("时间") {
        "date"
    } else if s.contains("amount")
        || s.contains("total")
        || s.contains("金额")
        || s.contains("总额")
    {
        "amount"
    } else if (s.contains("invoice")
        && (s.contains("id") || s.contains("no") || s.contains("number")))
        || s.contains("发票")
    {
        "invoice_id"
    } else {
        return None;
    };
    Some(field)
}

static INVISIBLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[\u{200B}-\u{200D}\u{FEFF}]").expect("valid regex"));
static NON_ALNUM_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9]+").expect("valid regex"));

/// Canonical unified field name for a raw header, or `None` for junk headers.
pub fn canonicalize_header(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if let Some(field) = keyword_field(&lower) {
        return Some(field.to_string());
    }

    let visible = INVISIBLE_CHARS.replace_all(&lower, "");
    let slug = NON_ALNUM_RUN.replace_all(&visible, "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() || slug.starts_with("unnamed") || slug == "col" || slug == "column" {
        return None;
    }
    Some(slug.to_string())
}

/// Deterministic mapping built from keyword rules and header slugs.
///
/// Fields present in more files rank first; ties are broken alphabetically.
pub fn generate_mapping_fallback(files: &[FileHeaders]) -> MappingResult {
    let per_file = files
        .iter()
        .map(|file| {
            let mut canonical: HashMap<String, String> = HashMap::new();
            for header in &file.headers {
                if let Some(field) = canonicalize_header(header) {
                    canonical.entry(field).or_insert_with(|| header.clone());
                }
            }
            (file.file_name.as_str(), canonical)
        })
        .collect::<Vec<_>>();

    let counts = per_file
        .iter()
        .flat_map(|(_, canonical)| canonical.keys())
        .counts();
    let unified_schema = counts
        .into_iter()
        .sorted_by(|(a, a_count), (b, b_count)| b_count.cmp(a_count).then_with(|| a.cmp(b)))
        .map(|(field, _)| field.clone())
        .collect::<Vec<_>>();

    let mappings = per_file
        .iter()
        .map(|(file_name, canonical)| FileMapping {
            file_name: file_name.to_string(),
            mapping: unified_schema
                .iter()
                .map(|field| (field.clone(), canonical.get(field).cloned()))
                .collect(),
        })
        .collect();

    debug!(
        "Rule-based mapping produced {} unified field(s) across {} file(s)",
        unified_schema.len(),
        files.len()
    );
    MappingResult {
        unified_schema,
        mappings,
        transformations: None,
    }
}

/// Produces a mapping suggestion for a batch of uploaded files.
pub trait MappingSuggester {
    fn name(&self) -> &str;
    fn suggest(&self, files: &[FileHeaders]) -> Result<MappingResult>;
}

pub struct RuleBasedSuggester;

impl MappingSuggester for RuleBasedSuggester {
    fn name(&self) -> &str {
        "rules"
    }

    fn suggest(&self, files: &[FileHeaders]) -> Result<MappingResult> {
        Ok(generate_mapping_fallback(files))
    }
}

/// Reads a suggestion previously obtained from the remote mapping service.
pub struct ResponseFileSuggester {
    path: PathBuf,
}

impl ResponseFileSuggester {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MappingSuggester for ResponseFileSuggester {
    fn name(&self) -> &str {
        "ai-response"
    }

    fn suggest(&self, _files: &[FileHeaders]) -> Result<MappingResult> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Reading mapping response {:?}", self.path))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Parsing mapping response {:?}", self.path))
    }
}

/// Asks `remote` first and falls back to the rule-based mapper when it is
/// absent, errors, or returns an empty unified schema.
pub fn resolve_mapping(
    remote: Option<&dyn MappingSuggester>,
    files: &[FileHeaders],
) -> MappingResult {
    if let Some(remote) = remote {
        match remote.suggest(files) {
            Ok(result) if result.is_structurally_valid() => {
                debug!("Using mapping suggested by '{}'", remote.name());
                return result.conform_to(files);
            }
            Ok(_) => warn!(
                "'{}' returned an empty unified schema; falling back to rule-based mapping",
                remote.name()
            ),
            Err(err) => warn!(
                "'{}' failed ({err:#}); falling back to rule-based mapping",
                remote.name()
            ),
        }
    }
    generate_mapping_fallback(files)
}
