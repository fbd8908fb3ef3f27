//! Learned mapping templates, matched by file shape and bounded by recency.
//!
//! A template remembers the header shapes (schema keys) of the batch it was
//! confirmed on, the unified schema it produced, and one field mapping per
//! shape. A later upload whose set of shapes is exactly the same reuses it,
//! whatever the file names or upload order. Matching is exact only: one
//! differing header anywhere means no match.
//!
//! Persistence goes through an injected [`KeyValueStore`]. The whole list is
//! stored as one JSON array under [`TEMPLATES_STORAGE_KEY`] and is rewritten
//! wholesale on every change; least-recently-used templates beyond the cap
//! are dropped on save.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    headers::schema_key_from_headers,
    mapping::{FieldMapping, FileHeaders, FileMapping, MappingResult, Transformations},
    storage::KeyValueStore,
};

pub const TEMPLATES_STORAGE_KEY: &str = "excelCleaner.mappingTemplates.v1";
pub const TEMPLATE_VERSION: u32 = 1;
pub const DEFAULT_TEMPLATE_LIMIT: usize = 50;

/// Joins sorted schema keys into a batch fingerprint.
const SCHEMA_SET_SEPARATOR: &str = "\u{1e}";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileSchema {
    pub schema_key: String,
    pub headers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMapping {
    pub schema_key: String,
    pub mapping: FieldMapping,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MappingTemplate {
    pub version: u32,
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub file_schemas: Vec<FileSchema>,
    pub unified_schema: Vec<String>,
    pub mappings: Vec<SchemaMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformations: Option<Transformations>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<i64>,
    #[serde(default)]
    pub use_count: u64,
}

impl MappingTemplate {
    /// Captures a confirmed mapping result for the uploaded `files`.
    pub fn from_result(
        name: &str,
        files: &[FileHeaders],
        result: &MappingResult,
        now: i64,
    ) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("Template name cannot be empty"));
        }
        if files.is_empty() {
            return Err(anyhow!("A template needs at least one file"));
        }
        let file_schemas = files
            .iter()
            .map(|f| FileSchema {
                schema_key: schema_key_from_headers(&f.headers),
                headers: f.headers.clone(),
            })
            .collect::<Vec<_>>();
        let mappings = files
            .iter()
            .zip(&file_schemas)
            .map(|(f, schema)| SchemaMapping {
                schema_key: schema.schema_key.clone(),
                mapping: result.mapping_for(&f.file_name).cloned().unwrap_or_default(),
            })
            .collect();
        Ok(MappingTemplate {
            version: TEMPLATE_VERSION,
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            file_schemas,
            unified_schema: result.unified_schema.clone(),
            mappings,
            transformations: result.transformations.clone(),
            last_used_at: Some(now),
            use_count: 1,
        })
    }

    fn recency(&self) -> i64 {
        self.last_used_at.unwrap_or(self.updated_at)
    }

    fn schema_set(&self) -> String {
        make_schema_key_set(self.file_schemas.iter().map(|s| s.schema_key.clone()))
    }
}

fn make_schema_key_set(keys: impl IntoIterator<Item = String>) -> String {
    let mut keys = keys.into_iter().collect::<Vec<_>>();
    keys.sort();
    keys.join(SCHEMA_SET_SEPARATOR)
}

/// First template trained on exactly the same set of file shapes as `files`.
pub fn find_best_template_for_files<'a>(
    templates: &'a [MappingTemplate],
    files: &[FileHeaders],
) -> Option<&'a MappingTemplate> {
    let want = make_schema_key_set(files.iter().map(|f| schema_key_from_headers(&f.headers)));
    templates.iter().find(|t| t.schema_set() == want)
}

/// Re-keys the template's per-shape mappings onto the current file names.
pub fn apply_template_to_files(template: &MappingTemplate, files: &[FileHeaders]) -> MappingResult {
    let by_schema_key = template
        .mappings
        .iter()
        .map(|m| (m.schema_key.as_str(), &m.mapping))
        .collect::<HashMap<_, _>>();

    let mappings = files
        .iter()
        .map(|file| {
            let key = schema_key_from_headers(&file.headers);
            let stored = by_schema_key.get(key.as_str());
            let mapping = template
                .unified_schema
                .iter()
                .map(|field| {
                    let header = stored.and_then(|m| m.get(field)).cloned().flatten();
                    (field.clone(), header)
                })
                .collect::<BTreeMap<_, _>>();
            FileMapping {
                file_name: file.file_name.clone(),
                mapping,
            }
        })
        .collect();

    MappingResult {
        unified_schema: template.unified_schema.clone(),
        mappings,
        transformations: template.transformations.clone(),
    }
}

pub fn mark_template_used(template: &MappingTemplate, now: i64) -> MappingTemplate {
    MappingTemplate {
        last_used_at: Some(now),
        use_count: template.use_count + 1,
        updated_at: now,
        ..template.clone()
    }
}

/// Replaces the entry with the same id in place, or appends.
pub fn upsert_template(
    mut templates: Vec<MappingTemplate>,
    template: MappingTemplate,
) -> Vec<MappingTemplate> {
    match templates.iter().position(|t| t.id == template.id) {
        Some(idx) => templates[idx] = template,
        None => templates.push(template),
    }
    templates
}

/// Most recently used first, truncated to `limit` entries.
pub fn enforce_templates_limit(
    mut templates: Vec<MappingTemplate>,
    limit: usize,
) -> Vec<MappingTemplate> {
    if limit == 0 {
        return Vec::new();
    }
    templates.sort_by_key(|t| std::cmp::Reverse(t.recency()));
    if templates.len() > limit {
        let evicted = templates.split_off(limit);
        debug!(
            "Evicted {} template(s): {:?}",
            evicted.len(),
            evicted.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );
    }
    templates
}

/// Parses a persisted blob, keeping only well-formed version 1 entries.
pub fn parse_templates(raw: &str) -> Vec<MappingTemplate> {
    let entries = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(entries)) => entries,
        Ok(_) => {
            warn!("Template store does not hold a list; treating it as empty");
            return Vec::new();
        }
        Err(err) => {
            warn!("Template store is unreadable ({err}); treating it as empty");
            return Vec::new();
        }
    };
    let total = entries.len();
    let templates = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<MappingTemplate>(entry).ok())
        .filter(|t| t.version == TEMPLATE_VERSION)
        .collect::<Vec<_>>();
    if templates.len() != total {
        debug!("Skipped {} malformed template entr(ies)", total - templates.len());
    }
    templates
}

/// Template list persisted through an injected key-value capability.
pub struct TemplateStore<S: KeyValueStore> {
    storage: S,
    limit: usize,
}

impl<S: KeyValueStore> TemplateStore<S> {
    pub fn new(storage: S, limit: usize) -> Self {
        Self { storage, limit }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn load(&self) -> Result<Vec<MappingTemplate>> {
        Ok(self
            .storage
            .get(TEMPLATES_STORAGE_KEY)?
            .map(|raw| parse_templates(&raw))
            .unwrap_or_default())
    }

    pub fn save(&mut self, templates: &[MappingTemplate]) -> Result<()> {
        let raw = serde_json::to_string(templates)?;
        self.storage.set(TEMPLATES_STORAGE_KEY, &raw)
    }

    pub fn find_match(&self, files: &[FileHeaders]) -> Result<Option<MappingTemplate>> {
        let templates = self.load()?;
        Ok(find_best_template_for_files(&templates, files).cloned())
    }

    /// Upserts `template`, applies the cap, persists, and returns the new list.
    pub fn remember(&mut self, template: MappingTemplate) -> Result<Vec<MappingTemplate>> {
        let name = template.name.clone();
        let templates =
            enforce_templates_limit(upsert_template(self.load()?, template), self.limit);
        self.save(&templates)?;
        info!(
            "Stored template '{name}' ({} of at most {} kept)",
            templates.len(),
            self.limit
        );
        Ok(templates)
    }

    /// Marks `template` as used at `now` and persists the updated list.
    pub fn record_use(&mut self, template: &MappingTemplate, now: i64) -> Result<MappingTemplate> {
        let used = mark_template_used(template, now);
        let templates =
            enforce_templates_limit(upsert_template(self.load()?, used.clone()), self.limit);
        self.save(&templates)?;
        Ok(used)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.storage.remove(TEMPLATES_STORAGE_KEY)
    }
}
