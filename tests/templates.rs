use std::collections::BTreeMap;

use csv_unify::{
    mapping::{FileHeaders, FileMapping, MappingResult},
    storage::{DirStore, KeyValueStore, MemoryStore},
    template::{
        MappingTemplate, TEMPLATES_STORAGE_KEY, TemplateStore, apply_template_to_files,
        enforce_templates_limit, find_best_template_for_files, upsert_template,
    },
};
use tempfile::tempdir;

fn file(name: &str, headers: &[&str]) -> FileHeaders {
    FileHeaders {
        file_name: name.to_string(),
        headers: headers.iter().map(|h| h.to_string()).collect(),
    }
}

fn mapping(pairs: &[(&str, &str)]) -> BTreeMap<String, Option<String>> {
    pairs
        .iter()
        .map(|(field, header)| (field.to_string(), Some(header.to_string())))
        .collect()
}

fn trained(name: &str, files: &[FileHeaders], now: i64) -> MappingTemplate {
    let result = MappingResult {
        unified_schema: vec!["Email".into(), "Phone".into()],
        mappings: files
            .iter()
            .map(|f| FileMapping {
                file_name: f.file_name.clone(),
                mapping: mapping(&[
                    ("Email", f.headers[0].as_str()),
                    ("Phone", f.headers[1].as_str()),
                ]),
            })
            .collect(),
        transformations: None,
    };
    MappingTemplate::from_result(name, files, &result, now).expect("template")
}

fn with_last_used(mut template: MappingTemplate, id: &str, last_used: i64) -> MappingTemplate {
    template.id = id.to_string();
    template.last_used_at = Some(last_used);
    template
}

#[test]
fn template_matches_batch_in_any_upload_order() {
    let template = trained(
        "crm",
        &[file("a.csv", &["email", "phone"]), file("b.csv", &["mail", "tel"])],
        1,
    );
    let templates = vec![template];

    let forward = [file("x.csv", &["Email", "Phone"]), file("y.csv", &["Mail", "Tel"])];
    let reversed = [file("y.csv", &["Mail", "Tel"]), file("x.csv", &["Email", "Phone"])];
    assert!(find_best_template_for_files(&templates, &forward).is_some());
    assert!(find_best_template_for_files(&templates, &reversed).is_some());

    let reordered_columns = [file("x.csv", &["Phone", "Email"]), file("y.csv", &["Mail", "Tel"])];
    assert!(find_best_template_for_files(&templates, &reordered_columns).is_none());
    let subset = [file("x.csv", &["Email", "Phone"])];
    assert!(find_best_template_for_files(&templates, &subset).is_none());
}

#[test]
fn applied_template_is_rekeyed_onto_new_file_names() {
    let template = trained("orders", &[file("export-1.csv", &["email", "phone"])], 1);
    let result = apply_template_to_files(&template, &[file("orders.xlsx", &["email", "phone"])]);
    assert_eq!(result.unified_schema, vec!["Email", "Phone"]);
    assert_eq!(
        result.mappings,
        vec![FileMapping {
            file_name: "orders.xlsx".into(),
            mapping: mapping(&[("Email", "email"), ("Phone", "phone")]),
        }]
    );
}

#[test]
fn limit_keeps_most_recently_used() {
    let base = trained("t", &[file("a.csv", &["email", "phone"])], 1);
    let templates = vec![
        with_last_used(base.clone(), "t1", 10),
        with_last_used(base.clone(), "t2", 20),
        with_last_used(base, "t3", 30),
    ];
    let kept = enforce_templates_limit(templates, 2);
    let ids = kept.iter().map(|t| t.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["t3", "t2"]);
}

#[test]
fn upsert_replaces_in_place_or_appends() {
    let base = trained("t", &[file("a.csv", &["email", "phone"])], 1);
    let templates = vec![
        with_last_used(base.clone(), "t1", 10),
        with_last_used(base.clone(), "t2", 20),
        with_last_used(base.clone(), "t3", 30),
    ];
    let mut renamed = templates[1].clone();
    renamed.name = "renamed".into();

    let replaced = upsert_template(templates, renamed);
    let ids = replaced.iter().map(|t| t.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["t1", "t2", "t3"]);
    assert_eq!(replaced[1].name, "renamed");

    let appended = upsert_template(replaced, with_last_used(base, "t4", 5));
    let ids = appended.iter().map(|t| t.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["t1", "t2", "t3", "t4"]);
}

#[test]
fn corrupt_store_is_treated_as_empty() {
    let store = TemplateStore::new(MemoryStore::with_entry(TEMPLATES_STORAGE_KEY, "{oops"), 50);
    assert!(store.load().expect("load").is_empty());
    let store = TemplateStore::new(MemoryStore::with_entry(TEMPLATES_STORAGE_KEY, "{}"), 50);
    assert!(store.load().expect("load").is_empty());
}

#[test]
fn directory_store_persists_between_instances() {
    let dir = tempdir().expect("temp dir");
    let files = [file("a.csv", &["email", "phone"])];

    let mut first = TemplateStore::new(DirStore::new(dir.path().join("store")), 50);
    first.remember(trained("crm", &files, 1)).expect("remember");

    let second = TemplateStore::new(DirStore::new(dir.path().join("store")), 50);
    let matched = second.find_match(&files).expect("find").expect("template match");
    assert_eq!(matched.name, "crm");
    assert!(
        second
            .storage()
            .get(TEMPLATES_STORAGE_KEY)
            .expect("get")
            .is_some_and(|raw| raw.contains("\"fileSchemas\""))
    );
}
