use csv_unify::{
    data::grid_from_strings,
    headers::{SourceFile, ingest_grid},
    mapping::{FileHeaders, MappingResult, generate_mapping_fallback},
    merge::{MergeError, MergeMode, merge},
    transform::Locale,
};

fn source(name: &str, rows: &[&[&str]]) -> SourceFile {
    ingest_grid(name, &grid_from_strings(rows))
}

fn fallback(files: &[SourceFile]) -> MappingResult {
    let headers = files.iter().map(FileHeaders::from).collect::<Vec<_>>();
    generate_mapping_fallback(&headers)
}

fn customers() -> Vec<SourceFile> {
    vec![
        source(
            "crm.csv",
            &[
                &["Customer export", "", ""],
                &["Phone", "Name", "City"],
                &["138-0013-8000", "Ann", "Lyon"],
                &["139 0000 0001", "Bo", ""],
            ],
        ),
        source(
            "shop.csv",
            &[
                &["手机号码", "城市", "支付金额"],
                &["13800138000", "Paris", "12.5"],
                &["13900000001", "Oslo", "7"],
                &["13700000002", "Rome", "1"],
            ],
        ),
    ]
}

#[test]
fn append_row_count_is_sum_of_inputs() {
    let files = customers();
    assert_eq!(files[0].header_row_index, 1);
    let result = fallback(&files);
    let output = merge(&files, &result, &MergeMode::Append, Locale::En).expect("append");
    assert_eq!(output.rows.len(), 5);
    assert_eq!(output.headers().last().map(String::as_str), Some("_source_file"));
    assert_eq!(output.value(2, "amount"), Some("12.5"));
    assert_eq!(output.value(2, "name"), Some(""));
}

#[test]
fn join_merges_rows_with_equivalent_keys() {
    let files = customers();
    let result = fallback(&files);
    let mode = MergeMode::Join {
        key: "phone_number".into(),
    };
    let output = merge(&files, &result, &mode, Locale::En).expect("join");
    assert_eq!(output.rows.len(), 3);
    assert_eq!(output.value(0, "phone_number"), Some("13800138000"));
    assert_eq!(output.value(0, "city"), Some("Lyon"));
    assert_eq!(output.value(0, "amount"), Some("12.5"));
    assert_eq!(output.rows[0].provenance(), "crm.csv,shop.csv");
    assert_eq!(output.value(1, "city"), Some("Oslo"));
    assert_eq!(output.rows[2].provenance(), "shop.csv");
    assert_eq!(output.headers().last().map(String::as_str), Some("_source_files"));
}

#[test]
fn join_without_key_binding_produces_nothing() {
    let files = vec![
        source("a.csv", &[&["Email", "Name"], &["a@x.com", "Ann"]]),
        source("b.csv", &[&["Name", "City"], &["Bo", "Oslo"]]),
        source("c.csv", &[&["Name", "Notes"], &["Cy", "vip"]]),
    ];
    let result = fallback(&files);
    let mode = MergeMode::Join {
        key: "email".into(),
    };
    let err = merge(&files, &result, &mode, Locale::En).unwrap_err();
    assert_eq!(
        err,
        MergeError::MissingJoinKeyMapping {
            key: "email".into(),
            files: vec!["b.csv".into(), "c.csv".into()],
        }
    );
    assert_eq!(err.to_string(), "Join key 'email' is not mapped in: b.csv, c.csv");
}

#[test]
fn derived_operator_field_is_filled_after_join() {
    let files = customers();
    let mut result = fallback(&files);
    result.add_derived_field("operator", "Identify operator from phone number");
    let mode = MergeMode::Join {
        key: "phone_number".into(),
    };
    let output = merge(&files, &result, &mode, Locale::Zh).expect("join");
    assert_eq!(output.value(0, "operator"), Some("中国移动"));
    assert_eq!(output.value(2, "operator"), Some("中国移动"));
}
