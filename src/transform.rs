//! Derived-field evaluation for merged rows.
//!
//! Transformations map a unified field to a short logic description. Only two
//! shapes are understood: a carrier lookup from `phone_number` and an
//! "extract"/"format" placeholder that flags the cell for manual fill. Any
//! other description is ignored. Transformations only ever fill empty cells.

use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use log::debug;
use regex::Regex;

use crate::{mapping::Transformations, merge::MergedRow};

pub const PHONE_FIELD: &str = "phone_number";

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Carrier {
    ChinaMobile,
    ChinaUnicom,
    ChinaTelecom,
    ChinaBroadnet,
    Unknown,
}

impl Carrier {
    pub fn label(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Carrier::ChinaMobile, Locale::En) => "China Mobile",
            (Carrier::ChinaUnicom, Locale::En) => "China Unicom",
            (Carrier::ChinaTelecom, Locale::En) => "China Telecom",
            (Carrier::ChinaBroadnet, Locale::En) => "China Broadnet",
            (Carrier::Unknown, Locale::En) => "Unknown",
            (Carrier::ChinaMobile, Locale::Zh) => "中国移动",
            (Carrier::ChinaUnicom, Locale::Zh) => "中国联通",
            (Carrier::ChinaTelecom, Locale::Zh) => "中国电信",
            (Carrier::ChinaBroadnet, Locale::Zh) => "中国广电",
            (Carrier::Unknown, Locale::Zh) => "未知运营商",
        }
    }
}

static CARRIER_PREFIXES: LazyLock<Vec<(Carrier, Regex)>> = LazyLock::new(|| {
    [
        (Carrier::ChinaMobile, r"^1(3[4-9]|47|5[012789]|78|8[23478]|98)"),
        (Carrier::ChinaUnicom, r"^1(3[0-2]|45|5[56]|66|7[156]|8[56])"),
        (Carrier::ChinaTelecom, r"^1(33|49|53|7[37]|8[019]|9[19])"),
        (Carrier::ChinaBroadnet, r"^192"),
    ]
    .into_iter()
    .map(|(carrier, pattern)| (carrier, Regex::new(pattern).expect("valid carrier pattern")))
    .collect()
});

/// Carrier for a phone value, or `None` when it holds no digits.
pub fn classify_carrier(phone: &str) -> Option<Carrier> {
    let digits = phone
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }
    let carrier = CARRIER_PREFIXES
        .iter()
        .find(|(_, pattern)| pattern.is_match(&digits))
        .map(|(carrier, _)| *carrier)
        .unwrap_or(Carrier::Unknown);
    Some(carrier)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformRule {
    CarrierLookup,
    Placeholder,
    Unsupported,
}

impl TransformRule {
    pub fn classify(field: &str, logic: &str) -> Self {
        let logic = logic.to_lowercase();
        if field.to_lowercase().contains("operator") || logic.contains("operator") {
            TransformRule::CarrierLookup
        } else if logic.contains("extract") || logic.contains("format") {
            TransformRule::Placeholder
        } else {
            TransformRule::Unsupported
        }
    }
}

/// A `field=logic` pair supplied on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedField {
    pub name: String,
    pub logic: String,
}

impl DerivedField {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.splitn(2, '=');
        let name = parts
            .next()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("Derived field is missing a name"))?;
        let logic = parts
            .next()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("Derived field '{name}' is missing its logic"))?;
        Ok(DerivedField {
            name: name.to_string(),
            logic: logic.to_string(),
        })
    }
}

pub fn parse_derived_fields(values: &[String]) -> Result<Vec<DerivedField>> {
    values.iter().map(|raw| DerivedField::parse(raw)).collect()
}

/// Fills empty cells of `row` from the recognised transformations.
pub fn apply_transformations(
    row: &mut MergedRow,
    fields: &[String],
    transformations: Option<&Transformations>,
    locale: Locale,
) {
    let Some(transformations) = transformations else {
        return;
    };
    let phone_idx = fields.iter().position(|f| f == PHONE_FIELD);
    for (field, logic) in transformations {
        let Some(idx) = fields.iter().position(|f| f == field) else {
            debug!("Transformation target '{field}' is not a unified field; skipping");
            continue;
        };
        if !row.values[idx].is_empty() {
            continue;
        }
        match TransformRule::classify(field, logic) {
            TransformRule::CarrierLookup => {
                let carrier = phone_idx.and_then(|p| classify_carrier(&row.values[p]));
                if let Some(carrier) = carrier {
                    row.values[idx] = carrier.label(locale).to_string();
                }
            }
            TransformRule::Placeholder => {
                row.values[idx] = format!("[AI: {logic}]");
            }
            TransformRule::Unsupported => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn row(values: &[&str]) -> MergedRow {
        MergedRow {
            values: values.iter().map(|v| v.to_string()).collect(),
            sources: vec!["a.csv".to_string()],
        }
    }

    #[test]
    fn carriers_follow_number_prefixes() {
        assert_eq!(classify_carrier("138-0013-8000"), Some(Carrier::ChinaMobile));
        assert_eq!(classify_carrier("13012345678"), Some(Carrier::ChinaUnicom));
        assert_eq!(classify_carrier("189 1234 5678"), Some(Carrier::ChinaTelecom));
        assert_eq!(classify_carrier("19212345678"), Some(Carrier::ChinaBroadnet));
        assert_eq!(classify_carrier("555-0100"), Some(Carrier::Unknown));
        assert_eq!(classify_carrier("n/a"), None);
    }

    #[test]
    fn rules_are_recognised_by_keyword() {
        assert_eq!(TransformRule::classify("Operator", "anything"), TransformRule::CarrierLookup);
        assert_eq!(
            TransformRule::classify("carrier", "Identify OPERATOR from phone"),
            TransformRule::CarrierLookup
        );
        assert_eq!(TransformRule::classify("year", "Extract year"), TransformRule::Placeholder);
        assert_eq!(TransformRule::classify("x", "sum columns"), TransformRule::Unsupported);
    }

    #[test]
    fn operator_is_filled_from_phone_number() {
        let schema = fields(&["phone_number", "operator", "year", "note"]);
        let transformations = BTreeMap::from([
            ("operator".to_string(), "carrier lookup".to_string()),
            ("year".to_string(), "Extract year from date".to_string()),
            ("note".to_string(), "translate".to_string()),
            ("absent".to_string(), "format it".to_string()),
        ]);
        let mut merged = row(&["13800138000", "", "", ""]);
        apply_transformations(&mut merged, &schema, Some(&transformations), Locale::Zh);
        assert_eq!(
            merged.values,
            vec!["13800138000", "中国移动", "[AI: Extract year from date]", ""]
        );
    }

    #[test]
    fn populated_cells_and_missing_phones_are_left_alone() {
        let schema = fields(&["phone_number", "operator", "year"]);
        let transformations = BTreeMap::from([
            ("operator".to_string(), "carrier".to_string()),
            ("year".to_string(), "format as yyyy".to_string()),
        ]);
        let mut merged = row(&["", "", "2024"]);
        apply_transformations(&mut merged, &schema, Some(&transformations), Locale::En);
        assert_eq!(merged.values, vec!["", "", "2024"]);
    }

    #[test]
    fn derived_fields_require_name_and_logic() {
        let parsed = DerivedField::parse("operator = Identify operator").unwrap();
        assert_eq!(parsed.name, "operator");
        assert_eq!(parsed.logic, "Identify operator");
        assert!(DerivedField::parse("=logic").is_err());
        assert!(DerivedField::parse("operator").is_err());
    }
}
