use std::fmt;

use serde::{Deserialize, Serialize};

/// A single spreadsheet cell as delivered by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

/// Raw rectangular-ish grid of cells; rows may have different lengths.
pub type Grid = Vec<Vec<CellValue>>;

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn as_display(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(f) => {
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            CellValue::Empty => String::new(),
        }
    }

    /// Display text with surrounding whitespace removed.
    pub fn trimmed(&self) -> String {
        match self {
            CellValue::Text(s) => s.trim().to_string(),
            other => other.as_display(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
            CellValue::Empty => true,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// Whether trimmed text reads as a finite number.
pub fn is_numeric_text(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok_and(f64::is_finite)
}

pub fn grid_from_strings(rows: &[&[&str]]) -> Grid {
    rows.iter()
        .map(|row| row.iter().map(|cell| CellValue::from(*cell)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_without_trailing_fraction() {
        assert_eq!(CellValue::Number(42.0).as_display(), "42");
        assert_eq!(CellValue::Number(13.5).as_display(), "13.5");
        assert_eq!(CellValue::Empty.as_display(), "");
    }

    #[test]
    fn blank_detection_ignores_whitespace() {
        assert!(CellValue::text("   ").is_blank());
        assert!(CellValue::Empty.is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
        assert!(!CellValue::text(" x ").is_blank());
    }

    #[test]
    fn numeric_text_rejects_words_and_non_finite_values() {
        assert!(is_numeric_text(" 12.5 "));
        assert!(is_numeric_text("1e3"));
        assert!(!is_numeric_text("Order ID"));
        assert!(!is_numeric_text("NaN"));
        assert!(!is_numeric_text(""));
    }

    #[test]
    fn untagged_json_cells_decode_by_shape() {
        let cells: Vec<CellValue> = serde_json::from_str(r#"[1.5, "a", null]"#).unwrap();
        assert_eq!(
            cells,
            vec![CellValue::Number(1.5), CellValue::text("a"), CellValue::Empty]
        );
    }
}
