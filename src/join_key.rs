use crate::data::CellValue;

/// Identifying fields tried, in order, when no join key was chosen.
const JOIN_KEY_CANDIDATES: &[&str] = &[
    "id",
    "uuid",
    "email",
    "phone",
    "phone_number",
    "mobile",
    "serial",
    "serial_number",
    "order_id",
    "invoice_id",
    "customer_id",
    "user_id",
    "member_id",
    "account_id",
    "employee_id",
    "student_id",
    "订单号",
    "编号",
    "序列号",
    "手机号",
    "电话",
    "邮箱",
];

const PHONE_KEYWORDS: &[&str] = &["phone", "mobile", "电话", "手机"];
const EMAIL_KEYWORDS: &[&str] = &["email", "邮箱"];

pub fn pick_default_join_key(unified_schema: &[String]) -> String {
    if let Some(exact) = JOIN_KEY_CANDIDATES
        .iter()
        .find(|c| unified_schema.iter().any(|f| f == *c))
    {
        return exact.to_string();
    }
    let lowered = unified_schema
        .iter()
        .map(|f| f.to_lowercase())
        .collect::<Vec<_>>();
    match JOIN_KEY_CANDIDATES
        .iter()
        .find_map(|c| lowered.iter().position(|f| f == c))
    {
        Some(idx) => unified_schema[idx].clone(),
        None => unified_schema.first().cloned().unwrap_or_default(),
    }
}

/// Canonical join key for `value`, with rules chosen by the field name.
///
/// Phone-like fields keep digits only and email-like fields are lowercased;
/// everything else is just trimmed.
pub fn normalize_join_key(value: Option<&CellValue>, field_name: &str) -> String {
    let Some(value) = value else {
        return String::new();
    };
    let text = value.trimmed();
    let field = field_name.to_lowercase();
    if PHONE_KEYWORDS.iter().any(|k| field.contains(k)) {
        text.chars().filter(char::is_ascii_digit).collect()
    } else if EMAIL_KEYWORDS.iter().any(|k| field.contains(k)) {
        text.to_lowercase()
    } else {
        text
    }
}
