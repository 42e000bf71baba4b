//! Typed coercion of staged rows
//!
//! Producers write dates as 8-digit codes with zero meaning "unset", and
//! integers with thousands separators. Each field is coerced once, here.

use chrono::NaiveDate;
use thiserror::Error;

use crate::ingest::normalizer::SourceRow;
use crate::ingest::schema::Field;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoerceError {
    #[error("line {line}: {field} is not an integer: '{value}'")]
    Integer { line: u64, field: Field, value: String },

    #[error("line {line}: {field} is not a valid date: '{value}'")]
    Date { line: u64, field: Field, value: String },
}

/// A row with every field in its store type; `None` is SQL NULL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRow {
    /// Line in the staged chunk, for error messages
    pub line: u64,
    pub record_code: Option<String>,
    pub name: Option<String>,
    pub name_kana: Option<String>,
    pub category_code: Option<String>,
    pub postal_code: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub quantity: Option<i64>,
    pub amount: Option<i64>,
    pub registered_on: Option<NaiveDate>,
    pub updated_on: Option<NaiveDate>,
    pub status_code: Option<String>,
    pub remarks: Option<String>,
}

pub fn coerce(row: &SourceRow) -> Result<CanonicalRow, CoerceError> {
    let text = |field: Field| parse_text(row.get(field));
    let integer = |field: Field| {
        let value = row.get(field);
        parse_integer(value).ok_or_else(|| CoerceError::Integer {
            line: row.line,
            field,
            value: value.to_string(),
        })
    };
    let date = |field: Field| {
        let value = row.get(field);
        parse_date(value).ok_or_else(|| CoerceError::Date {
            line: row.line,
            field,
            value: value.to_string(),
        })
    };

    Ok(CanonicalRow {
        line: row.line,
        record_code: text(Field::RecordCode),
        name: text(Field::Name),
        name_kana: text(Field::NameKana),
        category_code: text(Field::CategoryCode),
        postal_code: text(Field::PostalCode),
        address: text(Field::Address),
        phone: text(Field::Phone),
        quantity: integer(Field::Quantity)?,
        amount: integer(Field::Amount)?,
        registered_on: date(Field::RegisteredOn)?,
        updated_on: date(Field::UpdatedOn)?,
        status_code: text(Field::StatusCode),
        remarks: text(Field::Remarks),
    })
}

/// Trimmed text; empty is null
pub fn parse_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Signed integer with optional thousands separators
///
/// Outer `None` means the value is not an integer.
pub fn parse_integer(raw: &str) -> Option<Option<i64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(None);
    }

    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if digits.is_empty() || digits.starts_with(',') || digits.ends_with(',') {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit() || c == ',') {
        return None;
    }

    format!("{}{}", sign, digits.replace(',', ""))
        .parse::<i64>()
        .ok()
        .map(Some)
}

/// `YYYYMMDD`, `YYYY-MM-DD` or `YYYY/MM/DD`; empty or all zeros is null
///
/// Outer `None` means the value is not a date.
pub fn parse_date(raw: &str) -> Option<Option<NaiveDate>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '0') {
        return Some(None);
    }

    let format = match trimmed.len() {
        8 if trimmed.chars().all(|c| c.is_ascii_digit()) => "%Y%m%d",
        10 if trimmed.as_bytes()[4] == b'-' => "%Y-%m-%d",
        10 if trimmed.as_bytes()[4] == b'/' => "%Y/%m/%d",
        _ => return None,
    };

    NaiveDate::parse_from_str(trimmed, format).ok().map(Some)
}
