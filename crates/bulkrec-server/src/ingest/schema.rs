//! Canonical record layout
//!
//! Producers label their columns inconsistently (and the header line is often
//! garbled by a bad code page), so columns are identified by position only. The
//! order of [`Field::ALL`] is the order of the producer's export format.

use serde::{Deserialize, Serialize};

/// Value type a field is coerced to at reconciliation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    /// 8-digit `YYYYMMDD` date code
    Date,
}

/// One column of the canonical layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    RecordCode,
    Name,
    NameKana,
    CategoryCode,
    PostalCode,
    Address,
    Phone,
    Quantity,
    Amount,
    RegisteredOn,
    UpdatedOn,
    StatusCode,
    Remarks,
}

/// Number of canonical columns
pub const FIELD_COUNT: usize = Field::ALL.len();

/// The field used for insert-or-update conflict resolution
pub const BUSINESS_KEY: Field = Field::RecordCode;

impl Field {
    pub const ALL: [Field; 13] = [
        Field::RecordCode,
        Field::Name,
        Field::NameKana,
        Field::CategoryCode,
        Field::PostalCode,
        Field::Address,
        Field::Phone,
        Field::Quantity,
        Field::Amount,
        Field::RegisteredOn,
        Field::UpdatedOn,
        Field::StatusCode,
        Field::Remarks,
    ];

    /// Column position in every normalized row
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical column name, also the store's column name
    pub fn name(self) -> &'static str {
        match self {
            Field::RecordCode => "record_code",
            Field::Name => "name",
            Field::NameKana => "name_kana",
            Field::CategoryCode => "category_code",
            Field::PostalCode => "postal_code",
            Field::Address => "address",
            Field::Phone => "phone",
            Field::Quantity => "quantity",
            Field::Amount => "amount",
            Field::RegisteredOn => "registered_on",
            Field::UpdatedOn => "updated_on",
            Field::StatusCode => "status_code",
            Field::Remarks => "remarks",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Quantity | Field::Amount => FieldKind::Integer,
            Field::RegisteredOn | Field::UpdatedOn => FieldKind::Date,
            _ => FieldKind::Text,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The header line written in place of whatever the producer sent
pub fn canonical_header() -> String {
    Field::ALL
        .iter()
        .map(|f| f.name())
        .collect::<Vec<_>>()
        .join(",")
}
