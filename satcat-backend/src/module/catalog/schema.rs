//! Storage schema inference from field names

use satcat_common::FieldRecord;
use serde::Serialize;

/// Storage type proposed for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnType {
    /// Short fixed-length string (catalog numbers, designators)
    IdentifierString,
    Timestamp,
    /// Medium string (names, types, classes)
    ShortText,
    /// Unbounded text (TLE lines)
    LongText,
    Numeric,
    /// Default string when no rule matches
    FreeText,
    /// Auto-incrementing synthetic key
    Serial,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::IdentifierString => "identifier-string",
            ColumnType::Timestamp => "timestamp",
            ColumnType::ShortText => "short-text",
            ColumnType::LongText => "long-text",
            ColumnType::Numeric => "numeric",
            ColumnType::FreeText => "free-text",
            ColumnType::Serial => "serial",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Substring rules on the lower-cased field name, first match wins
const NAME_RULES: &[(&[&str], ColumnType)] = &[
    (&["norad", "id", "cat"], ColumnType::IdentifierString),
    (&["epoch", "date"], ColumnType::Timestamp),
    (&["name", "type", "class"], ColumnType::ShortText),
    (&["line"], ColumnType::LongText),
    (
        &["motion", "eccentric", "inclin", "anomaly", "node", "pericenter", "bstar"],
        ColumnType::Numeric,
    ),
];

pub const SYNTHETIC_KEY: &str = "id";
pub const CREATED_AT: &str = "created_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    pub name: String,
    pub column_type: ColumnType,
    /// Added by the inferrer rather than taken from the data
    pub implicit: bool,
}

/// Abstract storage table: columns, a primary key and one recommended index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDefinition {
    pub name: String,
    pub fields: Vec<SchemaField>,
    pub primary_key: String,
    pub index_on: Option<String>,
}

pub fn infer_column_type(name: &str) -> ColumnType {
    let lower = name.to_lowercase();
    NAME_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, column_type)| *column_type)
        .unwrap_or(ColumnType::FreeText)
}

/// Pick a name for an implicit column that does not clash with a data
/// column once names are lower-cased for storage.
fn implicit_name(preferred: &str, taken: &[SchemaField]) -> String {
    let clashes = |candidate: &str| taken.iter().any(|f| f.name.to_lowercase() == candidate);
    if !clashes(preferred) {
        return preferred.to_string();
    }
    let mut candidate = format!("record_{}", preferred);
    while clashes(&candidate) {
        candidate = format!("_{}", candidate);
    }
    candidate
}

/// Type every name in order, then append the synthetic key and creation
/// timestamp.
pub fn infer_schema<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<SchemaField> {
    let mut fields: Vec<SchemaField> = names
        .into_iter()
        .map(|name| SchemaField {
            name: name.to_string(),
            column_type: infer_column_type(name),
            implicit: false,
        })
        .collect();

    let key = implicit_name(SYNTHETIC_KEY, &fields);
    let created = implicit_name(CREATED_AT, &fields);
    fields.push(SchemaField {
        name: key,
        column_type: ColumnType::Serial,
        implicit: true,
    });
    fields.push(SchemaField {
        name: created,
        column_type: ColumnType::Timestamp,
        implicit: true,
    });
    fields
}

/// Build a table definition.
///
/// The index goes on `identifier` when it is one of the columns, otherwise on
/// the first identifier-typed column.
pub fn infer_table<'a>(
    table_name: &str,
    names: impl IntoIterator<Item = &'a str>,
    identifier: Option<&str>,
) -> TableDefinition {
    let fields = infer_schema(names);
    let data_fields = || fields.iter().filter(|f| !f.implicit);

    let index_on = identifier
        .filter(|id| data_fields().any(|f| f.name == *id))
        .map(str::to_string)
        .or_else(|| {
            data_fields()
                .find(|f| f.column_type == ColumnType::IdentifierString)
                .map(|f| f.name.clone())
        });

    let primary_key = fields
        .iter()
        .find(|f| f.column_type == ColumnType::Serial)
        .map(|f| f.name.clone())
        .unwrap_or_else(|| SYNTHETIC_KEY.to_string());

    TableDefinition {
        name: table_name.to_string(),
        fields,
        primary_key,
        index_on,
    }
}

/// Table definition from one sample record's field names
pub fn infer_table_from_record(
    table_name: &str,
    sample: &FieldRecord,
    identifier: Option<&str>,
) -> TableDefinition {
    infer_table(table_name, sample.names(), identifier)
}
