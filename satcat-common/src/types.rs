use std::collections::HashSet;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// NORAD catalog number (canonical join key)
pub type NoradId = u32;

/// Value written for a column that is present in a row but blank
pub const PLACEHOLDER: &str = "-";

pub const TLE_LINE1_FIELD: &str = "TLE_LINE1";
pub const TLE_LINE2_FIELD: &str = "TLE_LINE2";
pub const TLE_FETCHED_FIELD: &str = "TLE_FETCHED";
/// Object name as reported alongside the TLE lines
pub const TLE_NAME_FIELD: &str = "TLE_NAME";

/// A single cell value, serialized as a plain JSON string/number/null
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Null,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Raw string form used when a value is fed back into a text parser
    /// (identifier normalization, CSV output). Null renders empty.
    pub fn to_raw_string(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_raw_string())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

/// One source row: ordered field name -> value pairs.
///
/// Names are case-preserving. Field order is the order of insertion and is
/// kept through serialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRecord {
    fields: Vec<(String, FieldValue)>,
}

impl FieldRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Append a field without checking for an existing name
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Replace the value of an existing field in place, or append it
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Union of field names over `records`, in first-seen order
    pub fn union_names<'a>(records: impl IntoIterator<Item = &'a FieldRecord>) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut names: Vec<String> = Vec::new();
        for record in records {
            for name in record.names() {
                if seen.insert(name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }
}

impl FromIterator<(String, FieldValue)> for FieldRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl Serialize for FieldRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Rows parsed from one source in one pass, sharing a single header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    /// Source label, e.g. "SATCAT" or "ACTIVE". Used to disambiguate
    /// colliding column names during a join.
    pub label: String,
    /// Ordered header shared by every record
    pub fields: Vec<String>,
    pub records: Vec<FieldRecord>,
}

impl RecordSet {
    pub fn new(label: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            label: label.into(),
            fields,
            records: Vec::new(),
        }
    }

    /// Add a row of values in header order. Rows whose arity differs from
    /// the header are rejected and `false` is returned.
    pub fn push_row(&mut self, values: Vec<FieldValue>) -> bool {
        if values.len() != self.fields.len() {
            return false;
        }
        let record = self.fields.iter().cloned().zip(values).collect();
        self.records.push(record);
        true
    }

    /// Keep only `names`, in that order. Names absent from the header
    /// become Null in every record.
    pub fn project(&self, names: &[String]) -> RecordSet {
        let records = self
            .records
            .iter()
            .map(|record| {
                names
                    .iter()
                    .map(|name| {
                        let value = record.get(name).cloned().unwrap_or(FieldValue::Null);
                        (name.clone(), value)
                    })
                    .collect()
            })
            .collect();

        RecordSet {
            label: self.label.clone(),
            fields: names.to_vec(),
            records,
        }
    }

    /// Convert text values of the named fields to numbers where they parse.
    /// Blank values become Null; unparseable text is left untouched.
    pub fn coerce_numeric(&mut self, names: &[String]) {
        for record in &mut self.records {
            for name in names {
                let Some(raw) = record.get_text(name) else {
                    continue;
                };
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    record.set(name, FieldValue::Null);
                } else if let Ok(n) = trimmed.parse::<f64>() {
                    record.set(name, FieldValue::Number(n));
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reconciled status of a catalog object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SatStatus {
    /// Present in the secondary (active) source
    Active,
    /// Identifier resolved but not present in the secondary source
    Inactive,
    /// Identifier could not be normalized
    Unknown,
}

impl Default for SatStatus {
    fn default() -> Self {
        SatStatus::Unknown
    }
}

impl SatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SatStatus::Active => "ACTIVE",
            SatStatus::Inactive => "INACTIVE",
            SatStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for SatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One (name, line 1, line 2) entry from a TLE stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TleTriplet {
    pub object_name: String,
    pub line1: String,
    pub line2: String,
    /// Catalog field from columns 3-7 (identical in both lines), trimmed
    pub identifier: String,
}

/// TLE state of a unified record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TleEnrichment {
    /// The pipeline did not ask for TLE data
    #[default]
    NotRequested,
    /// Requested but no triplet matched the record
    Missing,
    Attached {
        object_name: String,
        line1: String,
        line2: String,
    },
}

/// A primary record after the join, with its derived status
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedRecord {
    pub norad_id: Option<NoradId>,
    pub fields: FieldRecord,
    pub status: SatStatus,
    pub tle: TleEnrichment,
}

impl UnifiedRecord {
    pub fn is_tle_enriched(&self) -> bool {
        matches!(self.tle, TleEnrichment::Attached { .. })
    }

    /// Flatten into the row written by the persistence layer.
    ///
    /// The status lands under `status_field`, overwriting a source column
    /// of the same name in place. TLE columns are only added when the
    /// pipeline requested TLE data.
    pub fn to_field_record(&self, status_field: &str) -> FieldRecord {
        let mut out = self.fields.clone();
        out.set(status_field, self.status.as_str());

        match &self.tle {
            TleEnrichment::NotRequested => {}
            TleEnrichment::Missing => {
                out.set(TLE_NAME_FIELD, FieldValue::Null);
                out.set(TLE_LINE1_FIELD, FieldValue::Null);
                out.set(TLE_LINE2_FIELD, FieldValue::Null);
                out.set(TLE_FETCHED_FIELD, "NO");
            }
            TleEnrichment::Attached {
                object_name,
                line1,
                line2,
            } => {
                out.set(TLE_NAME_FIELD, object_name.as_str());
                out.set(TLE_LINE1_FIELD, line1.as_str());
                out.set(TLE_LINE2_FIELD, line2.as_str());
                out.set(TLE_FETCHED_FIELD, "YES");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> RecordSet {
        let mut set = RecordSet::new(
            "ACTIVE",
            vec!["OBJECT_NAME".to_string(), "NORAD_CAT_ID".to_string(), "INCLINATION".to_string()],
        );
        assert!(set.push_row(vec!["ISS".into(), "25544".into(), "51.64".into()]));
        assert!(set.push_row(vec!["AO-91".into(), "43017".into(), "".into()]));
        set
    }

    #[test]
    fn test_record_preserves_insertion_order() {
        let mut record = FieldRecord::new();
        record.push("Z", "1");
        record.push("A", "2");
        record.set("Z", "3");
        let names: Vec<_> = record.names().collect();
        assert_eq!(names, vec!["Z", "A"]);
        assert_eq!(record.get_text("Z"), Some("3"));
    }

    #[test]
    fn test_union_names_keeps_first_seen_order() {
        let mut a = FieldRecord::new();
        a.push("NAME", "ISS");
        a.push("ID", "1");
        let mut b = FieldRecord::new();
        b.push("ID", "2");
        b.push("OBJECT_TYPE", "PAY");
        assert_eq!(FieldRecord::union_names([&a, &b]), vec!["NAME", "ID", "OBJECT_TYPE"]);
    }

    #[test]
    fn test_record_serializes_as_ordered_map() {
        let mut record = FieldRecord::new();
        record.push("NAME", "ISS");
        record.push("PERIOD", 92.9);
        record.push("DECAY", FieldValue::Null);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"NAME":"ISS","PERIOD":92.9,"DECAY":null}"#);
    }

    #[test]
    fn test_push_row_rejects_wrong_arity() {
        let mut set = sample_set();
        assert!(!set.push_row(vec!["only one".into()]));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_project_fills_missing_with_null() {
        let set = sample_set();
        let projected = set.project(&["NORAD_CAT_ID".to_string(), "EPOCH".to_string()]);
        assert_eq!(projected.fields, vec!["NORAD_CAT_ID", "EPOCH"]);
        assert_eq!(projected.records[0].get_text("NORAD_CAT_ID"), Some("25544"));
        assert_eq!(projected.records[0].get("EPOCH"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_coerce_numeric() {
        let mut set = sample_set();
        set.coerce_numeric(&["INCLINATION".to_string()]);
        assert_eq!(set.records[0].get("INCLINATION"), Some(&FieldValue::Number(51.64)));
        assert_eq!(set.records[1].get("INCLINATION"), Some(&FieldValue::Null));
        // untouched
        assert_eq!(set.records[0].get_text("OBJECT_NAME"), Some("ISS"));
    }

    #[test]
    fn test_flatten_overwrites_status_in_place() {
        let mut fields = FieldRecord::new();
        fields.push("NAME", "ISS");
        fields.push("STATUS", "O");
        fields.push("ID", "S25544");
        let record = UnifiedRecord {
            norad_id: Some(25544),
            fields,
            status: SatStatus::Active,
            tle: TleEnrichment::NotRequested,
        };
        let flat = record.to_field_record("STATUS");
        let names: Vec<_> = flat.names().collect();
        assert_eq!(names, vec!["NAME", "STATUS", "ID"]);
        assert_eq!(flat.get_text("STATUS"), Some("ACTIVE"));
        assert!(!flat.contains(TLE_LINE1_FIELD));
    }

    #[test]
    fn test_flatten_tle_columns() {
        let record = UnifiedRecord {
            norad_id: Some(25544),
            fields: FieldRecord::new(),
            status: SatStatus::Inactive,
            tle: TleEnrichment::Missing,
        };
        assert!(!record.is_tle_enriched());
        let flat = record.to_field_record("STATUS");
        assert_eq!(flat.get(TLE_LINE1_FIELD), Some(&FieldValue::Null));
        assert_eq!(flat.get(TLE_NAME_FIELD), Some(&FieldValue::Null));
        assert_eq!(flat.get_text(TLE_FETCHED_FIELD), Some("NO"));

        let enriched = UnifiedRecord {
            tle: TleEnrichment::Attached {
                object_name: "SPACE STATION".to_string(),
                line1: "1 25544U".to_string(),
                line2: "2 25544".to_string(),
            },
            ..record
        };
        assert!(enriched.is_tle_enriched());
        let flat = enriched.to_field_record("STATUS");
        assert_eq!(flat.get_text(TLE_LINE2_FIELD), Some("2 25544"));
        assert_eq!(flat.get_text(TLE_NAME_FIELD), Some("SPACE STATION"));
        assert_eq!(flat.get_text(TLE_FETCHED_FIELD), Some("YES"));
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&SatStatus::Inactive).unwrap(), r#""INACTIVE""#);
        assert_eq!(SatStatus::default(), SatStatus::Unknown);
    }
}
