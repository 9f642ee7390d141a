//! Record joiner
//!
//! Left-joins a primary record set (e.g. the GCAT satcat) with a secondary
//! one (e.g. the Celestrak active list) on the normalized catalog number.
//! The primary order is kept and every primary record yields exactly one
//! unified record.

use std::collections::{HashMap, HashSet};

use satcat_common::{
    FieldRecord, FieldValue, NoradId, RecordSet, SatStatus, TleEnrichment, UnifiedRecord,
};

use super::identifier::IdConvention;
use crate::error::{NormalizeError, ReconcileError, Result};

/// Known identifier column names, most specific first
pub const ID_COLUMN_PRIORITY: &[&str] = &[
    "NORAD_CAT_ID",
    "NORAD",
    "CATALOG_NUMBER",
    "SATNO",
    "OBJECT_NUMBER",
];

/// Substrings that mark an identifier column when no exact name matches
pub const ID_COLUMN_HINTS: &[&str] = &["NORAD", "CAT"];

/// Pick the identifier column of a header.
///
/// Exact names from [`ID_COLUMN_PRIORITY`] win. Otherwise the first field, in
/// declaration order, whose upper-cased name contains a hint.
pub fn resolve_id_column(fields: &[String]) -> Option<&str> {
    for candidate in ID_COLUMN_PRIORITY {
        if let Some(field) = fields.iter().find(|f| f.as_str() == *candidate) {
            return Some(field.as_str());
        }
    }

    fields
        .iter()
        .find(|f| {
            let upper = f.to_uppercase();
            ID_COLUMN_HINTS.iter().any(|hint| upper.contains(hint))
        })
        .map(String::as_str)
}

/// How to find and read the identifier on each side of the join
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinSpec {
    /// Explicit primary id column; resolved by heuristic when `None`
    pub primary_id: Option<String>,
    pub secondary_id: Option<String>,
    pub primary_convention: IdConvention,
    pub secondary_convention: IdConvention,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    pub matched: usize,
    pub unmatched: usize,
    /// Primary records whose identifier could not be normalized
    pub unknown: usize,
    /// Secondary records left out of the index (bad id or duplicate)
    pub secondary_skipped: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub records: Vec<UnifiedRecord>,
    pub stats: JoinStats,
    /// Primary id column as it appears in the unified records
    pub primary_id_column: String,
    /// Secondary id column as it appears in matched records
    pub secondary_id_column: String,
}

fn pick_id_column(set: &RecordSet, explicit: Option<&str>) -> Result<String> {
    match explicit {
        Some(name) if set.fields.iter().any(|f| f == name) => Ok(name.to_string()),
        Some(name) => Err(ReconcileError::UnknownIdColumn {
            source_label: set.label.clone(),
            column: name.to_string(),
        }),
        None => resolve_id_column(&set.fields)
            .map(str::to_string)
            .ok_or_else(|| ReconcileError::JoinColumnUnresolved {
                source_label: set.label.clone(),
            }),
    }
}

/// Name a field takes in the unified record. Names present on both sides
/// are suffixed with their source label.
fn output_name(name: &str, label: &str, collisions: &HashSet<&str>) -> String {
    if collisions.contains(name) {
        format!("{}_{}", name, label)
    } else {
        name.to_string()
    }
}

fn read_id(
    record: &FieldRecord,
    column: &str,
    convention: IdConvention,
) -> std::result::Result<NoradId, NormalizeError> {
    let raw = record.get(column).map(FieldValue::to_raw_string).unwrap_or_default();
    convention.normalize(&raw)
}

pub fn join(primary: &RecordSet, secondary: &RecordSet, spec: &JoinSpec) -> Result<JoinOutcome> {
    let primary_col = pick_id_column(primary, spec.primary_id.as_deref())?;
    let secondary_col = pick_id_column(secondary, spec.secondary_id.as_deref())?;

    tracing::info!(
        "Joining {} ({} rows, id column '{}') with {} ({} rows, id column '{}')",
        primary.label,
        primary.len(),
        primary_col,
        secondary.label,
        secondary.len(),
        secondary_col
    );

    let secondary_names: HashSet<&str> = secondary.fields.iter().map(String::as_str).collect();
    let collisions: HashSet<&str> = primary
        .fields
        .iter()
        .map(String::as_str)
        .filter(|name| secondary_names.contains(name))
        .collect();

    let mut stats = JoinStats::default();

    let mut index: HashMap<NoradId, usize> = HashMap::with_capacity(secondary.len());
    for (pos, record) in secondary.records.iter().enumerate() {
        match read_id(record, &secondary_col, spec.secondary_convention) {
            Ok(id) => {
                if index.contains_key(&id) {
                    stats.secondary_skipped += 1;
                } else {
                    index.insert(id, pos);
                }
            }
            Err(e) => {
                stats.secondary_skipped += 1;
                tracing::debug!("Skipping {} row {}: {}", secondary.label, pos, e);
            }
        }
    }

    let mut records = Vec::with_capacity(primary.len());
    for record in &primary.records {
        let mut fields = FieldRecord::with_capacity(primary.fields.len() + secondary.fields.len());
        for (name, value) in record.iter() {
            fields.push(output_name(name, &primary.label, &collisions), value.clone());
        }

        let (norad_id, status) = match read_id(record, &primary_col, spec.primary_convention) {
            Err(e) => {
                stats.unknown += 1;
                tracing::debug!("Unresolved {} identifier: {}", primary.label, e);
                (None, SatStatus::Unknown)
            }
            Ok(id) => match index.get(&id) {
                Some(&pos) => {
                    for (name, value) in secondary.records[pos].iter() {
                        let name = output_name(name, &secondary.label, &collisions);
                        fields.push(name, value.clone());
                    }
                    stats.matched += 1;
                    (Some(id), SatStatus::Active)
                }
                None => {
                    stats.unmatched += 1;
                    (Some(id), SatStatus::Inactive)
                }
            },
        };

        records.push(UnifiedRecord {
            norad_id,
            fields,
            status,
            tle: TleEnrichment::NotRequested,
        });
    }

    tracing::info!(
        "Join complete: {} active, {} inactive, {} unknown, {} secondary rows skipped",
        stats.matched,
        stats.unmatched,
        stats.unknown,
        stats.secondary_skipped
    );

    Ok(JoinOutcome {
        records,
        stats,
        primary_id_column: output_name(&primary_col, &primary.label, &collisions),
        secondary_id_column: output_name(&secondary_col, &secondary.label, &collisions),
    })
}

/// Key a single listing without a join partner. The listing stands for
/// itself: every record with a readable identifier is `Active`, the rest
/// `Unknown`. Field names are left untouched.
pub fn identify(
    primary: &RecordSet,
    id_column: Option<&str>,
    convention: IdConvention,
) -> Result<JoinOutcome> {
    let column = pick_id_column(primary, id_column)?;
    let mut stats = JoinStats::default();

    let records = primary
        .records
        .iter()
        .map(|record| {
            let (norad_id, status) = match read_id(record, &column, convention) {
                Ok(id) => {
                    stats.matched += 1;
                    (Some(id), SatStatus::Active)
                }
                Err(e) => {
                    stats.unknown += 1;
                    tracing::debug!("Unresolved {} identifier: {}", primary.label, e);
                    (None, SatStatus::Unknown)
                }
            };
            UnifiedRecord {
                norad_id,
                fields: record.clone(),
                status,
                tle: TleEnrichment::NotRequested,
            }
        })
        .collect();

    tracing::info!(
        "Keyed {} records of {} on '{}' ({} unknown)",
        stats.matched,
        primary.label,
        column,
        stats.unknown
    );

    Ok(JoinOutcome {
        records,
        stats,
        secondary_id_column: column.clone(),
        primary_id_column: column,
    })
}
