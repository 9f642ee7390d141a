//! TLE stream parser
//!
//! Bulk TLE files repeat (name, line 1, line 2). Upstream files sometimes
//! carry stray or missing lines, so the parser resynchronizes one line at a
//! time instead of failing. Triplets whose two lines disagree on the catalog
//! number are dropped whole.

use std::collections::HashMap;

use satcat_common::{FieldValue, NoradId, RecordSet, TleEnrichment, TleTriplet, UnifiedRecord};
use serde::Deserialize;

use super::identifier::decode_alpha5;
use crate::error::NormalizeError;

const LINE1_MARKER: &str = "1 ";
const LINE2_MARKER: &str = "2 ";

/// Result of one pass over a TLE stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TleBlockReport {
    pub triplets: Vec<TleTriplet>,
    /// Lines skipped while looking for a (name, 1, 2) alignment
    pub resync_skips: usize,
    /// Triplets dropped because line 1 and line 2 name different objects
    pub mismatched: usize,
}

/// Catalog number field, columns 3-7 (1-indexed)
fn catalog_field(line: &str) -> Option<&str> {
    line.get(2..7)
}

pub fn parse_tle_block(text: &str) -> TleBlockReport {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut report = TleBlockReport::default();
    let mut i = 0;

    while i + 2 < lines.len() {
        let (name, line1, line2) = (lines[i], lines[i + 1], lines[i + 2]);

        if !(line1.starts_with(LINE1_MARKER) && line2.starts_with(LINE2_MARKER)) {
            report.resync_skips += 1;
            i += 1;
            continue;
        }

        match (catalog_field(line1), catalog_field(line2)) {
            (Some(id1), Some(id2)) if id1 == id2 => {
                report.triplets.push(TleTriplet {
                    object_name: object_name(name),
                    line1: line1.to_string(),
                    line2: line2.to_string(),
                    identifier: id1.trim().to_string(),
                });
            }
            _ => {
                report.mismatched += 1;
                tracing::debug!("Dropping TLE with mismatched catalog numbers: {}", name);
            }
        }
        i += 3;
    }

    tracing::debug!(
        "Parsed {} TLE triplets ({} resync skips, {} mismatched)",
        report.triplets.len(),
        report.resync_skips,
        report.mismatched
    );

    report
}

/// Three-line element sets prefix the name with "0 "
fn object_name(line: &str) -> String {
    line.strip_prefix("0 ").unwrap_or(line).trim().to_string()
}

pub fn triplet_norad_id(triplet: &TleTriplet) -> Result<NoradId, NormalizeError> {
    decode_alpha5(&triplet.identifier)
}

/// Triplets as a record set, for pipelines that use a TLE stream as a
/// primary or secondary source.
pub fn triplets_to_record_set(triplets: &[TleTriplet], label: &str) -> RecordSet {
    let fields = ["OBJECT_NAME", "NORAD_CAT_ID", "TLE_LINE1", "TLE_LINE2"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut set = RecordSet::new(label, fields);

    for t in triplets {
        let id = match triplet_norad_id(t) {
            Ok(id) => FieldValue::text(id.to_string()),
            Err(_) => FieldValue::text(t.identifier.as_str()),
        };
        set.push_row(vec![
            FieldValue::text(t.object_name.as_str()),
            id,
            FieldValue::text(t.line1.as_str()),
            FieldValue::text(t.line2.as_str()),
        ]);
    }
    set
}

/// Counts from attaching TLE lines to unified records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TleAttachStats {
    pub attached: usize,
    pub missing: usize,
}

/// Attach the matching TLE lines to every record. Records without a match
/// (or without a resolved id) are marked `Missing`.
pub fn attach_tle(records: &mut [UnifiedRecord], triplets: &[TleTriplet]) -> TleAttachStats {
    let mut index: HashMap<NoradId, &TleTriplet> = HashMap::with_capacity(triplets.len());
    for t in triplets {
        match triplet_norad_id(t) {
            Ok(id) => {
                index.entry(id).or_insert(t);
            }
            Err(e) => tracing::debug!("Ignoring TLE {}: {}", t.object_name, e),
        }
    }

    let mut stats = TleAttachStats::default();
    for record in records.iter_mut() {
        let found = record.norad_id.and_then(|id| index.get(&id));
        record.tle = match found {
            Some(t) => {
                stats.attached += 1;
                TleEnrichment::Attached {
                    object_name: t.object_name.clone(),
                    line1: t.line1.clone(),
                    line2: t.line2.clone(),
                }
            }
            None => {
                stats.missing += 1;
                TleEnrichment::Missing
            }
        };
    }

    tracing::info!(
        "Attached TLE to {} records, {} without TLE",
        stats.attached,
        stats.missing
    );
    stats
}

/// N2YO `/satellite/tle/{id}` response
#[derive(Debug, Deserialize)]
struct N2yoResponse {
    info: N2yoInfo,
    #[serde(default)]
    tle: String,
}

#[derive(Debug, Deserialize)]
struct N2yoInfo {
    #[serde(default)]
    satname: String,
}

/// Parse a per-object N2YO response. An unknown object comes back with an
/// empty `tle`, which yields `None`, as does a pair that fails validation.
pub fn parse_n2yo_response(json: &str) -> serde_json::Result<Option<TleTriplet>> {
    let response: N2yoResponse = serde_json::from_str(json)?;
    let mut lines = response.tle.lines().map(str::trim).filter(|l| !l.is_empty());

    let (Some(line1), Some(line2)) = (lines.next(), lines.next()) else {
        return Ok(None);
    };

    let name = if response.info.satname.is_empty() {
        "UNKNOWN"
    } else {
        response.info.satname.as_str()
    };
    let block = format!("{}\n{}\n{}", name, line1, line2);
    Ok(parse_tle_block(&block).triplets.into_iter().next())
}
