//! CSV export reader (Celestrak GP CSV and similar)

use satcat_common::{FieldValue, RecordSet};

use crate::error::{ReconcileError, Result};

/// Parse CSV text with a header row into a record set.
///
/// Keys and values are trimmed. Ragged rows are padded with Null or
/// truncated to the header; unreadable rows are skipped and counted.
pub fn parse_csv_records(content: &str, label: &str) -> Result<RecordSet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // Allow variable number of fields
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ReconcileError::EmptyHeader);
    }

    let mut set = RecordSet::new(label, headers);
    let mut row_count = 0;
    let mut ragged_count = 0;
    let mut error_count = 0;

    for result in reader.records() {
        row_count += 1;

        let row = match result {
            Ok(row) => row,
            Err(e) => {
                error_count += 1;
                tracing::warn!("Error parsing CSV row {} of {}: {}", row_count, label, e);
                continue;
            }
        };

        if row.len() != set.fields.len() {
            ragged_count += 1;
        }

        let values: Vec<FieldValue> = (0..set.fields.len())
            .map(|i| match row.get(i) {
                Some(v) => FieldValue::text(v),
                None => FieldValue::Null,
            })
            .collect();
        set.push_row(values);
    }

    tracing::debug!(
        "Processed {} CSV rows from {}, {} ragged, {} errors",
        row_count,
        label,
        ragged_count,
        error_count
    );

    Ok(set)
}
