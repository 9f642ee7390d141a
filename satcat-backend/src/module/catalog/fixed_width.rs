//! Fixed-width table parser
//!
//! Column positions are not declared anywhere; they are inferred from where
//! each title starts in the header line. The resulting [`ColumnLayout`] is
//! computed once and applied to every body line.

use std::sync::OnceLock;

use regex::Regex;
use satcat_common::{FieldValue, RecordSet, PLACEHOLDER};

use crate::error::{ReconcileError, Result};

pub const COMMENT_MARKER: char = '#';
pub const DEFAULT_RECORD_MARKER: char = 'S';

/// Two or more whitespace characters separate column titles (and, in
/// misaligned rows, values). A single space stays inside a title.
fn column_gap() -> &'static Regex {
    static GAP: OnceLock<Regex> = OnceLock::new();
    GAP.get_or_init(|| Regex::new(r"\s{2,}").expect("column gap pattern is valid"))
}

/// Half-open character range `[start, end)` of one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpan {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// Ordered column spans inferred from a header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    spans: Vec<ColumnSpan>,
}

impl ColumnLayout {
    /// Locate each title's start offset left to right. The last span ends at
    /// the header length.
    pub fn from_header(header_line: &str) -> Result<Self> {
        let header_line = header_line.trim_end();
        let titles: Vec<&str> = column_gap()
            .split(header_line)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        if titles.is_empty() {
            return Err(ReconcileError::EmptyHeader);
        }

        let mut starts = Vec::with_capacity(titles.len());
        let mut cursor = 0;
        for title in &titles {
            // titles come from this very line, so the search cannot miss
            let byte_pos = header_line[cursor..]
                .find(*title)
                .map(|p| p + cursor)
                .unwrap_or(cursor);
            starts.push(header_line[..byte_pos].chars().count());
            cursor = byte_pos + title.len();
        }

        let header_len = header_line.chars().count();
        let spans = titles
            .iter()
            .enumerate()
            .map(|(i, title)| ColumnSpan {
                name: title.to_string(),
                start: starts[i],
                end: starts.get(i + 1).copied().unwrap_or(header_len),
            })
            .collect();

        Ok(Self { spans })
    }

    pub fn spans(&self) -> &[ColumnSpan] {
        &self.spans
    }

    pub fn names(&self) -> Vec<String> {
        self.spans.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Cut one line into values by position.
    ///
    /// Blank cells become [`PLACEHOLDER`]; columns starting past the end of
    /// the line become Null.
    pub fn slice(&self, line: &str) -> Vec<FieldValue> {
        let bounds = char_bounds(line);
        let char_len = bounds.len() - 1;

        self.spans
            .iter()
            .map(|span| {
                if span.start >= char_len {
                    return FieldValue::Null;
                }
                let end = span.end.min(char_len);
                let value = line[bounds[span.start]..bounds[end]].trim();
                if value.is_empty() {
                    FieldValue::text(PLACEHOLDER)
                } else {
                    FieldValue::text(value)
                }
            })
            .collect()
    }

    /// True when some non-blank run in `line` crosses a column boundary,
    /// i.e. the row was not laid out against this header.
    pub fn is_misaligned(&self, line: &str) -> bool {
        let chars: Vec<char> = line.chars().collect();
        self.spans.iter().skip(1).any(|span| {
            let b = span.start;
            b > 0 && b < chars.len() && !chars[b - 1].is_whitespace() && !chars[b].is_whitespace()
        })
    }
}

/// Byte offset of every char plus the end of the string
fn char_bounds(line: &str) -> Vec<usize> {
    line.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(line.len()))
        .collect()
}

/// Per-pass row accounting. No row ever raises an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowStats {
    pub accepted: usize,
    /// Misaligned rows recovered by reading gap-delimited tokens
    pub realigned: usize,
    /// Blank, comment or non-record lines
    pub ignored: usize,
    /// Misaligned rows whose tokens did not fit the header; these are still
    /// sliced by position
    pub unrecovered: usize,
}

/// Parsed header plus value rows, each row the same arity as the header
#[derive(Debug, Clone, PartialEq)]
pub struct FixedWidthTable {
    pub layout: ColumnLayout,
    pub rows: Vec<Vec<FieldValue>>,
    pub stats: RowStats,
}

impl FixedWidthTable {
    pub fn headers(&self) -> Vec<String> {
        self.layout.names()
    }

    pub fn into_record_set(self, label: &str) -> RecordSet {
        let mut set = RecordSet::new(label, self.layout.names());
        for row in self.rows {
            set.push_row(row);
        }
        set
    }
}

/// Parse body blocks against a header line.
///
/// A line is kept only when it starts with `record_marker`. Blank lines and
/// `#` comments are ignored.
pub fn parse_fixed_width<'a>(
    header_line: &str,
    bodies: impl IntoIterator<Item = &'a str>,
    record_marker: char,
) -> Result<FixedWidthTable> {
    let layout = ColumnLayout::from_header(header_line)?;
    let mut rows = Vec::new();
    let mut stats = RowStats::default();

    for body in bodies {
        for line in body.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty()
                || line.starts_with(COMMENT_MARKER)
                || !line.starts_with(record_marker)
            {
                stats.ignored += 1;
                continue;
            }

            if !layout.is_misaligned(line) {
                rows.push(layout.slice(line));
                stats.accepted += 1;
                continue;
            }

            match realign(&layout, line, record_marker) {
                Some(row) => {
                    rows.push(row);
                    stats.realigned += 1;
                }
                None => {
                    tracing::debug!("Slicing misaligned row by position: {:?}", line);
                    rows.push(layout.slice(line));
                    stats.unrecovered += 1;
                }
            }
            stats.accepted += 1;
        }
    }

    tracing::debug!(
        "Fixed-width pass: {} columns, {} rows accepted ({} realigned, {} unrecovered), {} ignored",
        layout.len(),
        stats.accepted,
        stats.realigned,
        stats.unrecovered,
        stats.ignored
    );

    Ok(FixedWidthTable { layout, rows, stats })
}

/// Read a misaligned row as gap-delimited tokens. A standalone leading
/// record marker is not a column. Gives up unless the remaining token count
/// equals the column count.
fn realign(layout: &ColumnLayout, line: &str, record_marker: char) -> Option<Vec<FieldValue>> {
    let mut tokens: Vec<&str> = column_gap()
        .split(line.trim())
        .filter(|t| !t.is_empty())
        .collect();

    let mut marker_buf = [0u8; 4];
    let marker: &str = record_marker.encode_utf8(&mut marker_buf);
    if tokens.first() == Some(&marker) {
        tokens.remove(0);
    }

    if tokens.len() != layout.len() {
        return None;
    }
    Some(tokens.into_iter().map(FieldValue::text).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "#JCAT    Satcat  Name             Status";
    const BODY: &str = "\
# comment line
S00001   1       Sputnik 1 R/B    R
S00002   2       Sputnik 1        R

S00900   900     Calsphere 1
X99999   99999   Not a satellite  O
S25544   25544                    O";

    #[test]
    fn test_layout_from_header() {
        let layout = ColumnLayout::from_header("NAME  ID  STATUS").unwrap();
        let spans = layout.spans();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0], ColumnSpan { name: "NAME".into(), start: 0, end: 6 });
        assert_eq!(spans[1], ColumnSpan { name: "ID".into(), start: 6, end: 10 });
        assert_eq!(spans[2], ColumnSpan { name: "STATUS".into(), start: 10, end: 16 });
    }

    #[test]
    fn test_single_space_stays_in_title() {
        let layout = ColumnLayout::from_header("Launch Date  Orbit Class").unwrap();
        assert_eq!(layout.names(), vec!["Launch Date", "Orbit Class"]);
        assert_eq!(layout.spans()[1].start, 13);
    }

    #[test]
    fn test_empty_header_is_error() {
        assert!(matches!(
            ColumnLayout::from_header("   "),
            Err(ReconcileError::EmptyHeader)
        ));
    }

    #[test]
    fn test_parse_filters_and_slices() {
        let table = parse_fixed_width(HEADER, [BODY], DEFAULT_RECORD_MARKER).unwrap();
        assert_eq!(table.headers(), vec!["#JCAT", "Satcat", "Name", "Status"]);
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.stats.ignored, 3); // comment, blank, X-row

        let first = &table.rows[0];
        assert_eq!(first[0], FieldValue::text("S00001"));
        assert_eq!(first[2], FieldValue::text("Sputnik 1 R/B"));
        assert_eq!(first[3], FieldValue::text("R"));
    }

    #[test]
    fn test_short_row_vs_blank_cell() {
        let table = parse_fixed_width(HEADER, [BODY], DEFAULT_RECORD_MARKER).unwrap();
        // row too short: Status column starts past the end of the line
        let calsphere = &table.rows[2];
        assert_eq!(calsphere[2], FieldValue::text("Calsphere 1"));
        assert_eq!(calsphere[3], FieldValue::Null);
        // present but blank name
        let iss = &table.rows[3];
        assert_eq!(iss[2], FieldValue::text(PLACEHOLDER));
        assert_eq!(iss[3], FieldValue::text("O"));
    }

    #[test]
    fn test_every_row_matches_header_arity() {
        let table = parse_fixed_width(HEADER, [BODY, BODY], DEFAULT_RECORD_MARKER).unwrap();
        assert!(table.rows.iter().all(|r| r.len() == table.layout.len()));
        assert_eq!(table.rows.len(), 8);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let a = parse_fixed_width(HEADER, [BODY], DEFAULT_RECORD_MARKER).unwrap();
        let b = parse_fixed_width(HEADER, [BODY], DEFAULT_RECORD_MARKER).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_value_past_header_end_is_truncated() {
        let table = parse_fixed_width("ID  NAME", ["S1  ABCDEFGHIJ"], 'S').unwrap();
        assert_eq!(table.rows[0][1], FieldValue::text("ABCD"));
    }

    #[test]
    fn test_misaligned_row_with_standalone_marker() {
        let table =
            parse_fixed_width("NAME  ID  STATUS", ["S  ISS  S25544  ACTIVE"], 'S').unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.stats.realigned, 1);
        assert_eq!(
            table.rows[0],
            vec![
                FieldValue::text("ISS"),
                FieldValue::text("S25544"),
                FieldValue::text("ACTIVE")
            ]
        );
    }

    #[test]
    fn test_unrecoverable_row_falls_back_to_slicing() {
        let table = parse_fixed_width("NAME  ID  STATUS", ["S  ISS  S25544"], 'S').unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.stats.unrecovered, 1);
        assert_eq!(table.rows[0].len(), 3);
    }

    #[test]
    fn test_overflowing_value_with_blank_cell_is_kept() {
        let table = parse_fixed_width(
            "#JCAT    Name      Type  Status",
            ["S00001   Sputnik1R/B       O"],
            DEFAULT_RECORD_MARKER,
        )
        .unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(
            table.stats,
            RowStats { accepted: 1, realigned: 0, ignored: 0, unrecovered: 1 }
        );

        let row = &table.rows[0];
        assert_eq!(row[0], FieldValue::text("S00001"));
        assert_eq!(row[1], FieldValue::text("Sputnik1R/"));
        assert_eq!(row[2], FieldValue::text("B"));
        assert_eq!(row[3], FieldValue::text("O"));
    }

    #[test]
    fn test_non_ascii_names_slice_by_char() {
        let table = parse_fixed_width("NAME    ID", ["SŌZORA  42"], 'S').unwrap();
        assert_eq!(table.rows[0][0], FieldValue::text("SŌZORA"));
        assert_eq!(table.rows[0][1], FieldValue::text("42"));
    }

    #[test]
    fn test_into_record_set() {
        let table = parse_fixed_width(HEADER, [BODY], DEFAULT_RECORD_MARKER).unwrap();
        let set = table.into_record_set("SATCAT");
        assert_eq!(set.label, "SATCAT");
        assert_eq!(set.len(), 4);
        assert_eq!(set.records[1].get_text("Name"), Some("Sputnik 1"));
    }
}
