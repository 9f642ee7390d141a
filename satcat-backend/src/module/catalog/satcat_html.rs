//! GCAT satcat HTML page reader
//!
//! The page wraps a fixed-width table in `<pre>` tags: the first block holds
//! the header line, every following block holds data rows.

use satcat_common::RecordSet;
use scraper::{Html, Selector};

use super::fixed_width::{parse_fixed_width, RowStats};
use crate::error::{ReconcileError, Result};

/// Header line and body blocks pulled out of the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreBlocks {
    pub header: String,
    pub bodies: Vec<String>,
}

pub fn extract_pre_blocks(html: &str) -> Result<PreBlocks> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse("pre").map_err(|e| ReconcileError::Selector(format!("{:?}", e)))?;

    let mut blocks = document
        .select(&selector)
        .map(|element| element.text().collect::<String>());

    let header_block = blocks.next().ok_or(ReconcileError::NoTableFound)?;
    let header = header_block
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or(ReconcileError::EmptyHeader)?
        .to_string();

    let bodies: Vec<String> = blocks
        .map(|text| text.trim_matches(|c| c == '\n' || c == '\r').to_string())
        .collect();

    tracing::debug!("Found {} <pre> body blocks", bodies.len());

    Ok(PreBlocks { header, bodies })
}

/// Parse the whole page into a record set labelled `label`
pub fn parse_satcat_html(
    html: &str,
    label: &str,
    record_marker: char,
) -> Result<(RecordSet, RowStats)> {
    let blocks = extract_pre_blocks(html)?;
    let table = parse_fixed_width(
        &blocks.header,
        blocks.bodies.iter().map(String::as_str),
        record_marker,
    )?;
    let stats = table.stats;

    tracing::info!(
        "Extracted {} entries from satcat table ({} columns)",
        stats.accepted,
        table.layout.len()
    );

    Ok((table.into_record_set(label), stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
<h1>GCAT satcat</h1>
<pre>#JCAT    Satcat  Name           Status
</pre>
<pre>
# Updated 2025 Oct 04
S00001   1       Sputnik 1 R/B  R
S00002   2       Sputnik 1      R
</pre>
<pre>
S25544   25544   ISS (Zarya)    O
</pre>
</body></html>"#;

    #[test]
    fn test_extract_pre_blocks() {
        let blocks = extract_pre_blocks(PAGE).unwrap();
        assert_eq!(blocks.header, "#JCAT    Satcat  Name           Status");
        assert_eq!(blocks.bodies.len(), 2);
        assert!(blocks.bodies[0].starts_with("# Updated"));
    }

    #[test]
    fn test_parse_satcat_html() {
        let (set, stats) = parse_satcat_html(PAGE, "SATCAT", 'S').unwrap();
        assert_eq!(set.fields, vec!["#JCAT", "Satcat", "Name", "Status"]);
        assert_eq!(set.len(), 3);
        assert_eq!(stats.ignored, 1);
        assert_eq!(set.records[2].get_text("Name"), Some("ISS (Zarya)"));
        assert_eq!(set.records[2].get_text("Status"), Some("O"));
    }

    #[test]
    fn test_page_without_pre() {
        let result = extract_pre_blocks("<html><body><p>maintenance</p></body></html>");
        assert!(matches!(result, Err(ReconcileError::NoTableFound)));
    }
}
