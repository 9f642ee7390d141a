//! Reconciliation pipeline
//!
//! A pipeline is data, not code: each source names its URL, format and
//! identifier column, and the same driver runs every configured pipeline.
//! `reconcile` is the synchronous core over already-fetched text;
//! `run_pipeline` fetches the sources first and finishes with optional
//! per-object TLE requests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use satcat_common::{FieldRecord, NoradId, RecordSet, SatStatus, TleTriplet, UnifiedRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::csv_source::parse_csv_records;
use super::fixed_width::{RowStats, DEFAULT_RECORD_MARKER};
use super::identifier::IdConvention;
use super::joiner::{identify, join, JoinOutcome, JoinSpec, JoinStats};
use super::satcat_html::parse_satcat_html;
use super::schema::{infer_table, TableDefinition};
use super::tle::{
    attach_tle, parse_n2yo_response, parse_tle_block, triplet_norad_id, triplets_to_record_set,
    TleAttachStats,
};
use crate::error::{ReconcileError, Result};
use crate::module::fetch::{fetch_per_object, TextFetcher};

pub const DEFAULT_STATUS_FIELD: &str = "STATUS";
pub const LAST_UPDATED_FIELD: &str = "LAST_UPDATED";
pub const DATA_SOURCE_FIELD: &str = "DATA_SOURCE";

fn default_record_marker() -> char {
    DEFAULT_RECORD_MARKER
}

fn default_status_field() -> String {
    DEFAULT_STATUS_FIELD.to_string()
}

fn default_table_name() -> String {
    "satellites".to_string()
}

fn default_delay_ms() -> u64 {
    1000
}

/// Wire format of a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFormat {
    /// Fixed-width table inside HTML `<pre>` blocks
    FixedWidthHtml {
        #[serde(default = "default_record_marker")]
        record_marker: char,
    },
    Csv,
    /// Bulk (name, line 1, line 2) stream
    Tle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Short upper-case name, used as the collision suffix
    pub label: String,
    pub url: String,
    pub format: SourceFormat,
    /// Explicit identifier column. Resolved by heuristic when absent.
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub id_convention: IdConvention,
    /// Keep only these fields, in this order
    #[serde(default)]
    pub select_fields: Option<Vec<String>>,
    /// Fields converted to numbers after selection
    #[serde(default)]
    pub numeric_fields: Vec<String>,
    /// Keep at most this many records
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Where TLE lines come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TleSource {
    /// One bulk TLE file covering every object
    Bulk { url: String },
    /// One JSON request per active object. The template may hold `{id}` and
    /// `{api_key}`.
    PerObject {
        url_template: String,
        #[serde(default = "default_delay_ms")]
        delay_ms: u64,
        #[serde(default)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub primary: SourceSpec,
    /// Listing that marks primary records active. Without one the primary
    /// listing is keyed on its own.
    #[serde(default)]
    pub secondary: Option<SourceSpec>,
    #[serde(default)]
    pub tle: Option<TleSource>,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default = "default_status_field")]
    pub status_field: String,
    /// When set, every record gets `LAST_UPDATED` and `DATA_SOURCE` fields
    #[serde(default)]
    pub data_source: Option<String>,
}

impl PipelineSpec {
    pub fn source_urls(&self) -> Vec<String> {
        let mut urls = vec![self.primary.url.clone()];
        if let Some(secondary) = &self.secondary {
            urls.push(secondary.url.clone());
        }
        match &self.tle {
            Some(TleSource::Bulk { url }) => urls.push(url.clone()),
            Some(TleSource::PerObject { url_template, .. }) => urls.push(url_template.clone()),
            None => {}
        }
        urls
    }
}

/// Raw text of every source of one run
#[derive(Debug, Clone)]
pub struct SourceTexts {
    pub primary: String,
    pub secondary: Option<String>,
    /// Bulk TLE text, only for [`TleSource::Bulk`]
    pub tle: Option<String>,
    pub fetched_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub primary_records: usize,
    pub secondary_records: usize,
    /// Row accounting when the primary is a fixed-width table
    pub primary_rows: Option<RowStats>,
    pub join: JoinStats,
    pub tle: Option<TleAttachStats>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run_id: Uuid,
    pub name: String,
    pub fetched_utc: DateTime<Utc>,
    pub sources: Vec<String>,
    pub status_field: String,
    /// Identifier column of the primary source as written in the records
    pub id_column: String,
    pub records: Vec<UnifiedRecord>,
    pub table: TableDefinition,
    pub stats: PipelineStats,
}

impl PipelineOutput {
    /// Records flattened to output rows, status and TLE columns included
    pub fn rows(&self) -> Vec<FieldRecord> {
        self.records
            .iter()
            .map(|r| r.to_field_record(&self.status_field))
            .collect()
    }

    fn refresh_table(&mut self, table_name: &str) {
        let rows = self.rows();
        let names = FieldRecord::union_names(&rows);
        self.table = infer_table(
            table_name,
            names.iter().map(String::as_str),
            Some(self.id_column.as_str()),
        );
    }
}

/// Parse one source into a record set, then apply its limit, field
/// selection and numeric coercion.
pub fn parse_source(spec: &SourceSpec, text: &str) -> Result<(RecordSet, Option<RowStats>)> {
    let (mut set, row_stats) = match &spec.format {
        SourceFormat::FixedWidthHtml { record_marker } => {
            let (set, stats) = parse_satcat_html(text, &spec.label, *record_marker)?;
            (set, Some(stats))
        }
        SourceFormat::Csv => (parse_csv_records(text, &spec.label)?, None),
        SourceFormat::Tle => {
            let report = parse_tle_block(text);
            (triplets_to_record_set(&report.triplets, &spec.label), None)
        }
    };

    if let Some(limit) = spec.limit {
        set.records.truncate(limit);
    }
    if let Some(names) = &spec.select_fields {
        set = set.project(names);
    }
    if !spec.numeric_fields.is_empty() {
        set.coerce_numeric(&spec.numeric_fields);
    }

    tracing::debug!(
        "Parsed {} records with {} fields from {}",
        set.len(),
        set.fields.len(),
        spec.label
    );
    Ok((set, row_stats))
}

/// Run the synchronous part of a pipeline over fetched text: parse, join,
/// bulk TLE enrichment and schema inference.
pub fn reconcile(spec: &PipelineSpec, texts: &SourceTexts) -> Result<PipelineOutput> {
    let (primary, primary_rows) = parse_source(&spec.primary, &texts.primary)?;
    let mut stats = PipelineStats {
        primary_records: primary.len(),
        primary_rows,
        ..PipelineStats::default()
    };

    let outcome: JoinOutcome = match (&spec.secondary, &texts.secondary) {
        (Some(secondary_spec), Some(secondary_text)) => {
            let (secondary, _) = parse_source(secondary_spec, secondary_text)?;
            stats.secondary_records = secondary.len();
            let join_spec = JoinSpec {
                primary_id: spec.primary.id_column.clone(),
                secondary_id: secondary_spec.id_column.clone(),
                primary_convention: spec.primary.id_convention,
                secondary_convention: secondary_spec.id_convention,
            };
            join(&primary, &secondary, &join_spec)?
        }
        (Some(secondary_spec), None) => {
            return Err(ReconcileError::MissingSourceText {
                source_label: secondary_spec.label.clone(),
            });
        }
        (None, _) => identify(
            &primary,
            spec.primary.id_column.as_deref(),
            spec.primary.id_convention,
        )?,
    };
    stats.join = outcome.stats;

    let mut records = outcome.records;

    if let (Some(TleSource::Bulk { .. }), Some(tle_text)) = (&spec.tle, &texts.tle) {
        let report = parse_tle_block(tle_text);
        stats.tle = Some(attach_tle(&mut records, &report.triplets));
    }

    if let Some(data_source) = &spec.data_source {
        let stamp = texts.fetched_utc.format("%Y-%m-%d %H:%M:%S").to_string();
        for record in &mut records {
            record.fields.set(LAST_UPDATED_FIELD, stamp.as_str());
            record.fields.set(DATA_SOURCE_FIELD, data_source.as_str());
        }
    }

    let mut output = PipelineOutput {
        run_id: Uuid::now_v7(),
        name: spec.name.clone(),
        fetched_utc: texts.fetched_utc,
        sources: spec.source_urls(),
        status_field: spec.status_field.clone(),
        id_column: outcome.primary_id_column,
        records,
        table: infer_table(&spec.table_name, std::iter::empty(), None),
        stats,
    };
    output.refresh_table(&spec.table_name);

    tracing::info!(
        "Pipeline {} reconciled {} records into table {} ({} columns)",
        output.name,
        output.records.len(),
        output.table.name,
        output.table.fields.len()
    );

    Ok(output)
}

/// Ids to request one by one: active records in order, without repeats
pub fn per_object_targets(records: &[UnifiedRecord], limit: Option<usize>) -> Vec<NoradId> {
    let mut seen = std::collections::HashSet::new();
    records
        .iter()
        .filter(|r| r.status == SatStatus::Active)
        .filter_map(|r| r.norad_id)
        .filter(|id| seen.insert(*id))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Attach per-object responses. A response only counts when its TLE names
/// the object that was asked for.
pub fn attach_per_object(
    records: &mut [UnifiedRecord],
    responses: &[(NoradId, Option<String>)],
) -> TleAttachStats {
    let triplets: Vec<TleTriplet> = responses
        .iter()
        .filter_map(|(id, body)| {
            let body = body.as_deref()?;
            match parse_n2yo_response(body) {
                Ok(Some(triplet)) if triplet_norad_id(&triplet) == Ok(*id) => Some(triplet),
                Ok(Some(triplet)) => {
                    tracing::warn!("Response for {} carried TLE of {}", id, triplet.identifier);
                    None
                }
                Ok(None) => {
                    tracing::debug!("No TLE available for {}", id);
                    None
                }
                Err(e) => {
                    tracing::warn!("Unreadable TLE response for {}: {}", id, e);
                    None
                }
            }
        })
        .collect();

    attach_tle(records, &triplets)
}

/// Fetch the primary, secondary and bulk TLE text of a pipeline
pub async fn fetch_sources(spec: &PipelineSpec, fetcher: &dyn TextFetcher) -> Result<SourceTexts> {
    let primary = fetcher.fetch_text(&spec.primary.url).await?;
    let secondary = match &spec.secondary {
        Some(source) => Some(fetcher.fetch_text(&source.url).await?),
        None => None,
    };
    let tle = match &spec.tle {
        Some(TleSource::Bulk { url }) => Some(fetcher.fetch_text(url).await?),
        _ => None,
    };

    Ok(SourceTexts {
        primary,
        secondary,
        tle,
        fetched_utc: Utc::now(),
    })
}

/// Run per-object TLE requests for a reconciled output. Does nothing unless
/// the pipeline uses [`TleSource::PerObject`].
pub async fn enrich_per_object(
    spec: &PipelineSpec,
    output: &mut PipelineOutput,
    fetcher: &dyn TextFetcher,
    api_key: Option<&str>,
) -> Result<()> {
    let Some(TleSource::PerObject {
        url_template,
        delay_ms,
        limit,
    }) = &spec.tle
    else {
        return Ok(());
    };

    if url_template.contains("{api_key}") && api_key.is_none() {
        return Err(ReconcileError::MissingApiKey {
            pipeline: spec.name.clone(),
        });
    }

    let targets = per_object_targets(&output.records, *limit);
    tracing::info!("Requesting TLE for {} objects", targets.len());
    let responses = fetch_per_object(
        fetcher,
        url_template,
        &targets,
        api_key,
        Duration::from_millis(*delay_ms),
    )
    .await;

    output.stats.tle = Some(attach_per_object(&mut output.records, &responses));
    output.refresh_table(&spec.table_name);
    Ok(())
}

/// Fetch every source, reconcile, then run per-object TLE requests when
/// the pipeline asks for them.
pub async fn run_pipeline(
    spec: &PipelineSpec,
    fetcher: &dyn TextFetcher,
    api_key: Option<&str>,
) -> Result<PipelineOutput> {
    tracing::info!("Running pipeline {}", spec.name);

    let texts = fetch_sources(spec, fetcher).await?;
    let mut output = reconcile(spec, &texts)?;
    enrich_per_object(spec, &mut output, fetcher, api_key).await?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::catalog::schema::ColumnType;
    use crate::module::fetch::StaticFetcher;
    use satcat_common::{FieldValue, TleEnrichment, TLE_NAME_FIELD};

    const ISS_L1: &str = "1 25544U 98067A   25277.51782528  .00016717  00000-0  30375-3 0  9993";
    const ISS_L2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.49815509 30000";

    const SATCAT_PAGE: &str = "<html><body><pre>NAME  ID  STATUS</pre>\
<pre>\nS  ISS  S25544  ACTIVE\nS  HUBBLE  S20580  ACTIVE\n# note\n</pre></body></html>";

    const ACTIVE_CSV: &str = "OBJECT_NAME,NORAD_CAT_ID,INCLINATION\nISS (ZARYA),25544,51.64\n";

    fn source(label: &str, url: &str, format: SourceFormat) -> SourceSpec {
        SourceSpec {
            label: label.to_string(),
            url: url.to_string(),
            format,
            id_column: None,
            id_convention: IdConvention::Auto,
            select_fields: None,
            numeric_fields: Vec::new(),
            limit: None,
        }
    }

    fn master_spec() -> PipelineSpec {
        PipelineSpec {
            name: "master".to_string(),
            primary: SourceSpec {
                id_column: Some("ID".to_string()),
                ..source("SATCAT", "satcat", SourceFormat::FixedWidthHtml { record_marker: 'S' })
            },
            secondary: Some(SourceSpec {
                numeric_fields: vec!["INCLINATION".to_string()],
                ..source("ACTIVE", "active", SourceFormat::Csv)
            }),
            tle: None,
            table_name: "satellites".to_string(),
            status_field: DEFAULT_STATUS_FIELD.to_string(),
            data_source: None,
        }
    }

    fn texts(primary: &str, secondary: Option<&str>, tle: Option<&str>) -> SourceTexts {
        SourceTexts {
            primary: primary.to_string(),
            secondary: secondary.map(str::to_string),
            tle: tle.map(str::to_string),
            fetched_utc: Utc::now(),
        }
    }

    #[test]
    fn test_end_to_end_reconcile() {
        let output =
            reconcile(&master_spec(), &texts(SATCAT_PAGE, Some(ACTIVE_CSV), None)).unwrap();
        assert_eq!(output.records.len(), 2);

        let iss = &output.records[0];
        assert_eq!(iss.fields.get_text("NAME"), Some("ISS"));
        assert_eq!(iss.fields.get_text("ID"), Some("S25544"));
        assert_eq!(iss.norad_id, Some(25544));
        assert_eq!(iss.status, SatStatus::Active);
        assert_eq!(iss.fields.get("INCLINATION"), Some(&FieldValue::Number(51.64)));

        assert_eq!(output.records[1].status, SatStatus::Inactive);
        assert_eq!(output.stats.primary_rows.map(|s| s.ignored), Some(1));
        assert_eq!(output.stats.join.matched, 1);
    }

    #[test]
    fn test_status_overwrites_source_column() {
        let output =
            reconcile(&master_spec(), &texts(SATCAT_PAGE, Some(ACTIVE_CSV), None)).unwrap();
        let rows = output.rows();
        // The page's own STATUS column is replaced in place by the derived status
        assert_eq!(rows[1].get_text("STATUS"), Some("INACTIVE"));
        assert_eq!(rows[1].names().nth(2), Some("STATUS"));
    }

    #[test]
    fn test_table_is_inferred_from_output_rows() {
        let output =
            reconcile(&master_spec(), &texts(SATCAT_PAGE, Some(ACTIVE_CSV), None)).unwrap();
        let table = &output.table;
        assert_eq!(table.index_on.as_deref(), Some("ID"));
        assert_eq!(table.primary_key, "record_id");
        let inclination = table.fields.iter().find(|f| f.name == "INCLINATION").unwrap();
        assert_eq!(inclination.column_type, ColumnType::Numeric);
    }

    #[test]
    fn test_single_listing_with_bulk_tle() {
        let spec = PipelineSpec {
            name: "active".to_string(),
            primary: SourceSpec {
                select_fields: Some(vec!["OBJECT_NAME".to_string(), "NORAD_CAT_ID".to_string()]),
                ..source("ACTIVE", "active", SourceFormat::Csv)
            },
            secondary: None,
            tle: Some(TleSource::Bulk { url: "tle".to_string() }),
            table_name: "satellites_tle".to_string(),
            status_field: DEFAULT_STATUS_FIELD.to_string(),
            data_source: Some("Celestrak".to_string()),
        };
        let tle = format!("ISS (ZARYA)\n{}\n{}\n", ISS_L1, ISS_L2);
        let output = reconcile(&spec, &texts(ACTIVE_CSV, None, Some(&tle))).unwrap();

        assert_eq!(output.records.len(), 1);
        assert!(output.records[0].is_tle_enriched());
        assert_eq!(output.stats.tle, Some(TleAttachStats { attached: 1, missing: 0 }));

        let row = &output.rows()[0];
        assert_eq!(row.get_text("TLE_FETCHED"), Some("YES"));
        assert_eq!(row.get_text("DATA_SOURCE"), Some("Celestrak"));
        assert!(row.contains(LAST_UPDATED_FIELD));
        assert!(!row.contains("INCLINATION"));
    }

    #[test]
    fn test_structural_error_aborts() {
        let err = reconcile(&master_spec(), &texts("<html></html>", Some(ACTIVE_CSV), None))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NoTableFound));
    }

    #[test]
    fn test_missing_secondary_text_aborts() {
        let err = reconcile(&master_spec(), &texts(SATCAT_PAGE, None, None)).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::MissingSourceText { ref source_label } if source_label == "ACTIVE"
        ));
    }

    #[test]
    fn test_per_object_targets() {
        let make = |id: Option<NoradId>, status| UnifiedRecord {
            norad_id: id,
            fields: FieldRecord::new(),
            status,
            tle: TleEnrichment::NotRequested,
        };
        let records = vec![
            make(Some(5), SatStatus::Inactive),
            make(Some(25544), SatStatus::Active),
            make(None, SatStatus::Unknown),
            make(Some(25544), SatStatus::Active),
            make(Some(43017), SatStatus::Active),
        ];
        assert_eq!(per_object_targets(&records, None), vec![25544, 43017]);
        assert_eq!(per_object_targets(&records, Some(1)), vec![25544]);
    }

    #[tokio::test]
    async fn test_run_pipeline_with_per_object_tle() {
        let n2yo = format!(
            r#"{{"info":{{"satid":25544,"satname":"SPACE STATION"}},"tle":"{}\r\n{}"}}"#,
            ISS_L1, ISS_L2
        );
        let fetcher = StaticFetcher::new([
            ("satcat", SATCAT_PAGE),
            ("active", ACTIVE_CSV),
            ("tle/25544?key=K", n2yo.as_str()),
        ]);
        let spec = PipelineSpec {
            tle: Some(TleSource::PerObject {
                url_template: "tle/{id}?key={api_key}".to_string(),
                delay_ms: 0,
                limit: None,
            }),
            ..master_spec()
        };

        let output = run_pipeline(&spec, &fetcher, Some("K")).await.unwrap();

        assert_eq!(fetcher.requests(), vec!["satcat", "active", "tle/25544?key=K"]);
        assert!(output.records[0].is_tle_enriched());
        assert_eq!(output.records[1].tle, TleEnrichment::Missing);
        assert!(output.table.fields.iter().any(|f| f.name == "TLE_LINE1"));
        assert_eq!(output.rows()[0].get_text(TLE_NAME_FIELD), Some("SPACE STATION"));
    }

    #[tokio::test]
    async fn test_run_pipeline_requires_api_key() {
        let fetcher = StaticFetcher::new([("satcat", SATCAT_PAGE), ("active", ACTIVE_CSV)]);
        let spec = PipelineSpec {
            tle: Some(TleSource::PerObject {
                url_template: "tle/{id}?key={api_key}".to_string(),
                delay_ms: 0,
                limit: None,
            }),
            ..master_spec()
        };
        let err = run_pipeline(&spec, &fetcher, None).await.unwrap_err();
        assert!(matches!(err, ReconcileError::MissingApiKey { .. }));
    }

    #[tokio::test]
    async fn test_run_pipeline_fetch_failure() {
        let fetcher = StaticFetcher::new([("satcat", SATCAT_PAGE)]);
        let err = run_pipeline(&master_spec(), &fetcher, None).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Fetch(_)));
    }

    #[test]
    fn test_pipeline_spec_from_toml() {
        let spec: PipelineSpec = toml::from_str(
            r#"
            name = "master"
            data_source = "planet4589.org + Celestrak"

            [primary]
            label = "SATCAT"
            url = "https://planet4589.org/space/gcat/data/cat/satcat.html"
            format = { kind = "fixed_width_html" }
            id_convention = "jcat"

            [secondary]
            label = "ACTIVE"
            url = "https://celestrak.org/NORAD/elements/gp.php?GROUP=active&FORMAT=csv"
            format = { kind = "csv" }

            [tle]
            kind = "per_object"
            url_template = "https://api.n2yo.com/rest/v1/satellite/tle/{id}?apiKey={api_key}"
            limit = 100
            "#,
        )
        .unwrap();

        assert_eq!(spec.primary.format, SourceFormat::FixedWidthHtml { record_marker: 'S' });
        assert_eq!(spec.primary.id_convention, IdConvention::Jcat);
        assert_eq!(spec.status_field, "STATUS");
        assert_eq!(spec.table_name, "satellites");
        match spec.tle {
            Some(TleSource::PerObject { delay_ms, limit, .. }) => {
                assert_eq!(delay_ms, 1000);
                assert_eq!(limit, Some(100));
            }
            other => panic!("unexpected TLE source: {:?}", other),
        }
    }
}
