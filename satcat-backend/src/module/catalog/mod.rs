//! Satellite catalog reconciliation
//!
//! Turns irregular catalog sources into one keyed dataset.
//!
//! ## Flow
//! - Sources (fixed-width HTML, CSV, TLE) are parsed into `RecordSet`s
//! - Identifiers are normalized to NORAD catalog numbers
//! - The primary set is left-joined with the secondary set, deriving status
//! - TLE lines are attached, then a storage schema is inferred
//!
//! ## Main Components
//! - `parse_fixed_width` / `parse_satcat_html`: positional table reader
//! - `join`: status-deriving left join
//! - `reconcile` / `run_pipeline`: configurable driver

// ============ Source Readers ============
mod fixed_width;
pub use fixed_width::{
    parse_fixed_width, ColumnLayout, ColumnSpan, FixedWidthTable, RowStats,
    COMMENT_MARKER, DEFAULT_RECORD_MARKER,
};

mod satcat_html;
pub use satcat_html::{extract_pre_blocks, parse_satcat_html, PreBlocks};

mod csv_source;
pub use csv_source::parse_csv_records;

mod tle;
pub use tle::{
    attach_tle, parse_n2yo_response, parse_tle_block, triplet_norad_id,
    triplets_to_record_set, TleAttachStats, TleBlockReport,
};

// ============ Identifiers & Join ============
mod identifier;
pub use identifier::{
    decode_alpha5, normalize_identifier, normalize_jcat, normalize_norad, IdConvention,
};

mod joiner;
pub use joiner::{
    identify, join, resolve_id_column, JoinOutcome, JoinSpec, JoinStats,
    ID_COLUMN_HINTS, ID_COLUMN_PRIORITY,
};

// ============ Storage Schema ============
mod schema;
pub use schema::{
    infer_column_type, infer_schema, infer_table, infer_table_from_record, ColumnType,
    SchemaField, TableDefinition, CREATED_AT, SYNTHETIC_KEY,
};

// ============ Pipeline ============
mod pipeline;
pub use pipeline::{
    attach_per_object, enrich_per_object, fetch_sources, parse_source, per_object_targets,
    reconcile, run_pipeline,
    PipelineOutput, PipelineSpec, PipelineStats, SourceFormat, SourceSpec, SourceTexts,
    TleSource, DATA_SOURCE_FIELD, DEFAULT_STATUS_FIELD, LAST_UPDATED_FIELD,
};
