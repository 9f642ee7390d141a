pub mod types;

pub use types::{
    FieldRecord, FieldValue, NoradId, RecordSet, SatStatus, TleEnrichment, TleTriplet,
    UnifiedRecord, PLACEHOLDER, TLE_FETCHED_FIELD, TLE_LINE1_FIELD, TLE_LINE2_FIELD,
    TLE_NAME_FIELD,
};
