use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::module::catalog::{
    IdConvention, PipelineSpec, SourceFormat, SourceSpec, TleSource, DEFAULT_RECORD_MARKER,
};

pub const CONFIG_PATH: &str = "config.toml";
pub const API_KEY_ENV: &str = "N2YO_API_KEY";

pub const GCAT_SATCAT_URL: &str = "https://planet4589.org/space/gcat/data/cat/satcat.html";
pub const CELESTRAK_ACTIVE_CSV_URL: &str = "https://celestrak.org/NORAD/elements/gp.php?GROUP=active&FORMAT=csv";
pub const CELESTRAK_ACTIVE_TLE_URL: &str = "https://celestrak.org/NORAD/elements/gp.php?GROUP=active&FORMAT=tle";

/// Fields kept from the Celestrak GP CSV
const ACTIVE_SELECT_FIELDS: &[&str] = &[
    "OBJECT_NAME",
    "NORAD_CAT_ID",
    "OBJECT_TYPE",
    "RCS_SIZE",
    "COUNTRY_CODE",
    "LAUNCH_DATE",
    "EPOCH",
    "MEAN_MOTION",
    "ECCENTRICITY",
    "INCLINATION",
    "RA_OF_ASC_NODE",
    "ARG_OF_PERICENTER",
    "MEAN_ANOMALY",
    "SEMIMAJOR_AXIS",
    "PERIOD",
    "APOAPSIS",
    "PERIAPSIS",
    "DECAY_DATE",
];

const ACTIVE_NUMERIC_FIELDS: &[&str] = &[
    "MEAN_MOTION",
    "ECCENTRICITY",
    "INCLINATION",
    "RA_OF_ASC_NODE",
    "ARG_OF_PERICENTER",
    "MEAN_ANOMALY",
    "SEMIMAJOR_AXIS",
    "PERIOD",
    "APOAPSIS",
    "PERIAPSIS",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Log files older than this are removed by the cleanup task
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Keep a dated raw copy of every primary source
    #[serde(default = "default_archive_raw")]
    pub archive_raw: bool,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// N2YO API key; `N2YO_API_KEY` is used when unset
    #[serde(default)]
    pub n2yo_api_key: Option<String>,

    #[serde(default = "default_pipelines")]
    pub pipelines: Vec<PipelineSpec>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u64 {
    3
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_archive_raw() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    "Mozilla/5.0 satcat-backend/0.1".to_string()
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// GCAT master list joined with the Celestrak active list, and the active
/// list on its own with bulk TLE.
pub fn default_pipelines() -> Vec<PipelineSpec> {
    let active = SourceSpec {
        label: "ACTIVE".to_string(),
        url: CELESTRAK_ACTIVE_CSV_URL.to_string(),
        format: SourceFormat::Csv,
        id_column: Some("NORAD_CAT_ID".to_string()),
        id_convention: IdConvention::Norad,
        select_fields: None,
        numeric_fields: Vec::new(),
        limit: None,
    };

    vec![
        PipelineSpec {
            name: "satellite_master_list".to_string(),
            primary: SourceSpec {
                label: "SATCAT".to_string(),
                url: GCAT_SATCAT_URL.to_string(),
                format: SourceFormat::FixedWidthHtml {
                    record_marker: DEFAULT_RECORD_MARKER,
                },
                id_column: None,
                id_convention: IdConvention::Jcat,
                select_fields: None,
                numeric_fields: Vec::new(),
                limit: None,
            },
            secondary: Some(active.clone()),
            tle: None,
            table_name: "satellites".to_string(),
            status_field: "STATUS".to_string(),
            data_source: Some("planet4589.org + Celestrak".to_string()),
        },
        PipelineSpec {
            name: "active".to_string(),
            primary: SourceSpec {
                select_fields: Some(strings(ACTIVE_SELECT_FIELDS)),
                numeric_fields: strings(ACTIVE_NUMERIC_FIELDS),
                ..active
            },
            secondary: None,
            tle: Some(TleSource::Bulk {
                url: CELESTRAK_ACTIVE_TLE_URL.to_string(),
            }),
            table_name: "satellites_tle".to_string(),
            status_field: "STATUS".to_string(),
            data_source: None,
        },
    ]
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            log_retention_days: default_log_retention_days(),
            output_dir: default_output_dir(),
            archive_raw: default_archive_raw(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            n2yo_api_key: None,
            pipelines: default_pipelines(),
        }
    }
}

impl BackendConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file {:?}", path))?;
        let config: BackendConfig = toml::from_str(&content)
            .context(format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    /// Configured key, else the environment
    pub fn api_key(&self) -> Option<String> {
        resolve_api_key(self.n2yo_api_key.as_deref(), std::env::var(API_KEY_ENV).ok())
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.output_dir.join("archive")
    }
}

fn resolve_api_key(configured: Option<&str>, env: Option<String>) -> Option<String> {
    configured
        .map(str::to_string)
        .or(env)
        .filter(|key| !key.trim().is_empty())
}

pub static CONFIG: OnceLock<BackendConfig> = OnceLock::new();

/// Load `config.toml` into [`CONFIG`]. A missing file means defaults; a
/// file that does not parse is an error.
pub fn read_config() -> anyhow::Result<&'static BackendConfig> {
    let path = Path::new(CONFIG_PATH);
    let config = if path.exists() {
        BackendConfig::from_file(path)?
    } else {
        BackendConfig::default()
    };

    CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Configuration already loaded"))?;
    CONFIG
        .get()
        .ok_or_else(|| anyhow::anyhow!("Configuration not initialized"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BackendConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_retention_days, 3);
        assert_eq!(config.pipelines.len(), 2);
        assert_eq!(config.pipelines[0].primary.url, GCAT_SATCAT_URL);
        assert_eq!(config.archive_dir(), PathBuf::from("data").join("archive"));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"\noutput_dir = \"out\"").unwrap();

        let config = BackendConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.pipelines.len(), 2);
    }

    #[test]
    fn test_from_file_with_pipeline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            n2yo_api_key = "KEY"

            [[pipelines]]
            name = "n2yo"
            [pipelines.primary]
            label = "ACTIVE"
            url = "{}"
            format = {{ kind = "csv" }}
            limit = 100
            [pipelines.tle]
            kind = "per_object"
            url_template = "https://api.n2yo.com/rest/v1/satellite/tle/{{id}}?apiKey={{api_key}}"
            "#,
            CELESTRAK_ACTIVE_CSV_URL
        )
        .unwrap();

        let config = BackendConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pipelines.len(), 1);
        assert_eq!(config.pipelines[0].primary.limit, Some(100));
        assert_eq!(config.api_key().as_deref(), Some("KEY"));
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = [").unwrap();
        assert!(BackendConfig::from_file(file.path()).is_err());
        assert!(BackendConfig::from_file("/nonexistent/config.toml").is_err());
    }

    #[test]
    fn test_resolve_api_key() {
        assert_eq!(resolve_api_key(Some("a"), Some("b".to_string())).as_deref(), Some("a"));
        assert_eq!(resolve_api_key(None, Some("b".to_string())).as_deref(), Some("b"));
        assert_eq!(resolve_api_key(Some("  "), None), None);
        assert_eq!(resolve_api_key(None, None), None);
    }
}
