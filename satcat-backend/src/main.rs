use satcat_backend::config;
use satcat_backend::module::catalog::{
    enrich_per_object, fetch_sources, reconcile, PipelineSpec, SourceFormat,
};
use satcat_backend::module::export::{archive_raw, export_all};
use satcat_backend::module::fetch::{HttpFetcher, TextFetcher};

use anyhow::{Context, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::read_config()?;

    // Initialize logging
    let _logging_guard = satcat_backend::logging::init_logging(
        &config.log_dir,
        "satcat-backend",
        &config.log_level,
        config.log_retention_days,
    )?;

    tracing::info!("Satcat backend starting, {} pipelines configured", config.pipelines.len());

    let fetcher = HttpFetcher::new(
        Duration::from_secs(config.request_timeout_secs),
        &config.user_agent,
    )
    .context("Failed to build HTTP client")?;
    let api_key = config.api_key();

    let mut failed = 0;
    for spec in &config.pipelines {
        if let Err(e) = run_one(config, spec, &fetcher, api_key.as_deref()).await {
            failed += 1;
            tracing::error!("Pipeline {} failed: {:#}", spec.name, e);
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} pipelines failed", failed, config.pipelines.len());
    }

    tracing::info!("All pipelines complete");
    Ok(())
}

async fn run_one(
    config: &config::BackendConfig,
    spec: &PipelineSpec,
    fetcher: &dyn TextFetcher,
    api_key: Option<&str>,
) -> Result<()> {
    tracing::info!("Running pipeline {}", spec.name);

    let texts = fetch_sources(spec, fetcher)
        .await
        .context("Failed to fetch sources")?;

    if config.archive_raw {
        let extension = match spec.primary.format {
            SourceFormat::FixedWidthHtml { .. } => "html",
            SourceFormat::Csv => "csv",
            SourceFormat::Tle => "txt",
        };
        let prefix = spec.primary.label.to_lowercase();
        archive_raw(
            &config.archive_dir(),
            &prefix,
            extension,
            &texts.primary,
            texts.fetched_utc,
        )
        .await?;
    }

    let mut output = reconcile(spec, &texts).context("Failed to reconcile sources")?;
    enrich_per_object(spec, &mut output, fetcher, api_key)
        .await
        .context("Failed to fetch per-object TLE")?;

    let paths = export_all(&config.output_dir, &output).await?;

    tracing::info!(
        "Pipeline {} (run {}) wrote {} records: {:?}, {:?}, {:?}",
        output.name,
        output.run_id,
        output.records.len(),
        paths.csv,
        paths.json,
        paths.ddl
    );
    Ok(())
}
