//! Output writers: CSV, JSON document, PostgreSQL DDL and raw archives

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use satcat_common::FieldRecord;
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use crate::module::catalog::{ColumnType, PipelineOutput, SchemaField, TableDefinition};

/// Write rows as CSV. The header is the union of every row's fields so
/// records with and without secondary data share one file.
pub async fn write_csv(path: &Path, rows: &[FieldRecord]) -> Result<()> {
    let header = FieldRecord::union_names(rows);

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for row in rows {
        let values = header.iter().map(|name| {
            row.get(name)
                .map(|v| v.to_raw_string())
                .unwrap_or_default()
        });
        writer.write_record(values)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV buffer: {}", e))?;

    ensure_parent(path).await?;
    fs::write(path, bytes)
        .await
        .context(format!("Failed to write CSV: {:?}", path))?;

    tracing::info!("Wrote {} rows to {:?}", rows.len(), path);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ExportMeta<'a> {
    pipeline: &'a str,
    run_id: Uuid,
    source: String,
    fetched_utc: DateTime<Utc>,
    record_count: usize,
    fields: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ExportDocument<'a> {
    meta: ExportMeta<'a>,
    satellites: Vec<FieldRecord>,
}

/// Write `{ meta, satellites }` as pretty JSON
pub async fn write_json(path: &Path, output: &PipelineOutput) -> Result<()> {
    let satellites = output.rows();
    let document = ExportDocument {
        meta: ExportMeta {
            pipeline: &output.name,
            run_id: output.run_id,
            source: output.sources.join(", "),
            fetched_utc: output.fetched_utc,
            record_count: satellites.len(),
            fields: FieldRecord::union_names(&satellites),
        },
        satellites,
    };

    let content = serde_json::to_string_pretty(&document)?;
    ensure_parent(path).await?;
    fs::write(path, content)
        .await
        .context(format!("Failed to write JSON: {:?}", path))?;

    tracing::info!("Wrote {} records to {:?}", document.meta.record_count, path);
    Ok(())
}

/// Lower-cased column name usable without quoting
pub fn sql_identifier(name: &str) -> String {
    let mut ident: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

fn postgres_type(field: &SchemaField) -> &'static str {
    match field.column_type {
        ColumnType::IdentifierString => "VARCHAR(50)",
        ColumnType::Timestamp if field.implicit => "TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
        ColumnType::Timestamp => "TIMESTAMP",
        ColumnType::ShortText | ColumnType::FreeText => "VARCHAR(255)",
        ColumnType::LongText => "TEXT",
        ColumnType::Numeric => "DOUBLE PRECISION",
        ColumnType::Serial => "SERIAL",
    }
}

/// Storage name for every field, in field order. Names that collapse to the
/// same identifier (`Status` and `STATUS`) get `_2`, `_3`, ... suffixes in
/// the order they appear.
pub fn sql_column_names(fields: &[SchemaField]) -> Vec<String> {
    let mut used = HashSet::new();
    fields
        .iter()
        .map(|field| {
            let base = sql_identifier(&field.name);
            let mut candidate = base.clone();
            let mut n = 2;
            while !used.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

pub fn render_postgres_ddl(table: &TableDefinition) -> String {
    let table_name = sql_identifier(&table.name);
    let names = sql_column_names(&table.fields);
    let columns: Vec<String> = table
        .fields
        .iter()
        .zip(&names)
        .map(|(field, name)| {
            let mut column = format!("    {} {}", name, postgres_type(field));
            if field.name == table.primary_key {
                column.push_str(" PRIMARY KEY");
            }
            column
        })
        .collect();

    let mut ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
        table_name,
        columns.join(",\n")
    );

    let index_column = table.index_on.as_ref().and_then(|index_on| {
        table
            .fields
            .iter()
            .position(|f| !f.implicit && &f.name == index_on)
            .map(|i| &names[i])
    });
    if let Some(column) = index_column {
        ddl.push_str(&format!(
            "\nCREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({});\n",
            table_name, column, table_name, column
        ));
    }
    ddl
}

pub async fn write_ddl(path: &Path, table: &TableDefinition) -> Result<()> {
    ensure_parent(path).await?;
    fs::write(path, render_postgres_ddl(table))
        .await
        .context(format!("Failed to write schema: {:?}", path))?;
    Ok(())
}

/// Keep one raw copy of a source per day. Returns the new file, or `None`
/// when today's copy already exists.
pub async fn archive_raw(
    archive_dir: &Path,
    prefix: &str,
    extension: &str,
    text: &str,
    date: DateTime<Utc>,
) -> Result<Option<PathBuf>> {
    let path = archive_dir.join(format!("{}-{}.{}", prefix, date.format("%Y%m%d"), extension));
    if fs::try_exists(&path).await.unwrap_or(false) {
        tracing::debug!("Archive {:?} already exists for today, skipping", path);
        return Ok(None);
    }

    fs::create_dir_all(archive_dir)
        .await
        .context(format!("Failed to create archive directory: {:?}", archive_dir))?;
    fs::write(&path, text)
        .await
        .context(format!("Failed to write archive: {:?}", path))?;

    tracing::info!("Archived raw source to {:?}", path);
    Ok(Some(path))
}

/// Files written for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub csv: PathBuf,
    pub json: PathBuf,
    pub ddl: PathBuf,
}

/// Write CSV, JSON and DDL named after the pipeline into `output_dir`
pub async fn export_all(output_dir: &Path, output: &PipelineOutput) -> Result<ExportPaths> {
    let paths = ExportPaths {
        csv: output_dir.join(format!("{}.csv", output.name)),
        json: output_dir.join(format!("{}.json", output.name)),
        ddl: output_dir.join(format!("{}_schema.sql", output.name)),
    };

    write_csv(&paths.csv, &output.rows()).await?;
    write_json(&paths.json, output).await?;
    write_ddl(&paths.ddl, &output.table).await?;

    Ok(paths)
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .context(format!("Failed to create output directory: {:?}", parent))?;
    }
    Ok(())
}
