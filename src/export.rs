// 📤 History Export - JSON / CSV snapshots of the calculation log

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::Connection;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::db::{get_all_history, CalculationRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => anyhow::bail!("Unknown export format: {}", other),
        }
    }
}

/// `calculator_history_<YYYYmmdd_HHMMSS>.<ext>`
pub fn export_filename(format: ExportFormat) -> String {
    format!(
        "calculator_history_{}.{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

pub fn export_json(records: &[CalculationRecord], path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer_pretty(file, records).context("Failed to write JSON export")?;
    Ok(())
}

pub fn export_csv(records: &[CalculationRecord], path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;

    for record in records {
        writer.serialize(record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the (optionally session scoped) history into `export_dir`.
/// Returns the path of the new file.
pub fn export_history(
    conn: &Connection,
    export_dir: &Path,
    format: ExportFormat,
    session_id: Option<&str>,
) -> Result<PathBuf> {
    fs::create_dir_all(export_dir)
        .with_context(|| format!("Failed to create export directory {:?}", export_dir))?;

    let records = get_all_history(conn, session_id)?;
    let path = export_dir.join(export_filename(format));

    match format {
        ExportFormat::Json => export_json(&records, &path)?,
        ExportFormat::Csv => export_csv(&records, &path)?,
    }

    info!("Exported {} calculations to {:?}", records.len(), path);
    Ok(path)
}
