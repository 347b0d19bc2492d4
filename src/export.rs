//! Flat-file export of the unified tables and the aggregated summary.

use crate::table::{Table, TableRow};
use anyhow::{Context, Result};
use log::{error, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use sweep_common::SweepSummary;

/// Writes a unified table as CSV: `run_id, <swept…>, replicate, step, [agent_id,] <columns…>`.
pub fn write_table_to<R: TableRow, W: Write>(table: &Table<R>, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut header: Vec<String> = vec!["run_id".to_string()];
    header.extend(table.swept_names.iter().cloned());
    header.push("replicate".to_string());
    header.push("step".to_string());
    if R::HAS_AGENT_ID {
        header.push("agent_id".to_string());
    }
    header.extend(table.columns.iter().cloned());
    csv.write_record(&header)?;

    let mut record: Vec<String> = Vec::with_capacity(header.len());
    for row in &table.rows {
        record.clear();
        record.push(row.run_id().to_string());
        record.extend(row.swept().iter().map(f64::to_string));
        record.push(row.replicate().to_string());
        record.push(row.step().to_string());
        if let Some(agent_id) = row.agent_id() {
            record.push(agent_id.to_string());
        }
        record.extend(row.values().iter().map(f64::to_string));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

fn write_table<R: TableRow>(table: &Table<R>, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating '{}'", path.display()))?;
    write_table_to(table, BufWriter::new(file))?;
    info!("Saved {} rows to {}", table.len(), path.display());
    Ok(())
}

pub fn write_model_csv<R: TableRow>(table: &Table<R>, path: impl AsRef<Path>) -> Result<()> {
    write_table(table, path.as_ref())
}

pub fn write_agent_csv<R: TableRow>(table: &Table<R>, path: impl AsRef<Path>) -> Result<()> {
    write_table(table, path.as_ref())
}

/// Serializes the summary next to `base_filename` in the requested format.
///
/// Recognized formats are "json", "bincode" and "messagepack"; anything else
/// falls back to JSON. Returns the path written.
pub fn write_summary(summary: &SweepSummary, base_filename: &str, format: Option<&str>) -> Result<PathBuf> {
    let format = format.unwrap_or("json");
    let path = match format {
        "json" => write_summary_json(summary, base_filename)?,
        "bincode" => {
            // Binary format (compact, Rust-only readers)
            let path = PathBuf::from(format!("{base_filename}_summary.bin"));
            let mut file =
                BufWriter::new(File::create(&path).with_context(|| format!("creating '{}'", path.display()))?);
            bincode::serialize_into(&mut file, summary).context("serializing summary to bincode")?;
            file.flush()?;
            path
        }
        "messagepack" => {
            let path = PathBuf::from(format!("{base_filename}_summary.msgpack"));
            let mut file =
                BufWriter::new(File::create(&path).with_context(|| format!("creating '{}'", path.display()))?);
            rmp_serde::encode::write(&mut file, summary).context("serializing summary to MessagePack")?;
            file.flush()?;
            path
        }
        other => {
            error!("Unknown output format: {}. Using JSON instead.", other);
            write_summary_json(summary, base_filename)?
        }
    };
    info!("Summary saved to {} ({} format)", path.display(), format);
    Ok(path)
}

fn write_summary_json(summary: &SweepSummary, base_filename: &str) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{base_filename}_summary.json"));
    let mut file = BufWriter::new(File::create(&path).with_context(|| format!("creating '{}'", path.display()))?);
    serde_json::to_writer_pretty(&mut file, summary).context("serializing summary to JSON")?;
    file.flush()?;
    Ok(path)
}
