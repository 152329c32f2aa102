//! JSON report of a finished scan

use crate::output::traits::{OutputHandler, OutputResult};
use crate::state::ScanReport;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes the full serialized report after each scan
#[derive(Debug, Clone)]
pub struct JsonReportWriter {
    path: PathBuf,
}

impl JsonReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputHandler for JsonReportWriter {
    fn name(&self) -> &'static str {
        "JSON report"
    }

    fn write_report(&self, report: &ScanReport) -> OutputResult<()> {
        write_json_report(report, &self.path)
    }
}

/// Serializes the report as pretty-printed JSON
pub fn write_json_report(report: &ScanReport, output_path: &Path) -> OutputResult<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(output_path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Reads a report written by [`write_json_report`]
pub fn read_json_report(path: &Path) -> OutputResult<ScanReport> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
