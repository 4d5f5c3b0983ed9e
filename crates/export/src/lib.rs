pub mod csv;
pub mod xlsx;

use std::path::{Path, PathBuf};

use stagetab_core::RecordTable;
use thiserror::Error;

pub use crate::csv::CsvSink;
pub use crate::xlsx::XlsxSink;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("Unsupported output format for {}: expected .xlsx or .csv", .0.display())]
    UnsupportedFormat(PathBuf),
}

/// Destination for the finished table. Called exactly once per run.
pub trait TableSink {
    fn write_table(&self, table: &RecordTable) -> Result<(), ExportError>;
}

/// Pick a sink from the output file's extension.
pub fn sink_for(path: &Path) -> Result<Box<dyn TableSink>, ExportError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match ext.as_deref() {
        Some("xlsx") => Ok(Box::new(XlsxSink::new(path))),
        Some("csv") => Ok(Box::new(CsvSink::new(path))),
        _ => Err(ExportError::UnsupportedFormat(path.to_path_buf())),
    }
}
