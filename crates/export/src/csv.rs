use std::io::Write;
use std::path::{Path, PathBuf};

use stagetab_core::RecordTable;
use tracing::info;

use crate::{ExportError, TableSink};

/// Plain CSV with the same header and columns as the spreadsheet.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

/// Write header and records to any writer.
pub fn write_csv<W: Write>(writer: W, table: &RecordTable) -> Result<(), ExportError> {
    let mut wtr = ::csv::Writer::from_writer(writer);
    wtr.write_record(table.header())?;
    for record in table.records() {
        wtr.write_record([
            record.distance.as_str(),
            record.stage_label.as_str(),
            record.sequence.to_string().as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

impl TableSink for CsvSink {
    fn write_table(&self, table: &RecordTable) -> Result<(), ExportError> {
        let file = std::fs::File::create(&self.path)?;
        write_csv(file, table)?;
        info!(path = %self.path.display(), rows = table.len(), "CSV written");
        Ok(())
    }
}
