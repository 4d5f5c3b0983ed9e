use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;
use stagetab_core::RecordTable;
use tracing::info;

use crate::{ExportError, TableSink};

/// Single-sheet workbook: header row, then distance and label as text and
/// the stage number as a number.
pub struct XlsxSink {
    path: PathBuf,
}

impl XlsxSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

/// Build the workbook in memory without saving it.
pub fn build_workbook(table: &RecordTable) -> Result<Workbook, ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, title) in table.header().iter().enumerate() {
        sheet.write_string(0, col as u16, *title)?;
    }
    for (idx, record) in table.records().iter().enumerate() {
        let row = idx as u32 + 1;
        sheet.write_string(row, 0, record.distance.as_str())?;
        sheet.write_string(row, 1, record.stage_label.as_str())?;
        sheet.write_number(row, 2, record.sequence)?;
    }
    Ok(workbook)
}

impl TableSink for XlsxSink {
    fn write_table(&self, table: &RecordTable) -> Result<(), ExportError> {
        let mut workbook = build_workbook(table)?;
        workbook.save(&self.path)?;
        info!(path = %self.path.display(), rows = table.len(), "Spreadsheet written");
        Ok(())
    }
}
