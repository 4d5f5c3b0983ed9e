use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Fixed header row written above every table.
pub const HEADER: [&str; 3] = ["Kms", "Stages", "Stage Number"];

/// One accepted "distance stage" line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRecord {
    /// ASCII digits only, never empty.
    pub distance: String,
    pub stage_label: String,
    /// 1-based position of the record, see [`NumberingMode`].
    pub sequence: u32,
}

impl ParsedRecord {
    pub fn new(distance: impl Into<String>, stage_label: impl Into<String>, sequence: u32) -> Self {
        Self {
            distance: distance.into(),
            stage_label: stage_label.into(),
            sequence,
        }
    }
}

/// How sequence numbers behave across source images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumberingMode {
    /// One running counter for the whole run.
    #[default]
    Global,
    /// Restart at 1 for every source image.
    PerSource,
}

impl fmt::Display for NumberingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberingMode::Global => write!(f, "global"),
            NumberingMode::PerSource => write!(f, "per-source"),
        }
    }
}

impl std::str::FromStr for NumberingMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(NumberingMode::Global),
            "per-source" => Ok(NumberingMode::PerSource),
            other => Err(format!("Unknown numbering mode: '{other}'")),
        }
    }
}

/// How many records each source image contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub path: PathBuf,
    pub accepted: usize,
}

/// The finished table: header plus records in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTable {
    records: Vec<ParsedRecord>,
    sources: Vec<SourceSummary>,
}

impl RecordTable {
    pub fn header(&self) -> [&'static str; 3] {
        HEADER
    }

    pub fn records(&self) -> &[ParsedRecord] {
        &self.records
    }

    pub fn sources(&self) -> &[SourceSummary] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Accumulates per-source records into a [`RecordTable`].
///
/// Consumed by value so a directory scan reads as a fold:
///
/// ```
/// use stagetab_core::{NumberingMode, ParsedRecord, TableBuilder};
///
/// let per_image = vec![
///     ("a.png", vec![ParsedRecord::new("12", "Col", 1)]),
///     ("b.png", vec![ParsedRecord::new("30", "Pass", 1)]),
/// ];
/// let table = per_image
///     .into_iter()
///     .fold(TableBuilder::new(NumberingMode::Global), |b, (path, recs)| {
///         b.with_source(path, recs)
///     })
///     .build();
/// assert_eq!(table.records()[1].sequence, 2);
/// ```
#[derive(Debug, Clone)]
pub struct TableBuilder {
    mode: NumberingMode,
    records: Vec<ParsedRecord>,
    sources: Vec<SourceSummary>,
}

impl TableBuilder {
    pub fn new(mode: NumberingMode) -> Self {
        Self {
            mode,
            records: Vec::new(),
            sources: Vec::new(),
        }
    }

    /// Append one source's records, renumbering them for the configured mode.
    /// Incoming sequence numbers are ignored; only their order matters.
    pub fn with_source(mut self, path: impl AsRef<Path>, records: Vec<ParsedRecord>) -> Self {
        let start = match self.mode {
            NumberingMode::Global => self.records.len() as u32 + 1,
            NumberingMode::PerSource => 1,
        };
        self.sources.push(SourceSummary {
            path: path.as_ref().to_path_buf(),
            accepted: records.len(),
        });
        self.records.extend(
            records
                .into_iter()
                .zip(start..)
                .map(|(record, sequence)| ParsedRecord { sequence, ..record }),
        );
        self
    }

    pub fn build(self) -> RecordTable {
        RecordTable {
            records: self.records,
            sources: self.sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two(prefix: &str) -> Vec<ParsedRecord> {
        vec![
            ParsedRecord::new("10", format!("{prefix}A"), 1),
            ParsedRecord::new("20", format!("{prefix}B"), 2),
        ]
    }

    #[test]
    fn global_numbering_spans_sources() {
        let table = TableBuilder::new(NumberingMode::Global)
            .with_source("one.png", two("x"))
            .with_source("two.png", two("y"))
            .build();
        let seq: Vec<u32> = table.records().iter().map(|r| r.sequence).collect();
        assert_eq!(seq, vec![1, 2, 3, 4]);
        assert_eq!(table.records()[2].stage_label, "yA");
    }

    #[test]
    fn per_source_numbering_restarts() {
        let table = TableBuilder::new(NumberingMode::PerSource)
            .with_source("one.png", two("x"))
            .with_source("two.png", two("y"))
            .build();
        let seq: Vec<u32> = table.records().iter().map(|r| r.sequence).collect();
        assert_eq!(seq, vec![1, 2, 1, 2]);
    }

    #[test]
    fn empty_source_is_recorded_but_consumes_no_numbers() {
        let table = TableBuilder::new(NumberingMode::Global)
            .with_source("blank.png", vec![])
            .with_source("two.png", two("y"))
            .build();
        assert_eq!(table.sources().len(), 2);
        assert_eq!(table.sources()[0].accepted, 0);
        assert_eq!(table.records()[0].sequence, 1);
    }

    #[test]
    fn header_is_fixed() {
        let table = TableBuilder::new(NumberingMode::Global).build();
        assert_eq!(table.header(), ["Kms", "Stages", "Stage Number"]);
        assert!(table.is_empty());
    }

    #[test]
    fn numbering_mode_roundtrip() {
        use std::str::FromStr;
        for mode in [NumberingMode::Global, NumberingMode::PerSource] {
            assert_eq!(NumberingMode::from_str(&mode.to_string()).unwrap(), mode);
        }
        assert!(NumberingMode::from_str("per-image").is_err());
    }
}
