pub mod config;
pub mod record;

pub use config::{
    BlurPlacement, ConfigError, LabelPolicy, OcrEngine, OcrSettings, ParserSettings, RunConfig,
    TransformConfig,
};
pub use record::{NumberingMode, ParsedRecord, RecordTable, SourceSummary, TableBuilder, HEADER};
