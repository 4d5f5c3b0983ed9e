use std::path::PathBuf;

use clap::Parser;
use stagetab_core::{ConfigError, LabelPolicy, NumberingMode, OcrEngine, RunConfig};

/// Turn photographed route boards into a stage table.
#[derive(Parser, Debug)]
#[command(
    name = "stagetab",
    version,
    about = "Condition route-board photos, OCR them and write a stage table"
)]
pub struct Cli {
    /// TOML file with run settings; flags below override it.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory of source photographs.
    #[arg(long)]
    pub raw_dir: Option<PathBuf>,

    /// Directory the conditioned images are written to and read back from.
    #[arg(long)]
    pub processed_dir: Option<PathBuf>,

    /// Output table; `.xlsx` or `.csv`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stage numbering across the whole run or restarting per image.
    #[arg(long, value_enum)]
    pub numbering: Option<NumberingArg>,

    /// Images handled concurrently.
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: Option<u16>,

    #[arg(long, value_enum)]
    pub engine: Option<EngineArg>,

    /// Tesseract language code, e.g. `eng` or `eng+fra`.
    #[arg(long)]
    pub lang: Option<String>,

    /// Directory holding the `.traineddata` files.
    #[arg(long)]
    pub tessdata: Option<PathBuf>,

    /// Path or name of the tesseract executable.
    #[arg(long)]
    pub tesseract_bin: Option<String>,

    /// Also erase long horizontal strokes.
    #[arg(long)]
    pub horizontal_lines: bool,

    /// Keep vertical ruling lines.
    #[arg(long)]
    pub no_vertical_lines: bool,

    #[arg(long, value_enum)]
    pub label_policy: Option<LabelPolicyArg>,

    /// Write `<stem>.boxes.png` character-box overlays into DIR.
    #[arg(long, value_name = "DIR")]
    pub debug_boxes: Option<PathBuf>,

    /// Reuse the processed directory as-is and only run OCR.
    #[arg(long)]
    pub skip_conditioning: bool,

    /// Enable DEBUG-level logs.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum NumberingArg {
    Global,
    PerSource,
}

impl From<NumberingArg> for NumberingMode {
    fn from(v: NumberingArg) -> Self {
        match v {
            NumberingArg::Global => NumberingMode::Global,
            NumberingArg::PerSource => NumberingMode::PerSource,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum EngineArg {
    Cli,
    Leptess,
}

impl From<EngineArg> for OcrEngine {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Cli => OcrEngine::Cli,
            EngineArg::Leptess => OcrEngine::Leptess,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum LabelPolicyArg {
    SecondToken,
    SkipUnitMarkers,
}

impl From<LabelPolicyArg> for LabelPolicy {
    fn from(v: LabelPolicyArg) -> Self {
        match v {
            LabelPolicyArg::SecondToken => LabelPolicy::SecondToken,
            LabelPolicyArg::SkipUnitMarkers => LabelPolicy::SkipUnitMarkers,
        }
    }
}

impl Cli {
    /// Config file (or defaults) with every given flag applied on top.
    pub fn resolve(&self) -> Result<RunConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut RunConfig) {
        if let Some(dir) = &self.raw_dir {
            config.raw_dir = dir.clone();
        }
        if let Some(dir) = &self.processed_dir {
            config.processed_dir = dir.clone();
        }
        if let Some(out) = &self.output {
            config.output = out.clone();
        }
        if let Some(mode) = self.numbering {
            config.numbering = mode.into();
        }
        if let Some(n) = self.workers {
            config.workers = usize::from(n);
        }
        if let Some(engine) = self.engine {
            config.ocr.engine = engine.into();
        }
        if let Some(lang) = &self.lang {
            config.ocr.language = lang.clone();
        }
        if let Some(dir) = &self.tessdata {
            config.ocr.tessdata_dir = Some(dir.clone());
        }
        if let Some(bin) = &self.tesseract_bin {
            config.ocr.tesseract_bin = bin.clone();
        }
        if self.horizontal_lines {
            config.transform.suppress_horizontal_lines = true;
        }
        if self.no_vertical_lines {
            config.transform.suppress_vertical_lines = false;
        }
        if let Some(policy) = self.label_policy {
            config.parser.label_policy = policy.into();
        }
        if let Some(dir) = &self.debug_boxes {
            config.debug_boxes_dir = Some(dir.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("stagetab").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_flags_gives_defaults() {
        let config = parse(&[]).resolve().unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--raw-dir",
            "in",
            "--output",
            "out.csv",
            "--numbering",
            "per-source",
            "--workers",
            "4",
            "--lang",
            "fra",
            "--horizontal-lines",
            "--no-vertical-lines",
            "--label-policy",
            "skip-unit-markers",
            "--debug-boxes",
            "boxes",
        ])
        .resolve()
        .unwrap();

        assert_eq!(config.raw_dir, PathBuf::from("in"));
        assert_eq!(config.processed_dir, PathBuf::from("processed_images"));
        assert_eq!(config.output, PathBuf::from("out.csv"));
        assert_eq!(config.numbering, NumberingMode::PerSource);
        assert_eq!(config.workers, 4);
        assert_eq!(config.ocr.language, "fra");
        assert!(config.transform.suppress_horizontal_lines);
        assert!(!config.transform.suppress_vertical_lines);
        assert_eq!(config.parser.label_policy, LabelPolicy::SkipUnitMarkers);
        assert_eq!(config.debug_boxes_dir, Some(PathBuf::from("boxes")));
    }

    #[test]
    fn flags_win_over_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = 2\noutput = \"file.xlsx\"\n[ocr]\nlanguage = \"deu\"").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = parse(&["--config", &path, "--workers", "8"]).resolve().unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.output, PathBuf::from("file.xlsx"));
        assert_eq!(config.ocr.language, "deu");
    }

    #[test]
    fn zero_workers_rejected_by_parser() {
        let args = ["stagetab", "--workers", "0"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn empty_language_fails_validation() {
        let err = parse(&["--lang", " "]).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_config_file_is_read_error() {
        let err = parse(&["--config", "/no/such/stagetab.toml"]).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
