use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{GrayImage, ImageFormat};
use stagetab_core::{NumberingMode, ParsedRecord, RecordTable, RunConfig, TableBuilder};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::boxes::draw_boxes;
use crate::extract::RecordParser;
use crate::preprocess::{self, PreprocessError, TransformChain};
use crate::recognizer::{OcrBackend, OcrError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Conditioning {} failed: {source}", .path.display())]
    Preprocess {
        path: PathBuf,
        #[source]
        source: PreprocessError,
    },
    #[error("OCR of {} failed: {source}", .path.display())]
    Ocr {
        path: PathBuf,
        #[source]
        source: OcrError,
    },
    #[error("Worker pool error: {0}")]
    Worker(String),
}

impl PipelineError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The per-image work, shared with worker tasks.
struct Stages<R> {
    recognizer: R,
    chain: TransformChain,
    parser: RecordParser,
    debug_boxes_dir: Option<PathBuf>,
}

impl<R: OcrBackend> Stages<R> {
    /// Condition one photograph into `processed_dir` under [`processed_name`].
    fn condition(&self, src: &Path, processed_dir: &Path) -> Result<PathBuf, PipelineError> {
        let file_name = src.file_name().ok_or_else(|| PipelineError::Io {
            path: src.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
        })?;
        let dest = processed_dir.join(processed_name(file_name));

        let processed = self
            .chain
            .prepare_file(src, &dest)
            .map_err(|source| PipelineError::Preprocess {
                path: src.to_path_buf(),
                source,
            })?;

        if let Some(dir) = &self.debug_boxes_dir {
            self.write_box_overlay(&processed, src, dir)?;
        }

        info!(src = %src.display(), dest = %dest.display(), "Image conditioned");
        Ok(dest)
    }

    fn write_box_overlay(
        &self,
        processed: &GrayImage,
        src: &Path,
        dir: &Path,
    ) -> Result<(), PipelineError> {
        let preprocess_err = |source: PreprocessError| PipelineError::Preprocess {
            path: src.to_path_buf(),
            source,
        };
        let bytes = preprocess::encode_png(processed).map_err(preprocess_err)?;
        let boxes = match self.recognizer.char_boxes(&bytes) {
            Ok(boxes) => boxes,
            Err(OcrError::Unsupported(what)) => {
                warn!(src = %src.display(), "OCR backend has no {what}; overlay skipped");
                return Ok(());
            }
            Err(source) => {
                return Err(PipelineError::Ocr {
                    path: src.to_path_buf(),
                    source,
                })
            }
        };

        let stem = src.file_stem().unwrap_or_default().to_string_lossy();
        let dest = dir.join(format!("{stem}.boxes.png"));
        draw_boxes(processed, &boxes)
            .save(&dest)
            .map_err(|e| preprocess_err(PreprocessError::Encode(e.to_string())))?;
        debug!(dest = %dest.display(), boxes = boxes.len(), "Box overlay written");
        Ok(())
    }

    /// OCR one processed image and parse its text.
    fn recognize(&self, path: &Path) -> Result<Vec<ParsedRecord>, PipelineError> {
        let bytes = std::fs::read(path).map_err(PipelineError::io(path))?;
        let text = self
            .recognizer
            .recognize(&bytes)
            .map_err(|source| PipelineError::Ocr {
                path: path.to_path_buf(),
                source,
            })?;
        let records = self.parser.parse_lines(&text);
        debug!(
            path = %path.display(),
            lines = text.lines().count(),
            accepted = records.len(),
            "Image recognized"
        );
        Ok(records)
    }
}

/// File name of the conditioned copy of a source image.
///
/// The conditioned image is single-channel. Formats whose encoder accepts that
/// keep the source name; any other (gif, webp, ico, …) gets `.png` appended, so
/// names stay unique and sort in source order.
pub fn processed_name(file_name: &OsStr) -> OsString {
    let keeps_format = matches!(
        ImageFormat::from_path(Path::new(file_name)),
        Ok(ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Bmp
            | ImageFormat::Tiff
            | ImageFormat::Pnm
            | ImageFormat::Tga)
    );
    let mut name = file_name.to_os_string();
    if !keeps_format {
        name.push(".png");
    }
    name
}

/// Orchestrates: list → condition → write → list processed → OCR → parse → table.
pub struct RoutePipeline<R: OcrBackend> {
    stages: Arc<Stages<R>>,
    numbering: NumberingMode,
    workers: usize,
}

impl<R: OcrBackend + 'static> RoutePipeline<R> {
    pub fn new(recognizer: R, config: &RunConfig) -> Self {
        Self {
            stages: Arc::new(Stages {
                recognizer,
                chain: TransformChain::new(config.transform.clone()),
                parser: RecordParser::new(config.parser.label_policy),
                debug_boxes_dir: config.debug_boxes_dir.clone(),
            }),
            numbering: config.numbering,
            workers: config.workers.max(1),
        }
    }

    /// Condition every image of `raw_dir` into `processed_dir` (created if
    /// absent). Returns the written paths in sorted source order.
    pub async fn condition_dir(
        &self,
        raw_dir: &Path,
        processed_dir: &Path,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let sources = list_images(raw_dir).await?;
        tokio::fs::create_dir_all(processed_dir)
            .await
            .map_err(PipelineError::io(processed_dir))?;
        if let Some(dir) = &self.stages.debug_boxes_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(PipelineError::io(dir))?;
        }

        info!(count = sources.len(), dir = %raw_dir.display(), "Conditioning images");
        let processed_dir = processed_dir.to_path_buf();
        self.run_each(sources, move |stages, src| {
            stages.condition(src, &processed_dir)
        })
        .await
    }

    /// OCR every image of `processed_dir` and fold the records into one table
    /// in sorted file-name order.
    pub async fn recognize_dir(&self, processed_dir: &Path) -> Result<RecordTable, PipelineError> {
        let images = list_images(processed_dir).await?;
        info!(count = images.len(), dir = %processed_dir.display(), "Recognizing images");

        let per_image = self
            .run_each(images.clone(), |stages, path| stages.recognize(path))
            .await?;

        let table = images
            .into_iter()
            .zip(per_image)
            .fold(TableBuilder::new(self.numbering), |builder, (path, records)| {
                builder.with_source(path, records)
            })
            .build();
        Ok(table)
    }

    /// Both stages back to back; the processed directory is re-read as the
    /// OCR input.
    pub async fn run(
        &self,
        raw_dir: &Path,
        processed_dir: &Path,
    ) -> Result<RecordTable, PipelineError> {
        self.condition_dir(raw_dir, processed_dir).await?;
        self.recognize_dir(processed_dir).await
    }

    /// Apply `job` to each path, returning results in input order.
    ///
    /// With one worker the paths are handled strictly one after another.
    /// Otherwise at most `workers` run at once; the first failure aborts the
    /// rest.
    async fn run_each<T, F>(&self, paths: Vec<PathBuf>, job: F) -> Result<Vec<T>, PipelineError>
    where
        T: Send + 'static,
        F: Fn(&Stages<R>, &Path) -> Result<T, PipelineError> + Send + Sync + 'static,
    {
        let job = Arc::new(job);

        if self.workers == 1 {
            let mut out = Vec::with_capacity(paths.len());
            for path in paths {
                let stages = Arc::clone(&self.stages);
                let job = Arc::clone(&job);
                let result = tokio::task::spawn_blocking(move || (*job)(stages.as_ref(), path.as_path()))
                    .await
                    .map_err(|e| PipelineError::Worker(e.to_string()))??;
                out.push(result);
            }
            return Ok(out);
        }

        let total = paths.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();
        for (idx, path) in paths.into_iter().enumerate() {
            let stages = Arc::clone(&self.stages);
            let job = Arc::clone(&job);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::Worker(e.to_string()))?;
                let result = tokio::task::spawn_blocking(move || (*job)(stages.as_ref(), path.as_path()))
                    .await
                    .map_err(|e| PipelineError::Worker(e.to_string()))??;
                Ok::<_, PipelineError>((idx, result))
            });
        }

        let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (idx, result) = joined.map_err(|e| PipelineError::Worker(e.to_string()))??;
            slots[idx] = Some(result);
        }
        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| PipelineError::Worker("missing result".into())))
            .collect()
    }
}

/// Image files directly inside `dir`, sorted by file name.
/// Hidden files and files without a known raster extension are skipped.
pub async fn list_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(PipelineError::io(dir))?;

    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(PipelineError::io(dir))? {
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }
        // `metadata` follows symlinks; a link to a photo counts as a photo.
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                warn!(path = %path.display(), "Skipping non-file entry");
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        }
        if ImageFormat::from_path(&path).is_err() {
            warn!(path = %path.display(), "Skipping non-image file");
            continue;
        }
        images.push(path);
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
