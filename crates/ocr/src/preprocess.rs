use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::path::Path;
use stagetab_core::{BlurPlacement, TransformConfig};
use thiserror::Error;

const INK: u8 = 255;
const BACKGROUND: u8 = 0;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to write processed image: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrientation {
    Horizontal,
    Vertical,
}

/// Grayscale → (blur) → inverted Otsu → (blur) → ruled-line suppression.
///
/// Every step returns a new image; the source is never touched.
#[derive(Debug, Clone)]
pub struct TransformChain {
    config: TransformConfig,
}

impl TransformChain {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Decode a source photograph. Corrupt or unreadable files are errors,
    /// never an empty image.
    pub fn load(path: &Path) -> Result<DynamicImage, PreprocessError> {
        Ok(image::open(path)?)
    }

    pub fn apply(&self, img: &DynamicImage) -> GrayImage {
        let c = &self.config;

        let mut work = grayscale(img);
        if c.blur == BlurPlacement::BeforeBinarize {
            work = blur(&work, c.blur_sigma);
        }
        work = binarize_inverted(&work);
        if c.blur == BlurPlacement::AfterBinarize {
            work = blur(&work, c.blur_sigma);
        }
        if c.suppress_horizontal_lines {
            work = suppress_lines(
                &work,
                LineOrientation::Horizontal,
                c.line_kernel_length,
                c.open_iterations,
            );
        }
        if c.suppress_vertical_lines {
            work = suppress_lines(
                &work,
                LineOrientation::Vertical,
                c.line_kernel_length,
                c.open_iterations,
            );
        }
        work
    }

    /// Load `src`, condition it, and write the result to `dest`.
    /// The output format follows `dest`'s extension.
    pub fn prepare_file(&self, src: &Path, dest: &Path) -> Result<GrayImage, PreprocessError> {
        let img = Self::load(src)?;
        let processed = self.apply(&img);
        processed
            .save(dest)
            .map_err(|e| PreprocessError::Encode(e.to_string()))?;
        Ok(processed)
    }
}

pub fn grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Otsu threshold with inverted polarity: dark ink becomes 255, paper 0.
pub fn binarize_inverted(gray: &GrayImage) -> GrayImage {
    let level = imageproc::contrast::otsu_level(gray);
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([BACKGROUND])
        } else {
            Luma([INK])
        }
    })
}

pub fn blur(gray: &GrayImage, sigma: f32) -> GrayImage {
    imageproc::filter::gaussian_blur_f32(gray, sigma)
}

/// Erase straight ink runs at least `length` pixels long in one direction.
///
/// The runs are isolated with an opening (`iterations` erosions, then as many
/// dilations) by a 1-pixel-thick rectangular element; each outer contour of
/// what survives has its bounding box, grown by one pixel, painted background.
/// If nothing survives the opening the input is returned unchanged.
pub fn suppress_lines(
    image: &GrayImage,
    orientation: LineOrientation,
    length: u32,
    iterations: u32,
) -> GrayImage {
    let mask = line_mask(orientation, length);

    let mut detected = image.clone();
    for _ in 0..iterations {
        detected = grayscale_erode(&detected, &mask);
    }
    for _ in 0..iterations {
        detected = grayscale_dilate(&detected, &mask);
    }

    let mut out = image.clone();
    let outer = find_contours::<i32>(&detected)
        .into_iter()
        .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer));
    for contour in outer {
        if let Some(rect) = padded_bounds(&contour.points, 1, image.width(), image.height()) {
            draw_filled_rect_mut(&mut out, rect, Luma([BACKGROUND]));
        }
    }
    out
}

fn line_mask(orientation: LineOrientation, length: u32) -> Mask {
    let length = length.clamp(1, 511);
    let (w, h, cx, cy) = match orientation {
        LineOrientation::Horizontal => (length, 1, length / 2, 0),
        LineOrientation::Vertical => (1, length, 0, length / 2),
    };
    let element = GrayImage::from_pixel(w, h, Luma([INK]));
    // cx/cy ≤ 255 because length ≤ 511.
    Mask::from_image(&element, cx as u8, cy as u8)
}

fn padded_bounds(
    points: &[imageproc::point::Point<i32>],
    pad: i32,
    width: u32,
    height: u32,
) -> Option<Rect> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in points {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    let x0 = (x0 - pad).max(0);
    let y0 = (y0 - pad).max(0);
    let x1 = (x1 + pad).min(width as i32 - 1);
    let y1 = (y1 + pad).min(height as i32 - 1);
    if x1 < x0 || y1 < y0 {
        return None;
    }
    Some(Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32))
}

/// Encode as PNG bytes for an OCR backend.
pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}
