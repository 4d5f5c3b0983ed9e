use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::recognizer::OcrError;
use crate::types::CharBox;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Parse Tesseract box output: one `symbol x1 y1 x2 y2 page` per line.
/// The symbol itself may contain spaces, so fields are taken from the right.
pub fn parse_box_text(text: &str) -> Result<Vec<CharBox>, OcrError> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(parse_box_line)
        .collect()
}

fn parse_box_line(line: &str) -> Result<CharBox, OcrError> {
    let malformed = || OcrError::Engine(format!("malformed box line: {line:?}"));

    let mut fields = line.rsplitn(6, ' ');
    let mut number = || -> Result<u32, OcrError> {
        fields
            .next()
            .and_then(|f| f.trim().parse().ok())
            .ok_or_else(malformed)
    };
    let page = number()?;
    let y2 = number()?;
    let x2 = number()?;
    let y1 = number()?;
    let x1 = number()?;
    let symbol = fields.next().ok_or_else(malformed)?.to_string();

    Ok(CharBox {
        symbol,
        x1,
        y1,
        x2,
        y2,
        page,
    })
}

/// Outline every box on a color copy of `image`.
/// Box rows are flipped from Tesseract's bottom-left origin.
pub fn draw_boxes(image: &GrayImage, boxes: &[CharBox]) -> RgbImage {
    let mut canvas = image::DynamicImage::ImageLuma8(image.clone()).to_rgb8();
    let height = image.height() as i64;

    for b in boxes {
        let top = height - b.y2 as i64;
        let bottom = height - b.y1 as i64;
        let width = b.x2.saturating_sub(b.x1);
        let box_height = bottom - top;
        if width == 0 || box_height <= 0 {
            continue;
        }
        let rect = Rect::at(b.x1 as i32, top as i32).of_size(width, box_height as u32);
        draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn parses_box_lines() {
        let boxes = parse_box_text("1 10 80 18 95 0\nC 20 80 30 96 0\n").unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(
            boxes[1],
            CharBox {
                symbol: "C".into(),
                x1: 20,
                y1: 80,
                x2: 30,
                y2: 96,
                page: 0
            }
        );
    }

    #[test]
    fn multibyte_symbol_kept() {
        let boxes = parse_box_text("é 1 2 3 4 0").unwrap();
        assert_eq!(boxes[0].symbol, "é");
    }

    #[test]
    fn malformed_line_is_engine_error() {
        assert!(matches!(
            parse_box_text("C 20 80 x 96 0"),
            Err(OcrError::Engine(_))
        ));
        assert!(parse_box_text("20 80 30 96 0").is_err());
    }

    #[test]
    fn blank_output_has_no_boxes() {
        assert!(parse_box_text("\n\n").unwrap().is_empty());
    }

    #[test]
    fn draws_box_with_flipped_rows() {
        let img = GrayImage::from_pixel(20, 20, Luma([0]));
        let b = CharBox {
            symbol: "A".into(),
            x1: 2,
            y1: 2,
            x2: 8,
            y2: 10,
            page: 0,
        };
        let out = draw_boxes(&img, &[b]);
        // rows 10..18 from the top once flipped
        assert_eq!(*out.get_pixel(2, 10), BOX_COLOR);
        assert_eq!(*out.get_pixel(2, 17), BOX_COLOR);
        assert_eq!(*out.get_pixel(2, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn degenerate_boxes_skipped() {
        let img = GrayImage::from_pixel(10, 10, Luma([0]));
        let b = CharBox {
            symbol: ".".into(),
            x1: 4,
            y1: 4,
            x2: 4,
            y2: 6,
            page: 0,
        };
        assert!(draw_boxes(&img, &[b]).pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
