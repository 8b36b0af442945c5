use image::imageops;
use image::GrayImage;
use imageproc::rect::Rect;
use tracing::{trace, warn};

use crate::config::AspectRange;
use crate::error::LprError;

/// Axis-aligned rectangle in source image coordinates. Never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl BoundingBox {
    /// `None` when `width` or `height` is zero.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { x, y, width, height })
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl From<BoundingBox> for Rect {
    fn from(b: BoundingBox) -> Self {
        Rect::at(b.x as i32, b.y as i32).of_size(b.width, b.height)
    }
}

/// A box that passed the geometric filter, with its grayscale crop.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub region: GrayImage,
}

/// An accepted plate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub text: String,
}

/// Geometric plate heuristic: aspect ratio inside the open `range`, and
/// strictly taller than `min_height`.
pub fn accepts(bbox: &BoundingBox, range: AspectRange, min_height: u32) -> bool {
    range.contains(bbox.aspect_ratio()) && bbox.height() > min_height
}

/// Keep the plausible boxes and crop each one out of `gray`. Boxes must come
/// from a mask with the same dimensions as `gray`.
pub fn filter_candidates<'a, I>(
    boxes: I,
    gray: &'a GrayImage,
    range: AspectRange,
    min_height: u32,
) -> impl Iterator<Item = Candidate> + 'a
where
    I: IntoIterator<Item = BoundingBox>,
    I::IntoIter: 'a,
{
    boxes.into_iter().filter_map(move |bbox| {
        if !accepts(&bbox, range, min_height) {
            trace!(?bbox, ratio = bbox.aspect_ratio(), "rejected box");
            return None;
        }
        let region = imageops::crop_imm(gray, bbox.x(), bbox.y(), bbox.width(), bbox.height()).to_image();
        Some(Candidate { bbox, region })
    })
}

/// Plates are a single line of characters: drop every whitespace char.
pub fn normalize_text(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Pair each candidate with its OCR outcome and keep those whose normalized
/// text is at least `min_text_length` chars long. Order follows `candidates`.
pub fn aggregate<I>(candidates: &[Candidate], texts: I, min_text_length: usize) -> Vec<Detection>
where
    I: IntoIterator<Item = Result<String, LprError>>,
{
    candidates.iter().zip(texts).filter_map(|(candidate, text)| {
        let text = match text {
            Ok(text) => normalize_text(&text),
            Err(e) => {
                warn!(bbox = ?candidate.bbox, error = %e, "dropping candidate");
                return None;
            }
        };
        if text.chars().count() < min_text_length {
            trace!(bbox = ?candidate.bbox, %text, "text too short");
            return None;
        }
        Some(Detection { bbox: candidate.bbox, text })
    }).collect()
}


#[cfg(test)]
mod test {

    use image::{GrayImage, Luma};

    use super::*;
    use crate::error::LprErrorKind;

    fn candidate(x: u32) -> Candidate {
        let bbox = BoundingBox::new(x, 0, 40, 10).unwrap();
        Candidate { bbox, region: GrayImage::new(40, 10) }
    }

    #[test]
    fn empty_boxes_cannot_exist() {
        assert!(BoundingBox::new(3, 4, 10, 0).is_none());
        assert!(BoundingBox::new(3, 4, 0, 10).is_none());
    }

    #[test]
    fn aspect_ratio_is_width_over_height() {
        let b = BoundingBox::new(0, 0, 200, 50).unwrap();
        assert_eq!(b.aspect_ratio(), 4.0);
        let thin = BoundingBox::new(0, 0, 1, 1).unwrap();
        assert!(thin.aspect_ratio().is_finite());
    }

    #[test]
    fn accepts_plate_shaped_box() {
        let range = AspectRange::new(3.0, 6.0);
        let b = BoundingBox::new(10, 10, 200, 50).unwrap();
        assert!(accepts(&b, range, 30));
    }

    #[test]
    fn rejects_square_box_at_any_height() {
        let range = AspectRange::new(3.0, 6.0);
        for height in [10, 50, 400] {
            let width = height * 3 / 2;
            let b = BoundingBox::new(0, 0, width, height).unwrap();
            assert_eq!(b.aspect_ratio(), 1.5);
            assert!(!accepts(&b, range, 30));
        }
    }

    #[test]
    fn rejects_short_box() {
        let range = AspectRange::new(3.0, 6.0);
        let b = BoundingBox::new(0, 0, 120, 30).unwrap();
        assert!(!accepts(&b, range, 30));
        let b = BoundingBox::new(0, 0, 124, 31).unwrap();
        assert!(accepts(&b, range, 30));
    }

    #[test]
    fn filter_crops_from_grayscale() {
        let gray = GrayImage::from_fn(100, 40, |x, y| Luma([(x + y) as u8]));
        let boxes = vec![
            BoundingBox::new(10, 5, 60, 20).unwrap(),
            BoundingBox::new(0, 0, 20, 20).unwrap(),
        ];
        let candidates: Vec<Candidate> = filter_candidates(boxes, &gray, AspectRange::new(2.0, 5.0), 10).collect();
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.region.dimensions(), (60, 20));
        assert_eq!(c.region.get_pixel(0, 0).0[0], 15);
        assert_eq!(c.region.get_pixel(59, 19).0[0], 10 + 59 + 5 + 19);
    }

    #[test]
    fn normalizes_ocr_noise() {
        assert_eq!(normalize_text(" AB1 23CD \n"), "AB123CD");
        assert_eq!(normalize_text("KA01\r\nAB1234\n\x0c"), "KA01AB1234");
        assert_eq!(normalize_text("\n \t"), "");
    }

    #[test]
    fn drops_short_and_failed_text() {
        let candidates = vec![candidate(0), candidate(50), candidate(100), candidate(150)];
        let texts: Vec<Result<String, LprError>> = vec![
            Ok("ABC".to_string()),
            Ok(" AB1 23CD \n".to_string()),
            Err(LprErrorKind::Ocr("engine crashed".into()).into()),
            Ok("\n".to_string()),
        ];
        let detections = aggregate(&candidates, texts, 5);
        assert_eq!(detections, vec![Detection { bbox: candidates[1].bbox, text: "AB123CD".to_string() }]);
    }

    #[test]
    fn keeps_discovery_order() {
        let candidates = vec![candidate(150), candidate(0), candidate(75)];
        let texts = ["PLATE1", "PLATE2", "PLATE3"].iter().map(|t| Ok(t.to_string()));
        let detections = aggregate(&candidates, texts, 5);
        let xs: Vec<u32> = detections.iter().map(|d| d.bbox.x()).collect();
        assert_eq!(xs, vec![150, 0, 75]);
    }
}
