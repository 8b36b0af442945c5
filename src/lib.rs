use image::{DynamicImage, GenericImageView, RgbImage};
use rayon::prelude::*;
use tracing::{debug, info};

use std::fmt;
use std::path::Path;

use error::LprError;

pub mod config;
pub mod error;
pub mod image_process;
pub mod ocr;
pub mod plate;
pub mod utils;

pub use config::{AdaptiveMethod, AspectRange, Binarization, CharWhitelist, LprConfig};
pub use error::LprErrorKind;
pub use ocr::{TesseractCli, TextRecognizer};
pub use plate::{BoundingBox, Candidate, Detection};


/// Read an image from disk. A missing or undecodable file is a load error.
pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage, LprError> {
    let path = path.as_ref();
    image::open(path).map_err(|e| LprError::load(path, e))
}

/// Contour based plate locator with a pluggable OCR engine.
pub struct Lpr<R = TesseractCli> {
    config: LprConfig,
    recognizer: R,
}

impl Lpr<TesseractCli> {

    pub fn with_tesseract(config: LprConfig) -> Result<Self, LprError> {
        Self::new(config, TesseractCli::default())
    }
}

impl<R: TextRecognizer> Lpr<R> {

    pub fn new(config: LprConfig, recognizer: R) -> Result<Self, LprError> {
        config.validate()?;
        Ok(Lpr { config, recognizer })
    }

    pub fn config(&self) -> &LprConfig {
        &self.config
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    /// Load `path` and recognize it. Only the load can fail.
    pub fn recognize_path(&self, path: impl AsRef<Path>) -> Result<Recognition, LprError> {
        let img = load_image(path)?;
        Ok(self.recognize(&img))
    }

    /// Recognize one image
    pub fn recognize(&self, img: &DynamicImage) -> Recognition {
        let candidates = self.detect_candidates(img);
        let texts = self.read_candidates(&candidates);
        let detections = plate::aggregate(&candidates, texts, self.config.min_text_length);
        info!(candidates = candidates.len(), plates = detections.len(), "recognized");

        let annotated = utils::annotate(img, detections.iter().map(|d| &d.bbox));
        Recognition { annotated, detections }
    }

    /// Boxes that look like plates, cropped from the grayscale image, in
    /// discovery order.
    pub fn detect_candidates(&self, img: &DynamicImage) -> Vec<Candidate> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let config = &self.config;
        let (gray, mask) = image_process::preprocess(img, config);
        let regions: Vec<BoundingBox> = image_process::extract_regions(&mask).collect();
        debug!(regions = regions.len(), "extracted regions");
        plate::filter_candidates(regions, &gray, config.aspect_ratio_range, config.min_height).collect()
    }

    /// Raw OCR output per candidate, same order as `candidates`.
    pub fn read_candidates(&self, candidates: &[Candidate]) -> Vec<Result<String, LprError>> {
        let whitelist = &self.config.char_whitelist;
        let read = |c: &Candidate| self.recognizer.recognize_text(&c.region, whitelist);
        if self.config.parallel_ocr {
            candidates.par_iter().map(read).collect()
        } else {
            candidates.iter().map(read).collect()
        }
    }
}

/// Outcome of a run: the plates found and the annotated copy of the input.
#[derive(Debug, Clone)]
pub struct Recognition {
    annotated: RgbImage,
    detections: Vec<Detection>,
}

impl Recognition {

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn annotated(&self) -> &RgbImage {
        &self.annotated
    }

    pub fn no_plates_detected(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn into_parts(self) -> (RgbImage, Vec<Detection>) {
        (self.annotated, self.detections)
    }
}

impl fmt::Display for Recognition {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.no_plates_detected() {
            return write!(f, "no plates detected");
        }
        for (i, detection) in self.detections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "Detected plate: {}", detection.text)?;
        }
        Ok(())
    }
}
