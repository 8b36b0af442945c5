//! Text extraction for cropped plate regions.

use image::{GrayImage, ImageFormat};
use tracing::debug;

use std::path::PathBuf;
use std::process::Command;

use crate::config::CharWhitelist;
use crate::error::{LprError, LprErrorKind};

/// Anything that can read the characters in a grayscale crop.
///
/// Implementations return the raw engine output. Surrounding whitespace and
/// line breaks are cleaned up by the caller.
pub trait TextRecognizer: Send + Sync {
    fn recognize_text(&self, region: &GrayImage, whitelist: &CharWhitelist) -> Result<String, LprError>;
}

impl<R: TextRecognizer + ?Sized> TextRecognizer for Box<R> {
    fn recognize_text(&self, region: &GrayImage, whitelist: &CharWhitelist) -> Result<String, LprError> {
        (**self).recognize_text(region, whitelist)
    }
}

/// Runs the `tesseract` executable once per region.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    language: String,
    page_seg_mode: u8,
}

impl Default for TesseractCli {
    fn default() -> Self {
        // psm 8: treat the image as a single word
        Self { binary: PathBuf::from("tesseract"), language: "eng".to_string(), page_seg_mode: 8 }
    }
}

impl TesseractCli {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_page_seg_mode(mut self, page_seg_mode: u8) -> Self {
        self.page_seg_mode = page_seg_mode;
        self
    }

    fn command(&self, input: &std::path::Path, whitelist: &CharWhitelist) -> Command {
        let mut command = Command::new(&self.binary);
        command.arg(input)
            .arg("stdout")
            .args(["-l", self.language.as_str()])
            .arg("--psm")
            .arg(self.page_seg_mode.to_string())
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={}", whitelist));
        command
    }
}

impl TextRecognizer for TesseractCli {

    fn recognize_text(&self, region: &GrayImage, whitelist: &CharWhitelist) -> Result<String, LprError> {
        let input = tempfile::Builder::new().prefix("plate-").suffix(".png").tempfile()?;
        region.save_with_format(input.path(), ImageFormat::Png)?;

        let output = self.command(input.path(), whitelist).output().map_err(|e| {
            LprErrorKind::Ocr(format!("cannot run {}: {}", self.binary.display(), e))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LprErrorKind::Ocr(format!("{} exited with {}: {}",
                self.binary.display(), output.status, stderr.trim())).into());
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(width = region.width(), height = region.height(), text = text.trim(), "tesseract");
        Ok(text)
    }
}
