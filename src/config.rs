use serde::{Deserialize, Deserializer};

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{LprError, LprErrorKind};
use crate::image_process::MAX_CLOSE_KERNEL;

/// Tunables for one pipeline run.
///
/// Every field has a default, and a TOML file only needs to name the
/// fields it overrides:
///
/// ```toml
/// min_height = 20
/// char_whitelist = "ABCDEFGHJKLMNPRSTUVWXYZ0123456789"
///
/// [aspect_ratio_range]
/// min = 3.0
/// max = 6.0
///
/// [binarization]
/// method = "global"
/// threshold = 127
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LprConfig {
    pub binarization: Binarization,
    /// side of the square structuring element used for closing, odd
    pub close_kernel: u32,
    pub aspect_ratio_range: AspectRange,
    /// boxes must be strictly taller than this, in pixels
    pub min_height: u32,
    /// recognized text shorter than this (in chars) is dropped
    pub min_text_length: usize,
    pub char_whitelist: CharWhitelist,
    /// run OCR for independent candidates on the rayon pool
    pub parallel_ocr: bool,
}

impl Default for LprConfig {
    fn default() -> Self {
        Self {
            binarization: Binarization::default(),
            close_kernel: 5,
            aspect_ratio_range: AspectRange::default(),
            min_height: 15,
            min_text_length: 5,
            char_whitelist: CharWhitelist::default(),
            parallel_ocr: false,
        }
    }
}

impl LprConfig {

    pub fn from_toml_str(content: &str) -> Result<Self, LprError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, LprError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), LprError> {
        let AspectRange { min, max } = self.aspect_ratio_range;
        if !min.is_finite() || !max.is_finite() || min <= 0.0 {
            return Err(invalid(format!("aspect ratio bounds must be finite and positive, got ({}, {})", min, max)));
        }
        if min >= max {
            return Err(invalid(format!("aspect ratio range is empty: ({}, {})", min, max)));
        }
        if self.close_kernel == 0 || self.close_kernel % 2 == 0 {
            return Err(invalid(format!("close_kernel must be odd, got {}", self.close_kernel)));
        }
        if self.close_kernel > MAX_CLOSE_KERNEL {
            return Err(invalid(format!("close_kernel must be at most {}, got {}", MAX_CLOSE_KERNEL, self.close_kernel)));
        }
        if let Binarization::Adaptive { block_size, offset, .. } = self.binarization {
            if block_size < 3 || block_size % 2 == 0 {
                return Err(invalid(format!("adaptive block_size must be odd and >= 3, got {}", block_size)));
            }
            if !(-255..=255).contains(&offset) {
                return Err(invalid(format!("adaptive offset must be within -255..=255, got {}", offset)));
            }
        }
        if self.char_whitelist.is_empty() {
            return Err(invalid("char_whitelist is empty".to_string()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> LprError {
    LprErrorKind::InvalidConfig(message).into()
}

/// How the grayscale raster is split into foreground and background.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Binarization {
    /// Pixels brighter than `threshold` are foreground.
    Global { threshold: u8 },
    /// Like `Global`, with the level picked from the histogram.
    Otsu,
    /// Pixels darker than their neighbourhood mean minus `offset` are
    /// foreground. Tolerates uneven lighting across the frame.
    Adaptive {
        block_size: u32,
        offset: i16,
        #[serde(default)]
        weighting: AdaptiveMethod,
    },
}

impl Default for Binarization {
    fn default() -> Self {
        Binarization::Adaptive { block_size: 11, offset: 2, weighting: AdaptiveMethod::Mean }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveMethod {
    #[default]
    Mean,
    Gaussian,
}

/// Open interval of accepted `width / height` ratios.
///
/// Plate formats differ: `(2.0, 5.0)` and `(3.0, 6.0)` have both been used
/// in the field. The default spans both.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AspectRange {
    pub min: f32,
    pub max: f32,
}

impl AspectRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, ratio: f32) -> bool {
        self.min < ratio && ratio < self.max
    }
}

impl Default for AspectRange {
    fn default() -> Self {
        Self { min: 2.0, max: 6.0 }
    }
}

/// Characters the OCR engine may emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharWhitelist(BTreeSet<char>);

impl CharWhitelist {
    pub fn contains(&self, c: char) -> bool {
        self.0.contains(&c)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.0.iter().copied()
    }
}

/// Uppercase latin letters and digits.
impl Default for CharWhitelist {
    fn default() -> Self {
        ('A'..='Z').chain('0'..='9').collect()
    }
}

impl FromIterator<char> for CharWhitelist {
    fn from_iter<T: IntoIterator<Item = char>>(iter: T) -> Self {
        Self(iter.into_iter().filter(|c| !c.is_whitespace()).collect())
    }
}

impl From<&str> for CharWhitelist {
    fn from(chars: &str) -> Self {
        chars.chars().collect()
    }
}

impl fmt::Display for CharWhitelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|c| write!(f, "{}", c))
    }
}

impl<'de> Deserialize<'de> for CharWhitelist {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let chars = String::deserialize(deserializer)?;
        Ok(CharWhitelist::from(chars.as_str()))
    }
}
