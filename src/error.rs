use thiserror::Error as ThisError;

use std::error::Error;
use std::fmt;
use std::io::Error as IOError;
use std::path::PathBuf;

/// Failure of a whole run.
///
/// Heuristic misses are not errors: a box that fails the geometric or text
/// filter is simply left out of the result.
#[derive(Debug)]
pub struct LprError(LprErrorKind);

#[derive(Debug, ThisError)]
pub enum LprErrorKind {
    /// The input image is missing or unreadable. Fatal, nothing is produced.
    #[error("cannot load image {}: {source}", path.display())]
    Load { path: PathBuf, source: image::ImageError },
    #[error(transparent)]
    IOError(#[from] IOError),
    #[error(transparent)]
    ImageError(#[from] image::ImageError),
    /// One candidate could not be read. Only that candidate is dropped.
    #[error("ocr failed: {0}")]
    Ocr(String),
    #[error("malformed config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl LprError {
    pub fn kind(&self) -> &LprErrorKind {
        &self.0
    }

    pub fn is_load_error(&self) -> bool {
        matches!(self.0, LprErrorKind::Load { .. })
    }

    pub(crate) fn load(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self(LprErrorKind::Load { path: path.into(), source })
    }
}

impl<T> From<T> for LprError
where T:  Into<LprErrorKind>
{
    fn from(e: T) -> Self {
        Self(e.into())
    }
}

impl fmt::Display for LprError {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.kind(), f)
    }
}

impl Error for LprError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.kind().source()
    }
}
