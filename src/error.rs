use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load PDF: {0}")]
    PdfLoad(#[source] lopdf::Error),

    #[error("Failed to save PDF: {0}")]
    PdfSave(#[source] lopdf::Error),

    #[error("No compression strategy produced an output")]
    NoStrategySucceeded,
}

impl CompressError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompressError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid quality '{0}'. Must be one of: low, medium, high, maximum")]
pub struct InvalidQuality(pub String);

pub type Result<T> = std::result::Result<T, CompressError>;
