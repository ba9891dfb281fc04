//! Quality levels and the settings each compression strategy derives from them.

use std::fmt;
use std::str::FromStr;

use crate::error::InvalidQuality;

/// Abstract size/fidelity tradeoff requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    /// Smallest output, screen viewing.
    Low,
    #[default]
    Medium,
    /// Print quality.
    High,
    /// Archive quality, minimal loss.
    Maximum,
}

/// Image recompression parameters used by the in-process rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecompressSettings {
    /// JPEG quality, 0-100.
    pub jpeg_quality: u8,
    /// Longest allowed side in pixels before downscaling.
    pub max_dimension: u32,
}

impl Quality {
    pub const ALL: [Quality; 4] = [
        Quality::Low,
        Quality::Medium,
        Quality::High,
        Quality::Maximum,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::Maximum => "maximum",
        }
    }

    /// Lenient parse: unrecognized input falls back to `Medium`.
    pub fn resolve(value: &str) -> Quality {
        value.parse().unwrap_or_else(|_| {
            log::warn!("Unknown quality {:?}, using medium", value);
            Quality::Medium
        })
    }

    /// Ghostscript `-dPDFSETTINGS` preset.
    pub fn pdf_settings(self) -> &'static str {
        match self {
            Quality::Low => "/screen",
            Quality::Medium => "/ebook",
            Quality::High => "/printer",
            Quality::Maximum => "/prepress",
        }
    }

    pub fn recompress_settings(self) -> RecompressSettings {
        let jpeg_quality = match self {
            Quality::Low => 50,
            Quality::Medium => 70,
            Quality::High => 85,
            Quality::Maximum => 95,
        };
        let max_dimension = match self {
            Quality::Low => 2000,
            Quality::Medium => 3000,
            Quality::High | Quality::Maximum => 4000,
        };
        RecompressSettings {
            jpeg_quality,
            max_dimension,
        }
    }
}

impl FromStr for Quality {
    type Err = InvalidQuality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            "maximum" => Ok(Quality::Maximum),
            other => Err(InvalidQuality(other.to_string())),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
