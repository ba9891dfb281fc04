//! PDF compression pipeline: Ghostscript when the host has it, in-process
//! image recompression with `lopdf` and `image` otherwise.

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod quality;
pub mod raster;
pub mod server;
pub mod staging;
pub mod strategy;

pub use config::{EngineSelection, PipelineConfig, ServerConfig};
pub use error::{CompressError, InvalidQuality};
pub use pipeline::{compression_ratio, CompressionOutcome, CompressionReport, Compressor};
pub use quality::{Quality, RecompressSettings};
pub use raster::fit_within;
pub use staging::{cleanup, StagedFile, Staging};
