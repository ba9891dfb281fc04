//! Strategy selection, size accounting and file lifecycle for one request.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::PipelineConfig;
use crate::engine::locator_for;
use crate::error::{CompressError, Result};
use crate::quality::Quality;
use crate::staging::{self, Staging};
use crate::strategy::{Attempt, CompressionStrategy, GhostscriptStrategy, RewriteStrategy};

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutcome {
    pub output: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Name of the strategy that produced `output`.
    pub strategy: &'static str,
}

impl CompressionOutcome {
    pub fn ratio(&self) -> f64 {
        compression_ratio(self.original_size, self.compressed_size)
    }
}

/// What the HTTP layer reports back to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionReport {
    pub file_name: String,
    pub output: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
}

impl From<CompressionOutcome> for CompressionReport {
    fn from(outcome: CompressionOutcome) -> Self {
        CompressionReport {
            file_name: outcome
                .output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            compression_ratio: outcome.ratio(),
            original_size: outcome.original_size,
            compressed_size: outcome.compressed_size,
            output: outcome.output,
        }
    }
}

/// Percentage size reduction rounded to two decimals. Growth yields a
/// negative value; an empty original yields 0.
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    let ratio = (original_size as f64 - compressed_size as f64) / original_size as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

/// Tries each strategy once, in order, and owns the staged and produced
/// files for the duration of a request.
pub struct Compressor {
    staging: Staging,
    strategies: Vec<Box<dyn CompressionStrategy>>,
}

impl Compressor {
    /// Ghostscript first, in-process rewrite second. Creates the working
    /// directories.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let staging = Staging::init(&config.upload_dir, &config.output_dir)?;
        let strategies: Vec<Box<dyn CompressionStrategy>> = vec![
            Box::new(GhostscriptStrategy::new(
                locator_for(config),
                config.engine_timeout,
            )),
            Box::new(RewriteStrategy),
        ];
        Ok(Compressor::with_strategies(staging, strategies))
    }

    pub fn with_strategies(staging: Staging, strategies: Vec<Box<dyn CompressionStrategy>>) -> Self {
        Compressor {
            staging,
            strategies,
        }
    }

    pub fn staging(&self) -> &Staging {
        &self.staging
    }

    /// Stages `content`, compresses it and removes the staged copy whatever
    /// the outcome.
    pub fn compress(
        &self,
        content: &[u8],
        filename: &str,
        quality: Quality,
    ) -> Result<CompressionReport> {
        let staged = self.staging.stage(content, filename)?;
        let outcome = self.compress_staged(staged.path(), quality)?;
        Ok(outcome.into())
    }

    /// Compresses an already staged file into the output directory. The
    /// input is left in place.
    pub fn compress_staged(&self, input: &Path, quality: Quality) -> Result<CompressionOutcome> {
        let output = self.staging.output_path_for(input);
        let original_size = file_size(input)?;

        for strategy in &self.strategies {
            let guard = OutputGuard::new(&output);
            match strategy.attempt(input, &output, quality)? {
                Attempt::Produced => {
                    let compressed_size = file_size(&output)?;
                    guard.keep();
                    info!(
                        "{} compressed {} -> {} bytes ({}%)",
                        strategy.name(),
                        original_size,
                        compressed_size,
                        compression_ratio(original_size, compressed_size)
                    );
                    return Ok(CompressionOutcome {
                        output,
                        original_size,
                        compressed_size,
                        strategy: strategy.name(),
                    });
                }
                Attempt::Declined => info!("{} declined, trying next strategy", strategy.name()),
            }
        }

        warn!("No strategy could compress {}", input.display());
        Err(CompressError::NoStrategySucceeded)
    }

    pub fn cleanup(&self, path: &Path) {
        staging::cleanup(path);
    }
}

fn file_size(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| CompressError::io(path, e))
}

/// Removes a (possibly partial) output unless the attempt succeeded.
struct OutputGuard<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> OutputGuard<'a> {
    fn new(path: &'a Path) -> Self {
        OutputGuard { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            staging::cleanup(self.path);
        }
    }
}
