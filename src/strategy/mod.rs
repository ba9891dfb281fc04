//! Interchangeable ways of turning one PDF into a smaller one.

mod ghostscript;
mod rewrite;

use std::path::Path;

pub use ghostscript::{ghostscript_args, GhostscriptStrategy};
pub use rewrite::{page_image_ids, recompress_images, RewriteStrategy, RewriteSummary};

use crate::error::Result;
use crate::quality::Quality;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The output file was written.
    Produced,
    /// The strategy could not run or did not succeed; try the next one.
    Declined,
}

pub trait CompressionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Writes a compressed copy of `input` to `output`. `Err` is reserved for
    /// failures that no later strategy could recover from.
    fn attempt(&self, input: &Path, output: &Path, quality: Quality) -> Result<Attempt>;
}
