use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};

use super::{Attempt, CompressionStrategy};
use crate::engine::{run_with_timeout, EngineLocator};
use crate::error::Result;
use crate::quality::Quality;

/// Runs Ghostscript's `pdfwrite` device with a quality preset.
pub struct GhostscriptStrategy {
    locator: Box<dyn EngineLocator>,
    timeout: Duration,
}

impl GhostscriptStrategy {
    pub fn new(locator: Box<dyn EngineLocator>, timeout: Duration) -> Self {
        GhostscriptStrategy { locator, timeout }
    }
}

/// Flag order matters: quiet/batch keep Ghostscript from prompting, and the
/// output must precede the input.
pub fn ghostscript_args(input: &Path, output: &Path, quality: Quality) -> Vec<OsString> {
    let mut out_flag = OsString::from("-sOutputFile=");
    out_flag.push(output);
    vec![
        "-sDEVICE=pdfwrite".into(),
        "-dCompatibilityLevel=1.4".into(),
        format!("-dPDFSETTINGS={}", quality.pdf_settings()).into(),
        "-dNOPAUSE".into(),
        "-dBATCH".into(),
        "-dQUIET".into(),
        out_flag,
        input.as_os_str().to_os_string(),
    ]
}

impl CompressionStrategy for GhostscriptStrategy {
    fn name(&self) -> &'static str {
        "ghostscript"
    }

    fn attempt(&self, input: &Path, output: &Path, quality: Quality) -> Result<Attempt> {
        let Some(gs) = self.locator.locate() else {
            info!("Ghostscript unavailable, skipping");
            return Ok(Attempt::Declined);
        };

        info!(
            "Running Ghostscript with quality {} ({})",
            quality,
            quality.pdf_settings()
        );
        let run = match run_with_timeout(&gs, ghostscript_args(input, output, quality), self.timeout)
        {
            Ok(run) => run,
            Err(e) => {
                warn!("Ghostscript could not be started ({}): {}", gs.display(), e);
                return Ok(Attempt::Declined);
            }
        };

        if run.timed_out() {
            warn!("Ghostscript timed out after {:?}", self.timeout);
            return Ok(Attempt::Declined);
        }
        if run.success() && output.exists() {
            info!("Ghostscript compression successful");
            return Ok(Attempt::Produced);
        }

        let code = run.status.and_then(|s| s.code());
        if run.success() {
            warn!("Ghostscript exited cleanly but wrote no output");
        } else {
            warn!("Ghostscript failed. Return code: {:?}", code);
        }
        let stderr = run.stderr_lossy();
        if !stderr.is_empty() {
            warn!("Ghostscript stderr: {}", stderr);
        }
        Ok(Attempt::Declined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FixedLocator;
    use std::path::PathBuf;

    #[test]
    fn flag_set_is_exact() {
        let args = ghostscript_args(Path::new("in.pdf"), Path::new("out.pdf"), Quality::High);
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-sDEVICE=pdfwrite",
                "-dCompatibilityLevel=1.4",
                "-dPDFSETTINGS=/printer",
                "-dNOPAUSE",
                "-dBATCH",
                "-dQUIET",
                "-sOutputFile=out.pdf",
                "in.pdf",
            ]
        );
    }

    #[test]
    fn declines_without_engine() {
        let tmp = tempfile::tempdir().unwrap();
        let strategy = GhostscriptStrategy::new(Box::new(FixedLocator(None)), Duration::from_secs(1));
        let attempt = strategy
            .attempt(&tmp.path().join("in.pdf"), &tmp.path().join("out.pdf"), Quality::Low)
            .unwrap();
        assert_eq!(attempt, Attempt::Declined);
    }

    #[test]
    fn declines_when_binary_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = FixedLocator(Some(PathBuf::from("/nonexistent/bin/gs")));
        let strategy = GhostscriptStrategy::new(Box::new(locator), Duration::from_secs(1));
        let attempt = strategy
            .attempt(&tmp.path().join("in.pdf"), &tmp.path().join("out.pdf"), Quality::Low)
            .unwrap();
        assert_eq!(attempt, Attempt::Declined);
    }
}
