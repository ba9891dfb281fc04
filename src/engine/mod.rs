//! Discovery and invocation of the external Ghostscript engine.

mod process;

use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;

pub use process::{run_with_timeout, RunOutput};

use crate::config::{EngineSelection, PipelineConfig};

#[cfg(windows)]
const INSTALL_PATTERNS: &[&str] = &[
    r"C:\Program Files\gs\gs*\bin\gswin64c.exe",
    r"C:\Program Files (x86)\gs\gs*\bin\gswin64c.exe",
    r"C:\Program Files\gs\gs*\bin\gswin32c.exe",
    r"C:\Program Files (x86)\gs\gs*\bin\gswin32c.exe",
];

#[cfg(not(windows))]
const INSTALL_PATTERNS: &[&str] = &[
    "/usr/bin/gs",
    "/usr/local/bin/gs",
    "/opt/homebrew/bin/gs",
    "/opt/local/bin/gs",
    "/usr/local/Cellar/ghostscript/*/bin/gs",
];

#[cfg(windows)]
const PATH_COMMANDS: &[&str] = &["gswin64c", "gswin32c", "gs"];

#[cfg(not(windows))]
const PATH_COMMANDS: &[&str] = &["gs"];

/// Finds an invocable compression engine. `None` means "not installed"
/// and is an ordinary answer, not a failure.
pub trait EngineLocator: Send + Sync {
    fn locate(&self) -> Option<PathBuf>;
}

/// Searches install-path patterns, then probes commands on `PATH` with `-v`.
#[derive(Debug, Clone)]
pub struct GhostscriptLocator {
    patterns: Vec<String>,
    commands: Vec<String>,
    probe_timeout: Duration,
}

impl GhostscriptLocator {
    pub fn new(probe_timeout: Duration) -> Self {
        GhostscriptLocator {
            patterns: INSTALL_PATTERNS.iter().map(|s| s.to_string()).collect(),
            commands: PATH_COMMANDS.iter().map(|s| s.to_string()).collect(),
            probe_timeout,
        }
    }

    pub fn with_search(
        patterns: Vec<String>,
        commands: Vec<String>,
        probe_timeout: Duration,
    ) -> Self {
        GhostscriptLocator {
            patterns,
            commands,
            probe_timeout,
        }
    }

    fn probe(&self, command: &str) -> bool {
        match run_with_timeout(Path::new(command), ["-v"], self.probe_timeout) {
            Ok(out) => out.success(),
            Err(e) => {
                debug!("Probe of {} failed: {}", command, e);
                false
            }
        }
    }
}

impl EngineLocator for GhostscriptLocator {
    fn locate(&self) -> Option<PathBuf> {
        for pattern in &self.patterns {
            if let Some(found) = expand_pattern(pattern).into_iter().next() {
                info!("Ghostscript found at {}", found.display());
                return Some(found);
            }
        }
        for command in &self.commands {
            if self.probe(command) {
                info!("Ghostscript found on PATH as {}", command);
                return Some(PathBuf::from(command));
            }
        }
        info!("Ghostscript not found");
        None
    }
}

/// Always answers with the same engine, or with none at all.
#[derive(Debug, Clone, Default)]
pub struct FixedLocator(pub Option<PathBuf>);

impl EngineLocator for FixedLocator {
    fn locate(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}

pub fn locator_for(config: &PipelineConfig) -> Box<dyn EngineLocator> {
    match &config.engine {
        EngineSelection::Discover => Box::new(GhostscriptLocator::new(config.probe_timeout)),
        EngineSelection::Pinned(path) => Box::new(FixedLocator(Some(path.clone()))),
        EngineSelection::Disabled => Box::new(FixedLocator(None)),
    }
}

/// Expands a glob pattern to existing files, newest version first. Numeric
/// runs in the path are compared as numbers, so `gs10.03.1` sorts ahead of
/// `gs9.56.1`.
pub fn expand_pattern(pattern: &str) -> Vec<PathBuf> {
    let matches = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(e) => {
            debug!("Bad install pattern {}: {}", pattern, e);
            return Vec::new();
        }
    };
    let mut found: Vec<PathBuf> = matches.flatten().filter(|p| p.is_file()).collect();
    found.sort_by_cached_key(|p| Reverse((version_key(p), p.clone())));
    found
}

fn version_key(path: &Path) -> Vec<u64> {
    lazy_static! {
        static ref DIGITS: Regex = Regex::new(r"\d+").unwrap();
    }
    DIGITS
        .find_iter(&path.to_string_lossy())
        .map(|m| m.as_str().parse().unwrap_or(u64::MAX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn expand_pattern_prefers_newest_version() {
        let tmp = tempfile::tempdir().unwrap();
        for version in ["gs9.56.1", "gs10.02.0", "gs10.03.1"] {
            let bin = tmp.path().join(version).join("bin");
            fs::create_dir_all(&bin).unwrap();
            fs::write(bin.join("gswin64c.exe"), b"").unwrap();
        }
        // a version directory without the executable is ignored
        fs::create_dir_all(tmp.path().join("gs99").join("bin")).unwrap();

        let pattern = tmp.path().join("gs*").join("bin").join("gswin64c.exe");
        let found = expand_pattern(&pattern.to_string_lossy());
        assert_eq!(
            found,
            vec![
                tmp.path().join("gs10.03.1/bin/gswin64c.exe"),
                tmp.path().join("gs10.02.0/bin/gswin64c.exe"),
                tmp.path().join("gs9.56.1/bin/gswin64c.exe"),
            ]
        );
    }

    #[test]
    fn expand_pattern_without_wildcard_checks_existence() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("gs");
        assert!(expand_pattern(&exe.to_string_lossy()).is_empty());
        fs::write(&exe, b"").unwrap();
        assert_eq!(expand_pattern(&exe.to_string_lossy()), vec![exe]);
    }

    #[test]
    fn locator_reports_unavailable_when_nothing_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = GhostscriptLocator::with_search(
            vec![tmp.path().join("gs*/bin/gs").to_string_lossy().into_owned()],
            vec![tmp.path().join("no-such-gs").to_string_lossy().into_owned()],
            Duration::from_secs(1),
        );
        assert_eq!(locator.locate(), None);
    }

    #[cfg(unix)]
    #[test]
    fn locator_falls_back_to_probing_commands() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let failing = tmp.path().join("broken-gs");
        let working = tmp.path().join("good-gs");
        fs::write(&failing, "#!/bin/sh\nexit 1\n").unwrap();
        fs::write(&working, "#!/bin/sh\necho 10.03.1\n").unwrap();
        for script in [&failing, &working] {
            fs::set_permissions(script, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let locator = GhostscriptLocator::with_search(
            Vec::new(),
            vec![
                failing.to_string_lossy().into_owned(),
                working.to_string_lossy().into_owned(),
            ],
            Duration::from_secs(5),
        );
        assert_eq!(locator.locate(), Some(working));
    }

    #[test]
    fn config_selects_locator() {
        let disabled = PipelineConfig::default().with_engine(EngineSelection::Disabled);
        assert_eq!(locator_for(&disabled).locate(), None);

        let pinned = PipelineConfig::default()
            .with_engine(EngineSelection::Pinned(PathBuf::from("/opt/gs/bin/gs")));
        assert_eq!(
            locator_for(&pinned).locate(),
            Some(PathBuf::from("/opt/gs/bin/gs"))
        );
    }
}
