//! Upload and output directories, staged uploads and best-effort deletion.

use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use uuid::Uuid;

use crate::error::{CompressError, Result};

lazy_static! {
    static ref UNSAFE_NAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]+").unwrap();
}

#[derive(Debug, Clone)]
pub struct Staging {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl Staging {
    /// Creates both directories if absent. Idempotent; call once at startup.
    pub fn init(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let staging = Staging {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        };
        for dir in [&staging.upload_dir, &staging.output_dir] {
            fs::create_dir_all(dir).map_err(|e| CompressError::io(dir, e))?;
        }
        Ok(staging)
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes `content` under `<stem>_<uuid><ext>` in the upload directory.
    pub fn stage(&self, content: &[u8], filename: &str) -> Result<StagedFile> {
        let name = sanitize_file_name(filename);
        let path = Path::new(&name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("upload");
        let unique = match path.extension().and_then(|s| s.to_str()) {
            Some(ext) => format!("{}_{}.{}", stem, Uuid::new_v4(), ext),
            None => format!("{}_{}", stem, Uuid::new_v4()),
        };
        let staged = self.upload_dir.join(unique);
        fs::write(&staged, content).map_err(|e| CompressError::io(&staged, e))?;
        debug!("Staged {} bytes at {}", content.len(), staged.display());
        Ok(StagedFile { path: staged })
    }

    /// `<stem>_compressed_<uuid>.pdf` in the output directory.
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        self.output_dir
            .join(format!("{}_compressed_{}.pdf", stem, Uuid::new_v4()))
    }

    /// Resolves a client-supplied download token to a file in the output
    /// directory. Anything that is not a bare file name yields `None`.
    pub fn output_file(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty()
            || name.contains(['/', '\\'])
            || name == "."
            || name.contains("..")
        {
            return None;
        }
        let path = self.output_dir.join(name);
        path.is_file().then_some(path)
    }
}

/// A staged upload, deleted when dropped.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        cleanup(&self.path);
    }
}

/// Deletes `path` if it exists. Failures are logged, never returned.
pub fn cleanup(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Error deleting file {}: {}", path.display(), e),
    }
}

/// Reduces a client-supplied name to a bare file name without path
/// components or shell-hostile characters.
pub fn sanitize_file_name(filename: &str) -> String {
    let bare = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned = UNSAFE_NAME_CHARS.replace_all(bare, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(r"C:\Users\me\report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("my report (final).pdf"), "my_report_final_.pdf");
        assert_eq!(sanitize_file_name(".."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name(".hidden.pdf"), "hidden.pdf");
    }

    #[test]
    fn init_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = Staging::init(tmp.path().join("in"), tmp.path().join("out")).unwrap();
        assert!(staging.upload_dir().is_dir());
        assert!(staging.output_dir().is_dir());
        // second call is a no-op
        Staging::init(tmp.path().join("in"), tmp.path().join("out")).unwrap();
    }

    #[test]
    fn staged_file_is_removed_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = Staging::init(tmp.path().join("in"), tmp.path().join("out")).unwrap();
        let staged = staging.stage(b"%PDF-1.4", "../doc.pdf").unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(path.parent(), Some(staging.upload_dir()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("pdf"));
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-1.4");
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn identical_names_never_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = Staging::init(tmp.path().join("in"), tmp.path().join("out")).unwrap();
        let a = staging.stage(b"a", "same.pdf").unwrap();
        let b = staging.stage(b"b", "same.pdf").unwrap();
        assert_ne!(a.path(), b.path());
        assert_ne!(
            staging.output_path_for(a.path()),
            staging.output_path_for(a.path())
        );
    }

    #[test]
    fn output_file_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = Staging::init(tmp.path().join("in"), tmp.path().join("out")).unwrap();
        fs::write(staging.output_dir().join("ok.pdf"), b"x").unwrap();
        assert!(staging.output_file("ok.pdf").is_some());
        assert!(staging.output_file("missing.pdf").is_none());
        assert!(staging.output_file("../in/ok.pdf").is_none());
        assert!(staging.output_file("..").is_none());
        assert!(staging.output_file("").is_none());
    }

    #[test]
    fn cleanup_of_missing_file_is_silent() {
        let tmp = tempfile::tempdir().unwrap();
        cleanup(&tmp.path().join("never-existed.pdf"));
    }
}
