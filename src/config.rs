use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_OUTPUT_DIR: &str = "compressed";
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// How the external engine is found.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EngineSelection {
    /// Search install paths, then PATH.
    #[default]
    Discover,
    /// Use this executable without probing.
    Pinned(PathBuf),
    /// Never use an external engine.
    Disabled,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub engine: EngineSelection,
    pub engine_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            engine: EngineSelection::Discover,
            engine_timeout: DEFAULT_ENGINE_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    pub fn with_dirs(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        PipelineConfig {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_engine(mut self, engine: EngineSelection) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub max_upload_bytes: usize,
    /// `["*"]` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:8000".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    pub fn max_upload_mb(&self) -> usize {
        self.max_upload_bytes / (1024 * 1024)
    }
}

/// Splits a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
