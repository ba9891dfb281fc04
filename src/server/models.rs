use serde::{Deserialize, Serialize};

use crate::pipeline::CompressionReport;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CompressResponse {
    pub filename: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    pub download_url: String,
}

impl From<CompressionReport> for CompressResponse {
    fn from(report: CompressionReport) -> Self {
        CompressResponse {
            download_url: format!("/api/download/{}", report.file_name),
            filename: report.file_name,
            original_size: report.original_size,
            compressed_size: report.compressed_size,
            compression_ratio: report.compression_ratio,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompressParams {
    #[serde(default = "default_quality")]
    pub(crate) quality: String,
}

fn default_quality() -> String {
    "medium".to_string()
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: &'static str,
    pub(crate) version: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
}
