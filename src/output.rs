//! Result types produced by the pipeline and the extraction service.

use crate::error::{CleanupFailure, PageError};
use serde::{Deserialize, Serialize};

/// The extraction result for exactly one page image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 0-based position of the page in the document.
    pub page_index: usize,
    /// Extracted Markdown; empty when `error` is set.
    pub markdown: String,
    /// Retries spent on the remote call.
    pub retries: u32,
    pub duration_ms: u64,
    /// Why the page degraded to an empty result, if it did.
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Empty result for a page that could not be extracted.
    pub fn failed(page_index: usize, duration_ms: u64, retries: u32, error: PageError) -> Self {
        Self {
            page_index,
            markdown: String::new(),
            retries,
            duration_ms,
            error: Some(error),
        }
    }
}

/// What the scratch-directory release managed to remove.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub directories_removed: usize,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Timing and outcome counters for one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    pub total_retries: u64,
    pub render_duration_ms: u64,
    pub extraction_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// A converted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Page texts joined by a blank line, in page order.
    pub markdown: String,
    /// One entry per page image, in page order.
    pub pages: Vec<PageResult>,
    pub stats: ConversionStats,
    /// Set when the Markdown was also written to disk.
    pub output_path: Option<std::path::PathBuf>,
}

/// Response of [`crate::service::extract_text_from_uri`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractTextResponse {
    /// Original URI that was processed.
    pub uri: String,
    /// Extracted text content in Markdown format.
    pub markdown: String,
}
