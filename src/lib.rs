//! # pdf-scribe
//!
//! Extract the text of PDF documents as Markdown by sending each rendered
//! page to a vision model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Scratch  per-conversion image directory
//!  ├─ 2. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Fan-out  one future per page, bounded concurrency, page-ordered join
//!  ├─ 4. Extract  remote OCR call under transient retry + fenced-block parsing
//!  ├─ 5. Join     page texts separated by a blank line
//!  ├─ 6. Persist  optional `<dest>/<stem>.md` (atomic write)
//!  └─ 7. Cleanup  page images and directories removed on every exit path
//! ```
//!
//! A single page that cannot be extracted becomes an empty string; only
//! document-level failures (missing file, rasterisation, client setup,
//! output write) are returned as errors.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_scribe::{ConversionConfig, DocumentPipeline};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ConversionConfig::builder().concurrency(8).build()?;
//!     let pipeline = DocumentPipeline::from_config(config);
//!     let output = pipeline.convert(Path::new("document.pdf"), None).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("{}/{} pages", output.stats.succeeded_pages, output.stats.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Batching
//!
//! [`batch`] is independent of the pipeline: [`create_batches`] groups any
//! iterable, and [`read_records_in_batches`] streams a JSON-lines file in
//! bounded batches without loading it whole.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scribe` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod service;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{create_batches, read_records_in_batches, BatchMode, Chunk, RecordBatches};
pub use client::{ClientFactory, LlmOcrClient, OcrClient, ProviderClientFactory};
pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert_to_file, save_markdown, DocumentPipeline};
pub use error::{PageError, RemoteError, RemoteErrorKind, ScribeError, ServiceError};
pub use output::{CleanupReport, ConversionOutput, ConversionStats, ExtractTextResponse, PageResult};
pub use pipeline::encode::PageImage;
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use progress::{ExtractionProgress, ProgressCallback};
pub use retry::{retry, RetryPolicy, Transient};
pub use service::extract_text_from_uri;
pub use storage::{GcsBucket, GsUri, LocalBucket, ObjectStore};
