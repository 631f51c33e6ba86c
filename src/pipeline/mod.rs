//! Pipeline stages for PDF-to-Markdown conversion.
//!
//! Each submodule implements one step; [`crate::convert::DocumentPipeline`]
//! wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! scratch ──▶ render ──▶ fanout ──▶ extract ──▶ encode ──▶ client ──▶ postprocess
//! (tmp dir)   (pdfium)   (N pages)  (1 page)    (base64)   (VLM)      (fences)
//! ```
//!
//! 1. [`scratch`]: per-conversion image directory, released on every exit path
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`fanout`]: one future per page, bounded by a semaphore, joined in
//!    page order
//! 4. [`extract`]: one page: read image, call the client under retry,
//!    post-process; never fails past its boundary
//! 5. [`encode`]: base64-wrap page images for the multimodal request body
//! 6. [`postprocess`]: keep fenced-block bodies, optionally tidy them

pub mod encode;
pub mod extract;
pub mod fanout;
pub mod postprocess;
pub mod render;
pub mod scratch;
