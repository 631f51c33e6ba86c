//! Whole-document conversion: render → fan-out → join → persist → clean up.
//!
//! [`DocumentPipeline`] owns the configuration and the two collaborators it
//! needs (a [`Rasterizer`] and a [`ClientFactory`]). Every conversion gets its
//! own scratch directory, and that directory is released on every exit path,
//! including errors and cancellation.

use crate::client::{ClientFactory, ProviderClientFactory};
use crate::config::ConversionConfig;
use crate::error::ScribeError;
use crate::output::{ConversionOutput, ConversionStats, PageResult};
use crate::pipeline::fanout::extract_pages;
use crate::pipeline::postprocess::BLOCK_SEPARATOR;
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use crate::pipeline::scratch::ScratchDir;
use crate::prompts::resolve_prompt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Converts PDF documents into Markdown.
pub struct DocumentPipeline {
    config: ConversionConfig,
    rasterizer: Arc<dyn Rasterizer>,
    client_factory: Arc<dyn ClientFactory>,
}

/// What a successful pass through the stages produced, before cleanup.
struct Extracted {
    markdown: String,
    pages: Vec<PageResult>,
    output_path: Option<PathBuf>,
    render_duration_ms: u64,
    extraction_duration_ms: u64,
}

impl DocumentPipeline {
    pub fn new(
        config: ConversionConfig,
        rasterizer: Arc<dyn Rasterizer>,
        client_factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            config,
            rasterizer,
            client_factory,
        }
    }

    /// Pipeline using pdfium for rendering and the configured LLM provider.
    pub fn from_config(config: ConversionConfig) -> Self {
        let rasterizer = Arc::new(PdfiumRasterizer::new(config.max_rendered_pixels));
        Self::new(config, rasterizer, Arc::new(ProviderClientFactory))
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert the PDF at `path`.
    ///
    /// When `destination` is given the Markdown is also written to
    /// `<destination>/<stem>.md`. Pages that fail to extract contribute an
    /// empty string; only document-level failures are returned as errors.
    pub async fn convert(
        &self,
        path: &Path,
        destination: Option<&Path>,
    ) -> Result<ConversionOutput, ScribeError> {
        let total_start = Instant::now();
        info!("Starting conversion: {}", path.display());

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ScribeError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let prompt = resolve_prompt(
            &self.config.prompt_template,
            self.config.templates_dir.as_deref(),
        )?;
        let stem = document_stem(path);

        let mut scratch = ScratchDir::create(&self.config.work_dir, &stem).await?;
        let outcome = self
            .run_stages(path, &stem, &prompt, destination, &mut scratch)
            .await;

        let cleanup = scratch.release();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_cleanup(&cleanup);
        }

        let extracted = match outcome {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(
                    "Conversion of '{}' failed after {}ms: {}",
                    path.display(),
                    total_start.elapsed().as_millis(),
                    e
                );
                return Err(e);
            }
        };

        let pages = extracted.pages;
        let succeeded_pages = pages.iter().filter(|p| p.is_success()).count();
        let stats = ConversionStats {
            total_pages: pages.len(),
            succeeded_pages,
            failed_pages: pages.len() - succeeded_pages,
            total_retries: pages.iter().map(|p| p.retries as u64).sum(),
            render_duration_ms: extracted.render_duration_ms,
            extraction_duration_ms: extracted.extraction_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Conversion complete: {}/{} pages, {}ms total",
            stats.succeeded_pages, stats.total_pages, stats.total_duration_ms
        );

        Ok(ConversionOutput {
            markdown: extracted.markdown,
            pages,
            stats,
            output_path: extracted.output_path,
        })
    }

    async fn run_stages(
        &self,
        path: &Path,
        stem: &str,
        prompt: &str,
        destination: Option<&Path>,
        scratch: &mut ScratchDir,
    ) -> Result<Extracted, ScribeError> {
        // ── Rasterize ────────────────────────────────────────────────────
        let render_start = Instant::now();
        let images = self
            .rasterizer
            .render(path, scratch.image_dir())
            .await
            .map_err(|e| match e {
                ScribeError::RasterizationFailed { .. } => e,
                other => ScribeError::RasterizationFailed {
                    path: path.to_path_buf(),
                    detail: other.to_string(),
                },
            })?;
        scratch.set_images(images.clone());
        let render_duration_ms = render_start.elapsed().as_millis() as u64;
        info!("Rendered {} pages in {}ms", images.len(), render_duration_ms);

        // ── Extract ──────────────────────────────────────────────────────
        let client = self.client_factory.create(&self.config)?;

        let extraction_start = Instant::now();
        let fan_out = extract_pages(client.as_ref(), &images, prompt, &self.config);
        let pages = match self.config.document_timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), fan_out)
                .await
                .map_err(|_| ScribeError::Timeout { secs })?,
            None => fan_out.await,
        };
        let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;

        // ── Assemble ─────────────────────────────────────────────────────
        let markdown = pages
            .iter()
            .map(|p| p.markdown.as_str())
            .collect::<Vec<_>>()
            .join(BLOCK_SEPARATOR);
        debug!("Assembled {} chars from {} pages", markdown.len(), pages.len());

        let output_path = match destination {
            Some(dir) => Some(save_markdown(dir, stem, &markdown).await?),
            None => None,
        };

        Ok(Extracted {
            markdown,
            pages,
            output_path,
            render_duration_ms,
            extraction_duration_ms,
        })
    }
}

/// File stem used for the scratch directory and the output file.
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Write `markdown` to `<dir>/<stem>.md`, creating `dir` if needed.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn save_markdown(dir: &Path, stem: &str, markdown: &str) -> Result<PathBuf, ScribeError> {
    let path = dir.join(format!("{stem}.md"));
    let write_failed = |source| ScribeError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(write_failed)?;

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(write_failed)?;

    debug!("Wrote {}", path.display());
    Ok(path)
}

/// Convert `path` with pdfium and the configured provider, writing the
/// Markdown into `destination`.
pub async fn convert_to_file(
    path: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    config: ConversionConfig,
) -> Result<ConversionOutput, ScribeError> {
    DocumentPipeline::from_config(config)
        .convert(path.as_ref(), Some(destination.as_ref()))
        .await
}
