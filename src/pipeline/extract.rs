//! Single-page extraction: image file → remote OCR call → clean Markdown.
//!
//! [`extract_page`] always returns a [`PageResult`]. A page that cannot be
//! read, or whose remote call fails for good, becomes an empty page with a
//! [`PageError`] attached so one bad page never aborts the document.

use crate::client::OcrClient;
use crate::config::ConversionConfig;
use crate::error::{PageError, RemoteError, RemoteErrorKind};
use crate::output::PageResult;
use crate::pipeline::encode::PageImage;
use crate::pipeline::postprocess::extract_code_blocks;
use crate::retry::retry_counted;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Extract the Markdown of page `index` from the image at `image_path`.
pub async fn extract_page(
    client: &dyn OcrClient,
    index: usize,
    image_path: &Path,
    prompt: &str,
    config: &ConversionConfig,
) -> PageResult {
    let start = Instant::now();
    let elapsed_ms = |start: Instant| start.elapsed().as_millis() as u64;

    let image = match PageImage::load(image_path).await {
        Ok(image) => image,
        Err(e) => {
            let error = if e.kind() == ErrorKind::NotFound {
                PageError::MissingImage {
                    page: index,
                    path: image_path.to_path_buf(),
                }
            } else {
                PageError::ReadFailed {
                    page: index,
                    detail: e.to_string(),
                }
            };
            warn!("{}", error);
            return PageResult::failed(index, elapsed_ms(start), 0, error);
        }
    };

    let timeout = config.api_timeout();
    let image = &image;
    let mut attempts = 0u32;

    let outcome = retry_counted(&config.retry, || {
        attempts += 1;
        async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, client.generate(prompt, image))
                    .await
                    .map_err(|_| {
                        RemoteError::new(
                            RemoteErrorKind::Timeout,
                            format!("no response within {}s", limit.as_secs()),
                        )
                    })?,
                None => client.generate(prompt, image).await,
            }
        }
    })
    .await;

    match outcome {
        Ok((raw, retries)) => {
            let markdown = extract_code_blocks(&raw, config.tidy);
            if markdown.is_empty() {
                debug!("Page {}: reply contained no fenced block", index);
            }
            debug!(
                "Page {}: {} chars after {} retries",
                index,
                markdown.len(),
                retries
            );
            PageResult {
                page_index: index,
                markdown,
                retries,
                duration_ms: elapsed_ms(start),
                error: None,
            }
        }
        Err(e) => {
            let retries = attempts.saturating_sub(1);
            let error = PageError::RemoteFailed {
                page: index,
                retries,
                kind: e.kind,
                detail: e.message,
            };
            warn!("{}", error);
            PageResult::failed(index, elapsed_ms(start), retries, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Scripted {
        calls: AtomicU32,
        failures: u32,
        kind: RemoteErrorKind,
        reply: String,
    }

    impl Scripted {
        fn new(failures: u32, kind: RemoteErrorKind, reply: &str) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                kind,
                reply: reply.to_string(),
            }
        }
    }

    #[async_trait]
    impl OcrClient for Scripted {
        async fn generate(&self, _prompt: &str, _image: &PageImage) -> Result<String, RemoteError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(RemoteError::new(self.kind, "scripted failure"))
            } else {
                Ok(self.reply.clone())
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl OcrClient for Stalled {
        async fn generate(&self, _prompt: &str, _image: &PageImage) -> Result<String, RemoteError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn config(max_attempts: u32) -> ConversionConfig {
        ConversionConfig::builder()
            .retry_policy(RetryPolicy {
                max_attempts,
                initial_delay: Duration::from_millis(10),
                jitter: false,
                ..RetryPolicy::default()
            })
            .api_timeout_secs(Some(5))
            .build()
            .unwrap()
    }

    fn page_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("page_0.png");
        std::fs::write(&path, b"png").unwrap();
        path
    }

    #[tokio::test(start_paused = true)]
    async fn extracts_fenced_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = page_file(dir.path());
        let client = Scripted::new(0, RemoteErrorKind::Other, "chatter\n```markdown\n# Page\n```\nbye");

        let result = extract_page(&client, 0, &path, "prompt", &config(3)).await;
        assert!(result.is_success());
        assert_eq!(result.markdown, "# Page");
        assert_eq!(result.retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn default_config_keeps_block_body_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = page_file(dir.path());
        let body = "| Name |\n| Alice |\nline one  \nline two\n\n\n\nend";
        let reply = format!("```markdown\n{body}\n```");
        let client = Scripted::new(0, RemoteErrorKind::Other, &reply);
        let cfg = ConversionConfig::default();

        let result = extract_page(&client, 0, &path, "prompt", &cfg).await;
        assert_eq!(result.markdown, body);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = page_file(dir.path());
        let client = Scripted::new(2, RemoteErrorKind::RateLimited, "```\nok\n```");

        let result = extract_page(&client, 4, &path, "prompt", &config(3)).await;
        assert_eq!(result.markdown, "ok");
        assert_eq!(result.retries, 2);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_yield_empty_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = page_file(dir.path());
        let client = Scripted::new(u32::MAX, RemoteErrorKind::Unavailable, "");

        let result = extract_page(&client, 1, &path, "prompt", &config(3)).await;
        assert_eq!(result.markdown, "");
        assert_eq!(result.retries, 2);
        match result.error {
            Some(PageError::RemoteFailed { page, retries, kind, .. }) => {
                assert_eq!(page, 1);
                assert_eq!(retries, 2);
                assert_eq!(kind, RemoteErrorKind::Unavailable);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = page_file(dir.path());
        let client = Scripted::new(u32::MAX, RemoteErrorKind::Auth, "");

        let result = extract_page(&client, 0, &path, "prompt", &config(3)).await;
        assert!(!result.is_success());
        assert_eq!(result.retries, 0);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_image_yields_empty_page() {
        let client = Scripted::new(0, RemoteErrorKind::Other, "```\nnever\n```");
        let result = extract_page(&client, 2, Path::new("/nonexistent/page_2.png"), "p", &config(3)).await;
        assert_eq!(result.markdown, "");
        assert!(matches!(result.error, Some(PageError::MissingImage { page: 2, .. })));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn per_attempt_timeout_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = page_file(dir.path());

        let result = extract_page(&Stalled, 0, &path, "prompt", &config(3)).await;
        match result.error {
            Some(PageError::RemoteFailed { kind, retries, .. }) => {
                assert_eq!(kind, RemoteErrorKind::Timeout);
                assert_eq!(retries, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
