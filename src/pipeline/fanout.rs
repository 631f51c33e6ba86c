//! Concurrent fan-out of page extraction.
//!
//! One future per page is built in page order and all of them are awaited
//! together with `join_all`, which yields results positionally. Completion
//! order therefore never affects output order. A semaphore bounds how many
//! remote calls are in flight at once; dropping the returned future drops
//! every page future with it.

use crate::client::OcrClient;
use crate::config::ConversionConfig;
use crate::output::PageResult;
use crate::pipeline::extract::extract_page;
use futures::future::join_all;
use std::path::PathBuf;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Extract every page image, returning one result per path in input order.
pub async fn extract_pages(
    client: &dyn OcrClient,
    image_paths: &[PathBuf],
    prompt: &str,
    config: &ConversionConfig,
) -> Vec<PageResult> {
    let total = image_paths.len();
    let progress = config.progress_callback.as_deref();
    let semaphore = Semaphore::new(config.concurrency.max(1));

    if let Some(cb) = progress {
        cb.on_document_start(total);
    }
    info!(
        "Extracting {} pages (concurrency: {})",
        total, config.concurrency
    );

    let tasks = image_paths.iter().enumerate().map(|(index, path)| {
        let semaphore = &semaphore;
        async move {
            // Never closed, so acquire cannot fail.
            let _permit = semaphore.acquire().await.ok();
            if let Some(cb) = progress {
                cb.on_page_start(index, total);
            }

            let result = extract_page(client, index, path, prompt, config).await;

            if let Some(cb) = progress {
                match &result.error {
                    None => cb.on_page_complete(index, total, result.markdown.len()),
                    Some(e) => cb.on_page_error(index, total, &e.to_string()),
                }
            }
            result
        }
    });

    let results: Vec<PageResult> = join_all(tasks).await;

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    debug!("Fan-out finished: {}/{} pages succeeded", succeeded, total);
    if let Some(cb) = progress {
        cb.on_document_complete(total, succeeded);
    }

    results
}
