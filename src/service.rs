//! Request/response surface: extract Markdown from a PDF stored at a `gs://` URI.
//!
//! Caller mistakes come back as [`ServiceError::InvalidUri`] or
//! [`ServiceError::NotFound`]. Everything else is logged with its cause and
//! reported as the opaque [`ServiceError::Failed`].

use crate::convert::DocumentPipeline;
use crate::error::ServiceError;
use crate::output::ExtractTextResponse;
use crate::storage::{GsUri, ObjectStore};
use tracing::{error, info};

/// Download the PDF at `uri` from `store`, convert it, and return its Markdown.
///
/// The object is fetched from `store`; `uri` supplies the object name. The
/// download lives in a temporary directory that is removed before returning.
pub async fn extract_text_from_uri(
    uri: &str,
    store: &dyn ObjectStore,
    pipeline: &DocumentPipeline,
) -> Result<ExtractTextResponse, ServiceError> {
    let parsed = GsUri::parse(uri).map_err(|_| ServiceError::InvalidUri {
        uri: uri.to_string(),
    })?;

    match store.exists().await {
        Ok(true) => {}
        Ok(false) => {
            error!("Storage bucket '{}' not accessible", store.name());
            return Err(ServiceError::Failed);
        }
        Err(e) => {
            error!("Error checking bucket '{}': {}", store.name(), e);
            return Err(ServiceError::Failed);
        }
    }

    match store.blob_exists(&parsed.object).await {
        Ok(true) => {}
        Ok(false) => {
            return Err(ServiceError::NotFound {
                object: parsed.object,
            })
        }
        Err(e) => {
            error!("Error processing '{}': {}", uri, e);
            return Err(ServiceError::Failed);
        }
    }

    let staging = tempfile::Builder::new()
        .prefix("pdf-scribe-download-")
        .tempdir()
        .map_err(|e| {
            error!("Error processing '{}': cannot create download directory: {}", uri, e);
            ServiceError::Failed
        })?;

    let file_name = match parsed.file_name() {
        "" => "document.pdf",
        name => name,
    };
    let local_path = staging.path().join(file_name);

    info!("Processing file: {}", parsed.object);
    if let Err(e) = store.download_blob(&parsed.object, &local_path).await {
        error!("Error processing '{}': {}", uri, e);
        return Err(ServiceError::Failed);
    }

    let output = pipeline.convert(&local_path, None).await.map_err(|e| {
        error!("Error processing '{}': {}", uri, e);
        ServiceError::Failed
    })?;

    Ok(ExtractTextResponse {
        uri: uri.to_string(),
        markdown: output.markdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientFactory, OcrClient};
    use crate::config::ConversionConfig;
    use crate::error::{RemoteError, ScribeError};
    use crate::pipeline::encode::PageImage;
    use crate::pipeline::render::{page_file_name, Rasterizer};
    use crate::retry::RetryPolicy;
    use crate::storage::LocalBucket;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    /// Two pages whose image bytes are their own text.
    struct TwoPages;

    #[async_trait]
    impl Rasterizer for TwoPages {
        async fn render(&self, _pdf: &Path, dest: &Path) -> Result<Vec<PathBuf>, ScribeError> {
            let mut paths = Vec::new();
            for (i, text) in ["Page one", "Page two"].iter().enumerate() {
                let p = dest.join(page_file_name(i));
                tokio::fs::write(&p, text).await.unwrap();
                paths.push(p);
            }
            Ok(paths)
        }
    }

    struct Echo;

    #[async_trait]
    impl OcrClient for Echo {
        async fn generate(&self, _prompt: &str, image: &PageImage) -> Result<String, RemoteError> {
            Ok(format!("```markdown\n{}\n```", String::from_utf8_lossy(&image.bytes)))
        }
    }

    struct EchoFactory;

    impl ClientFactory for EchoFactory {
        fn create(&self, _config: &ConversionConfig) -> Result<Arc<dyn OcrClient>, ScribeError> {
            Ok(Arc::new(Echo))
        }
    }

    fn pipeline(work_dir: &Path) -> DocumentPipeline {
        let config = ConversionConfig::builder()
            .work_dir(work_dir)
            .retry_policy(RetryPolicy::none())
            .build()
            .unwrap();
        DocumentPipeline::new(config, Arc::new(TwoPages), Arc::new(EchoFactory))
    }

    fn bucket_with_pdf() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("docs")).unwrap();
        std::fs::write(root.path().join("docs/report.pdf"), b"%PDF-1.7").unwrap();
        root
    }

    #[tokio::test]
    async fn returns_uri_and_markdown() {
        let root = bucket_with_pdf();
        let work = tempfile::tempdir().unwrap();
        let store = LocalBucket::new(root.path());

        let response = extract_text_from_uri("gs://bucket/docs/report.pdf", &store, &pipeline(work.path()))
            .await
            .unwrap();

        assert_eq!(response.uri, "gs://bucket/docs/report.pdf");
        assert_eq!(response.markdown, "Page one\n\nPage two");
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn rejects_non_gs_uri() {
        let root = bucket_with_pdf();
        let work = tempfile::tempdir().unwrap();
        let store = LocalBucket::new(root.path());

        let err = extract_text_from_uri("https://example.com/a.pdf", &store, &pipeline(work.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidUri { .. }));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let root = bucket_with_pdf();
        let work = tempfile::tempdir().unwrap();
        let store = LocalBucket::new(root.path());

        let err = extract_text_from_uri("gs://bucket/docs/absent.pdf", &store, &pipeline(work.path()))
            .await
            .unwrap_err();
        match err {
            ServiceError::NotFound { ref object } => assert_eq!(object, "docs/absent.pdf"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn inaccessible_bucket_is_generic_failure() {
        let work = tempfile::tempdir().unwrap();
        let store = LocalBucket::new(work.path().join("no-such-bucket"));

        let err = extract_text_from_uri("gs://bucket/docs/report.pdf", &store, &pipeline(work.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Failed));
        assert_eq!(err.to_string(), "Text extraction failed");
    }
}
