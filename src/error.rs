//! Error types for the pdf-scribe library.
//!
//! Failures are split by how far they are allowed to travel:
//!
//! * [`ScribeError`]: **Fatal**: the document (or batch source) cannot be
//!   processed at all. Returned as `Err(ScribeError)` from the pipeline and
//!   the batch readers.
//!
//! * [`RemoteError`]: one remote OCR call failed. Carries a
//!   [`RemoteErrorKind`] so the retry layer can tell transient failures
//!   (rate limited, overloaded, unavailable) from permanent ones.
//!
//! * [`PageError`]: **Non-fatal**: a single page could not be extracted.
//!   Stored on [`crate::output::PageResult`]; the page contributes an empty
//!   string and the document carries on.
//!
//! * [`CleanupFailure`]: a scratch file or directory could not be removed.
//!   Logged and reported, never escalated.
//!
//! * [`ServiceError`]: what the request/response surface reports to an
//!   external caller. Internal detail is logged, not exposed.

use crate::retry::Transient;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// An HTTP status at the start of the message or right after a label such
/// as `HTTP`, `status` or `code`. Bare numbers elsewhere (token counts,
/// sizes) are not statuses.
static RE_HTTP_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\b(?:http|status|code|error)\b[^0-9a-z]{0,3})([1-5][0-9]{2})\b").unwrap()
});

/// All fatal errors returned by the pdf-scribe library.
#[derive(Debug, Error)]
pub enum ScribeError {
    // ── Caller errors ─────────────────────────────────────────────────────
    /// A caller-supplied parameter is out of range. Detected before any I/O.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// A record source handed to the batch reader does not exist.
    #[error("Source file not found: '{path}'")]
    SourceNotFound { path: PathBuf },

    /// The PDF handed to the pipeline does not exist.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    NotFound { path: PathBuf },

    /// A line of a record file is not valid JSON (strict mode only).
    #[error("Failed to parse record at line {line} in '{path}': {source}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Reading a source file failed mid-way.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pre-extraction failures ───────────────────────────────────────────
    /// The PDF could not be turned into page images.
    #[error("Failed to rasterize '{path}': {detail}")]
    RasterizationFailed { path: PathBuf, detail: String },

    /// The remote OCR client could not be constructed.
    #[error("OCR client '{provider}' could not be initialised.\n{hint}")]
    ClientInitFailed { provider: String, hint: String },

    /// The extraction stage did not finish within the document deadline.
    #[error("Extraction timed out after {secs}s")]
    Timeout { secs: u64 },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Object storage ────────────────────────────────────────────────────
    /// An object-storage request failed.
    #[error("Storage error: {detail}")]
    Storage { detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RemoteErrorKind {
    /// HTTP 429 or an explicit quota message.
    RateLimited,
    /// The backend reported it is overloaded (HTTP 529 and friends).
    Overloaded,
    /// 5xx / service unavailable.
    Unavailable,
    /// The per-attempt deadline expired.
    Timeout,
    /// 401 / 403.
    Auth,
    /// 400, malformed payload, content filtered.
    InvalidRequest,
    Other,
}

impl RemoteErrorKind {
    /// Whether a call failing with this kind is worth repeating.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            RemoteErrorKind::RateLimited | RemoteErrorKind::Overloaded | RemoteErrorKind::Unavailable
        )
    }
}

/// A failed remote OCR call.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a provider error from its rendered message.
    ///
    /// Providers surface HTTP status codes and vendor wording inside the
    /// error text. A status only counts when it appears as a labelled token
    /// (`HTTP 503`, `status: 429`) or leads the message (`400 Bad Request`).
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
        let statuses: Vec<u16> = RE_HTTP_STATUS
            .captures_iter(&lower)
            .filter_map(|caps| caps[1].parse().ok())
            .collect();
        let status = |pred: fn(u16) -> bool| statuses.iter().any(|&s| pred(s));

        let kind = if status(|s| s == 429)
            || has(&["rate limit", "rate_limit", "too many requests", "resource_exhausted", "quota"])
        {
            RemoteErrorKind::RateLimited
        } else if status(|s| s == 529) || has(&["overloaded"]) {
            RemoteErrorKind::Overloaded
        } else if status(|s| (500..600).contains(&s))
            || has(&["unavailable", "internal server error", "bad gateway"])
        {
            RemoteErrorKind::Unavailable
        } else if status(|s| s == 408) || has(&["timed out", "timeout"]) {
            RemoteErrorKind::Timeout
        } else if status(|s| s == 401 || s == 403)
            || has(&["unauthorized", "forbidden", "api key", "permission denied"])
        {
            RemoteErrorKind::Auth
        } else if status(|s| (400..500).contains(&s))
            || has(&["invalid", "bad request", "content_filter"])
        {
            RemoteErrorKind::InvalidRequest
        } else {
            RemoteErrorKind::Other
        };

        Self { kind, message }
    }
}

impl Transient for RemoteError {
    fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// A non-fatal error for a single page.
///
/// The page's markdown is empty when one of these is present.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page image was not on disk when extraction started.
    #[error("Page {page}: image not found at '{path}'")]
    MissingImage { page: usize, path: PathBuf },

    /// The page image exists but could not be read.
    #[error("Page {page}: failed to read image: {detail}")]
    ReadFailed { page: usize, detail: String },

    /// The remote call failed permanently or ran out of attempts.
    #[error("Page {page}: OCR call failed after {retries} retries: {detail}")]
    RemoteFailed {
        page: usize,
        retries: u32,
        kind: RemoteErrorKind,
        detail: String,
    },
}

/// One scratch path that could not be removed.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("Failed to remove '{path}': {reason}")]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Errors reported by [`crate::service::extract_text_from_uri`].
///
/// `Failed` deliberately carries no detail; the cause is logged instead.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid URI '{uri}': URL must start with 'gs://'")]
    InvalidUri { uri: String },

    #[error("File '{object}' not found")]
    NotFound { object: String },

    #[error("Text extraction failed")]
    Failed,
}

impl ServiceError {
    /// HTTP-style status code for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::InvalidUri { .. } => 400,
            ServiceError::NotFound { .. } => 404,
            ServiceError::Failed => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rate_limit() {
        let e = RemoteError::classify("HTTP 429 Too Many Requests");
        assert_eq!(e.kind, RemoteErrorKind::RateLimited);
        assert!(e.is_transient());
    }

    #[test]
    fn classify_overloaded_and_unavailable() {
        assert_eq!(
            RemoteError::classify("Anthropic API error: overloaded_error").kind,
            RemoteErrorKind::Overloaded
        );
        assert_eq!(
            RemoteError::classify("503 Service Unavailable").kind,
            RemoteErrorKind::Unavailable
        );
    }

    #[test]
    fn classify_fatal_kinds() {
        let auth = RemoteError::classify("401 Unauthorized: bad api key");
        assert_eq!(auth.kind, RemoteErrorKind::Auth);
        assert!(!auth.is_transient());

        let bad = RemoteError::classify("400 Bad Request");
        assert_eq!(bad.kind, RemoteErrorKind::InvalidRequest);
        assert!(!bad.is_transient());

        assert_eq!(RemoteError::classify("something odd").kind, RemoteErrorKind::Other);
    }

    #[test]
    fn classify_ignores_numbers_that_are_not_statuses() {
        let e = RemoteError::classify("Request rejected: prompt has 15000 tokens, limit is 8192");
        assert_eq!(e.kind, RemoteErrorKind::Other);
        assert!(!e.is_transient());

        let e = RemoteError::classify("image of 4290 bytes exceeds the 5000 byte limit");
        assert!(!e.is_transient());
    }

    #[test]
    fn classify_labelled_statuses() {
        assert_eq!(
            RemoteError::classify("API error (status: 502): upstream reset").kind,
            RemoteErrorKind::Unavailable
        );
        assert_eq!(
            RemoteError::classify("request failed with status code 403").kind,
            RemoteErrorKind::Auth
        );
        assert_eq!(
            RemoteError::classify("HTTP 422 while uploading").kind,
            RemoteErrorKind::InvalidRequest
        );
    }

    #[test]
    fn page_error_display() {
        let e = PageError::RemoteFailed {
            page: 3,
            retries: 2,
            kind: RemoteErrorKind::Unavailable,
            detail: "503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 3"), "got: {msg}");
        assert!(msg.contains("2 retries"), "got: {msg}");
    }

    #[test]
    fn service_error_hides_detail() {
        assert_eq!(ServiceError::Failed.to_string(), "Text extraction failed");
        assert_eq!(ServiceError::Failed.status_code(), 500);
        let nf = ServiceError::NotFound {
            object: "docs/a.pdf".into(),
        };
        assert_eq!(nf.status_code(), 404);
        assert!(nf.to_string().contains("docs/a.pdf"));
    }
}
