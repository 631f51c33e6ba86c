//! Configuration types for PDF-to-Markdown conversion.
//!
//! All pipeline behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob so a
//! config can be cloned into each page task and logged as a whole.

use crate::error::ScribeError;
use crate::progress::ProgressCallback;
use crate::prompts::EXTRACT_TEXT_TEMPLATE;
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a PDF-to-Markdown conversion.
///
/// # Example
/// ```rust
/// use pdf_scribe::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .concurrency(8)
///     .max_attempts(5)
///     .model("gemini-2.0-flash")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Pages in flight against the remote API at once. Default: 10.
    ///
    /// This is the caller's budget for the remote client, not a property of
    /// the pipeline; raise it when the provider's rate limit allows.
    pub concurrency: usize,

    /// Model identifier, e.g. "gemini-2.0-flash". If None, the factory default.
    pub model: Option<String>,

    /// Provider name (e.g. "gemini", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 8192.
    pub max_tokens: usize,

    /// Backoff policy for each page's remote call.
    pub retry: RetryPolicy,

    /// Per-attempt deadline for one remote call, in seconds. Default: 60.
    pub api_timeout_secs: Option<u64>,

    /// Deadline for the whole extraction stage of a document. Default: none.
    ///
    /// On expiry every in-flight page is cancelled and the scratch directory
    /// is still cleaned up.
    pub document_timeout_secs: Option<u64>,

    /// Name of the prompt template sent with every page.
    pub prompt_template: String,

    /// Directory holding `<name>.txt` prompt templates. If None, built-ins are used.
    pub templates_dir: Option<PathBuf>,

    /// Run the tidy rules (whitespace, table repair, invisible characters)
    /// over each extracted block. Default: false, blocks are returned as
    /// the model wrote them.
    pub tidy: bool,

    /// Root under which per-conversion scratch directories are created.
    /// Default: `$TMPDIR/pdf-scribe`.
    pub work_dir: PathBuf,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 2000,
            concurrency: 10,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            retry: RetryPolicy::default(),
            api_timeout_secs: Some(60),
            document_timeout_secs: None,
            prompt_template: EXTRACT_TEXT_TEMPLATE.to_string(),
            templates_dir: None,
            tidy: false,
            work_dir: std::env::temp_dir().join("pdf-scribe"),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("document_timeout_secs", &self.document_timeout_secs)
            .field("prompt_template", &self.prompt_template)
            .field("templates_dir", &self.templates_dir)
            .field("tidy", &self.tidy)
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Per-attempt deadline as a `Duration`.
    pub fn api_timeout(&self) -> Option<Duration> {
        self.api_timeout_secs.map(Duration::from_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn initial_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry.initial_delay = Duration::from_millis(ms);
        self
    }

    pub fn jitter(mut self, v: bool) -> Self {
        self.config.retry.jitter = v;
        self
    }

    pub fn api_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn document_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.document_timeout_secs = secs;
        self
    }

    pub fn prompt_template(mut self, name: impl Into<String>) -> Self {
        self.config.prompt_template = name.into();
        self
    }

    pub fn templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.templates_dir = Some(dir.into());
        self
    }

    pub fn tidy(mut self, v: bool) -> Self {
        self.config.tidy = v;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ScribeError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ScribeError::InvalidConfiguration(
                "concurrency must be ≥ 1".into(),
            ));
        }
        if c.retry.max_attempts == 0 {
            return Err(ScribeError::InvalidConfiguration(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if !(c.retry.backoff_factor.is_finite() && c.retry.backoff_factor >= 1.0) {
            return Err(ScribeError::InvalidConfiguration(format!(
                "backoff_factor must be ≥ 1.0, got {}",
                c.retry.backoff_factor
            )));
        }
        if c.api_timeout_secs == Some(0) || c.document_timeout_secs == Some(0) {
            return Err(ScribeError::InvalidConfiguration(
                "timeouts must be at least 1 second".into(),
            ));
        }
        if c.prompt_template.trim().is_empty() {
            return Err(ScribeError::InvalidConfiguration(
                "prompt_template must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = ConversionConfig::builder().build().unwrap();
        assert_eq!(c.concurrency, 10);
        assert_eq!(c.retry.max_attempts, 3);
        assert!(c.retry.jitter);
        assert_eq!(c.prompt_template, EXTRACT_TEXT_TEMPLATE);
        assert!(!c.tidy);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = ConversionConfig::builder().concurrency(0).build().unwrap_err();
        assert!(matches!(err, ScribeError::InvalidConfiguration(_)));
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = ConversionConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(matches!(err, ScribeError::InvalidConfiguration(_)));
    }

    #[test]
    fn shrinking_backoff_rejected() {
        let policy = RetryPolicy {
            backoff_factor: 0.5,
            ..RetryPolicy::default()
        };
        assert!(ConversionConfig::builder().retry_policy(policy).build().is_err());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = ConversionConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn debug_hides_provider() {
        let c = ConversionConfig::default();
        let s = format!("{c:?}");
        assert!(s.contains("concurrency"));
        assert!(!s.contains("progress_callback"));
    }
}
