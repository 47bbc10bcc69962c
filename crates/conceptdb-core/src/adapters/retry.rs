//! Retry wrapper for concept extraction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};

use super::extraction::{ConceptExtractor, ExtractedConcept};
use crate::{Error, Result};

/// Wraps a concept extractor with exponential-backoff retries.
///
/// Only retryable errors (backend outages and timeouts) are retried.
pub struct RetryingExtractor {
    inner: Arc<dyn ConceptExtractor>,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryingExtractor {
    /// Creates a new retry wrapper with default settings.
    ///
    /// Default settings:
    /// - Max attempts: 3
    /// - Initial delay: 200 milliseconds
    /// - Max delay: 5 seconds
    pub fn new(extractor: Arc<dyn ConceptExtractor>) -> Self {
        Self {
            inner: extractor,
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }

    /// Sets the maximum number of retries.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the initial delay between retries.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retries.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    fn should_retry(error: &Error) -> bool {
        let retry = error.is_retryable();
        if retry {
            log::debug!("Retrying concept extraction after: {error}");
        }
        retry
    }
}

#[async_trait]
impl ConceptExtractor for RetryingExtractor {
    async fn extract(&self, text: &str, min_confidence: f64) -> Result<Vec<ExtractedConcept>> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts as usize);

        let extractor = self.inner.clone();
        (|| async { extractor.extract(text, min_confidence).await })
            .retry(backoff)
            .when(Self::should_retry)
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::adapters::KeywordConceptExtractor;

    /// Fails with the given error for the first `failures` calls.
    struct Flaky {
        failures: usize,
        retryable: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConceptExtractor for Flaky {
        async fn extract(&self, _text: &str, _min: f64) -> Result<Vec<ExtractedConcept>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(if self.retryable {
                    Error::backend("extraction", "overloaded")
                } else {
                    Error::invalid_data("unparseable")
                });
            }
            Ok(vec![ExtractedConcept {
                name: "ok".into(),
                description: String::new(),
                confidence: 1.0,
            }])
        }
    }

    fn fast(inner: Arc<dyn ConceptExtractor>) -> RetryingExtractor {
        RetryingExtractor::new(inner)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
    }

    #[tokio::test]
    async fn test_retry_passes_through_success() {
        let retry = fast(Arc::new(KeywordConceptExtractor::new()));
        let concepts = retry.extract("warehouse warehouse", 0.0).await.unwrap();
        assert_eq!(concepts[0].name, "warehouse");
        assert_eq!(retry.name(), "keyword");
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let flaky = Arc::new(Flaky {
            failures: 2,
            retryable: true,
            calls: AtomicUsize::new(0),
        });
        let retry = fast(flaky.clone());
        let concepts = retry.extract("x", 0.0).await.unwrap();
        assert_eq!(concepts.len(), 1);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_permanent_errors() {
        let flaky = Arc::new(Flaky {
            failures: 5,
            retryable: false,
            calls: AtomicUsize::new(0),
        });
        let retry = fast(flaky.clone());
        assert!(retry.extract("x", 0.0).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_builder() {
        let retry = RetryingExtractor::new(Arc::new(KeywordConceptExtractor::new()))
            .with_max_attempts(5)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(30));
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(500));
        assert_eq!(retry.max_delay, Duration::from_secs(30));
    }
}
