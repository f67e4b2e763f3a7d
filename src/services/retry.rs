//! Resilient wrapper around fallible persistence calls.
//!
//! Two call shapes are supported:
//! - [`RetryExecutor::execute`] for operations returning `Result<T, GridError>`
//! - [`RetryExecutor::execute_data_result`] for operations that never fail
//!   outright but hand back a `(data, error)` pair ([`DataResult`])

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::config::RetrySettings;
use crate::error::{GridError, GridResult};

/// Backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
        }
    }
}

/// A `(data, error)` response from an operation that reports failure in-band
#[derive(Debug, Clone, PartialEq)]
pub struct DataResult<T> {
    pub data: Option<T>,
    pub error: Option<GridError>,
}

impl<T> DataResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }

    pub fn err(error: GridError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    /// An error in the pair wins over any data it carries
    pub fn into_result(self) -> GridResult<Option<T>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.data),
        }
    }
}

/// Details passed to the retry observer before each retry sleep
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    /// The attempt that just failed (1-based)
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub error: GridError,
}

pub type ErrorClassifier = Arc<dyn Fn(&GridError) -> bool + Send + Sync>;
pub type RetryObserver = Arc<dyn Fn(&RetryAttempt) + Send + Sync>;

#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    classifier: ErrorClassifier,
    on_retry: Option<RetryObserver>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            classifier: Arc::new(GridError::is_retryable),
            on_retry: None,
        }
    }

    /// Replace the retryable/terminal classifier
    pub fn with_classifier(
        mut self,
        classifier: impl Fn(&GridError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn on_retry(mut self, observer: impl Fn(&RetryAttempt) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// `min(max_delay, initial_delay * multiplier^(attempt-1) * jitter)`
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = self.config.initial_delay.as_secs_f64()
            * self.config.backoff_multiplier.powi(exponent)
            * jitter.clamp(0.5, 1.0);
        let capped = base.min(self.config.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        self.delay_for(attempt, jitter)
    }

    fn should_retry(&self, attempt: u32, error: &GridError) -> bool {
        attempt < self.config.max_attempts.max(1) && (self.classifier)(error)
    }

    fn report_retry(&self, label: &str, attempt: u32, delay: Duration, error: &GridError) {
        warn!(target: "retry", "{} failed on attempt {}/{}: {} (retrying in {:?})",
            label, attempt, self.config.max_attempts, error, delay);
        if let Some(observer) = &self.on_retry {
            observer(&RetryAttempt {
                attempt,
                max_attempts: self.config.max_attempts,
                delay,
                error: error.clone(),
            });
        }
    }

    /// Run an operation that signals failure through `Err`
    pub async fn execute<T, F, Fut>(&self, label: &str, mut op: F) -> GridResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GridResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(target: "retry", "{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !self.should_retry(attempt, &err) {
                        debug!(target: "retry", "{} giving up after {} attempt(s): {}",
                            label, attempt, err);
                        return Err(err);
                    }
                    let delay = self.next_delay(attempt);
                    self.report_retry(label, attempt, delay, &err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run an operation that reports failure in a `(data, error)` pair.
    ///
    /// The final pair is returned unchanged, whether it carries data or the
    /// last error.
    pub async fn execute_data_result<T, F, Fut>(&self, label: &str, mut op: F) -> DataResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DataResult<T>>,
    {
        let mut attempt = 1;
        loop {
            let result = op().await;
            let retry_delay = match &result.error {
                None => None,
                Some(err) if !self.should_retry(attempt, err) => {
                    debug!(target: "retry", "{} giving up after {} attempt(s): {}",
                        label, attempt, err);
                    None
                }
                Some(err) => {
                    let delay = self.next_delay(attempt);
                    self.report_retry(label, attempt, delay, err);
                    Some(delay)
                }
            };
            let Some(delay) = retry_delay else {
                if result.error.is_none() && attempt > 1 {
                    info!(target: "retry", "{} succeeded on attempt {}", label, attempt);
                }
                return result;
            };
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_formula() {
        let exec = RetryExecutor::default();
        assert_eq!(exec.delay_for(1, 1.0), Duration::from_millis(1000));
        assert_eq!(exec.delay_for(2, 1.0), Duration::from_millis(2000));
        assert_eq!(exec.delay_for(3, 0.5), Duration::from_millis(2000));
        // capped at max_delay
        assert_eq!(exec.delay_for(10, 1.0), Duration::from_millis(10_000));
        // jitter is clamped into [0.5, 1.0]
        assert_eq!(exec.delay_for(1, 0.1), Duration::from_millis(500));
    }

    #[test]
    fn test_random_delay_within_jitter_bounds() {
        let exec = RetryExecutor::default();
        for _ in 0..100 {
            let d = exec.next_delay(2);
            assert!(d >= Duration::from_millis(1000) && d <= Duration::from_millis(2000));
        }
    }

    #[tokio::test]
    async fn test_terminal_error_attempted_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let retries = Arc::new(AtomicU32::new(0));
        let r = retries.clone();
        let exec = RetryExecutor::new(fast()).on_retry(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        let c = calls.clone();
        let result: GridResult<()> = exec
            .execute("save", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(GridError::terminal("permission denied"))
                }
            })
            .await;

        assert_eq!(result, Err(GridError::terminal("permission denied")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(retries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_twice_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let retries = Arc::new(AtomicU32::new(0));
        let r = retries.clone();
        let exec = RetryExecutor::new(fast()).on_retry(move |attempt| {
            assert!(attempt.attempt <= 2);
            r.fetch_add(1, Ordering::SeqCst);
        });

        let c = calls.clone();
        let result = exec
            .execute("save", || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                    if n <= 2 {
                        Err(GridError::transient("503"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(retries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = RetryExecutor::new(fast());
        let c = calls.clone();
        let result: GridResult<()> = exec
            .execute("save", || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(GridError::transient(format!("failure {}", n)))
                }
            })
            .await;

        assert_eq!(result, Err(GridError::transient("failure 3")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_data_result_error_is_not_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = RetryExecutor::new(fast());
        let c = calls.clone();
        let result: DataResult<Vec<u32>> = exec
            .execute_data_result("fetch", || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 1 {
                        DataResult::err(GridError::transient("timeout"))
                    } else {
                        DataResult::ok(vec![n])
                    }
                }
            })
            .await;

        assert_eq!(result, DataResult::ok(vec![2]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_data_result_terminal_returned_unchanged() {
        let exec = RetryExecutor::new(fast());
        let result: DataResult<u32> = exec
            .execute_data_result("fetch", || async {
                DataResult {
                    data: Some(7),
                    error: Some(GridError::terminal("jwt expired")),
                }
            })
            .await;

        assert_eq!(result.data, Some(7));
        assert!(result.clone().into_result().is_err());
        assert_eq!(result.error, Some(GridError::terminal("jwt expired")));
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = RetryExecutor::new(fast()).with_classifier(|_| false);
        let c = calls.clone();
        let _ = exec
            .execute::<(), _, _>("save", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(GridError::transient("offline"))
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
