use crate::InferenceError;
use std::thread;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth another attempt after releasing cached model state.
    Recoverable,
    Fatal,
}

/// Shape mismatches and accelerator OOM are recoverable, everything else is fatal.
#[must_use]
pub const fn default_classifier(error: &InferenceError) -> ErrorClass {
    match error {
        InferenceError::ShapeMismatch(_) | InferenceError::OutOfMemory(_) => {
            ErrorClass::Recoverable
        }
        InferenceError::InvalidInput(_) | InferenceError::Model(_) => ErrorClass::Fatal,
    }
}

/// Bounded retry with exponential backoff for inference calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub classifier: fn(&InferenceError) -> ErrorClass,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            classifier: default_classifier,
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: fn(&InferenceError) -> ErrorClass) -> Self {
        self.classifier = classifier;
        self
    }

    /// Delay before retry number `attempt` (1-based): `base_delay * 2^(attempt - 1)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    #[must_use]
    pub fn classify(&self, error: &InferenceError) -> ErrorClass {
        (self.classifier)(error)
    }

    /// Runs `operation` until it succeeds, fails fatally, or attempts run out.
    /// `recover` runs between attempts, before the backoff sleep.
    pub fn run<T>(
        &self,
        mut operation: impl FnMut() -> Result<T, InferenceError>,
        mut recover: impl FnMut(),
    ) -> Result<T, InferenceError> {
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if self.classify(&error) == ErrorClass::Fatal || attempt >= self.max_attempts
                    {
                        return Err(error);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Recoverable inference error on attempt {}/{}: {}. Retrying in {:?}.",
                        attempt, self.max_attempts, error, delay
                    );
                    recover();
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

impl From<&app_state::RetrySettings> for RetryPolicy {
    fn from(settings: &app_state::RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
        )
    }
}
