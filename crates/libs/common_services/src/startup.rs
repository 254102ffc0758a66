use app_state::StartupSettings;
use color_eyre::eyre::{Result, eyre};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{info, warn};

/// Retries `action` with a fixed delay until it succeeds or the attempts run out.
/// Used for infrastructure that may still be starting when a process boots.
pub async fn retry_startup<T, E, F, Fut>(
    settings: &StartupSettings,
    what: &str,
    mut action: F,
) -> Result<T>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = settings.attempts.max(1);
    let strategy = FixedInterval::new(Duration::from_secs(settings.delay_seconds)).take(attempts - 1);
    let mut attempt = 0;

    let result = Retry::spawn(strategy, || {
        attempt += 1;
        let current = attempt;
        let fut = action();
        async move {
            fut.await.inspect_err(|e| {
                warn!("{what} unavailable (attempt {current}/{attempts}): {e}");
            })
        }
    })
    .await;

    match result {
        Ok(value) => {
            info!("{what} is available");
            Ok(value)
        }
        Err(e) => Err(eyre!("{what} unavailable after {attempts} attempts: {e}")),
    }
}
