//! Backoff executor.
//!
//! [`with_backoff`] re-invokes an I/O operation while it fails with a
//! transient [`StageError`], sleeping according to a [`RetryPolicy`].
//! Fatal errors, and transient ones once the policy gives up, are returned
//! to the caller unchanged.

use std::future::Future;

use movies_etl_core::retry::RetryPolicy;
use movies_etl_core::StageError;

pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, StageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let mut failures = 0u32;
    loop {
        match call().await {
            Ok(value) => {
                if failures > 0 {
                    tracing::info!(operation, attempts = failures + 1, "Recovered after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() => {
                failures = failures.saturating_add(1);
                if !policy.allows_retry(failures) {
                    tracing::error!(
                        operation,
                        attempts = failures,
                        error = %err,
                        "Retries exhausted"
                    );
                    return Err(err);
                }
                let delay = policy.delay_for(failures);
                #[allow(clippy::cast_possible_truncation)]
                let delay_ms = delay.as_millis() as u64;
                tracing::warn!(
                    operation,
                    attempt = failures,
                    delay_ms,
                    error = %err,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
