//! Polling helpers for asynchronous API operations.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::error::ProviderError;

/// Caps every wait delay and poll interval.
///
/// Production code uses [`Pacing::default`], which leaves intervals as
/// configured. Tests cap them so waiters spin quickly against mock servers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pacing {
    /// Upper bound applied to delays and intervals.
    pub max_interval: Option<Duration>,
}

impl Pacing {
    /// Pacing that never sleeps longer than `max`.
    pub fn capped(max: Duration) -> Self {
        Self {
            max_interval: Some(max),
        }
    }

    /// `interval`, capped.
    pub fn apply(&self, interval: Duration) -> Duration {
        match self.max_interval {
            Some(max) => interval.min(max),
            None => interval,
        }
    }
}

/// Parameters of a [`wait_for_state`] call.
#[derive(Debug, Clone)]
pub struct StateChangeConf<'a> {
    /// States that mean "keep polling".
    pub pending: &'a [&'a str],
    /// States that end the wait successfully.
    pub target: &'a [&'a str],
    /// Overall deadline.
    pub timeout: Duration,
    /// Sleep before the first poll.
    pub delay: Duration,
    /// Sleep between polls.
    pub min_timeout: Duration,
}

impl<'a> StateChangeConf<'a> {
    /// A waiter with a 3s delay and a 10s poll interval.
    pub fn new(pending: &'a [&'a str], target: &'a [&'a str], timeout: Duration) -> Self {
        Self {
            pending,
            target,
            timeout,
            delay: Duration::from_secs(3),
            min_timeout: Duration::from_secs(10),
        }
    }

    /// Set the initial delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the poll interval.
    pub fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }
}

/// Poll `refresh` until it reports a target state.
///
/// `refresh` returns the current object and its state name. A state in
/// neither `pending` nor `target` is an error, as is any error returned by
/// `refresh`.
pub async fn wait_for_state<T, F, Fut>(
    conf: &StateChangeConf<'_>,
    pacing: Pacing,
    mut refresh: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(T, String), ProviderError>>,
{
    let deadline = Instant::now() + conf.timeout;
    sleep(pacing.apply(conf.delay)).await;

    loop {
        let (value, state) = refresh().await?;
        trace!(state = %state, "refreshed");

        if conf.target.contains(&state.as_str()) {
            debug!(state = %state, "reached target state");
            return Ok(value);
        }
        if !conf.pending.contains(&state.as_str()) {
            return Err(ProviderError::FailedPrecondition(format!(
                "unexpected state '{}', wanted target '{}'",
                state,
                conf.target.join(", ")
            )));
        }
        if Instant::now() >= deadline {
            return Err(ProviderError::DeadlineExceeded(format!(
                "timeout while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
                conf.target.join(", "),
                state,
                conf.timeout
            )));
        }
        sleep(pacing.apply(conf.min_timeout)).await;
    }
}

/// Run `op` until it succeeds, fails with an error `should_retry` rejects, or
/// `timeout` passes. The last error is returned on timeout.
pub async fn retry_while<T, F, Fut, P>(
    timeout: Duration,
    interval: Duration,
    pacing: Pacing,
    mut op: F,
    should_retry: P,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
    P: Fn(&ProviderError) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if should_retry(&err) && Instant::now() < deadline => {
                debug!(attempt, error = %err, "retrying");
                sleep(pacing.apply(interval)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> Pacing {
        Pacing::capped(Duration::from_millis(1))
    }

    #[test]
    fn test_pacing_caps_intervals() {
        assert_eq!(Pacing::default().apply(Duration::from_secs(10)), Duration::from_secs(10));
        assert_eq!(fast().apply(Duration::from_secs(10)), Duration::from_millis(1));
        assert_eq!(fast().apply(Duration::ZERO), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_wait_reaches_target() {
        let calls = AtomicU32::new(0);
        let conf = StateChangeConf::new(&["CREATING", "UPDATING"], &["IDLE"], Duration::from_secs(5));
        let result = wait_for_state(&conf, fast(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let state = if n < 2 { "CREATING" } else { "IDLE" };
                Ok((n, state.to_string()))
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_unexpected_state() {
        let conf = StateChangeConf::new(&["CREATING"], &["IDLE"], Duration::from_secs(5));
        let err = wait_for_state(&conf, fast(), || async { Ok(((), "DELETED".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
        assert!(err.to_string().contains("unexpected state 'DELETED'"));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let conf = StateChangeConf::new(&["CREATING"], &["IDLE"], Duration::from_millis(20))
            .with_delay(Duration::ZERO)
            .with_min_timeout(Duration::from_millis(5));
        let err = wait_for_state(&conf, Pacing::default(), || async {
            Ok(((), "CREATING".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
        assert!(err.to_string().contains("last state: 'CREATING'"));
    }

    #[tokio::test]
    async fn test_wait_propagates_refresh_error() {
        let conf = StateChangeConf::new(&["CREATING"], &["IDLE"], Duration::from_secs(5));
        let err = wait_for_state::<(), _, _>(&conf, fast(), || async {
            Err(ProviderError::Api(ApiError::new(400, "INVALID", "no")))
        })
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), Some("INVALID"));
    }

    #[tokio::test]
    async fn test_retry_while_recovers() {
        let calls = AtomicU32::new(0);
        let value = retry_while(
            Duration::from_secs(5),
            Duration::from_secs(10),
            fast(),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::Api(ApiError::new(500, "UNEXPECTED_ERROR", "")))
                    } else {
                        Ok("done")
                    }
                }
            },
            ProviderError::is_retryable,
        )
        .await
        .unwrap();
        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_while_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let err = retry_while(
            Duration::from_secs(5),
            Duration::from_secs(10),
            fast(),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ProviderError::Api(ApiError::new(400, "INVALID", ""))) }
            },
            ProviderError::is_retryable,
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
