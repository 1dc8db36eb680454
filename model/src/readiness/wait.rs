use crate::error::{self, Result};
use log::{debug, info};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// The outcome of one poll.
#[derive(Debug)]
pub enum Poll<T> {
    Done(T),
    /// Not there yet, the message is logged.
    Pending(String),
}

/// Calls `check` every `interval` until it returns [`Poll::Done`], the `timeout` passes, or
/// `cancel` fires. Errors from `check` are logged and retried. A timeout and a cancellation fail
/// with distinct errors.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>>>,
{
    let deadline = Instant::now() + timeout;
    info!("waiting for {} (timeout {:?})", what, timeout);
    loop {
        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return error::CancelledSnafu { what }.fail(),
            attempt = timeout_at(deadline, check()) => attempt,
        };
        match attempt {
            Ok(Ok(Poll::Done(value))) => return Ok(value),
            Ok(Ok(Poll::Pending(message))) => info!("{}", message),
            Ok(Err(e)) => debug!("still waiting for {}: {}", what, e),
            Err(_) => return error::ReadinessTimeoutSnafu { what, timeout }.fail(),
        }

        let next = Instant::now() + interval;
        if next >= deadline {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return error::CancelledSnafu { what }.fail(),
                _ = sleep_until(deadline) => {},
            }
            return error::ReadinessTimeoutSnafu { what, timeout }.fail();
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return error::CancelledSnafu { what }.fail(),
            _ = sleep_until(next) => {},
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn done_after_a_few_polls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let value = poll_until(
            "thing",
            Duration::from_secs(60),
            Duration::from_secs(5),
            &CancellationToken::new(),
            || {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Ok(Poll::Pending(format!("attempt {}", n)))
                    } else {
                        Ok(Poll::Done(n))
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_retried_until_timeout() {
        let err = poll_until::<(), _, _>(
            "thing",
            Duration::from_secs(30),
            Duration::from_secs(10),
            &CancellationToken::new(),
            || async {
                error::InvalidFieldSnafu {
                    reason: "not yet",
                }
                .fail()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadinessTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_not_a_timeout() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            child.cancel();
        });
        let err = poll_until::<(), _, _>(
            "thing",
            Duration::from_secs(600),
            Duration::from_secs(5),
            &cancel,
            || async { Ok(Poll::Pending("waiting".to_string())) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
