//! Per-call timeouts, the run deadline and cooperative cancellation.
//!
//! Reads race against cancellation and the deadline. Mutations are never
//! started once the run is stopping, and once started they are only bounded
//! by the per-call timeout: an in-flight mutation is never dropped because of
//! a cancel, so its outcome is either known or explicitly "unknown".

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use baseline_contracts::api::ApiError;

/// Stand-in deadline when the configured one does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Why a guarded call did not produce an API result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The collaborator answered with an error.
    Api(ApiError),
    /// The call exceeded the per-call timeout.
    TimedOut(Duration),
    /// The run was cancelled or hit its deadline before the call finished
    /// (reads) or started (mutations).
    Interrupted,
}

/// Marker returned when work was not performed because the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Shared per-run limits applied to every collaborator call.
#[derive(Debug, Clone)]
pub struct CallGuard {
    cancel: CancellationToken,
    deadline: Instant,
    call_timeout: Duration,
}

impl CallGuard {
    pub fn new(cancel: CancellationToken, run_deadline: Duration, call_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            cancel,
            deadline: now.checked_add(run_deadline).unwrap_or(now + FAR_FUTURE),
            call_timeout,
        }
    }

    /// True once the run was cancelled or its deadline passed.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Run a read-only call. Abandoned early on cancel or deadline.
    pub async fn read<T, F>(&self, call: F) -> Result<T, CallError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        if self.is_stopped() {
            return Err(CallError::Interrupted);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CallError::Interrupted),
            _ = tokio::time::sleep_until(self.deadline) => Err(CallError::Interrupted),
            res = tokio::time::timeout(self.call_timeout, call) => match res {
                Ok(inner) => inner.map_err(CallError::Api),
                Err(_) => Err(CallError::TimedOut(self.call_timeout)),
            },
        }
    }

    /// Run a mutating call. Refused if the run is already stopping; once
    /// started it runs to completion or to the per-call timeout.
    pub async fn mutate<T, F>(&self, call: F) -> Result<T, CallError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        if self.is_stopped() {
            return Err(CallError::Interrupted);
        }
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(inner) => inner.map_err(CallError::Api),
            Err(_) => Err(CallError::TimedOut(self.call_timeout)),
        }
    }

    /// Sleep for `duration` unless the run stops first. Returns false when
    /// interrupted.
    pub async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_stopped();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep_until(self.deadline) => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    use baseline_contracts::api::ApiError;

    use super::{CallError, CallGuard};

    fn guard(token: &CancellationToken) -> CallGuard {
        CallGuard::new(token.clone(), Duration::from_secs(60), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn read_passes_through_results() {
        let token = CancellationToken::new();
        let g = guard(&token);

        let ok: Result<u32, CallError> = g.read(async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, CallError> = g
            .read(async { Err(ApiError::new("AccessDenied", "no")) })
            .await;
        assert_eq!(err, Err(CallError::Api(ApiError::new("AccessDenied", "no"))));
    }

    #[tokio::test]
    async fn slow_read_times_out() {
        let token = CancellationToken::new();
        let g = guard(&token);
        let res: Result<(), CallError> = g
            .read(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(res, Err(CallError::TimedOut(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn cancelled_run_refuses_new_mutations() {
        let token = CancellationToken::new();
        let g = guard(&token);
        token.cancel();

        assert!(g.is_stopped());
        let res: Result<(), CallError> = g.mutate(async { Ok(()) }).await;
        assert_eq!(res, Err(CallError::Interrupted));
    }

    #[tokio::test]
    async fn started_mutation_survives_cancel() {
        let token = CancellationToken::new();
        let g = CallGuard::new(token.clone(), Duration::from_secs(60), Duration::from_secs(5));

        let canceller = token.clone();
        let res: Result<&str, CallError> = g
            .mutate(async move {
                canceller.cancel();
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok("done")
            })
            .await;
        assert_eq!(res, Ok("done"));
    }

    #[tokio::test]
    async fn pause_is_interrupted_by_cancel() {
        let token = CancellationToken::new();
        let g = guard(&token);
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        assert!(!g.pause(Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn unrepresentable_deadline_means_no_deadline() {
        let token = CancellationToken::new();
        let g = CallGuard::new(token, Duration::from_secs(u64::MAX), Duration::from_secs(1));
        assert!(!g.is_stopped());
        let res: Result<u32, CallError> = g.read(async { Ok(3) }).await;
        assert_eq!(res, Ok(3));
        assert!(g.pause(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn expired_deadline_stops_reads() {
        let token = CancellationToken::new();
        let g = CallGuard::new(token, Duration::ZERO, Duration::from_secs(1));
        let res: Result<(), CallError> = g.read(async { Ok(()) }).await;
        assert_eq!(res, Err(CallError::Interrupted));
    }
}
