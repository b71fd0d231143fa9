//! Per-call deadline and cancellation for store I/O.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use super::error::{CancelReason, StoreError, StoreResult};

/// Cancellation signal shared between a caller and the operations it starts.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Deadline and cancellation carried from the originating request into every
/// store call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancelSignal,
}

impl CallContext {
    /// A context with no deadline and a fresh cancellation signal.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drive `fut` unless the deadline passes or the signal fires first.
    ///
    /// A cut-short operation yields `StoreError::Cancelled`; whatever the
    /// inner future had read so far is dropped with it.
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled {
                operation,
                reason: CancelReason::Requested,
            });
        }

        let guarded = async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(StoreError::Cancelled {
                    operation,
                    reason: CancelReason::Requested,
                }),
                result = fut => result,
            }
        };

        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, guarded)
                .await
                .unwrap_or(Err(StoreError::Cancelled {
                    operation,
                    reason: CancelReason::DeadlineExceeded,
                })),
            None => guarded.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let ctx = CallContext::background();
        let value = ctx.run("get", async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(value.expect("completed"), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_reported_as_cancelled() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        let result = ctx
            .run("get", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StoreError>(())
            })
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Cancelled {
                operation: "get",
                reason: CancelReason::DeadlineExceeded
            })
        ));
    }

    #[tokio::test]
    async fn explicit_cancel_interrupts_pending_io() {
        let signal = CancelSignal::new();
        let ctx = CallContext::background().with_cancel(signal.clone());

        let task = tokio::spawn(async move {
            ctx.run("put", async {
                std::future::pending::<()>().await;
                Ok::<_, StoreError>(())
            })
            .await
        });

        tokio::task::yield_now().await;
        signal.cancel();

        let result = task.await.expect("task joins");
        assert!(matches!(
            result,
            Err(StoreError::Cancelled {
                reason: CancelReason::Requested,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn already_cancelled_context_skips_the_call() {
        let signal = CancelSignal::new();
        signal.cancel();
        let ctx = CallContext::background().with_cancel(signal);
        let started = AtomicBool::new(false);
        let result = ctx
            .run("delete", async {
                started.store(true, Ordering::SeqCst);
                Ok::<_, StoreError>(())
            })
            .await;
        assert!(result.expect_err("cancelled").is_cancelled());
        assert!(!started.load(Ordering::SeqCst));
    }
}
