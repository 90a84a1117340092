//! Ambient deadline and cancellation for a single lifecycle operation.

use std::future::{pending, Future};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use crate::error::SyncError;

/// Deadline and cancellation signal supplied by the host for one operation.
///
/// Cloning is cheap; every clone observes the same signal.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    deadline: Option<Instant>,
    cancellation: Option<watch::Receiver<bool>>,
}

/// Triggers cancellation of every context cloned from its pair.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl OperationContext {
    /// A context that never expires and cannot be cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A cancellable context and the handle that cancels it.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancellation: Some(rx),
            },
            CancelHandle(tx),
        )
    }

    /// Returns a copy of this context that also expires after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Runs `fut` until it completes, the context is cancelled, or the
    /// deadline passes. On cancellation or expiry `fut` is dropped.
    pub async fn guard<F>(&self, fut: F) -> Result<F::Output, SyncError>
    where
        F: Future,
    {
        let cancelled = wait_cancelled(self.cancellation.clone());
        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(SyncError::Cancelled),
            _ = expired => Err(SyncError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

async fn wait_cancelled(rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = rx else {
        return pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Handle dropped without cancelling.
            return pending().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_context_runs_future_to_completion() {
        let ctx = OperationContext::background();
        let out = ctx.guard(async { 7 }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let (ctx, handle) = OperationContext::cancellable();
        handle.cancel();
        assert!(ctx.is_cancelled());
        let res = ctx.guard(pending::<()>()).await;
        assert!(matches!(res, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn expired_deadline_is_reported() {
        let ctx = OperationContext::background().with_timeout(Duration::from_millis(10));
        let res = ctx.guard(pending::<()>()).await;
        assert!(matches!(res, Err(SyncError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let (ctx, handle) = OperationContext::cancellable();
        drop(handle);
        let out = ctx.guard(async { "done" }).await.unwrap();
        assert_eq!(out, "done");
    }
}
