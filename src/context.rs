//! Cancellation and deadline context threaded through every collaborator call.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::plugins::{PluginError, PluginResult};

/// Cancellation flag plus optional deadline, cloned into every call.
#[derive(Debug, Clone)]
pub struct Context {
    cancel: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Owner side of a cancellable [`Context`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            cancel: rx,
            deadline: None,
        }
    }

    /// A context cancelled when the returned handle's `cancel` is called.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                cancel: rx,
                deadline: None,
            },
            CancelHandle { tx },
        )
    }

    /// Derive a context whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Fail fast if the context is already cancelled or past its deadline.
    pub fn check(&self) -> PluginResult<()> {
        if self.is_cancelled() {
            return Err(PluginError::Cancelled);
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(PluginError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolves once the context is cancelled. Never resolves for a
    /// background context.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without cancelling.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Race a collaborator call against cancellation and the deadline.
    pub async fn run<T, F>(&self, fut: F) -> PluginResult<T>
    where
        F: Future<Output = PluginResult<T>>,
    {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(PluginError::Cancelled),
            _ = deadline => Err(PluginError::DeadlineExceeded),
            res = fut => res,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = Context::background();
        let res = ctx.run(async { Ok::<_, PluginError>(7) }).await;
        assert_eq!(res.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_call() {
        let (ctx, handle) = Context::cancellable();
        let call = ctx.run(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, PluginError>(())
        });
        handle.cancel();
        assert!(matches!(call.await, Err(PluginError::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let res = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, PluginError>(())
            })
            .await;
        assert!(matches!(res, Err(PluginError::DeadlineExceeded)));
    }

    #[test]
    fn test_with_timeout_keeps_earlier_deadline() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let short = Context::background().with_timeout(Duration::from_millis(5));
            let longer = short.with_timeout(Duration::from_secs(60));
            assert_eq!(short.deadline(), longer.deadline());
        });
    }
}
