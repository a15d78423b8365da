//! Cancellation and deadline propagation.
//!
//! A [`Context`] is handed to every stage. Stages wrap their blocking work in
//! [`Context::run`], which aborts the work as soon as the token is cancelled
//! or the deadline passes. Dropping the in-flight future is what aborts it:
//! sqlx returns the connection, and child processes are spawned with
//! `kill_on_drop`.

use crate::error::{DberdError, DberdResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context driven by an external cancellation token.
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Set a deadline `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some((Instant::now() + timeout, timeout));
        self
    }

    /// Derive a context whose cancellation also follows this one.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast if the context is already done.
    pub fn check(&self, operation: &str) -> DberdResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DberdError::cancelled(operation));
        }
        if let Some((at, timeout)) = self.deadline {
            if Instant::now() >= at {
                return Err(DberdError::timeout(operation, timeout.as_secs()));
            }
        }
        Ok(())
    }

    /// Run `fut` until it completes, the context is cancelled, or the deadline
    /// passes, whichever comes first.
    pub async fn run<F, T>(&self, operation: &str, fut: F) -> DberdResult<T>
    where
        F: Future<Output = DberdResult<T>>,
    {
        self.check(operation)?;

        let expired = async {
            match self.deadline {
                Some((at, _)) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DberdError::cancelled(operation)),
            _ = expired => {
                let secs = self.deadline.map(|(_, t)| t.as_secs()).unwrap_or_default();
                Err(DberdError::timeout(operation, secs))
            }
            result = fut => result,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
