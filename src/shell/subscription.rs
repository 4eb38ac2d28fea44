//! Cancellable handles for in-flight sync operations.

use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Handle for one spawned asynchronous operation.
///
/// Spawning races the operation's future against a cancellation token:
/// disposing the handle before the future settles means neither callback
/// fires. Dropping the handle does not cancel — only explicit disposal
/// does.
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    /// Subscribe to a single-result future.
    ///
    /// This is the point where the operation starts: the future performs
    /// no work until the spawned task polls it. Exactly one of `on_next`
    /// and `on_error` runs, unless the handle is disposed first.
    pub fn spawn<F, T, E>(
        future: F,
        on_next: impl FnOnce(T) + Send + 'static,
        on_error: impl FnOnce(E) + Send + 'static,
    ) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let token = CancellationToken::new();
        let guard = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = guard.cancelled() => {}
                result = future => match result {
                    Ok(value) => on_next(value),
                    Err(err) => on_error(err),
                },
            }
        });

        Self { token }
    }

    /// Cancel the operation, suppressing any pending delivery.
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }
}

/// Every live subscription owned by the shell.
///
/// Teardown disposes the whole set, so no handle is lost even when
/// several operations are in flight at once.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn track(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Dispose every tracked subscription. Idempotent; a no-op when
    /// nothing was ever tracked.
    pub fn dispose_all(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
