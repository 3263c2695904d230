// ctx-assist-core/src/cancellation.rs

//! Cancellation plumbing between the host surface and running invocations.
//!
//! A host hands the core a [`CancellationSource`]. The invocation wrapper
//! subscribes to it right after spawning and holds the returned handle in a
//! [`CancellationRegistration`], which is retired exactly once when the
//! process finishes.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Callback invoked when cancellation is requested. Sources may call it more
/// than once; receivers must tolerate repeats.
pub type CancelCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Handle returned by [`CancellationSource::subscribe`].
pub trait Subscription: Send {
    /// Stops delivery of further cancellation callbacks.
    fn unsubscribe(self: Box<Self>);
}

/// Something that can tell an invocation to stop.
pub trait CancellationSource: Send + Sync {
    /// Whether cancellation was already requested.
    fn is_cancelled(&self) -> bool;

    /// Registers `callback` to run when cancellation is requested.
    fn subscribe(&self, callback: CancelCallback) -> Box<dyn Subscription>;
}

/// Pairs a subscription handle with a `disposed` flag so the handle is
/// released exactly once, whichever exit path gets there first.
pub struct CancellationRegistration {
    handle: Option<Box<dyn Subscription>>,
    disposed: bool,
}

impl CancellationRegistration {
    pub fn new(handle: Box<dyn Subscription>) -> Self {
        Self {
            handle: Some(handle),
            disposed: false,
        }
    }

    /// Releases the subscription. Returns `false` if it was already released.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        if let Some(handle) = self.handle.take() {
            handle.unsubscribe();
        }
        trace!("Cancellation registration disposed.");
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for CancellationRegistration {
    fn drop(&mut self) {
        // Covers an invocation future that is dropped mid-flight.
        self.dispose();
    }
}

/// [`CancellationSource`] backed by a `tokio_util` [`CancellationToken`].
///
/// Each subscription is a small task parked on `token.cancelled()`; the
/// subscription handle aborts that task.
#[derive(Debug, Clone, Default)]
pub struct TokenCancellation {
    token: CancellationToken,
}

impl TokenCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl CancellationSource for TokenCancellation {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn subscribe(&self, callback: CancelCallback) -> Box<dyn Subscription> {
        let token = self.token.clone();
        let task = tokio::spawn(async move {
            token.cancelled().await;
            callback();
        });
        Box::new(TaskSubscription { task })
    }
}

struct TaskSubscription {
    task: JoinHandle<()>,
}

impl Subscription for TaskSubscription {
    fn unsubscribe(self: Box<Self>) {
        self.task.abort();
    }
}
