//! Push channel abstraction (mechanics only).
//!
//! ## Delivery
//!
//! - **Keyed**: a subscription only ever sees messages published for its key
//! - **Best-effort**: a message published while nobody is subscribed is dropped
//! - **No persistence**: the channel is for notification, the store is the source of truth
//!
//! Consumers must treat a missed notification as normal and keep a way to read
//! the record directly.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

type UnsubscribeHook = Box<dyn FnOnce() + Send>;
type SharedHook = Arc<Mutex<Option<UnsubscribeHook>>>;

fn run_hook(hook: &SharedHook) {
    let taken = match hook.lock() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    if let Some(hook) = taken {
        hook();
    }
}

/// A live subscription to one key of a push channel.
///
/// Dropping the subscription unsubscribes synchronously: once `drop` returns,
/// the channel no longer holds a sender for it.
pub struct Subscription<M> {
    receiver: mpsc::UnboundedReceiver<M>,
    unsubscribe: SharedHook,
}

impl<M> Subscription<M> {
    pub fn new(receiver: mpsc::UnboundedReceiver<M>) -> Self {
        Self {
            receiver,
            unsubscribe: Arc::new(Mutex::new(None)),
        }
    }

    /// Attach a hook that runs exactly once when the subscription is dropped.
    pub fn with_unsubscribe(self, hook: impl FnOnce() + Send + 'static) -> Self {
        if let Ok(mut slot) = self.unsubscribe.lock() {
            *slot = Some(Box::new(hook));
        }
        self
    }

    /// A handle that can end this subscription from elsewhere.
    ///
    /// Useful when the subscription itself has moved into a task: dropping the
    /// guard (or the subscription, whichever happens first) unsubscribes, and
    /// the hook still runs only once.
    pub fn guard(&self) -> UnsubscribeGuard {
        UnsubscribeGuard {
            hook: Arc::clone(&self.unsubscribe),
        }
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once the channel side has gone away.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<M, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Explicit teardown; equivalent to dropping.
    pub fn unsubscribe(self) {}
}

impl<M> Drop for Subscription<M> {
    fn drop(&mut self) {
        self.receiver.close();
        run_hook(&self.unsubscribe);
    }
}

impl<M> core::fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let armed = self.unsubscribe.lock().map(|h| h.is_some()).unwrap_or(false);
        f.debug_struct("Subscription")
            .field("has_unsubscribe_hook", &armed)
            .finish()
    }
}

/// Detached unsubscribe trigger obtained from [`Subscription::guard`].
pub struct UnsubscribeGuard {
    hook: SharedHook,
}

impl UnsubscribeGuard {
    /// Unsubscribe now; equivalent to dropping.
    pub fn release(self) {}

    /// Whether the owning subscription is still registered.
    pub fn is_active(&self) -> bool {
        self.hook.lock().map(|h| h.is_some()).unwrap_or(false)
    }
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        run_hook(&self.hook);
    }
}

impl core::fmt::Debug for UnsubscribeGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UnsubscribeGuard")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Keyed publish/subscribe channel.
///
/// `K` identifies the record (e.g. a job id), `M` is the notification payload
/// (e.g. the full updated row).
pub trait PushChannel<K, M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    /// Publish `message` to every live subscriber of `key`.
    ///
    /// Returns how many subscribers received it.
    fn publish(&self, key: &K, message: M) -> Result<usize, Self::Error>;

    /// Subscribe to messages for `key` only.
    fn subscribe(&self, key: K) -> Subscription<M>;
}

impl<K, M, B> PushChannel<K, M> for Arc<B>
where
    B: PushChannel<K, M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, key: &K, message: M) -> Result<usize, Self::Error> {
        (**self).publish(key, message)
    }

    fn subscribe(&self, key: K) -> Subscription<M> {
        (**self).subscribe(key)
    }
}
