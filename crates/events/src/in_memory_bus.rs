//! In-memory push channel for tests/dev.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::bus::{PushChannel, Subscription};

#[derive(Debug, Error)]
pub enum PushChannelError {
    /// Publish failed due to internal lock poisoning.
    #[error("push channel lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
struct Registry<K, M> {
    next_id: u64,
    subscribers: HashMap<K, Vec<(u64, mpsc::UnboundedSender<M>)>>,
}

/// In-memory keyed push channel.
///
/// - No IO
/// - Fan-out per key; other keys are never touched
/// - Dropped subscriptions are removed synchronously
#[derive(Debug)]
pub struct InMemoryPushChannel<K, M> {
    registry: Arc<Mutex<Registry<K, M>>>,
}

impl<K, M> InMemoryPushChannel<K, M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, M> Default for InMemoryPushChannel<K, M> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                subscribers: HashMap::new(),
            })),
        }
    }
}

impl<K, M> InMemoryPushChannel<K, M>
where
    K: Eq + Hash,
{
    /// Number of live subscriptions for `key`.
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.registry
            .lock()
            .map(|r| r.subscribers.get(key).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Number of keys with at least one live subscription.
    pub fn active_keys(&self) -> usize {
        self.registry.lock().map(|r| r.subscribers.len()).unwrap_or(0)
    }
}

fn remove_subscriber<K, M>(registry: &Weak<Mutex<Registry<K, M>>>, key: &K, id: u64)
where
    K: Eq + Hash,
{
    let Some(registry) = registry.upgrade() else {
        return;
    };
    let Ok(mut registry) = registry.lock() else {
        return;
    };
    if let Some(subs) = registry.subscribers.get_mut(key) {
        subs.retain(|(sub_id, _)| *sub_id != id);
        if subs.is_empty() {
            registry.subscribers.remove(key);
        }
    }
}

impl<K, M> PushChannel<K, M> for InMemoryPushChannel<K, M>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    M: Clone + Send + 'static,
{
    type Error = PushChannelError;

    fn publish(&self, key: &K, message: M) -> Result<usize, Self::Error> {
        let mut registry = self
            .registry
            .lock()
            .map_err(|_| PushChannelError::Poisoned)?;

        let Some(subs) = registry.subscribers.get_mut(key) else {
            return Ok(0);
        };

        // Drop any dead subscribers while publishing.
        subs.retain(|(_, tx)| tx.send(message.clone()).is_ok());
        let delivered = subs.len();
        if subs.is_empty() {
            registry.subscribers.remove(key);
        }

        Ok(delivered)
    }

    fn subscribe(&self, key: K) -> Subscription<M> {
        let (tx, rx) = mpsc::unbounded_channel();

        // If the lock is poisoned we still return a subscription; it just never
        // receives anything and callers fall back to reading the store.
        let id = match self.registry.lock() {
            Ok(mut registry) => {
                let id = registry.next_id;
                registry.next_id += 1;
                registry
                    .subscribers
                    .entry(key.clone())
                    .or_default()
                    .push((id, tx));
                id
            }
            Err(_) => {
                tracing::warn!("push channel lock poisoned; subscription will stay silent");
                return Subscription::new(rx);
            }
        };

        let registry = Arc::downgrade(&self.registry);
        Subscription::new(rx).with_unsubscribe(move || remove_subscriber(&registry, &key, id))
    }
}
