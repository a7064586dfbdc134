//! Process-local message bus

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::{
    subject_matches, validate_pattern, validate_subject, MessageBus, MessageHandler,
    SubscriptionId,
};
use crate::{Error, Result};

struct Subscription {
    pattern: String,
    handler: Arc<MessageHandler>,
}

/// In-memory bus delivering synchronously on the publishing thread
///
/// Handlers run in subscription order. No lock is held while a handler runs,
/// so handlers may publish or (un)subscribe themselves.
#[derive(Default)]
pub struct InMemoryBus {
    subscriptions: DashMap<SubscriptionId, Subscription>,
    next_id: AtomicU64,
    published: AtomicU64,
}

impl InMemoryBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Number of messages published so far
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl MessageBus for InMemoryBus {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        validate_subject(topic)?;

        let mut targets: Vec<(SubscriptionId, Arc<MessageHandler>)> = self
            .subscriptions
            .iter()
            .filter(|entry| subject_matches(&entry.value().pattern, topic))
            .map(|entry| (*entry.key(), Arc::clone(&entry.value().handler)))
            .collect();
        targets.sort_by_key(|(id, _)| *id);

        for (_, handler) in targets {
            (**handler)(topic, payload);
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn subscribe(&self, pattern: &str, handler: MessageHandler) -> Result<SubscriptionId> {
        validate_pattern(pattern)?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.insert(
            id,
            Subscription {
                pattern: pattern.to_string(),
                handler: Arc::new(handler),
            },
        );

        debug!("Subscribed {:?} to '{}'", id, pattern);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        match self.subscriptions.remove(&id) {
            Some(_) => {
                debug!("Unsubscribed {:?}", id);
                Ok(())
            }
            None => Err(Error::Bus(format!("Unknown subscription {id:?}"))),
        }
    }
}
