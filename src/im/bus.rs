//! Change bus: row-level change notifications fanned out to subscribers
//!
//! Delivery is at-least-once and carries no ordering guarantee across
//! reconnects. Every consumer must tolerate the same event arriving twice and
//! events arriving out of `created_at` order.

use super::lock;
use super::types::{Conversation, Message};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRow {
    Message(Message),
    Conversation(Conversation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub row: ChangeRow,
}

impl ChangeEvent {
    pub fn message_inserted(message: Message) -> Self {
        Self {
            kind: ChangeKind::Insert,
            row: ChangeRow::Message(message),
        }
    }

    pub fn conversation_inserted(conversation: Conversation) -> Self {
        Self {
            kind: ChangeKind::Insert,
            row: ChangeRow::Conversation(conversation),
        }
    }

    pub fn conversation_updated(conversation: Conversation) -> Self {
        Self {
            kind: ChangeKind::Update,
            row: ChangeRow::Conversation(conversation),
        }
    }
}

/// Entity + column filter a subscription is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeFilter {
    MessagesByOwner(String),
    MessagesByConversation(String),
    ConversationsByOwner(String),
}

impl ChangeFilter {
    pub fn matches(&self, row: &ChangeRow) -> bool {
        match (self, row) {
            (ChangeFilter::MessagesByOwner(owner), ChangeRow::Message(m)) => &m.owner_id == owner,
            (ChangeFilter::MessagesByConversation(id), ChangeRow::Message(m)) => {
                &m.conversation_id == id
            }
            (ChangeFilter::ConversationsByOwner(owner), ChangeRow::Conversation(c)) => {
                &c.owner_id == owner
            }
            _ => false,
        }
    }
}

/// Callbacks for one subscription. Both default to no-ops.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn on_insert(&self, _row: ChangeRow) {}
    async fn on_update(&self, _row: ChangeRow) {}
}

pub trait ChangeBus: Send + Sync {
    fn subscribe(
        &self,
        scope_key: &str,
        filter: ChangeFilter,
        handler: Arc<dyn ChangeHandler>,
    ) -> Subscription;
}

pub trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: u64);
}

/// Handle of a live subscription; dropping it unsubscribes
pub struct Subscription {
    id: u64,
    scope_key: String,
    registry: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub fn new(id: u64, scope_key: String, registry: Weak<dyn Unsubscribe>) -> Self {
        Self {
            id,
            scope_key,
            registry,
        }
    }

    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
            debug!("[Bus] unsubscribed {} ({})", self.id, self.scope_key);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("scope_key", &self.scope_key)
            .finish()
    }
}

struct Subscriber {
    scope_key: String,
    filter: ChangeFilter,
    handler: Arc<dyn ChangeHandler>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
}

impl Unsubscribe for BusInner {
    fn unsubscribe(&self, id: u64) {
        lock(&self.subscribers).remove(&id);
    }
}

/// In-process change bus
#[derive(Clone, Default)]
pub struct LocalChangeBus {
    inner: Arc<BusInner>,
}

impl LocalChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every matching subscriber, one after another
    ///
    /// Calling this twice with the same event is how a redelivery looks to
    /// consumers.
    pub async fn publish(&self, event: ChangeEvent) {
        let targets: Vec<(String, Arc<dyn ChangeHandler>)> = {
            let subscribers = lock(&self.inner.subscribers);
            let mut matching: Vec<(&u64, &Subscriber)> = subscribers
                .iter()
                .filter(|(_, s)| s.filter.matches(&event.row))
                .collect();
            matching.sort_by_key(|(id, _)| **id);
            matching
                .into_iter()
                .map(|(_, s)| (s.scope_key.clone(), s.handler.clone()))
                .collect()
        };

        if targets.is_empty() {
            debug!("[Bus] no subscriber for {:?} event", event.kind);
            return;
        }

        for (scope_key, handler) in targets {
            debug!("[Bus] delivering {:?} to {}", event.kind, scope_key);
            match event.kind {
                ChangeKind::Insert => handler.on_insert(event.row.clone()).await,
                ChangeKind::Update => handler.on_update(event.row.clone()).await,
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }

    pub fn scope_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.inner.subscribers)
            .values()
            .map(|s| s.scope_key.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl ChangeBus for LocalChangeBus {
    fn subscribe(
        &self,
        scope_key: &str,
        filter: ChangeFilter,
        handler: Arc<dyn ChangeHandler>,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut subscribers = lock(&self.inner.subscribers);
        if subscribers.values().any(|s| s.scope_key == scope_key) {
            warn!("[Bus] scope {} already has a subscriber", scope_key);
        }
        subscribers.insert(
            id,
            Subscriber {
                scope_key: scope_key.to_string(),
                filter,
                handler,
            },
        );
        debug!("[Bus] subscribed {} ({})", id, scope_key);

        let weak_inner: Weak<BusInner> = Arc::downgrade(&self.inner);
        let registry: Weak<dyn Unsubscribe> = weak_inner;
        Subscription::new(id, scope_key.to_string(), registry)
    }
}
