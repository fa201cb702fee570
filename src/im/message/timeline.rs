//! Per-conversation message timeline
//!
//! History is loaded with a full fetch; after that, live inserts are appended
//! in arrival order. Sending never appends locally: the bus echo of the insert
//! is the only way a message enters the timeline.

use crate::im::bus::{ChangeBus, ChangeFilter, ChangeHandler, ChangeRow, Subscription};
use crate::im::lock;
use crate::im::message::listener::{EmptyTimelineListener, TimelineListener};
use crate::im::message::models::TimelineConfig;
use crate::im::store::ChatStore;
use crate::im::transient::TransientSet;
use crate::im::types::{Message, NewMessage, SenderType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info, warn};

/// A message as shown in the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    #[serde(flatten)]
    pub message: Message,
    /// Set briefly on messages from the other participant that arrived live
    pub is_new: bool,
}

#[derive(Default)]
struct TimelineState {
    conversation_id: Option<String>,
    participants: Option<(String, String)>,
    messages: Vec<Message>,
    loaded: bool,
    subscription: Option<Subscription>,
}

struct TimelineInner {
    store: Arc<dyn ChatStore>,
    bus: Arc<dyn ChangeBus>,
    listener: Arc<dyn TimelineListener>,
    config: TimelineConfig,
    state: Mutex<TimelineState>,
    fresh: TransientSet<String>,
}

#[derive(Clone)]
pub struct MessageTimeline {
    inner: Arc<TimelineInner>,
}

impl MessageTimeline {
    pub fn new(store: Arc<dyn ChatStore>, bus: Arc<dyn ChangeBus>, config: TimelineConfig) -> Self {
        Self::with_listener(store, bus, config, Arc::new(EmptyTimelineListener))
    }

    pub fn with_listener(
        store: Arc<dyn ChatStore>,
        bus: Arc<dyn ChangeBus>,
        config: TimelineConfig,
        listener: Arc<dyn TimelineListener>,
    ) -> Self {
        Self {
            inner: Arc::new(TimelineInner {
                store,
                bus,
                listener,
                config,
                state: Mutex::new(TimelineState::default()),
                fresh: TransientSet::new(),
            }),
        }
    }

    pub fn viewer(&self) -> SenderType {
        self.inner.config.viewer
    }

    /// Subscribes to `conversation_id`, loads its history and marks it read
    pub async fn open(&self, conversation_id: &str) {
        self.close();

        let viewer = self.inner.config.viewer;
        let handler = Arc::new(TimelineHandler {
            timeline: Arc::downgrade(&self.inner),
            conversation_id: conversation_id.to_string(),
        });
        let subscription = self.inner.bus.subscribe(
            &format!("timeline-{}-{}", viewer, conversation_id),
            ChangeFilter::MessagesByConversation(conversation_id.to_string()),
            handler,
        );
        {
            let mut state = lock(&self.inner.state);
            state.conversation_id = Some(conversation_id.to_string());
            state.subscription = Some(subscription);
        }
        info!("[Timeline] {} opened conversation {}", viewer, conversation_id);

        self.inner.load_participants(conversation_id).await;
        self.refetch().await;
        self.mark_read().await;
    }

    /// Moves to another conversation; a no-op for the one already open
    pub async fn switch_to(&self, conversation_id: &str) {
        if self.conversation_id().as_deref() == Some(conversation_id) {
            return;
        }
        self.open(conversation_id).await;
    }

    pub fn close(&self) {
        let previous = {
            let mut state = lock(&self.inner.state);
            state.subscription.take();
            let previous = state.conversation_id.take();
            *state = TimelineState::default();
            previous
        };
        self.inner.fresh.clear();
        if let Some(conversation_id) = previous {
            debug!("[Timeline] closed conversation {}", conversation_id);
        }
    }

    pub fn conversation_id(&self) -> Option<String> {
        lock(&self.inner.state).conversation_id.clone()
    }

    /// Whether the history fetch for the open conversation has completed
    pub fn is_loaded(&self) -> bool {
        lock(&self.inner.state).loaded
    }

    pub fn entries(&self) -> Vec<TimelineEntry> {
        self.inner.entries()
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.inner.state).messages.clone()
    }

    /// Reloads the full history. Failures are logged and the list is kept.
    pub async fn refetch(&self) {
        let Some(conversation_id) = self.conversation_id() else {
            return;
        };
        let fetched = match self.inner.store.list_messages(&conversation_id).await {
            Ok(messages) => messages,
            Err(e) => {
                error!("[Timeline] failed to load messages for {}: {:#}", conversation_id, e);
                return;
            }
        };

        {
            let mut state = lock(&self.inner.state);
            if state.conversation_id.as_deref() != Some(conversation_id.as_str()) {
                debug!("[Timeline] conversation changed during fetch, dropping result");
                return;
            }
            // keep live arrivals the fetch did not see
            let fetched_ids: HashSet<&str> = fetched.iter().map(|m| m.id.as_str()).collect();
            let live: Vec<Message> = state
                .messages
                .iter()
                .filter(|m| !fetched_ids.contains(m.id.as_str()))
                .cloned()
                .collect();
            let mut messages = fetched;
            messages.extend(live);
            state.messages = messages;
            state.loaded = true;
        }
        debug!("[Timeline] loaded history of {}", conversation_id);
        self.inner.listener.on_timeline_changed(self.entries()).await;
    }

    /// Marks every message from the other participant read, best-effort
    pub async fn mark_read(&self) {
        let Some(conversation_id) = self.conversation_id() else {
            return;
        };
        let viewer = self.inner.config.viewer;
        match self.inner.store.mark_conversation_read(&conversation_id, viewer).await {
            Ok(changed) => debug!(
                "[Timeline] {} marked {} messages read in {}",
                viewer, changed, conversation_id
            ),
            Err(e) => warn!("[Timeline] read-mark on {} failed: {:#}", conversation_id, e),
        }
    }

    /// Inserts a message as the viewer. Returns whether the store accepted it.
    pub async fn send_message(&self, content: &str) -> bool {
        let content = content.trim();
        if content.is_empty() {
            debug!("[Timeline] refusing to send empty message");
            return false;
        }
        let Some(conversation_id) = self.conversation_id() else {
            warn!("[Timeline] send without an open conversation");
            return false;
        };

        let mut participants = lock(&self.inner.state).participants.clone();
        if participants.is_none() {
            self.inner.load_participants(&conversation_id).await;
            participants = lock(&self.inner.state).participants.clone();
        }
        let (owner_id, customer_id) = match participants {
            Some((owner_id, customer_id)) if !owner_id.is_empty() && !customer_id.is_empty() => {
                (owner_id, customer_id)
            }
            _ => {
                error!("[Timeline] conversation {} has no participants, not sending", conversation_id);
                return false;
            }
        };

        let viewer = self.inner.config.viewer;
        let new = NewMessage {
            conversation_id: conversation_id.clone(),
            owner_id,
            customer_id,
            sender_type: Some(viewer),
            content: content.to_string(),
            ..Default::default()
        };
        match self.inner.store.insert_message(new).await {
            Ok(message) => {
                debug!("[Timeline] {} sent {} in {}", viewer, message.id, conversation_id);
                true
            }
            Err(e) => {
                error!("[Timeline] failed to send message in {}: {:#}", conversation_id, e);
                false
            }
        }
    }
}

impl TimelineInner {
    fn entries(&self) -> Vec<TimelineEntry> {
        lock(&self.state)
            .messages
            .iter()
            .map(|m| TimelineEntry {
                message: m.clone(),
                is_new: self.fresh.contains(&m.id),
            })
            .collect()
    }

    async fn load_participants(&self, conversation_id: &str) {
        let participants = match self.store.get_conversation(conversation_id).await {
            Ok(Some(c)) => Some((c.owner_id, c.customer_id)),
            Ok(None) => {
                warn!("[Timeline] conversation {} not found", conversation_id);
                None
            }
            Err(e) => {
                warn!("[Timeline] failed to load conversation {}: {:#}", conversation_id, e);
                None
            }
        };
        let mut state = lock(&self.state);
        if state.conversation_id.as_deref() == Some(conversation_id) {
            state.participants = participants;
        }
    }

    async fn on_message_inserted(self: Arc<Self>, conversation_id: &str, message: Message) {
        let flag = {
            let mut state = lock(&self.state);
            if state.conversation_id.as_deref() != Some(conversation_id) {
                return;
            }
            if state.messages.iter().any(|m| m.id == message.id) {
                debug!("[Timeline] message {} already present", message.id);
                return;
            }
            state.messages.push(message.clone());
            state.loaded && message.sender_type != self.config.viewer
        };

        if flag {
            let timeline = Arc::downgrade(&self);
            self.fresh.mark(
                message.id.clone(),
                self.config.new_flag_duration,
                move |_id| async move {
                    if let Some(timeline) = timeline.upgrade() {
                        let entries = timeline.entries();
                        timeline.listener.on_timeline_changed(entries).await;
                    }
                },
            );
            self.listener.on_new_message(message).await;
        }
        self.listener.on_timeline_changed(self.entries()).await;
    }
}

struct TimelineHandler {
    timeline: Weak<TimelineInner>,
    conversation_id: String,
}

#[async_trait]
impl ChangeHandler for TimelineHandler {
    async fn on_insert(&self, row: ChangeRow) {
        let Some(timeline) = self.timeline.upgrade() else {
            return;
        };
        if let ChangeRow::Message(message) = row {
            timeline.on_message_inserted(&self.conversation_id, message).await;
        }
    }
}
