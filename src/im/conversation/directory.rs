//! Owner-scoped conversation list
//!
//! The directory keeps its own bus subscription and its own dedup cache; it
//! does not coordinate with the timeline or the notifier. Every fresh message
//! insert triggers a full refetch of the list.

use crate::im::bus::{ChangeBus, ChangeFilter, ChangeHandler, ChangeRow, Subscription};
use crate::im::conversation::listener::{DirectoryListener, EmptyDirectoryListener};
use crate::im::conversation::models::DirectoryConfig;
use crate::im::dedup::DedupCache;
use crate::im::link::{display_name, LinkRegistry};
use crate::im::lock;
use crate::im::store::ChatStore;
use crate::im::transient::TransientSet;
use crate::im::types::{compare_by_recent_activity, ConversationEntry, ConversationPatch, Message, SenderType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info};

struct DirectoryState {
    owner_id: Option<String>,
    entries: Vec<ConversationEntry>,
    seen: DedupCache,
    subscription: Option<Subscription>,
}

struct DirectoryInner {
    store: Arc<dyn ChatStore>,
    bus: Arc<dyn ChangeBus>,
    registry: Arc<dyn LinkRegistry>,
    listener: Arc<dyn DirectoryListener>,
    config: DirectoryConfig,
    state: Mutex<DirectoryState>,
    highlighted: TransientSet<String>,
}

/// Conversation list for one owner
///
/// Cloning yields another handle onto the same directory.
#[derive(Clone)]
pub struct ConversationDirectory {
    inner: Arc<DirectoryInner>,
}

impl ConversationDirectory {
    pub fn new(
        store: Arc<dyn ChatStore>,
        bus: Arc<dyn ChangeBus>,
        registry: Arc<dyn LinkRegistry>,
        config: DirectoryConfig,
    ) -> Self {
        Self::with_listener(store, bus, registry, config, Arc::new(EmptyDirectoryListener))
    }

    pub fn with_listener(
        store: Arc<dyn ChatStore>,
        bus: Arc<dyn ChangeBus>,
        registry: Arc<dyn LinkRegistry>,
        config: DirectoryConfig,
        listener: Arc<dyn DirectoryListener>,
    ) -> Self {
        let seen = DedupCache::new(config.dedup_capacity, config.dedup_retain);
        Self {
            inner: Arc::new(DirectoryInner {
                store,
                bus,
                registry,
                listener,
                config,
                state: Mutex::new(DirectoryState {
                    owner_id: None,
                    entries: Vec::new(),
                    seen,
                    subscription: None,
                }),
                highlighted: TransientSet::new(),
            }),
        }
    }

    /// Subscribes for `owner_id` and loads its list, replacing any previous owner
    pub async fn mount(&self, owner_id: &str) {
        self.unmount();

        let handler = Arc::new(DirectoryHandler {
            directory: Arc::downgrade(&self.inner),
            owner_id: owner_id.to_string(),
        });
        let subscription = self.inner.bus.subscribe(
            &format!("directory-messages-{}", owner_id),
            ChangeFilter::MessagesByOwner(owner_id.to_string()),
            handler,
        );
        {
            let mut state = lock(&self.inner.state);
            state.owner_id = Some(owner_id.to_string());
            state.subscription = Some(subscription);
        }
        info!("[Directory] mounted for owner {}", owner_id);
        self.refresh().await;
    }

    /// Same as `mount`, but does nothing if `owner_id` is already mounted
    pub async fn set_owner(&self, owner_id: &str) {
        if self.owner_id().as_deref() == Some(owner_id) {
            return;
        }
        self.mount(owner_id).await;
    }

    /// Drops the subscription and forgets the list
    pub fn unmount(&self) {
        let previous = {
            let mut state = lock(&self.inner.state);
            state.entries.clear();
            state.seen = DedupCache::new(self.inner.config.dedup_capacity, self.inner.config.dedup_retain);
            state.subscription.take();
            state.owner_id.take()
        };
        self.inner.highlighted.clear();
        if let Some(owner_id) = previous {
            info!("[Directory] unmounted owner {}", owner_id);
        }
    }

    pub fn owner_id(&self) -> Option<String> {
        lock(&self.inner.state).owner_id.clone()
    }

    /// Current list, most recent activity first
    pub fn conversations(&self) -> Vec<ConversationEntry> {
        lock(&self.inner.state).entries.clone()
    }

    pub fn is_highlighted(&self, conversation_id: &str) -> bool {
        self.inner.highlighted.contains(&conversation_id.to_string())
    }

    pub fn highlighted(&self) -> Vec<String> {
        let mut ids = self.inner.highlighted.keys();
        ids.sort();
        ids
    }

    /// Reloads the list. Failures are logged and the previous list is kept.
    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let result = self
            .inner
            .store
            .delete_conversation(conversation_id)
            .await
            .with_context(|| format!("failed to delete conversation {}", conversation_id));
        self.inner.finish_mutation(result).await
    }

    pub async fn toggle_ai(&self, conversation_id: &str, enabled: bool) -> Result<()> {
        let patch = ConversationPatch {
            ai_enabled: Some(enabled),
            ..Default::default()
        };
        let result = self
            .inner
            .store
            .update_conversation(conversation_id, patch)
            .await
            .with_context(|| format!("failed to switch AI on conversation {}", conversation_id));
        self.inner.finish_mutation(result).await
    }

    /// `None` clears the active agent
    pub async fn set_active_agent(&self, conversation_id: &str, agent_id: Option<&str>) -> Result<()> {
        let patch = ConversationPatch {
            active_agent_id: Some(agent_id.map(str::to_string)),
            ..Default::default()
        };
        let result = self
            .inner
            .store
            .update_conversation(conversation_id, patch)
            .await
            .with_context(|| format!("failed to set agent on conversation {}", conversation_id));
        self.inner.finish_mutation(result).await
    }
}

impl DirectoryInner {
    async fn refresh(&self) {
        let owner_id = match lock(&self.state).owner_id.clone() {
            Some(owner_id) => owner_id,
            None => {
                debug!("[Directory] refresh skipped, not mounted");
                return;
            }
        };

        let conversations = match self.store.list_conversations(&owner_id).await {
            Ok(list) => list,
            Err(e) => {
                error!("[Directory] failed to load conversations for {}: {:#}", owner_id, e);
                return;
            }
        };

        let fallback = self.config.fallback_customer_label.as_str();
        let names = join_all(
            conversations
                .iter()
                .map(|c| display_name(self.registry.as_ref(), &c.customer_id, fallback)),
        )
        .await;

        let mut entries: Vec<ConversationEntry> = conversations
            .into_iter()
            .zip(names)
            .map(|(conversation, customer_name)| ConversationEntry {
                conversation,
                customer_name,
            })
            .collect();
        entries.sort_by(|a, b| compare_by_recent_activity(&a.conversation, &b.conversation));

        {
            let mut state = lock(&self.state);
            if state.owner_id.as_deref() != Some(owner_id.as_str()) {
                debug!("[Directory] owner changed during refresh, dropping result for {}", owner_id);
                return;
            }
            state.entries = entries.clone();
        }
        debug!("[Directory] {} conversations for owner {}", entries.len(), owner_id);
        self.listener.on_conversations_changed(entries).await;
    }

    async fn finish_mutation(&self, result: Result<()>) -> Result<()> {
        if let Err(e) = &result {
            error!("[Directory] {:#}", e);
        }
        self.refresh().await;
        result
    }

    async fn on_message_inserted(self: Arc<Self>, owner_id: &str, message: Message) {
        let fresh = {
            let mut state = lock(&self.state);
            if state.owner_id.as_deref() != Some(owner_id) {
                return;
            }
            state.seen.check_and_insert(&message.id)
        };
        if !fresh {
            debug!("[Directory] duplicate insert {} ignored", message.id);
            return;
        }

        if message.sender_type == SenderType::Customer {
            self.highlight(&message.conversation_id).await;
            let customer_name = self.customer_name_for(&message).await;
            self.listener
                .on_new_message(
                    message.conversation_id.clone(),
                    customer_name,
                    message.content.clone(),
                    message.media_type,
                    message.file_name.clone(),
                )
                .await;
        }
        self.refresh().await;
    }

    async fn highlight(self: &Arc<Self>, conversation_id: &str) {
        let already = self.highlighted.contains(&conversation_id.to_string());
        let directory = Arc::downgrade(self);
        self.highlighted.mark(
            conversation_id.to_string(),
            self.config.highlight_duration,
            move |id| async move {
                if let Some(directory) = directory.upgrade() {
                    debug!("[Directory] highlight on {} expired", id);
                    directory.listener.on_highlight_changed(id, false).await;
                }
            },
        );
        if !already {
            self.listener
                .on_highlight_changed(conversation_id.to_string(), true)
                .await;
        }
    }

    async fn customer_name_for(&self, message: &Message) -> String {
        let known = lock(&self.state)
            .entries
            .iter()
            .find(|e| e.conversation.id == message.conversation_id)
            .map(|e| e.customer_name.clone());
        match known {
            Some(name) => name,
            None => {
                display_name(
                    self.registry.as_ref(),
                    &message.customer_id,
                    &self.config.fallback_customer_label,
                )
                .await
            }
        }
    }
}

struct DirectoryHandler {
    directory: Weak<DirectoryInner>,
    owner_id: String,
}

#[async_trait]
impl ChangeHandler for DirectoryHandler {
    async fn on_insert(&self, row: ChangeRow) {
        let Some(directory) = self.directory.upgrade() else {
            return;
        };
        if let ChangeRow::Message(message) = row {
            directory.on_message_inserted(&self.owner_id, message).await;
        }
    }
}
