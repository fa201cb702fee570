//! Test doubles shared by the unit tests

use crate::im::bus::{ChangeEvent, ChangeHandler, ChangeRow, LocalChangeBus};
use crate::im::conversation::DirectoryListener;
use crate::im::link::LinkRegistry;
use crate::im::lock;
use crate::im::message::{TimelineEntry, TimelineListener};
use crate::im::notification::{AudioBackend, NotificationOptions, NotificationSurface, PermissionState, SettingsStore, Tone};
use crate::im::notifier::NotifierListener;
use crate::im::store::ChatStore;
use crate::im::types::{
    compare_by_recent_activity, compare_chronologically, Conversation, ConversationEntry, ConversationPatch,
    MediaType, Message, NewMessage, SenderType,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use uuid::Uuid;

static INIT_LOGGER: Once = Once::new();

pub fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        let filter_layer = EnvFilter::new("info,customer_chat_core=debug,sqlx=warn");
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

// ---- builders ----

pub fn conversation(id: &str, owner_id: &str, customer_id: &str) -> Conversation {
    let now = Utc::now();
    Conversation {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        customer_id: customer_id.to_string(),
        link_id: None,
        created_at: now,
        updated_at: now,
        last_message_at: None,
        unread_owner_count: 0,
        unread_customer_count: 0,
        ai_enabled: false,
        active_agent_id: None,
    }
}

/// Customer-authored text message
pub fn message(id: &str, conversation_id: &str, owner_id: &str) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        owner_id: owner_id.to_string(),
        customer_id: format!("customer-of-{}", conversation_id),
        sender_type: SenderType::Customer,
        content: format!("text of {}", id),
        media_url: None,
        media_type: None,
        file_name: None,
        created_at: Utc::now(),
        is_read_by_owner: false,
        is_read_by_customer: true,
    }
}

pub fn message_in(conversation: &Conversation, id: &str, sender: SenderType, content: &str) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: conversation.id.clone(),
        owner_id: conversation.owner_id.clone(),
        customer_id: conversation.customer_id.clone(),
        sender_type: sender,
        content: content.to_string(),
        media_url: None,
        media_type: None,
        file_name: None,
        created_at: Utc::now(),
        is_read_by_owner: sender == SenderType::Owner,
        is_read_by_customer: sender == SenderType::Customer,
    }
}

// ---- bus ----

#[derive(Default)]
pub struct RecordingHandler {
    inserted: Mutex<Vec<ChangeRow>>,
    updated: Mutex<Vec<ChangeRow>>,
}

fn row_id(row: &ChangeRow) -> String {
    match row {
        ChangeRow::Message(m) => m.id.clone(),
        ChangeRow::Conversation(c) => c.id.clone(),
    }
}

impl RecordingHandler {
    pub fn inserted_ids(&self) -> Vec<String> {
        lock(&self.inserted).iter().map(row_id).collect()
    }

    pub fn updated_ids(&self) -> Vec<String> {
        lock(&self.updated).iter().map(row_id).collect()
    }
}

#[async_trait]
impl ChangeHandler for RecordingHandler {
    async fn on_insert(&self, row: ChangeRow) {
        lock(&self.inserted).push(row);
    }

    async fn on_update(&self, row: ChangeRow) {
        lock(&self.updated).push(row);
    }
}

// ---- store ----

#[derive(Default)]
struct MemoryState {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

/// In-memory `ChatStore` that publishes to its bus like `SqliteStore`
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    bus: LocalChangeBus,
    fail_fetches: AtomicBool,
    fail_inserts: AtomicBool,
    fail_read_marks: AtomicBool,
    fail_updates: AtomicBool,
    list_calls: AtomicUsize,
    read_marks: Mutex<Vec<(String, SenderType)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus(&self) -> &LocalChangeBus {
        &self.bus
    }

    /// Adds a row without publishing anything
    pub fn seed_conversation(&self, conversation: Conversation) {
        lock(&self.state).conversations.push(conversation);
    }

    /// Overwrites a row without publishing anything
    pub fn replace_conversation(&self, conversation: Conversation) {
        let mut state = lock(&self.state);
        state.conversations.retain(|c| c.id != conversation.id);
        state.conversations.push(conversation);
    }

    /// Adds a row without publishing or touching counters
    pub fn seed_message(&self, message: Message) {
        lock(&self.state).messages.push(message);
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        lock(&self.state)
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.state).messages.clone()
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_read_marks(&self, fail: bool) {
        self.fail_read_marks.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn read_marks(&self) -> Vec<(String, SenderType)> {
        lock(&self.read_marks).clone()
    }

    async fn publish_conversation(&self, conversation_id: &str) {
        if let Some(conversation) = self.conversation(conversation_id) {
            self.bus
                .publish(ChangeEvent::conversation_updated(conversation))
                .await;
        }
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn list_conversations(&self, owner_id: &str) -> Result<Vec<Conversation>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            bail!("conversation fetch failed");
        }
        let mut list: Vec<Conversation> = lock(&self.state)
            .conversations
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        list.sort_by(compare_by_recent_activity);
        Ok(list)
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            bail!("conversation fetch failed");
        }
        Ok(self.conversation(conversation_id))
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            bail!("message fetch failed");
        }
        let mut list: Vec<Message> = lock(&self.state)
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        list.sort_by(compare_chronologically);
        Ok(list)
    }

    async fn insert_message(&self, new: NewMessage) -> Result<Message> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            bail!("insert failed");
        }
        let sender_type = new.sender_type.ok_or_else(|| anyhow!("message has no sender type"))?;
        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: new.conversation_id,
            owner_id: new.owner_id,
            customer_id: new.customer_id,
            sender_type,
            content: new.content,
            media_url: new.media_url,
            media_type: new.media_type,
            file_name: new.file_name,
            created_at: Utc::now(),
            is_read_by_owner: sender_type == SenderType::Owner,
            is_read_by_customer: sender_type == SenderType::Customer,
        };
        {
            let mut state = lock(&self.state);
            let conversation = state
                .conversations
                .iter_mut()
                .find(|c| c.id == message.conversation_id)
                .ok_or_else(|| anyhow!("conversation {} does not exist", message.conversation_id))?;
            match sender_type {
                SenderType::Customer => conversation.unread_owner_count += 1,
                SenderType::Owner => conversation.unread_customer_count += 1,
            }
            conversation.last_message_at = Some(message.created_at);
            conversation.updated_at = message.created_at;
            state.messages.push(message.clone());
        }
        self.bus
            .publish(ChangeEvent::message_inserted(message.clone()))
            .await;
        self.publish_conversation(&message.conversation_id).await;
        Ok(message)
    }

    async fn mark_conversation_read(&self, conversation_id: &str, reader: SenderType) -> Result<u64> {
        lock(&self.read_marks).push((conversation_id.to_string(), reader));
        if self.fail_read_marks.load(Ordering::SeqCst) {
            bail!("read-mark failed");
        }
        let changed = {
            let mut state = lock(&self.state);
            let mut changed = 0;
            for m in state
                .messages
                .iter_mut()
                .filter(|m| m.conversation_id == conversation_id && m.sender_type != reader)
            {
                let flag = match reader {
                    SenderType::Owner => &mut m.is_read_by_owner,
                    SenderType::Customer => &mut m.is_read_by_customer,
                };
                if !*flag {
                    *flag = true;
                    changed += 1;
                }
            }
            if let Some(c) = state.conversations.iter_mut().find(|c| c.id == conversation_id) {
                match reader {
                    SenderType::Owner => c.unread_owner_count = 0,
                    SenderType::Customer => c.unread_customer_count = 0,
                }
            }
            changed
        };
        self.publish_conversation(conversation_id).await;
        Ok(changed)
    }

    async fn update_conversation(&self, conversation_id: &str, patch: ConversationPatch) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            bail!("update failed");
        }
        {
            let mut state = lock(&self.state);
            let conversation = state
                .conversations
                .iter_mut()
                .find(|c| c.id == conversation_id)
                .ok_or_else(|| anyhow!("conversation {} does not exist", conversation_id))?;
            if let Some(ai_enabled) = patch.ai_enabled {
                conversation.ai_enabled = ai_enabled;
            }
            if let Some(agent) = patch.active_agent_id {
                conversation.active_agent_id = agent;
            }
            conversation.updated_at = Utc::now();
        }
        self.publish_conversation(conversation_id).await;
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            bail!("delete failed");
        }
        let mut state = lock(&self.state);
        let before = state.conversations.len();
        state.conversations.retain(|c| c.id != conversation_id);
        if state.conversations.len() == before {
            bail!("conversation {} does not exist", conversation_id);
        }
        state.messages.retain(|m| m.conversation_id != conversation_id);
        Ok(())
    }

    async fn redeem_link(&self, owner_id: &str, customer_id: &str, link_id: Option<&str>) -> Result<Conversation> {
        let created = {
            let mut state = lock(&self.state);
            if let Some(existing) = state
                .conversations
                .iter()
                .find(|c| c.owner_id == owner_id && c.customer_id == customer_id)
            {
                return Ok(existing.clone());
            }
            let mut created = conversation(&Uuid::new_v4().to_string(), owner_id, customer_id);
            created.link_id = link_id.map(str::to_string);
            state.conversations.push(created.clone());
            created
        };
        self.bus
            .publish(ChangeEvent::conversation_inserted(created.clone()))
            .await;
        Ok(created)
    }
}

// ---- link registry ----

#[derive(Default)]
pub struct FakeLinkRegistry {
    names: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl FakeLinkRegistry {
    pub fn insert(&self, customer_id: &str, name: &str) {
        lock(&self.names).insert(customer_id.to_string(), name.to_string());
    }

    pub fn fail(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LinkRegistry for FakeLinkRegistry {
    async fn resolve(&self, customer_id: &str) -> Result<Option<String>> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("link registry unavailable");
        }
        Ok(lock(&self.names).get(customer_id).cloned())
    }
}

// ---- notification channel ----

pub struct RecordingSurface {
    permission: Mutex<PermissionState>,
    answer: Mutex<std::result::Result<PermissionState, String>>,
    shown: Mutex<Vec<NotificationOptions>>,
    prompts: AtomicUsize,
    focus_requests: AtomicUsize,
}

impl RecordingSurface {
    pub fn new(permission: PermissionState) -> Self {
        Self {
            permission: Mutex::new(permission),
            answer: Mutex::new(Ok(PermissionState::Granted)),
            shown: Mutex::new(Vec::new()),
            prompts: AtomicUsize::new(0),
            focus_requests: AtomicUsize::new(0),
        }
    }

    pub fn answer_with(&self, answer: std::result::Result<PermissionState, String>) {
        *lock(&self.answer) = answer;
    }

    pub fn shown(&self) -> Vec<NotificationOptions> {
        lock(&self.shown).clone()
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn focus_requests(&self) -> usize {
        self.focus_requests.load(Ordering::SeqCst)
    }

    /// Runs the click handler of the latest banner with `tag`
    pub fn click(&self, tag: &str) -> bool {
        let handler = lock(&self.shown)
            .iter()
            .rev()
            .find(|o| o.tag.as_deref() == Some(tag))
            .and_then(|o| o.on_click.clone());
        match handler {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl NotificationSurface for RecordingSurface {
    fn permission(&self) -> PermissionState {
        *lock(&self.permission)
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let answer = lock(&self.answer).clone();
        match answer {
            Ok(state) => {
                *lock(&self.permission) = state;
                Ok(state)
            }
            Err(reason) => Err(anyhow!(reason)),
        }
    }

    fn show(&self, options: NotificationOptions) -> Result<()> {
        lock(&self.shown).push(options);
        Ok(())
    }

    fn focus_window(&self) {
        self.focus_requests.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingAudio {
    played: Mutex<Vec<Vec<Tone>>>,
    failing: AtomicBool,
}

impl RecordingAudio {
    pub fn played(&self) -> Vec<Vec<Tone>> {
        lock(&self.played).clone()
    }

    pub fn fail(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

impl AudioBackend for RecordingAudio {
    fn play(&self, tones: &[Tone]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("audio device unavailable");
        }
        lock(&self.played).push(tones.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ---- listeners ----

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessageCall {
    pub conversation_id: String,
    pub customer_name: String,
    pub content: String,
    pub media_type: Option<MediaType>,
    pub file_name: Option<String>,
}

#[derive(Default)]
pub struct RecordingDirectoryListener {
    new_messages: Mutex<Vec<NewMessageCall>>,
    lists: Mutex<Vec<Vec<ConversationEntry>>>,
    highlights: Mutex<Vec<(String, bool)>>,
}

impl RecordingDirectoryListener {
    pub fn new_messages(&self) -> Vec<NewMessageCall> {
        lock(&self.new_messages).clone()
    }

    pub fn list_changes(&self) -> usize {
        lock(&self.lists).len()
    }

    pub fn highlights(&self) -> Vec<(String, bool)> {
        lock(&self.highlights).clone()
    }
}

#[async_trait]
impl DirectoryListener for RecordingDirectoryListener {
    async fn on_new_message(
        &self,
        conversation_id: String,
        customer_name: String,
        content: String,
        media_type: Option<MediaType>,
        file_name: Option<String>,
    ) {
        lock(&self.new_messages).push(NewMessageCall {
            conversation_id,
            customer_name,
            content,
            media_type,
            file_name,
        });
    }

    async fn on_conversations_changed(&self, conversations: Vec<ConversationEntry>) {
        lock(&self.lists).push(conversations);
    }

    async fn on_highlight_changed(&self, conversation_id: String, highlighted: bool) {
        lock(&self.highlights).push((conversation_id, highlighted));
    }
}

#[derive(Default)]
pub struct RecordingTimelineListener {
    new_messages: Mutex<Vec<Message>>,
    changes: Mutex<Vec<Vec<TimelineEntry>>>,
}

impl RecordingTimelineListener {
    pub fn new_message_ids(&self) -> Vec<String> {
        lock(&self.new_messages).iter().map(|m| m.id.clone()).collect()
    }

    pub fn last_entries(&self) -> Vec<TimelineEntry> {
        lock(&self.changes).last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl TimelineListener for RecordingTimelineListener {
    async fn on_new_message(&self, message: Message) {
        lock(&self.new_messages).push(message);
    }

    async fn on_timeline_changed(&self, entries: Vec<TimelineEntry>) {
        lock(&self.changes).push(entries);
    }
}

#[derive(Default)]
pub struct RecordingNotifierListener {
    counts: Mutex<Vec<u32>>,
    has_new: Mutex<Vec<bool>>,
    clicks: Mutex<Vec<String>>,
}

impl RecordingNotifierListener {
    pub fn counts(&self) -> Vec<u32> {
        lock(&self.counts).clone()
    }

    pub fn has_new(&self) -> Vec<bool> {
        lock(&self.has_new).clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        lock(&self.clicks).clone()
    }
}

#[async_trait]
impl NotifierListener for RecordingNotifierListener {
    async fn on_unread_count_changed(&self, unread_count: u32) {
        lock(&self.counts).push(unread_count);
    }

    async fn on_has_new_message_changed(&self, has_new_message: bool) {
        lock(&self.has_new).push(has_new_message);
    }

    async fn on_notification_clicked(&self, conversation_id: String) {
        lock(&self.clicks).push(conversation_id);
    }
}
