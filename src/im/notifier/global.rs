//! Owner-wide notifier
//!
//! Runs for the whole session regardless of which conversation is open. It
//! keeps the global unread counter, raises the short "has new message" flag and
//! drives the notification channel for every fresh customer message.

use crate::im::bus::{ChangeBus, ChangeFilter, ChangeHandler, ChangeRow, Subscription};
use crate::im::dedup::DedupCache;
use crate::im::link::{display_name, LinkRegistry};
use crate::im::lock;
use crate::im::notification::{ClickHandler, CueKind, NotificationChannel, NotificationOptions, PermissionState};
use crate::im::notifier::listener::{EmptyNotifierListener, NotifierListener};
use crate::im::notifier::models::NotifierConfig;
use crate::im::store::ChatStore;
use crate::im::transient::TransientFlag;
use crate::im::types::{Message, SenderType};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info, warn};

/// Banner tag for a conversation; a newer banner replaces the visible one
pub fn banner_tag(conversation_id: &str) -> String {
    format!("customer-chat-{}", conversation_id)
}

/// Banner body for `message`
///
/// Text is cut to `max_chars` characters plus "…". Messages without text show
/// the media glyph with the file name, or the media label when there is none.
pub fn preview(message: &Message, max_chars: usize) -> String {
    let text = message.content.trim();
    if !text.is_empty() {
        if text.chars().count() > max_chars {
            let cut: String = text.chars().take(max_chars).collect();
            return format!("{}…", cut);
        }
        return text.to_string();
    }
    match message.media_type {
        Some(media) => match message.file_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{} {}", media.glyph(), name),
            _ => format!("{} {}", media.glyph(), media.label()),
        },
        None => String::new(),
    }
}

struct NotifierState {
    owner_id: Option<String>,
    unread: u32,
    seen: DedupCache,
    subscriptions: Vec<Subscription>,
    interacted: bool,
}

struct NotifierInner {
    store: Arc<dyn ChatStore>,
    bus: Arc<dyn ChangeBus>,
    registry: Arc<dyn LinkRegistry>,
    channel: Arc<NotificationChannel>,
    listener: Arc<dyn NotifierListener>,
    config: NotifierConfig,
    state: Mutex<NotifierState>,
    has_new: TransientFlag,
}

#[derive(Clone)]
pub struct GlobalNotifier {
    inner: Arc<NotifierInner>,
}

impl GlobalNotifier {
    pub fn new(
        store: Arc<dyn ChatStore>,
        bus: Arc<dyn ChangeBus>,
        registry: Arc<dyn LinkRegistry>,
        channel: Arc<NotificationChannel>,
        config: NotifierConfig,
    ) -> Self {
        Self::with_listener(store, bus, registry, channel, config, Arc::new(EmptyNotifierListener))
    }

    pub fn with_listener(
        store: Arc<dyn ChatStore>,
        bus: Arc<dyn ChangeBus>,
        registry: Arc<dyn LinkRegistry>,
        channel: Arc<NotificationChannel>,
        config: NotifierConfig,
        listener: Arc<dyn NotifierListener>,
    ) -> Self {
        let seen = DedupCache::new(config.dedup_capacity, config.dedup_retain);
        Self {
            inner: Arc::new(NotifierInner {
                store,
                bus,
                registry,
                channel,
                listener,
                config,
                state: Mutex::new(NotifierState {
                    owner_id: None,
                    unread: 0,
                    seen,
                    subscriptions: Vec::new(),
                    interacted: false,
                }),
                has_new: TransientFlag::new(),
            }),
        }
    }

    /// Starts watching `owner_id`: fresh dedup cache, new subscriptions, recount
    pub async fn start(&self, owner_id: &str) {
        self.stop().await;

        let messages = self.inner.bus.subscribe(
            &format!("notifier-messages-{}", owner_id),
            ChangeFilter::MessagesByOwner(owner_id.to_string()),
            Arc::new(NotifierHandler {
                notifier: Arc::downgrade(&self.inner),
                owner_id: owner_id.to_string(),
            }),
        );
        let conversations = self.inner.bus.subscribe(
            &format!("notifier-conversations-{}", owner_id),
            ChangeFilter::ConversationsByOwner(owner_id.to_string()),
            Arc::new(NotifierHandler {
                notifier: Arc::downgrade(&self.inner),
                owner_id: owner_id.to_string(),
            }),
        );
        {
            let mut state = lock(&self.inner.state);
            state.owner_id = Some(owner_id.to_string());
            state.subscriptions = vec![messages, conversations];
        }
        info!("[Notifier] started for owner {}", owner_id);
        self.inner.recount().await;
    }

    /// Same as `start`, but does nothing if `owner_id` is already watched
    pub async fn set_owner(&self, owner_id: &str) {
        if lock(&self.inner.state).owner_id.as_deref() == Some(owner_id) {
            return;
        }
        self.start(owner_id).await;
    }

    /// Drops the subscriptions and resets the counter and flag, reporting
    /// both to the listener if they were set
    pub async fn stop(&self) {
        let (previous, had_unread) = {
            let mut state = lock(&self.inner.state);
            state.subscriptions.clear();
            let had_unread = state.unread != 0;
            state.unread = 0;
            state.seen = DedupCache::new(self.inner.config.dedup_capacity, self.inner.config.dedup_retain);
            (state.owner_id.take(), had_unread)
        };
        let was_raised = self.inner.has_new.lower();
        if had_unread {
            self.inner.listener.on_unread_count_changed(0).await;
        }
        if was_raised {
            self.inner.listener.on_has_new_message_changed(false).await;
        }
        if let Some(owner_id) = previous {
            info!("[Notifier] stopped for owner {}", owner_id);
        }
    }

    pub fn unread_count(&self) -> u32 {
        lock(&self.inner.state).unread
    }

    pub fn has_new_message(&self) -> bool {
        self.inner.has_new.is_raised()
    }

    /// Zeroes the local counter and lowers the flag; the store is not touched
    pub async fn clear_unread(&self) {
        lock(&self.inner.state).unread = 0;
        let was_raised = self.inner.has_new.lower();
        self.inner.listener.on_unread_count_changed(0).await;
        if was_raised {
            self.inner.listener.on_has_new_message_changed(false).await;
        }
    }

    /// Reloads the counter from the store
    pub async fn recount(&self) {
        self.inner.recount().await;
    }

    /// Call on any user interaction. The first call asks for banner permission
    /// if it is still undecided; later calls do nothing.
    pub async fn on_user_interaction(&self) {
        {
            let mut state = lock(&self.inner.state);
            if state.interacted {
                return;
            }
            state.interacted = true;
        }
        if self.inner.channel.permission() == PermissionState::Default {
            debug!("[Notifier] first interaction, requesting banner permission");
            self.inner.channel.request_permission().await;
        }
    }

    pub fn permission(&self) -> PermissionState {
        self.inner.channel.permission()
    }

    pub async fn request_permission(&self) -> PermissionState {
        self.inner.channel.request_permission().await
    }

    pub fn channel(&self) -> &Arc<NotificationChannel> {
        &self.inner.channel
    }
}

impl NotifierInner {
    async fn recount(&self) {
        let Some(owner_id) = lock(&self.state).owner_id.clone() else {
            return;
        };
        let conversations = match self.store.list_conversations(&owner_id).await {
            Ok(list) => list,
            Err(e) => {
                error!("[Notifier] failed to recount unread for {}: {:#}", owner_id, e);
                return;
            }
        };
        let total = conversations
            .iter()
            .fold(0u32, |sum, c| sum.saturating_add(c.unread_owner_count));

        let changed = {
            let mut state = lock(&self.state);
            if state.owner_id.as_deref() != Some(owner_id.as_str()) {
                return;
            }
            let changed = state.unread != total;
            state.unread = total;
            changed
        };
        debug!("[Notifier] unread for {} is {}", owner_id, total);
        if changed {
            self.listener.on_unread_count_changed(total).await;
        }
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
            debug!("[Notifier] duplicate insert {} ignored", message.id);
            return;
        }
        if message.sender_type != SenderType::Customer {
            return;
        }

        let unread = {
            let mut state = lock(&self.state);
            state.unread = state.unread.saturating_add(1);
            state.unread
        };
        self.listener.on_unread_count_changed(unread).await;
        self.raise_has_new().await;

        let name = display_name(
            self.registry.as_ref(),
            &message.customer_id,
            &self.config.fallback_customer_label,
        )
        .await;
        let options = NotificationOptions {
            title: format!("New message from {}", name),
            body: preview(&message, self.config.preview_length),
            icon: self.config.banner_icon.clone(),
            tag: Some(banner_tag(&message.conversation_id)),
            on_click: Some(self.click_handler(&message.conversation_id)),
        };

        self.channel.play_sound(CueKind::Message);
        let shown = self.channel.show_notification(options);
        debug!(
            "[Notifier] message {} from {} (banner shown: {})",
            message.id, name, shown
        );
    }

    async fn raise_has_new(self: &Arc<Self>) {
        let was_raised = self.has_new.is_raised();
        let notifier = Arc::downgrade(self);
        self.has_new.raise(self.config.has_new_duration, move || async move {
            if let Some(notifier) = notifier.upgrade() {
                notifier.listener.on_has_new_message_changed(false).await;
            }
        });
        if !was_raised {
            self.listener.on_has_new_message_changed(true).await;
        }
    }

    fn click_handler(self: &Arc<Self>, conversation_id: &str) -> ClickHandler {
        let notifier = Arc::downgrade(self);
        let conversation_id = conversation_id.to_string();
        Arc::new(move || {
            let Some(notifier) = notifier.upgrade() else {
                return;
            };
            notifier.channel.focus_window();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let conversation_id = conversation_id.clone();
                    handle.spawn(async move {
                        notifier.listener.on_notification_clicked(conversation_id).await;
                    });
                }
                Err(_) => warn!(
                    "[Notifier] banner for {} clicked outside a runtime, listener not called",
                    conversation_id
                ),
            }
        })
    }
}

struct NotifierHandler {
    notifier: Weak<NotifierInner>,
    owner_id: String,
}

#[async_trait]
impl ChangeHandler for NotifierHandler {
    async fn on_insert(&self, row: ChangeRow) {
        let Some(notifier) = self.notifier.upgrade() else {
            return;
        };
        if let ChangeRow::Message(message) = row {
            notifier.on_message_inserted(&self.owner_id, message).await;
        }
    }

    async fn on_update(&self, row: ChangeRow) {
        let Some(notifier) = self.notifier.upgrade() else {
            return;
        };
        if let ChangeRow::Conversation(conversation) = row {
            debug!("[Notifier] conversation {} updated, recounting", conversation.id);
            notifier.recount().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::bus::{ChangeEvent, LocalChangeBus};
    use crate::im::testing::{
        conversation, init_test_logger, message_in, FakeLinkRegistry, MemoryStore, RecordingAudio,
        RecordingNotifierListener, RecordingSurface,
    };
    use crate::im::types::{MediaType, NewMessage};
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: Arc<FakeLinkRegistry>,
        surface: Arc<RecordingSurface>,
        audio: Arc<RecordingAudio>,
        listener: Arc<RecordingNotifierListener>,
        notifier: GlobalNotifier,
    }

    impl Fixture {
        fn bus(&self) -> &LocalChangeBus {
            self.store.bus()
        }
    }

    fn fixture(permission: PermissionState) -> Fixture {
        init_test_logger();
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(FakeLinkRegistry::default());
        let surface = Arc::new(RecordingSurface::new(permission));
        let audio = Arc::new(RecordingAudio::default());
        let channel = Arc::new(NotificationChannel::new(surface.clone(), audio.clone()));
        let listener = Arc::new(RecordingNotifierListener::default());
        let notifier = GlobalNotifier::with_listener(
            store.clone(),
            Arc::new(store.bus().clone()),
            registry.clone(),
            channel,
            NotifierConfig::default(),
            listener.clone(),
        );
        Fixture {
            store,
            registry,
            surface,
            audio,
            listener,
            notifier,
        }
    }

    fn customer_text(conv: &crate::im::types::Conversation, content: &str) -> NewMessage {
        NewMessage {
            conversation_id: conv.id.clone(),
            owner_id: conv.owner_id.clone(),
            customer_id: conv.customer_id.clone(),
            sender_type: Some(SenderType::Customer),
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn initial_count_sums_owner_unread() {
        let f = fixture(PermissionState::Granted);
        let mut a = conversation("C1", "O1", "cust-1");
        a.unread_owner_count = 2;
        let mut b = conversation("C2", "O1", "cust-2");
        b.unread_owner_count = 3;
        b.unread_customer_count = 9;
        let mut other = conversation("X", "O2", "cust-3");
        other.unread_owner_count = 7;
        f.store.seed_conversation(a);
        f.store.seed_conversation(b);
        f.store.seed_conversation(other);

        f.notifier.start("O1").await;
        assert_eq!(f.notifier.unread_count(), 5);
        assert_eq!(f.listener.counts(), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn customer_message_rings_and_shows_a_banner() {
        let f = fixture(PermissionState::Granted);
        let conv = conversation("C1", "O1", "cust-1");
        f.store.seed_conversation(conv.clone());
        f.registry.insert("cust-1", "Maria");
        f.notifier.start("O1").await;

        f.store.insert_message(customer_text(&conv, "Oi")).await.unwrap();

        assert_eq!(f.notifier.unread_count(), 1);
        assert!(f.notifier.has_new_message());
        assert_eq!(f.audio.played().len(), 1);
        let shown = f.surface.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "New message from Maria");
        assert_eq!(shown[0].body, "Oi");
        assert_eq!(shown[0].tag.as_deref(), Some("customer-chat-C1"));

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(f.notifier.has_new_message());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!f.notifier.has_new_message());
        assert_eq!(f.listener.has_new(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn redelivery_notifies_once() {
        let f = fixture(PermissionState::Granted);
        let conv = conversation("C1", "O1", "cust-1");
        f.store.seed_conversation(conv.clone());
        f.notifier.start("O1").await;

        let event = ChangeEvent::message_inserted(message_in(&conv, "m1", SenderType::Customer, "Oi"));
        f.bus().publish(event.clone()).await;
        f.bus().publish(event).await;

        assert_eq!(f.notifier.unread_count(), 1);
        assert_eq!(f.audio.played().len(), 1);
        assert_eq!(f.surface.shown().len(), 1);
    }

    #[tokio::test]
    async fn owner_messages_are_silent() {
        let f = fixture(PermissionState::Granted);
        let conv = conversation("C1", "O1", "cust-1");
        f.store.seed_conversation(conv.clone());
        f.notifier.start("O1").await;

        f.bus()
            .publish(ChangeEvent::message_inserted(message_in(&conv, "m1", SenderType::Owner, "hi")))
            .await;
        assert_eq!(f.notifier.unread_count(), 0);
        assert!(f.audio.played().is_empty());
        assert!(f.surface.shown().is_empty());
    }

    #[tokio::test]
    async fn denied_banner_still_plays_sound() {
        let f = fixture(PermissionState::Denied);
        let conv = conversation("C1", "O1", "cust-1");
        f.store.seed_conversation(conv.clone());
        f.notifier.start("O1").await;

        f.store.insert_message(customer_text(&conv, "Oi")).await.unwrap();
        assert_eq!(f.audio.played().len(), 1);
        assert!(f.surface.shown().is_empty());
        assert_eq!(f.notifier.unread_count(), 1);
    }

    #[tokio::test]
    async fn read_mark_update_triggers_recount() {
        let f = fixture(PermissionState::Granted);
        let conv = conversation("C1", "O1", "cust-1");
        f.store.seed_conversation(conv.clone());
        f.notifier.start("O1").await;

        f.store.insert_message(customer_text(&conv, "one")).await.unwrap();
        f.store.insert_message(customer_text(&conv, "two")).await.unwrap();
        assert_eq!(f.notifier.unread_count(), 2);

        f.store
            .mark_conversation_read("C1", SenderType::Owner)
            .await
            .unwrap();
        assert_eq!(f.notifier.unread_count(), 0);
    }

    #[tokio::test]
    async fn clear_unread_is_local() {
        let f = fixture(PermissionState::Granted);
        let mut conv = conversation("C1", "O1", "cust-1");
        conv.unread_owner_count = 4;
        f.store.seed_conversation(conv);
        f.notifier.start("O1").await;

        f.notifier.clear_unread().await;
        assert_eq!(f.notifier.unread_count(), 0);
        assert_eq!(f.store.conversation("C1").unwrap().unread_owner_count, 4);
    }

    #[tokio::test]
    async fn first_interaction_prompts_exactly_once() {
        let f = fixture(PermissionState::Default);
        f.surface.answer_with(Ok(PermissionState::Granted));

        f.notifier.on_user_interaction().await;
        f.notifier.on_user_interaction().await;
        assert_eq!(f.surface.prompts(), 1);
        assert_eq!(f.notifier.permission(), PermissionState::Granted);

        let f = fixture(PermissionState::Denied);
        f.notifier.on_user_interaction().await;
        assert_eq!(f.surface.prompts(), 0);
    }

    #[tokio::test]
    async fn clicking_a_banner_focuses_and_reports() {
        let f = fixture(PermissionState::Granted);
        let conv = conversation("C1", "O1", "cust-1");
        f.store.seed_conversation(conv.clone());
        f.notifier.start("O1").await;
        f.store.insert_message(customer_text(&conv, "Oi")).await.unwrap();

        assert!(f.surface.click("customer-chat-C1"));
        for _ in 0..10 {
            if !f.listener.clicks().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(f.surface.focus_requests(), 1);
        assert_eq!(f.listener.clicks(), vec!["C1".to_string()]);
    }

    #[tokio::test]
    async fn set_owner_swaps_both_subscriptions() {
        let f = fixture(PermissionState::Granted);
        f.notifier.start("O1").await;
        assert_eq!(f.bus().subscriber_count(), 2);

        f.notifier.set_owner("O2").await;
        assert_eq!(
            f.bus().scope_keys(),
            vec![
                "notifier-conversations-O2".to_string(),
                "notifier-messages-O2".to_string()
            ]
        );

        f.notifier.stop().await;
        assert_eq!(f.bus().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_reports_the_cleared_badge() {
        let f = fixture(PermissionState::Granted);
        let conv = conversation("C1", "O1", "cust-1");
        f.store.seed_conversation(conv.clone());
        f.notifier.start("O1").await;
        f.store.insert_message(customer_text(&conv, "Oi")).await.unwrap();
        assert_eq!(f.listener.counts(), vec![1]);
        assert_eq!(f.listener.has_new(), vec![true]);

        f.notifier.stop().await;
        assert_eq!(f.notifier.unread_count(), 0);
        assert!(!f.notifier.has_new_message());
        assert_eq!(f.listener.counts(), vec![1, 0]);
        assert_eq!(f.listener.has_new(), vec![true, false]);

        // the pending timer must not report a second lowering
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(f.listener.has_new(), vec![true, false]);

        // nothing left to clear
        f.notifier.stop().await;
        assert_eq!(f.listener.counts(), vec![1, 0]);
    }

    #[tokio::test]
    async fn update_before_insert_counts_the_message_twice() {
        let f = fixture(PermissionState::Granted);
        let conv = conversation("C1", "O1", "cust-1");
        f.store.seed_conversation(conv.clone());
        f.notifier.start("O1").await;

        // store already counts the message; its update overtakes the insert
        let mut counted = conv.clone();
        counted.unread_owner_count = 1;
        f.store.replace_conversation(counted.clone());
        let m1 = message_in(&conv, "m1", SenderType::Customer, "Oi");
        f.bus().publish(ChangeEvent::conversation_updated(counted.clone())).await;
        f.bus().publish(ChangeEvent::message_inserted(m1)).await;
        assert_eq!(f.notifier.unread_count(), 2);

        // the next conversation update resynchronises
        f.bus().publish(ChangeEvent::conversation_updated(counted)).await;
        assert_eq!(f.notifier.unread_count(), 1);
    }

    #[test]
    fn preview_truncates_by_characters() {
        let conv = conversation("C1", "O1", "cust-1");
        let long = "é".repeat(150);
        let msg = message_in(&conv, "m1", SenderType::Customer, &long);
        let body = preview(&msg, 100);
        assert_eq!(body.chars().count(), 101);
        assert!(body.ends_with('…'));

        let short = message_in(&conv, "m2", SenderType::Customer, "  Oi  ");
        assert_eq!(preview(&short, 100), "Oi");
    }

    #[test]
    fn preview_describes_media_without_text() {
        let conv = conversation("C1", "O1", "cust-1");
        let mut doc = message_in(&conv, "m1", SenderType::Customer, "   ");
        doc.media_type = Some(MediaType::Document);
        doc.file_name = Some("invoice.pdf".into());
        assert_eq!(preview(&doc, 100), format!("{} invoice.pdf", MediaType::Document.glyph()));

        doc.file_name = None;
        assert_eq!(
            preview(&doc, 100),
            format!("{} {}", MediaType::Document.glyph(), MediaType::Document.label())
        );

        let empty = message_in(&conv, "m2", SenderType::Customer, "");
        assert_eq!(preview(&empty, 100), "");
    }
}
