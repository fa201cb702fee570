//! Chat client: configuration and wiring
//!
//! `ChatClient` owns the database pool, the change bus, the store, the link
//! registry and the notification channel, and hands out the three live
//! components bound to them.

use crate::im::bus::{ChangeBus, LocalChangeBus};
use crate::im::conversation::{ConversationDirectory, DirectoryConfig, DirectoryListener};
use crate::im::db::create_sqlite_pool_with_migration;
use crate::im::link::{HttpLinkRegistry, LinkRegistry, SqliteLinkRegistry};
use crate::im::message::{MessageTimeline, TimelineConfig, TimelineListener};
use crate::im::notification::{AudioBackend, NotificationChannel, NotificationSurface, SqliteSettingsStore};
use crate::im::notifier::{GlobalNotifier, NotifierConfig, NotifierListener};
use crate::im::store::{ChatStore, SqliteStore};
use crate::im::types::{Conversation, SenderType};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Owner whose conversations the session follows
    pub owner_id: String,
    /// SQLite URL, e.g. `sqlite://customer-chat.db?mode=rwc` or `sqlite::memory:`
    pub db_url: String,
    pub dedup_capacity: usize,
    pub dedup_retain: usize,
    pub highlight_ms: u64,
    pub new_flag_ms: u64,
    pub has_new_ms: u64,
    /// Characters of message text in a banner body
    pub preview_length: usize,
    pub fallback_customer_label: String,
    pub banner_icon: Option<String>,
    /// When set, names are resolved through the REST API instead of the local table
    pub link_api_base_url: Option<String>,
    pub link_api_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            owner_id: String::new(),
            db_url: "sqlite://customer-chat.db?mode=rwc".to_string(),
            dedup_capacity: 100,
            dedup_retain: 50,
            highlight_ms: 3_000,
            new_flag_ms: 1_000,
            has_new_ms: 5_000,
            preview_length: 100,
            fallback_customer_label: "Customer".to_string(),
            banner_icon: None,
            link_api_base_url: None,
            link_api_token: None,
        }
    }
}

impl ClientConfig {
    /// Default configuration for `owner_id` on `db_url`
    pub fn new(owner_id: String, db_url: String) -> Self {
        Self {
            owner_id,
            db_url,
            ..Default::default()
        }
    }

    /// Parses a JSON config body; missing fields take their defaults
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).context("failed to parse client config")
    }

    pub fn directory_config(&self) -> DirectoryConfig {
        DirectoryConfig {
            fallback_customer_label: self.fallback_customer_label.clone(),
            highlight_duration: Duration::from_millis(self.highlight_ms),
            dedup_capacity: self.dedup_capacity,
            dedup_retain: self.dedup_retain,
        }
    }

    pub fn timeline_config(&self, viewer: SenderType) -> TimelineConfig {
        TimelineConfig {
            viewer,
            new_flag_duration: Duration::from_millis(self.new_flag_ms),
        }
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            fallback_customer_label: self.fallback_customer_label.clone(),
            has_new_duration: Duration::from_millis(self.has_new_ms),
            preview_length: self.preview_length,
            banner_icon: self.banner_icon.clone(),
            dedup_capacity: self.dedup_capacity,
            dedup_retain: self.dedup_retain,
        }
    }
}

pub struct ChatClient {
    config: ClientConfig,
    pool: Pool<Sqlite>,
    bus: LocalChangeBus,
    store: Arc<SqliteStore>,
    links: SqliteLinkRegistry,
    registry: Arc<dyn LinkRegistry>,
    channel: Arc<NotificationChannel>,
}

impl ChatClient {
    /// Opens the database, loads notification settings and wires the components
    pub async fn connect(
        config: ClientConfig,
        surface: Arc<dyn NotificationSurface>,
        audio: Arc<dyn AudioBackend>,
    ) -> Result<Self> {
        if config.owner_id.trim().is_empty() {
            bail!("owner id must not be empty");
        }
        info!("[Client] connecting owner {} to {}", config.owner_id, config.db_url);

        let pool = create_sqlite_pool_with_migration(&config.db_url).await?;
        let bus = LocalChangeBus::new();
        let store = Arc::new(SqliteStore::new(pool.clone(), bus.clone()));
        let links = SqliteLinkRegistry::new(pool.clone());

        let registry: Arc<dyn LinkRegistry> = match &config.link_api_base_url {
            Some(base_url) => {
                let token = config.link_api_token.as_deref().unwrap_or_default();
                info!("[Client] resolving customer names through {}", base_url);
                Arc::new(HttpLinkRegistry::new(base_url.clone(), token)?)
            }
            None => Arc::new(links.clone()),
        };

        let settings = Arc::new(SqliteSettingsStore::new(pool.clone()));
        let channel = Arc::new(NotificationChannel::with_settings_store(surface, audio, settings).await);

        Ok(Self {
            config,
            pool,
            bus,
            store,
            links,
            registry,
            channel,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn owner_id(&self) -> &str {
        &self.config.owner_id
    }

    pub fn bus(&self) -> &LocalChangeBus {
        &self.bus
    }

    pub fn store(&self) -> Arc<dyn ChatStore> {
        self.store.clone()
    }

    pub fn channel(&self) -> &Arc<NotificationChannel> {
        &self.channel
    }

    /// Records the link a customer redeemed and returns their conversation
    /// with the owner, creating it on first redemption
    pub async fn redeem_link(&self, customer_id: &str, customer_name: Option<&str>) -> Result<Conversation> {
        let link = self
            .links
            .register(&self.config.owner_id, customer_id, customer_name)
            .await?;
        self.store
            .redeem_link(&self.config.owner_id, customer_id, Some(&link.id))
            .await
    }

    fn shared_bus(&self) -> Arc<dyn ChangeBus> {
        Arc::new(self.bus.clone())
    }

    /// Directory for the owner; call `mount` to start it
    pub fn directory(&self, listener: Arc<dyn DirectoryListener>) -> ConversationDirectory {
        ConversationDirectory::with_listener(
            self.store(),
            self.shared_bus(),
            self.registry.clone(),
            self.config.directory_config(),
            listener,
        )
    }

    /// Timeline seen by `viewer`; call `open` to load a conversation
    pub fn timeline(&self, viewer: SenderType, listener: Arc<dyn TimelineListener>) -> MessageTimeline {
        MessageTimeline::with_listener(
            self.store(),
            self.shared_bus(),
            self.config.timeline_config(viewer),
            listener,
        )
    }

    /// Notifier for the owner; call `start` to begin watching
    pub fn notifier(&self, listener: Arc<dyn NotifierListener>) -> GlobalNotifier {
        GlobalNotifier::with_listener(
            self.store(),
            self.shared_bus(),
            self.registry.clone(),
            self.channel.clone(),
            self.config.notifier_config(),
            listener,
        )
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("[Client] closed");
    }
}
