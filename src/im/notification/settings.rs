//! Persisted notification preferences (enabled toggle + volume)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, warn};

pub const ENABLED_KEY: &str = "customer_chat.notifications.enabled";
pub const VOLUME_KEY: &str = "customer_chat.notifications.volume";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub enabled: bool,
    /// 0.0 to 1.0
    pub volume: f32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 0.5,
        }
    }
}

pub(crate) fn clamp_volume(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        NotificationSettings::default().volume
    }
}

/// Key/value persistence for settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Reads settings, falling back to defaults for missing or unreadable values
pub async fn load_settings(store: &dyn SettingsStore) -> NotificationSettings {
    let defaults = NotificationSettings::default();

    let enabled = match store.get(ENABLED_KEY).await {
        Ok(Some(raw)) => raw.parse::<bool>().unwrap_or_else(|_| {
            warn!("[Settings] unreadable enabled flag {:?}, using default", raw);
            defaults.enabled
        }),
        Ok(None) => defaults.enabled,
        Err(e) => {
            warn!("[Settings] failed to read enabled flag: {:#}", e);
            defaults.enabled
        }
    };

    let volume = match store.get(VOLUME_KEY).await {
        Ok(Some(raw)) => raw.parse::<f32>().map(clamp_volume).unwrap_or_else(|_| {
            warn!("[Settings] unreadable volume {:?}, using default", raw);
            defaults.volume
        }),
        Ok(None) => defaults.volume,
        Err(e) => {
            warn!("[Settings] failed to read volume: {:#}", e);
            defaults.volume
        }
    };

    NotificationSettings { enabled, volume }
}

pub async fn save_settings(store: &dyn SettingsStore, settings: &NotificationSettings) -> Result<()> {
    store
        .set(ENABLED_KEY, &settings.enabled.to_string())
        .await?;
    store
        .set(VOLUME_KEY, &clamp_volume(settings.volume).to_string())
        .await?;
    debug!("[Settings] saved {:?}", settings);
    Ok(())
}

/// Settings kept in the `settings` table
#[derive(Clone)]
pub struct SqliteSettingsStore {
    db: Pool<Sqlite>,
}

impl SqliteSettingsStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("failed to read setting {}", key))?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.db)
        .await
        .with_context(|| format!("failed to write setting {}", key))?;
        Ok(())
    }
}
