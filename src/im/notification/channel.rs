//! Notification channel: sound cues and OS banners behind one switch
//!
//! Sound and banners are independent. A cue plays whenever notifications are
//! enabled, even if banners are denied or unsupported, so the owner always gets
//! some signal.

use super::backend::AudioBackend;
use super::cue::{plan_cue, CueKind};
use super::settings::{clamp_volume, load_settings, save_settings, NotificationSettings, SettingsStore};
use super::surface::{NotificationOptions, NotificationSurface, PermissionState};
use crate::im::lock;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub struct NotificationChannel {
    surface: Arc<dyn NotificationSurface>,
    audio: Arc<dyn AudioBackend>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    settings: Mutex<NotificationSettings>,
}

impl NotificationChannel {
    /// Channel with default settings that are not persisted
    pub fn new(surface: Arc<dyn NotificationSurface>, audio: Arc<dyn AudioBackend>) -> Self {
        Self {
            surface,
            audio,
            settings_store: None,
            settings: Mutex::new(NotificationSettings::default()),
        }
    }

    /// Channel whose settings are loaded from and saved to `store`
    pub async fn with_settings_store(
        surface: Arc<dyn NotificationSurface>,
        audio: Arc<dyn AudioBackend>,
        store: Arc<dyn SettingsStore>,
    ) -> Self {
        let settings = load_settings(store.as_ref()).await;
        info!(
            "[Channel] loaded settings: enabled={}, volume={:.2}",
            settings.enabled, settings.volume
        );
        Self {
            surface,
            audio,
            settings_store: Some(store),
            settings: Mutex::new(settings),
        }
    }

    pub fn permission(&self) -> PermissionState {
        self.surface.permission()
    }

    pub fn is_supported(&self) -> bool {
        self.permission() != PermissionState::Unsupported
    }

    /// Prompts only from `Default`; every other state is returned as is.
    /// A failed prompt leaves the state at `Default`.
    pub async fn request_permission(&self) -> PermissionState {
        let current = self.permission();
        if current != PermissionState::Default {
            debug!("[Channel] permission already {:?}, not prompting", current);
            return current;
        }
        match self.surface.request_permission().await {
            Ok(state) => {
                info!("[Channel] permission is now {:?}", state);
                state
            }
            Err(e) => {
                warn!("[Channel] permission request failed: {:#}", e);
                PermissionState::Default
            }
        }
    }

    pub fn settings(&self) -> NotificationSettings {
        *lock(&self.settings)
    }

    pub fn is_enabled(&self) -> bool {
        self.settings().enabled
    }

    pub async fn set_enabled(&self, enabled: bool) {
        let updated = {
            let mut settings = lock(&self.settings);
            settings.enabled = enabled;
            *settings
        };
        self.persist(updated).await;
    }

    pub async fn set_volume(&self, volume: f32) {
        let updated = {
            let mut settings = lock(&self.settings);
            settings.volume = clamp_volume(volume);
            *settings
        };
        self.persist(updated).await;
    }

    async fn persist(&self, settings: NotificationSettings) {
        if let Some(store) = &self.settings_store {
            if let Err(e) = save_settings(store.as_ref(), &settings).await {
                warn!("[Channel] failed to persist settings: {:#}", e);
            }
        }
    }

    /// Plays the cue for `kind`. Returns whether a cue was handed to the backend.
    pub fn play_sound(&self, kind: CueKind) -> bool {
        let settings = self.settings();
        if !settings.enabled {
            debug!("[Channel] sound skipped, notifications disabled");
            return false;
        }
        let tones = plan_cue(kind, settings.volume);
        match self.audio.play(&tones) {
            Ok(()) => true,
            Err(e) => {
                warn!("[Channel] failed to play {:?} cue: {:#}", kind, e);
                false
            }
        }
    }

    /// Raises a banner when enabled and permitted. Returns whether one was shown.
    pub fn show_notification(&self, options: NotificationOptions) -> bool {
        if !self.is_enabled() {
            debug!("[Channel] banner skipped, notifications disabled");
            return false;
        }
        let permission = self.permission();
        if permission != PermissionState::Granted {
            debug!("[Channel] banner skipped, permission {:?}", permission);
            return false;
        }
        match self.surface.show(options) {
            Ok(()) => true,
            Err(e) => {
                warn!("[Channel] failed to show banner: {:#}", e);
                false
            }
        }
    }

    pub fn focus_window(&self) {
        self.surface.focus_window();
    }
}
