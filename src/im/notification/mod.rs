//! Notification channel: permission, audio cues and OS banners
//!
//! Knows nothing about conversations; the global notifier decides what to say.

pub mod backend;
pub mod channel;
pub mod cue;
pub mod settings;
pub mod surface;
pub mod synth;

pub use backend::{AudioBackend, NullAudioBackend, PcmAudioBackend, PcmSink};
pub use channel::NotificationChannel;
pub use cue::{plan_cue, CueKind, Tone, Waveform};
pub use settings::{NotificationSettings, SettingsStore, SqliteSettingsStore};
pub use surface::{
    ClickHandler, HeadlessSurface, NotificationOptions, NotificationSurface, PermissionState,
    VisibleBanner,
};
