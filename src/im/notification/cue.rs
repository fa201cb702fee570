//! Audio cue planning
//!
//! Cues are described, not recorded: `plan_cue` turns a cue kind and a volume
//! into tone descriptors that an `AudioBackend` schedules.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CueKind {
    #[default]
    Message,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
}

/// One oscillator note inside a cue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub frequency_hz: f32,
    pub start: Duration,
    pub duration: Duration,
    pub waveform: Waveform,
    /// Peak amplitude, already scaled by volume
    pub gain: f32,
}

impl Tone {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

// C5 E5 G5 C6
const MESSAGE_NOTES: [f32; 4] = [523.25, 659.25, 783.99, 1046.50];
const MESSAGE_NOTE_SPACING_MS: u64 = 120;
const MESSAGE_NOTE_MS: u64 = 350;
const MESSAGE_LAST_NOTE_MS: u64 = 600;
const MESSAGE_GAIN: f32 = 0.30;
const OVERTONE_RATIO: f32 = 2.0;
const OVERTONE_GAIN: f32 = 0.25;

const URGENT_FREQUENCY: f32 = 880.0;
const URGENT_BEEPS: u64 = 3;
const URGENT_CADENCE_MS: u64 = 250;
const URGENT_BEEP_MS: u64 = 120;
const URGENT_GAIN: f32 = 0.25;

/// Builds the tone schedule for `kind`; amplitude scales linearly with `volume`
pub fn plan_cue(kind: CueKind, volume: f32) -> Vec<Tone> {
    let volume = if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        0.0
    };
    match kind {
        CueKind::Message => message_cue(volume),
        CueKind::Urgent => urgent_cue(volume),
    }
}

fn message_cue(volume: f32) -> Vec<Tone> {
    let last = MESSAGE_NOTES.len() - 1;
    let mut tones = Vec::with_capacity(MESSAGE_NOTES.len() * 2);
    for (i, frequency) in MESSAGE_NOTES.iter().enumerate() {
        let start = Duration::from_millis(MESSAGE_NOTE_SPACING_MS * i as u64);
        let duration = Duration::from_millis(if i == last {
            MESSAGE_LAST_NOTE_MS
        } else {
            MESSAGE_NOTE_MS
        });
        tones.push(Tone {
            frequency_hz: *frequency,
            start,
            duration,
            waveform: Waveform::Sine,
            gain: MESSAGE_GAIN * volume,
        });
        tones.push(Tone {
            frequency_hz: frequency * OVERTONE_RATIO,
            start,
            duration,
            waveform: Waveform::Sine,
            gain: MESSAGE_GAIN * OVERTONE_GAIN * volume,
        });
    }
    tones
}

fn urgent_cue(volume: f32) -> Vec<Tone> {
    (0..URGENT_BEEPS)
        .map(|i| Tone {
            frequency_hz: URGENT_FREQUENCY,
            start: Duration::from_millis(URGENT_CADENCE_MS * i),
            duration: Duration::from_millis(URGENT_BEEP_MS),
            waveform: Waveform::Square,
            gain: URGENT_GAIN * volume,
        })
        .collect()
}

/// Time from the first onset to the last release
pub fn cue_length(tones: &[Tone]) -> Duration {
    tones.iter().map(Tone::end).max().unwrap_or_default()
}
