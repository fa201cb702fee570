//! Renders a tone plan into mono PCM samples

use super::cue::{cue_length, Tone, Waveform};
use std::f32::consts::PI;

const ATTACK_SECS: f32 = 0.01;
const RELEASE_SECS: f32 = 0.05;
const DECAY_RATE: f32 = 3.0;

fn oscillator(waveform: Waveform, phase: f32) -> f32 {
    let s = (2.0 * PI * phase).sin();
    match waveform {
        Waveform::Sine => s,
        Waveform::Square => {
            if s >= 0.0 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

/// Short linear attack, exponential decay, linear release into silence
fn envelope(t: f32, duration: f32) -> f32 {
    if duration <= 0.0 {
        return 0.0;
    }
    let attack = (t / ATTACK_SECS).min(1.0);
    let release = ((duration - t) / RELEASE_SECS).clamp(0.0, 1.0);
    attack * release * (-DECAY_RATE * t / duration).exp()
}

/// Mixes every tone into one buffer, clipped to [-1, 1]
pub fn render_samples(tones: &[Tone], sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate as f32;
    let total = (cue_length(tones).as_secs_f32() * rate).ceil() as usize;
    let mut buffer = vec![0.0f32; total];

    for tone in tones {
        if tone.gain <= 0.0 {
            continue;
        }
        let first = (tone.start.as_secs_f32() * rate) as usize;
        let len = (tone.duration.as_secs_f32() * rate) as usize;
        let duration = tone.duration.as_secs_f32();
        for n in 0..len {
            let Some(slot) = buffer.get_mut(first + n) else {
                break;
            };
            let t = n as f32 / rate;
            *slot += tone.gain * envelope(t, duration) * oscillator(tone.waveform, tone.frequency_hz * t);
        }
    }

    for sample in buffer.iter_mut() {
        *sample = sample.clamp(-1.0, 1.0);
    }
    buffer
}

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}
