//! Audio backends that execute a tone plan

use super::cue::{cue_length, Tone};
use super::synth::{peak, render_samples};
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

pub trait AudioBackend: Send + Sync {
    fn play(&self, tones: &[Tone]) -> Result<()>;
}

/// Accepts every cue and only logs it; for hosts without an audio device
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioBackend;

impl AudioBackend for NullAudioBackend {
    fn play(&self, tones: &[Tone]) -> Result<()> {
        debug!(
            "[Audio] dropping cue of {} tones ({:?})",
            tones.len(),
            cue_length(tones)
        );
        Ok(())
    }
}

/// Destination for rendered PCM, e.g. an output stream
pub trait PcmSink: Send + Sync {
    fn write(&self, samples: &[f32], sample_rate: u32) -> Result<()>;
}

/// Synthesizes the cue at call time and hands the samples to a sink
pub struct PcmAudioBackend {
    sample_rate: u32,
    sink: Arc<dyn PcmSink>,
}

impl PcmAudioBackend {
    pub fn new(sink: Arc<dyn PcmSink>) -> Self {
        Self::with_sample_rate(sink, DEFAULT_SAMPLE_RATE)
    }

    pub fn with_sample_rate(sink: Arc<dyn PcmSink>, sample_rate: u32) -> Self {
        Self { sample_rate, sink }
    }
}

impl AudioBackend for PcmAudioBackend {
    fn play(&self, tones: &[Tone]) -> Result<()> {
        let samples = render_samples(tones, self.sample_rate);
        debug!(
            "[Audio] rendered {} samples at {} Hz, peak {:.3}",
            samples.len(),
            self.sample_rate,
            peak(&samples)
        );
        self.sink.write(&samples, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::notification::cue::{plan_cue, CueKind};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        writes: Mutex<Vec<(usize, u32)>>,
    }

    impl PcmSink for CapturingSink {
        fn write(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
            self.writes.lock().unwrap().push((samples.len(), sample_rate));
            Ok(())
        }
    }

    #[test]
    fn pcm_backend_renders_into_its_sink() {
        let sink = Arc::new(CapturingSink::default());
        let backend = PcmAudioBackend::with_sample_rate(sink.clone(), 8_000);
        backend.play(&plan_cue(CueKind::Urgent, 0.5)).unwrap();

        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, 8_000);
        assert!(writes[0].0 > 0);
    }
}
