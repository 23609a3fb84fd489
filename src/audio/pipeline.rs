//! Capture-thread processing: downmix, resample, quantize, frame, hand off

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::backend::{AudioBackendConfig, PcmFrame};
use super::pcm::{downmix_to_mono, FrameAccumulator};
use super::resample::StreamResampler;
use crate::error::CaptureError;

/// Owns everything the capture callback needs
///
/// `process` never blocks: frames that do not fit in the channel are
/// counted and dropped, and once the receiver is gone every later frame is
/// dropped silently.
pub struct CapturePipeline {
    channels: u16,
    resampler: Option<StreamResampler>,
    accumulator: FrameAccumulator,
    frame_tx: mpsc::Sender<PcmFrame>,
    dropped: Arc<AtomicU64>,
    receiver_gone: bool,
    mono: Vec<f32>,
    resampled: Vec<f32>,
}

impl CapturePipeline {
    pub fn new(
        input_rate: u32,
        channels: u16,
        config: &AudioBackendConfig,
        frame_tx: mpsc::Sender<PcmFrame>,
        dropped: Arc<AtomicU64>,
    ) -> Result<Self, CaptureError> {
        let resampler = if input_rate != config.target_sample_rate {
            Some(StreamResampler::new(input_rate, config.target_sample_rate)?)
        } else {
            None
        };

        Ok(Self {
            channels,
            resampler,
            accumulator: FrameAccumulator::new(config.frame_samples, config.target_sample_rate),
            frame_tx,
            dropped,
            receiver_gone: false,
            mono: Vec::new(),
            resampled: Vec::new(),
        })
    }

    /// Feed interleaved float samples at the input rate
    ///
    /// Returns false once the frame receiver has been dropped.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<bool, CaptureError> {
        if self.receiver_gone {
            return Ok(false);
        }

        downmix_to_mono(interleaved, self.channels, &mut self.mono);

        let samples = match &mut self.resampler {
            Some(resampler) => {
                self.resampled.clear();
                resampler.process(&self.mono, &mut self.resampled)?;
                &self.resampled
            }
            None => &self.mono,
        };

        let frame_tx = &self.frame_tx;
        let dropped = &self.dropped;
        let receiver_gone = &mut self.receiver_gone;

        self.accumulator.push(samples, |frame| {
            if *receiver_gone {
                return;
            }
            match frame_tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Closed(_)) => {
                    *receiver_gone = true;
                }
            }
        });

        Ok(!self.receiver_gone)
    }

    pub fn frames_emitted(&self) -> u64 {
        self.accumulator.frames_emitted()
    }

    /// Samples left in the partial frame
    pub fn buffered(&self) -> usize {
        self.accumulator.buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(frame_samples: usize) -> AudioBackendConfig {
        AudioBackendConfig {
            frame_samples,
            ..Default::default()
        }
    }

    #[test]
    fn test_mono_16k_passthrough() {
        let (tx, mut rx) = mpsc::channel(8);
        let dropped = Arc::new(AtomicU64::new(0));
        let mut pipeline = CapturePipeline::new(16000, 1, &config(4), tx, dropped).unwrap();

        assert!(pipeline.process(&[1.0, -1.0, 0.0, 0.5, 0.1]).unwrap());

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.samples, vec![i16::MAX, i16::MIN, 0, 16384]);
        assert!(rx.try_recv().is_err());
        assert_eq!(pipeline.buffered(), 1);
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let (tx, mut rx) = mpsc::channel(8);
        let dropped = Arc::new(AtomicU64::new(0));
        let mut pipeline = CapturePipeline::new(16000, 2, &config(2), tx, dropped).unwrap();

        pipeline.process(&[1.0, 1.0, -1.0, -1.0]).unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.samples, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_full_channel_drops_and_counts() {
        let (tx, mut rx) = mpsc::channel(1);
        let dropped = Arc::new(AtomicU64::new(0));
        let mut pipeline =
            CapturePipeline::new(16000, 1, &config(2), tx, Arc::clone(&dropped)).unwrap();

        pipeline.process(&[0.1; 6]).unwrap();

        assert_eq!(pipeline.frames_emitted(), 3);
        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        assert_eq!(rx.try_recv().unwrap().sequence, 0);
    }

    #[test]
    fn test_closed_receiver_stops_pipeline() {
        let (tx, rx) = mpsc::channel(4);
        let dropped = Arc::new(AtomicU64::new(0));
        let mut pipeline =
            CapturePipeline::new(16000, 1, &config(2), tx, Arc::clone(&dropped)).unwrap();
        drop(rx);

        assert!(!pipeline.process(&[0.1; 4]).unwrap());
        assert!(!pipeline.process(&[0.1; 4]).unwrap());
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_48k_input_is_resampled() {
        let (tx, mut rx) = mpsc::channel(64);
        let dropped = Arc::new(AtomicU64::new(0));
        let mut pipeline = CapturePipeline::new(48000, 1, &config(1600), tx, dropped).unwrap();

        for block in vec![0.25f32; 48000].chunks(480) {
            pipeline.process(block).unwrap();
        }

        let mut frames = 0;
        while let Ok(frame) = rx.try_recv() {
            assert_eq!(frame.sample_rate, 16000);
            assert_eq!(frame.len(), 1600);
            frames += 1;
        }
        // ~1s at 16kHz in 100ms frames, minus resampler latency
        assert!((8..=10).contains(&frames), "got {} frames", frames);
    }
}
