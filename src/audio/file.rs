use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, PcmFrame};
use super::pipeline::CapturePipeline;
use crate::error::CaptureError;

/// A WAV file decoded to normalized float samples (interleaved)
pub struct WavClip {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl WavClip {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .map_err(|e| CaptureError::File(format!("{}: {}", path.display(), e)))?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>(),
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
            }
        }
        .map_err(|e| CaptureError::File(format!("Failed to read audio samples: {}", e)))?;

        let duration_seconds = if spec.sample_rate == 0 || spec.channels == 0 {
            0.0
        } else {
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64)
        };

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Replays a WAV file as if it were a microphone
///
/// Runs on its own `wav-replay` thread through the same capture pipeline,
/// 10ms of audio per step. When the file ends the frame channel closes;
/// the trailing partial frame is dropped like on a live stop.
pub struct WavFileBackend {
    clip: Arc<WavClip>,
    config: AudioBackendConfig,
    realtime: bool,
    stop_tx: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
    capturing: bool,
}

impl WavFileBackend {
    pub fn open(
        path: PathBuf,
        config: AudioBackendConfig,
        realtime: bool,
    ) -> Result<Self, CaptureError> {
        let clip = WavClip::open(&path)?;
        if clip.sample_rate == 0 || clip.channels == 0 {
            return Err(CaptureError::File(format!(
                "{}: invalid format ({}Hz, {} channels)",
                path.display(),
                clip.sample_rate,
                clip.channels
            )));
        }

        Ok(Self::from_clip(clip, config, realtime))
    }

    /// Frames the clip yields at the target rate
    fn expected_frames(&self) -> usize {
        let clip = &self.clip;
        if clip.sample_rate == 0 || clip.channels == 0 {
            return 0;
        }
        let input_samples = (clip.samples.len() / clip.channels as usize) as u64;
        let output_samples = input_samples * self.config.target_sample_rate as u64 / clip.sample_rate as u64;
        (output_samples / self.config.frame_samples.max(1) as u64) as usize + 1
    }

    pub fn from_clip(clip: WavClip, config: AudioBackendConfig, realtime: bool) -> Self {
        Self {
            clip: Arc::new(clip),
            config,
            realtime,
            stop_tx: None,
            thread: None,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for WavFileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<PcmFrame>, CaptureError> {
        if self.capturing {
            return Err(CaptureError::AlreadyCapturing);
        }

        // Unpaced replay outruns the sender; make room for the whole clip
        let capacity = if self.realtime {
            self.config.channel_capacity
        } else {
            self.config.channel_capacity.max(self.expected_frames() + 1)
        };
        let (frame_tx, frame_rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();

        let pipeline = CapturePipeline::new(
            self.clip.sample_rate,
            self.clip.channels,
            &self.config,
            frame_tx,
            Arc::new(AtomicU64::new(0)),
        )?;

        let clip = Arc::clone(&self.clip);
        let realtime = self.realtime;

        let handle = thread::Builder::new()
            .name("wav-replay".to_string())
            .spawn(move || replay(clip, pipeline, realtime, stop_rx))
            .map_err(|e| CaptureError::Stream(format!("Failed to spawn replay thread: {}", e)))?;

        info!(
            "Replaying {} ({:.1}s, realtime={})",
            self.clip.path, self.clip.duration_seconds, realtime
        );

        self.stop_tx = Some(stop_tx);
        self.thread = Some(handle);
        self.capturing = true;

        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(handle) = self.thread.take() {
            if tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_or(true, |joined| joined.is_err())
            {
                warn!("WAV replay thread panicked");
            }
            info!("WAV replay stopped");
        }

        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "wav file"
    }
}

impl Drop for WavFileBackend {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

fn replay(
    clip: Arc<WavClip>,
    mut pipeline: CapturePipeline,
    realtime: bool,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let step = (clip.sample_rate as usize / 100).max(1) * clip.channels as usize;

    for block in clip.samples.chunks(step) {
        match stop_rx.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => {}
            _ => {
                debug!("WAV replay interrupted");
                return;
            }
        }

        match pipeline.process(block) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Frame receiver dropped, ending replay");
                return;
            }
            Err(e) => {
                warn!("WAV replay failed: {}", e);
                return;
            }
        }

        if realtime {
            thread::sleep(Duration::from_millis(10));
        }
    }

    debug!(
        "WAV replay finished: {} frames, {} samples left in partial frame",
        pipeline.frames_emitted(),
        pipeline.buffered()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(samples: Vec<f32>, sample_rate: u32, channels: u16) -> WavClip {
        WavClip {
            path: "memory".to_string(),
            duration_seconds: samples.len() as f64 / (sample_rate as f64 * channels as f64),
            sample_rate,
            channels,
            samples,
        }
    }

    #[tokio::test]
    async fn test_replay_emits_whole_frames() {
        let config = AudioBackendConfig {
            frame_samples: 4096,
            ..Default::default()
        };
        let mut backend = WavFileBackend::from_clip(clip(vec![0.5; 4096 * 3 + 17], 16000, 1), config, false);

        let mut rx = backend.start().await.unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }

        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == 4096 && f.samples[0] == 16384));
        assert_eq!(
            frames.iter().map(|f| f.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        backend.stop().await.unwrap();
        backend.stop().await.unwrap();
        assert!(!backend.is_capturing());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let mut backend =
            WavFileBackend::from_clip(clip(vec![0.0; 100], 16000, 1), AudioBackendConfig::default(), true);

        let _rx = backend.start().await.unwrap();
        assert!(matches!(backend.start().await, Err(CaptureError::AlreadyCapturing)));
        backend.stop().await.unwrap();
    }
}
