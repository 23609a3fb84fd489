use std::path::PathBuf;
use tokio::sync::mpsc;

use super::pcm::DEFAULT_FRAME_SAMPLES;
use crate::error::CaptureError;

/// Sample rate the speech server expects
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// One fixed-size block of 16-bit mono PCM ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    /// Quantized samples (mono)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Position of this frame in the capture (0-indexed)
    pub sequence: u64,
    /// Milliseconds of audio captured before this frame
    pub timestamp_ms: u64,
}

impl PcmFrame {
    /// Little-endian byte encoding sent as one binary message
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Output sample rate (input is resampled if needed)
    pub target_sample_rate: u32,
    /// Samples per emitted frame
    pub frame_samples: usize,
    /// Frames that may queue between the capture thread and the sender
    pub channel_capacity: usize,
    /// Input device name, `None` for the system default
    pub device: Option<String>,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: TARGET_SAMPLE_RATE,
            frame_samples: DEFAULT_FRAME_SAMPLES,
            channel_capacity: 64,
            device: None,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal input stream on a dedicated capture thread
/// - WAV file: replays a file through the same quantize/frame path
#[async_trait::async_trait]
pub trait AudioBackend: Send {
    /// Start capturing audio
    ///
    /// Resolves once the input is acquired (or refused). The receiver yields
    /// frames in capture order and ends when capture stops.
    async fn start(&mut self) -> Result<mpsc::Receiver<PcmFrame>, CaptureError>;

    /// Stop capturing and release the input; calling it again is a no-op
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Live microphone input (all platforms)
    Microphone,
    /// WAV file input (for testing/batch evaluation)
    WavFile {
        path: PathBuf,
        /// Pace playback at the file's real duration
        realtime: bool,
    },
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend for the given source
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>, CaptureError> {
        match source {
            AudioSource::Microphone => {
                let backend = super::microphone::MicrophoneBackend::new(config);
                Ok(Box::new(backend))
            }

            AudioSource::WavFile { path, realtime } => {
                let backend = super::file::WavFileBackend::open(path, config, realtime)?;
                Ok(Box::new(backend))
            }
        }
    }
}
