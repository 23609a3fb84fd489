//! Microphone capture using cpal

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, PcmFrame};
use super::pipeline::CapturePipeline;
use crate::error::CaptureError;

/// Microphone backend
///
/// cpal::Stream is not Send, so the stream lives on its own `audio-capture`
/// thread for the whole capture. The input callback runs the capture
/// pipeline and hands finished frames to the async side by value.
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    stop_tx: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
    capturing: bool,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            stop_tx: None,
            thread: None,
            dropped: Arc::new(AtomicU64::new(0)),
            capturing: false,
        }
    }

    /// Frames dropped because the sender fell behind
    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<PcmFrame>, CaptureError> {
        if self.capturing {
            return Err(CaptureError::AlreadyCapturing);
        }

        info!(
            "Starting microphone capture ({}Hz, {} samples/frame)",
            self.config.target_sample_rate, self.config.frame_samples
        );

        let (frame_tx, frame_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let config = self.config.clone();
        let dropped = Arc::clone(&self.dropped);

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_capture_thread(config, frame_tx, dropped, ready_tx, stop_rx))
            .map_err(|e| CaptureError::Stream(format!("Failed to spawn audio thread: {}", e)))?;

        // Suspends until the device is opened or refused
        match ready_rx.await {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(handle);
                self.capturing = true;
                info!("Microphone capture started");
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                error!("Microphone capture failed: {}", e);
                let _ = tokio::task::spawn_blocking(move || handle.join()).await;
                Err(e)
            }
            Err(_) => {
                let _ = tokio::task::spawn_blocking(move || handle.join()).await;
                Err(CaptureError::Stream("Capture thread exited during start-up".to_string()))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(handle) = self.thread.take() {
            info!("Stopping microphone capture");
            if tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_or(true, |joined| joined.is_err())
            {
                warn!("Audio capture thread panicked");
            }

            let dropped = self.frames_dropped();
            if dropped > 0 {
                warn!("{} frames dropped during capture", dropped);
            }
            info!("Microphone capture stopped");
        }

        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "microphone (cpal)"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        // The thread drops the stream as soon as it sees the signal
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

/// Names of the available input devices
pub fn list_input_devices() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| classify_backend_error(&e.to_string()))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

fn run_capture_thread(
    config: AudioBackendConfig,
    frame_tx: mpsc::Sender<PcmFrame>,
    dropped: Arc<AtomicU64>,
    ready_tx: oneshot::Sender<Result<(), CaptureError>>,
    stop_rx: oneshot::Receiver<()>,
) {
    let stream = match open_stream(&config, frame_tx, dropped) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(classify_backend_error(&e.to_string())));
        return;
    }

    if ready_tx.send(Ok(())).is_err() {
        return;
    }

    debug!("Audio capture thread running");

    // Either the stop signal or the backend being dropped ends capture
    let _ = stop_rx.blocking_recv();

    debug!("Audio capture thread stopping");
    drop(stream);
}

fn open_stream(
    config: &AudioBackendConfig,
    frame_tx: mpsc::Sender<PcmFrame>,
    dropped: Arc<AtomicU64>,
) -> Result<Stream, CaptureError> {
    let host = cpal::default_host();

    let device = match config.device.as_deref() {
        None | Some("default") => host.default_input_device().ok_or(CaptureError::NoInputDevice)?,
        Some(name) => find_device_by_name(&host, name)?,
    };

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using input device: {}", device_name);

    let supported = device
        .default_input_config()
        .map_err(|e| classify_backend_error(&e.to_string()))?;

    let sample_format = supported.sample_format();
    let stream_config: StreamConfig = supported.config();

    debug!(
        "Device stream: {} Hz, {} channels, {:?}",
        stream_config.sample_rate.0, stream_config.channels, sample_format
    );

    let pipeline = CapturePipeline::new(
        stream_config.sample_rate.0,
        stream_config.channels,
        config,
        frame_tx,
        dropped,
    )?;

    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, pipeline),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, pipeline),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, pipeline),
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, pipeline),
        cpal::SampleFormat::I8 => build_stream::<i8>(&device, &stream_config, pipeline),
        cpal::SampleFormat::U8 => build_stream::<u8>(&device, &stream_config, pipeline),
        other => Err(CaptureError::UnsupportedConfig(format!(
            "Sample format {:?} not supported",
            other
        ))),
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut pipeline: CapturePipeline,
) -> Result<Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut scratch: Vec<f32> = Vec::new();
    let mut failed = false;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if failed {
                    return;
                }
                scratch.clear();
                scratch.extend(data.iter().map(|&s| f32::from_sample(s)));
                if let Err(e) = pipeline.process(&scratch) {
                    error!("Capture pipeline failed: {}", e);
                    failed = true;
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureError::NoInputDevice,
            cpal::BuildStreamError::StreamConfigNotSupported => {
                CaptureError::UnsupportedConfig("Stream config not supported by device".to_string())
            }
            other => classify_backend_error(&other.to_string()),
        })
}

fn find_device_by_name(host: &cpal::Host, name: &str) -> Result<Device, CaptureError> {
    let devices = host
        .input_devices()
        .map_err(|e| classify_backend_error(&e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name.contains(name) {
                return Ok(device);
            }
        }
    }

    Err(CaptureError::DeviceNotFound(name.to_string()))
}

/// Map a host-specific failure message onto the capture taxonomy
///
/// Hosts report refused microphone access as backend-specific errors, so
/// the message text is the only signal.
pub fn classify_backend_error(message: &str) -> CaptureError {
    let lower = message.to_ascii_lowercase();
    let denied = ["permission", "denied", "not authorized", "unauthorized", "not permitted"]
        .iter()
        .any(|needle| lower.contains(needle));

    if denied {
        CaptureError::PermissionDenied(message.to_string())
    } else if lower.contains("not available") || lower.contains("no such device") {
        CaptureError::NoInputDevice
    } else {
        CaptureError::Stream(message.to_string())
    }
}
