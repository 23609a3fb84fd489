pub mod backend;
pub mod dump;
pub mod file;
pub mod microphone;
pub mod pcm;
pub mod pipeline;
pub mod resample;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioSource, PcmFrame, TARGET_SAMPLE_RATE,
};
pub use dump::AudioDump;
pub use file::{WavClip, WavFileBackend};
pub use microphone::{list_input_devices, MicrophoneBackend};
pub use pcm::{quantize_sample, FrameAccumulator, DEFAULT_FRAME_SAMPLES};
pub use pipeline::CapturePipeline;
