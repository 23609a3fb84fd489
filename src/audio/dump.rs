use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::backend::PcmFrame;
use crate::error::CaptureError;

/// Writes every frame a session sends into one 16-bit mono WAV file
///
/// Debugging aid for checking what the recognizer actually heard.
pub struct AudioDump {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    file_path: PathBuf,
    sample_count: usize,
}

impl AudioDump {
    pub fn create(output_dir: &Path, file_stem: &str, sample_rate: u32) -> Result<Self, CaptureError> {
        fs::create_dir_all(output_dir)
            .map_err(|e| CaptureError::File(format!("Failed to create {}: {}", output_dir.display(), e)))?;

        let file_path = output_dir.join(format!("{}.wav", file_stem));

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec).map_err(|e| {
            CaptureError::File(format!("Failed to create WAV file {:?}: {}", file_path, e))
        })?;

        info!("Dumping session audio to {}", file_path.display());

        Ok(Self {
            writer: Some(writer),
            file_path,
            sample_count: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &PcmFrame) -> Result<(), CaptureError> {
        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| CaptureError::File(format!("Failed to write sample to WAV: {}", e)))?;
            }
            self.sample_count += frame.samples.len();
        }

        Ok(())
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Finalize the WAV header and return the file path
    pub fn finish(mut self) -> Result<PathBuf, CaptureError> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| CaptureError::File(format!("Failed to finalize WAV file: {}", e)))?;
        }

        info!(
            "Audio dump complete: {} ({} samples)",
            self.file_path.display(),
            self.sample_count
        );

        Ok(self.file_path.clone())
    }
}

impl Drop for AudioDump {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
