//! Streaming resampling to the 16kHz speech rate

use rubato::{FftFixedIn, Resampler};
use tracing::debug;

use crate::error::CaptureError;

/// Requested input frames per resampler call (rubato rounds it up)
const CHUNK_SIZE: usize = 1024;

/// Mono resampler that accepts arbitrary-length input
///
/// The FFT resampler wants fixed-size input chunks; this buffers whatever
/// the device delivers and processes complete chunks as they fill up.
/// Buffers are allocated up front so `process` can run on the audio thread.
pub struct StreamResampler {
    resampler: FftFixedIn<f32>,
    pending: Vec<f32>,
    output: Vec<f32>,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self, CaptureError> {
        debug!(
            "Creating resampler: {} Hz -> {} Hz (ratio: {:.4})",
            input_rate,
            output_rate,
            output_rate as f64 / input_rate as f64
        );

        let resampler = FftFixedIn::<f32>::new(
            input_rate as usize,
            output_rate as usize,
            CHUNK_SIZE,
            2, // sub_chunks for better latency
            1, // mono
        )
        .map_err(|e| CaptureError::Resampler(e.to_string()))?;

        let pending = Vec::with_capacity(resampler.input_frames_max() * 4);
        let output = vec![0.0; resampler.output_frames_max()];

        Ok(Self {
            resampler,
            pending,
            output,
        })
    }

    /// Samples buffered until the next full chunk
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feed mono input, appending whatever output is ready to `out`
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<(), CaptureError> {
        self.pending.extend_from_slice(input);

        let mut consumed = 0;
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() - consumed < needed {
                break;
            }

            let (read, written) = self
                .resampler
                .process_into_buffer(
                    &[&self.pending[consumed..consumed + needed]],
                    std::slice::from_mut(&mut self.output),
                    None,
                )
                .map_err(|e| CaptureError::Resampler(e.to_string()))?;

            consumed += read;
            out.extend_from_slice(&self.output[..written]);
        }

        self.pending.drain(..consumed);
        Ok(())
    }
}
