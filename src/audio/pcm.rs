//! PCM16 quantization and fixed-size frame accumulation
//!
//! This is the part of the capture path that runs on the audio thread:
//! float samples come in, clamped and quantized 16-bit frames of a fixed
//! length come out.

use super::backend::PcmFrame;

/// Default frame length in samples
pub const DEFAULT_FRAME_SAMPLES: usize = 4096;

/// Quantize one float sample to PCM16
///
/// The sample is clamped to [-1, 1]; negative values scale by 32768 and
/// non-negative values by 32767, so -1.0 maps to i16::MIN and 1.0 to i16::MAX.
#[inline]
pub fn quantize_sample(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

/// Average interleaved channels down to mono
pub fn downmix_to_mono(interleaved: &[f32], channels: u16, out: &mut Vec<f32>) {
    out.clear();
    match channels {
        0 | 1 => out.extend_from_slice(interleaved),
        n => {
            let n = n as usize;
            out.extend(
                interleaved
                    .chunks_exact(n)
                    .map(|frame| frame.iter().sum::<f32>() / n as f32),
            );
        }
    }
}

/// Accumulates quantized samples and emits full frames
///
/// Each emitted frame is exactly `capacity` samples long. A partially filled
/// buffer is only ever dropped, never emitted short.
#[derive(Debug)]
pub struct FrameAccumulator {
    capacity: usize,
    sample_rate: u32,
    buffer: Vec<i16>,
    next_sequence: u64,
}

impl FrameAccumulator {
    pub fn new(capacity: usize, sample_rate: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            sample_rate,
            buffer: Vec::with_capacity(capacity),
            next_sequence: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples waiting for the next frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of frames emitted so far
    pub fn frames_emitted(&self) -> u64 {
        self.next_sequence
    }

    /// Feed float samples, calling `emit` once per completed frame in order
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(PcmFrame)) {
        for &sample in samples {
            self.buffer.push(quantize_sample(sample));

            if self.buffer.len() >= self.capacity {
                let full = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
                emit(self.seal(full));
            }
        }
    }

    /// Feed samples and collect the completed frames
    pub fn push_collect(&mut self, samples: &[f32]) -> Vec<PcmFrame> {
        let mut frames = Vec::new();
        self.push(samples, |frame| frames.push(frame));
        frames
    }

    /// Drop the partial frame, returning how many samples were discarded
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }

    fn seal(&mut self, samples: Vec<i16>) -> PcmFrame {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let timestamp_ms = if self.sample_rate == 0 {
            0
        } else {
            sequence * self.capacity as u64 * 1000 / self.sample_rate as u64
        };

        PcmFrame {
            samples,
            sample_rate: self.sample_rate,
            sequence,
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(x: f32) -> i16 {
        let c = x.clamp(-1.0, 1.0);
        if c < 0.0 {
            (c * 32768.0).round() as i16
        } else {
            (c * 32767.0).round() as i16
        }
    }

    #[test]
    fn test_quantize_extremes() {
        assert_eq!(quantize_sample(-1.0), i16::MIN);
        assert_eq!(quantize_sample(1.0), i16::MAX);
        assert_eq!(quantize_sample(0.0), 0);
        assert_eq!(quantize_sample(-0.0), 0);
    }

    #[test]
    fn test_quantize_clamps_out_of_range() {
        assert_eq!(quantize_sample(-3.5), i16::MIN);
        assert_eq!(quantize_sample(42.0), i16::MAX);
    }

    #[test]
    fn test_quantize_is_asymmetric() {
        assert_eq!(quantize_sample(0.5), 16384); // 16383.5 rounds away from zero
        assert_eq!(quantize_sample(-0.5), -16384);
        assert_eq!(quantize_sample(0.25), 8192); // 8191.75
        assert_eq!(quantize_sample(-0.25), -8192);
    }

    #[test]
    fn test_quantize_matches_reference_law() {
        let mut x = -1.25f32;
        while x <= 1.25 {
            assert_eq!(quantize_sample(x), reference(x), "x = {}", x);
            x += 0.0007;
        }
    }

    #[test]
    fn test_quantize_nan_is_silence() {
        assert_eq!(quantize_sample(f32::NAN), 0);
    }

    #[test]
    fn test_accumulator_emits_full_frames_only() {
        let mut acc = FrameAccumulator::new(4, 16000);
        let frames = acc.push_collect(&[0.1; 10]);

        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.samples.len() == 4));
        assert_eq!(acc.buffered(), 2);
    }

    #[test]
    fn test_accumulator_preserves_order_across_pushes() {
        let mut acc = FrameAccumulator::new(3, 16000);
        let mut frames = acc.push_collect(&[-1.0, 0.0]);
        assert!(frames.is_empty());
        frames.extend(acc.push_collect(&[1.0, -1.0, 0.0, 1.0, 0.5]));

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples, vec![i16::MIN, 0, i16::MAX]);
        assert_eq!(frames[1].samples, vec![i16::MIN, 0, i16::MAX]);
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[1].sequence, 1);
        assert_eq!(acc.buffered(), 1);
    }

    #[test]
    fn test_accumulator_timestamps() {
        let mut acc = FrameAccumulator::new(1600, 16000);
        let frames = acc.push_collect(&vec![0.0; 1600 * 3]);

        let stamps: Vec<u64> = frames.iter().map(|f| f.timestamp_ms).collect();
        assert_eq!(stamps, vec![0, 100, 200]);
    }

    #[test]
    fn test_discard_drops_partial_frame() {
        let mut acc = FrameAccumulator::new(8, 16000);
        acc.push_collect(&[0.2; 5]);

        assert_eq!(acc.discard(), 5);
        assert_eq!(acc.buffered(), 0);
        assert_eq!(acc.frames_emitted(), 0);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let acc = FrameAccumulator::new(0, 16000);
        assert_eq!(acc.capacity(), 1);
    }

    #[test]
    fn test_downmix_stereo() {
        let mut out = Vec::new();
        downmix_to_mono(&[1.0, 0.0, -0.5, -0.5, 0.25, 0.75], 2, &mut out);
        assert_eq!(out, vec![0.5, -0.5, 0.5]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let mut out = vec![9.0];
        downmix_to_mono(&[0.1, 0.2], 1, &mut out);
        assert_eq!(out, vec![0.1, 0.2]);
    }
}
