//! G.711 mu-law (PCMU) encoding and fixed-size framing.

use bytes::Bytes;
use std::time::Duration;

pub const PCMU_SAMPLE_RATE: u32 = 8000;
pub const PCMU_CHANNELS: u16 = 1;

/// Encoded mu-law value of digital silence.
pub const ULAW_SILENCE: u8 = 0xFF;

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

/// Encodes one 16-bit linear PCM sample as G.711 mu-law.
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };

    pcm = pcm.min(ULAW_CLIP) + ULAW_BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;

    !(sign | (exponent << 4) | mantissa) as u8
}

/// Number of PCMU samples in one frame of the given duration.
pub fn samples_per_frame(frame: Duration) -> usize {
    (PCMU_SAMPLE_RATE as u128 * frame.as_millis() / 1000) as usize
}

/// Groups 8 kHz mono samples into encoded frames of `frame_len` bytes.
///
/// A short final frame is padded with silence; the iterator ends when the
/// underlying samples do.
pub struct FrameEncoder<I> {
    samples: I,
    frame_len: usize,
}

impl<I> FrameEncoder<I>
where
    I: Iterator<Item = i16>,
{
    pub fn new(samples: I, frame_len: usize) -> Self {
        Self {
            samples,
            frame_len: frame_len.max(1),
        }
    }
}

impl<I> Iterator for FrameEncoder<I>
where
    I: Iterator<Item = i16>,
{
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        let mut frame: Vec<u8> = self
            .samples
            .by_ref()
            .take(self.frame_len)
            .map(linear_to_ulaw)
            .collect();

        if frame.is_empty() {
            return None;
        }
        frame.resize(self.frame_len, ULAW_SILENCE);
        Some(Bytes::from(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ulaw_reference_points() {
        assert_eq!(linear_to_ulaw(0), 0xFF);
        assert_eq!(linear_to_ulaw(i16::MAX), 0x80);
        assert_eq!(linear_to_ulaw(i16::MIN), 0x00);
        assert_eq!(linear_to_ulaw(-1), 0x7F);
    }

    #[test]
    fn test_ulaw_sign_only_differs_by_top_bit() {
        for sample in [1i16, 100, 1000, 8000, 20000] {
            assert_eq!(linear_to_ulaw(sample) ^ linear_to_ulaw(-sample), 0x80);
        }
    }

    #[test]
    fn test_ulaw_is_monotonic_for_positive_input() {
        // Larger magnitudes map to smaller codes on the positive side.
        let codes: Vec<u8> = [0i16, 50, 500, 5000, 30000].iter().map(|&s| linear_to_ulaw(s)).collect();
        assert!(codes.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_samples_per_frame() {
        assert_eq!(samples_per_frame(Duration::from_millis(20)), 160);
        assert_eq!(samples_per_frame(Duration::from_millis(10)), 80);
    }

    #[test]
    fn test_frame_encoder_pads_last_frame() {
        let samples = std::iter::repeat(0i16).take(400);
        let frames: Vec<Bytes> = FrameEncoder::new(samples, 160).collect();

        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == 160));
        assert!(frames[2].iter().all(|&b| b == ULAW_SILENCE));
    }

    #[test]
    fn test_frame_encoder_on_empty_input() {
        let mut frames = FrameEncoder::new(std::iter::empty::<i16>(), 160);
        assert!(frames.next().is_none());
    }
}
