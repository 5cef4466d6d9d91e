//! PCM16 decoding for narration playback.
//!
//! The speech synthesis operation returns base64-encoded raw 16-bit signed
//! little-endian PCM at a fixed sample rate. Decoding it into normalized
//! float planes is a pure transform; the playback thread re-quantizes to
//! interleaved i16 for the ALSA write path.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;

/// A decoded multi-channel sample buffer. One plane per channel, every
/// sample in [-1, 1). Immutable once produced; owned by the playback that
/// created it and discarded when playback ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub sample_rate: u32,
    pub planes: Vec<Vec<f32>>,
}

impl SampleBuffer {
    pub fn channel_count(&self) -> usize {
        self.planes.len()
    }

    /// Samples per channel.
    pub fn frame_count(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }
}

/// Decode a base64 wire payload into raw bytes.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64_STANDARD.decode(data)
}

/// Decode interleaved PCM16LE bytes into per-channel float planes.
///
/// Each sample is the original integer divided by 32768. A trailing partial
/// frame (byte length not a multiple of 2 x channels) is truncated.
pub fn decode_pcm16(bytes: &[u8], channels: usize, sample_rate: u32) -> SampleBuffer {
    let channels = channels.max(1);
    let frame_count = bytes.len() / (2 * channels);
    let mut planes = vec![vec![0f32; frame_count]; channels];

    for frame in 0..frame_count {
        for ch in 0..channels {
            let off = (frame * channels + ch) * 2;
            let sample = i16::from_le_bytes([bytes[off], bytes[off + 1]]);
            planes[ch][frame] = sample as f32 / 32768.0;
        }
    }

    SampleBuffer {
        sample_rate,
        planes,
    }
}

/// Re-quantize float planes back to interleaved i16 for ALSA playback.
pub fn interleave_i16(buffer: &SampleBuffer) -> Vec<i16> {
    let channels = buffer.channel_count();
    let frames = buffer.frame_count();
    let mut out = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        for ch in 0..channels {
            let scaled = (buffer.planes[ch][frame] * 32768.0).round();
            out.push(scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_mono_samples() {
        // 0x4000 = 16384 -> 0.5, 0xC000 = -16384 -> -0.5
        let buffer = decode_pcm16(&[0x00, 0x40, 0x00, 0xC0], 1, 24000);
        assert_eq!(buffer.planes, vec![vec![0.5, -0.5]]);
        assert_eq!(buffer.sample_rate, 24000);
    }

    #[test]
    fn yields_n_samples_per_channel_in_range() {
        let n = 64;
        let channels = 2;
        let bytes: Vec<u8> = (0..2 * channels * n).map(|i| i as u8).collect();
        let buffer = decode_pcm16(&bytes, channels, 24000);
        assert_eq!(buffer.channel_count(), channels);
        for plane in &buffer.planes {
            assert_eq!(plane.len(), n);
            assert!(plane.iter().all(|s| (-1.0..1.0).contains(s)));
        }
    }

    #[test]
    fn decoding_is_deterministic() {
        let bytes: Vec<u8> = (0..128).map(|i| (i * 7) as u8).collect();
        assert_eq!(decode_pcm16(&bytes, 2, 24000), decode_pcm16(&bytes, 2, 24000));
    }

    #[test]
    fn truncates_trailing_partial_frame() {
        let buffer = decode_pcm16(&[0x00, 0x40, 0xFF], 1, 24000);
        assert_eq!(buffer.frame_count(), 1);
        assert_eq!(buffer.planes[0][0], 0.5);
    }

    #[test]
    fn interleave_round_trips_extremes() {
        let buffer = decode_pcm16(&[0x00, 0x40, 0x00, 0xC0, 0xFF, 0x7F], 1, 24000);
        assert_eq!(interleave_i16(&buffer), vec![16384, -16384, 32767]);
    }

    #[test]
    fn base64_decodes_wire_payloads() {
        assert_eq!(decode_base64("AEA=").unwrap(), vec![0x00, 0x40]);
        assert!(decode_base64("not base64!").is_err());
    }
}
