//! Assembly of a recorded capture session into a single encoded clip.

use bytes::Bytes;

/// An encoded audio clip ready for the transcription upload.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub data: Bytes,
    pub mime_type: &'static str,
}

/// Wrap captured interleaved i16 PCM into a WAV (PCM16LE) container.
pub fn wav_clip(samples: &[i16], sample_rate: u32, channels: u16) -> AudioClip {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + samples.len() * 2);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * channels as u32 * 2;
    out.extend_from_slice(&byte_rate.to_le_bytes());
    let block_align = channels * 2;
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }

    AudioClip {
        data: Bytes::from(out),
        mime_type: "audio/wav",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_describes_the_payload() {
        let samples: Vec<i16> = vec![0, 16384, -16384, 32767];
        let clip = wav_clip(&samples, 16000, 1);
        let data = &clip.data;

        assert_eq!(clip.mime_type, "audio/wav");
        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(&data[8..12], b"WAVE");
        assert_eq!(&data[12..16], b"fmt ");
        assert_eq!(&data[36..40], b"data");
        // data chunk size = 4 samples * 2 bytes
        assert_eq!(u32::from_le_bytes(data[40..44].try_into().unwrap()), 8);
        // sample rate
        assert_eq!(u32::from_le_bytes(data[24..28].try_into().unwrap()), 16000);
        // first payload sample is little-endian 16384
        assert_eq!(&data[46..48], &[0x00, 0x40]);
        assert_eq!(data.len(), 44 + 8);
    }
}
