/// Sample rate of the TTS backend's PCM output.
pub const SAMPLE_RATE: u32 = 24_000;

/// Decode little-endian signed 16-bit mono PCM into normalized f32
/// samples. Negative samples scale by 1/0x8000 and positive by 1/0x7fff
/// so both ends of the range map to exactly -1.0/1.0. A trailing odd byte
/// is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            if sample < 0 {
                f32::from(sample) / 0x8000 as f32
            } else {
                f32::from(sample) / 0x7fff as f32
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_samples() {
        let bytes = [
            0x00, 0x00, // 0
            0xff, 0x7f, // i16::MAX
            0x00, 0x80, // i16::MIN
            0x00, 0x40, // 0x4000
        ];
        let samples = decode_pcm16(&bytes);
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 1.0);
        assert_eq!(samples[2], -1.0);
        assert!((samples[3] - 0x4000 as f32 / 0x7fff as f32).abs() < 1e-6);
    }

    #[test]
    fn trailing_odd_byte_is_ignored() {
        let samples = decode_pcm16(&[0x00, 0x00, 0xab]);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn empty_input_decodes_to_nothing() {
        assert!(decode_pcm16(&[]).is_empty());
    }
}
