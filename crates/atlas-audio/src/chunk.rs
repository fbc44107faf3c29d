use std::time::Duration;

/// Wire label for little-endian 16-bit PCM, the only capture format the
/// pipeline produces.
pub const PCM16_FORMAT: &str = "pcm16";

/// One fixed-duration span of captured audio.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Little-endian i16 samples.
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub duration: Duration,
}

impl AudioChunk {
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        let duration = if sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(samples.len() as f64 / f64::from(sample_rate))
        };
        Self {
            data,
            sample_rate,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_encode_little_endian() {
        let chunk = AudioChunk::from_samples(&[1, -2], 16_000);
        assert_eq!(chunk.data, vec![0x01, 0x00, 0xFE, 0xFF]);
    }

    #[test]
    fn duration_follows_sample_count() {
        let chunk = AudioChunk::from_samples(&[0; 16_000], 16_000);
        assert_eq!(chunk.duration, Duration::from_secs(1));
    }
}
