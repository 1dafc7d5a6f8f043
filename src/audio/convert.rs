//! Sample conversion between the capture format and the wire format

/// Divisor mapping the full i16 range onto [-1.0, 1.0)
pub const PCM16_SCALE: f32 = 32768.0;

/// Convert PCM16 samples to normalized f32 samples (`x / 32768.0`)
pub fn normalize(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / PCM16_SCALE).collect()
}

/// Serialize normalized samples as raw f32 in native byte order (no header)
pub fn to_wire_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

/// Serialize PCM16 samples as little-endian bytes
pub fn pcm16_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Decode little-endian PCM16 bytes. A trailing odd byte is ignored.
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Convert a float sample from the device into PCM16, clamping out-of-range input
pub fn f32_to_pcm16(sample: f32) -> i16 {
    (sample * PCM16_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
