//! Sample conversion from device-native formats to 16-bit signed PCM
//!
//! The capture callback hands us whatever the device produces (f32, i16,
//! u16). Everything is normalized to f32 first, then saturated into the
//! i16 range. Conversion is pure and order-preserving.

/// Convert a normalized f32 sample (nominally [-1.0, 1.0]) to i16.
///
/// Full scale maps to the full representable range: 1.0 becomes 32767 and
/// -1.0 becomes -32768. Out-of-range input saturates rather than wrapping.
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Convert any cpal sample type to i16.
pub fn convert_sample<T: cpal::Sample<Float = f32>>(sample: T) -> i16 {
    sample_to_i16(sample.to_float_sample())
}

/// Convert a whole callback chunk, preserving order.
pub fn convert_chunk<T: cpal::Sample<Float = f32>>(data: &[T]) -> Vec<i16> {
    data.iter().map(|&s| convert_sample(s)).collect()
}
