//! Conversions between `f32` samples, 16-bit PCM and decibels.

/// Scales a sample in `[-1.0, 1.0]` to 16-bit PCM.
///
/// Out-of-range input saturates. The scale factor is 32767, so the range is
/// symmetric and -1.0 becomes -32767.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Scales a 16-bit PCM sample to `[-1.0, 1.0)`.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// [`f32_to_i16`] over a whole block.
pub fn f32_slice_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().copied().map(f32_to_i16).collect()
}

/// Converts a level in dB to a linear gain factor.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Converts a linear gain factor to dB. Zero maps to negative infinity.
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.abs().log10()
}
