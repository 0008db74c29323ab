//! Integer sample rate conversion.
//!
//! Both converters are deliberately simple: suitable for speech, not for
//! music. Put a low-pass [`Biquad`](super::Biquad) in front of a decimator
//! when the input carries energy above the new Nyquist frequency.

use crate::pipeline::SampleProcessor;

/// Lowers the sample rate by an integer factor, averaging each group of
/// input samples into one output sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Decimator {
    factor: usize,
}

impl Decimator {
    /// Creates a decimator.
    ///
    /// # Panics
    ///
    /// Panics if `factor` is zero.
    pub fn new(factor: usize) -> Self {
        assert!(factor > 0, "decimation factor must be non-zero");
        Self { factor }
    }

    /// The decimation factor.
    pub fn factor(&self) -> usize {
        self.factor
    }
}

impl SampleProcessor for Decimator {
    fn process(&mut self, dst: &mut [f32], src: &[f32]) {
        let scale = 1.0 / self.factor as f32;
        for (d, group) in dst.iter_mut().zip(src.chunks_exact(self.factor)) {
            *d = group.iter().sum::<f32>() * scale;
        }
    }

    fn rate_ratio(&self) -> (usize, usize) {
        (self.factor, 1)
    }
}

/// Raises the sample rate by an integer factor using linear interpolation.
///
/// The last input sample is remembered so that interpolation continues
/// smoothly across blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolator {
    factor: usize,
    prev: f32,
}

impl Interpolator {
    /// Creates an interpolator.
    ///
    /// # Panics
    ///
    /// Panics if `factor` is zero.
    pub fn new(factor: usize) -> Self {
        assert!(factor > 0, "interpolation factor must be non-zero");
        Self { factor, prev: 0.0 }
    }

    /// The interpolation factor.
    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Forgets the remembered sample.
    pub fn reset(&mut self) {
        self.prev = 0.0;
    }
}

impl SampleProcessor for Interpolator {
    fn process(&mut self, dst: &mut [f32], src: &[f32]) {
        let step = 1.0 / self.factor as f32;
        for (out, &sample) in dst.chunks_exact_mut(self.factor).zip(src) {
            for (k, d) in out.iter_mut().enumerate() {
                let frac = (k + 1) as f32 * step;
                *d = self.prev + (sample - self.prev) * frac;
            }
            self.prev = sample;
        }
    }

    fn rate_ratio(&self) -> (usize, usize) {
        (1, self.factor)
    }
}
