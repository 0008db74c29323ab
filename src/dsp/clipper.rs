use crate::pipeline::SampleProcessor;

/// Hard-clips samples symmetrically at a threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Clipper {
    threshold: f32,
}

impl Clipper {
    /// Creates a clipper limiting samples to `[-threshold, threshold]`.
    /// A negative threshold is taken by its magnitude.
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.abs(),
        }
    }

    /// The clipping level.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for Clipper {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl SampleProcessor for Clipper {
    fn process(&mut self, dst: &mut [f32], src: &[f32]) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s.clamp(-self.threshold, self.threshold);
        }
    }
}
