use crate::format::{db_to_gain, gain_to_db};
use crate::pipeline::SampleProcessor;

/// Scales samples by a gain given in dB.
#[derive(Debug, Clone, PartialEq)]
pub struct Amplifier {
    gain_db: f32,
    factor: f32,
}

impl Amplifier {
    /// Creates an amplifier with the given gain.
    pub fn new(gain_db: f32) -> Self {
        Self {
            gain_db,
            factor: db_to_gain(gain_db),
        }
    }

    /// Creates an amplifier from a linear factor.
    pub fn from_factor(factor: f32) -> Self {
        Self {
            gain_db: gain_to_db(factor),
            factor,
        }
    }

    /// Changes the gain.
    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain_db = gain_db;
        self.factor = db_to_gain(gain_db);
    }

    /// Current gain in dB.
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }
}

impl Default for Amplifier {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl SampleProcessor for Amplifier {
    fn process(&mut self, dst: &mut [f32], src: &[f32]) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s * self.factor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_gain() {
        let mut amp = Amplifier::default();
        let mut out = [0.0; 3];
        amp.process(&mut out, &[0.1, -0.2, 0.3]);
        assert_eq!(out, [0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_minus_six_db_halves() {
        let mut amp = Amplifier::new(-6.0);
        let mut out = [0.0; 1];
        amp.process(&mut out, &[1.0]);
        assert!((out[0] - 0.501).abs() < 0.001);

        amp.set_gain_db(20.0);
        amp.process(&mut out, &[0.05]);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert_eq!(amp.gain_db(), 20.0);
    }

    #[test]
    fn test_from_factor() {
        let mut amp = Amplifier::from_factor(0.25);
        assert!((amp.gain_db() + 12.04).abs() < 0.01);
        let mut out = [0.0; 2];
        amp.process(&mut out, &[1.0, -0.5]);
        assert_eq!(out, [0.25, -0.125]);
    }
}
