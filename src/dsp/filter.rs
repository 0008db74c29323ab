//! Biquad IIR filters and their text description.
//!
//! A filter can be described by a short string, which makes it easy to put
//! in a configuration file:
//!
//! ```text
//! spec   := stage ("x" stage)* [":" gain_db]
//! stage  := ("Lp" | "Hp" | "Bp") "Bq" [sections] "/" freq ["-" freq]
//! ```
//!
//! `LpBq/3000` is a single low-pass section at 3 kHz, `HpBq2/300` two
//! cascaded high-pass sections at 300 Hz. A band-pass takes either a centre
//! frequency or a `low-high` range. Stages joined with `x` are cascaded, and
//! a trailing `:gain` sets the output gain in dB:
//! `HpBq2/300xLpBq2/3400:-3`.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use crate::error::AudioError;
use crate::format::db_to_gain;
use crate::pipeline::SampleProcessor;

/// Response of a biquad section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Passes frequencies below the corner.
    LowPass,
    /// Passes frequencies above the corner.
    HighPass,
    /// Passes frequencies around the centre, 0 dB peak gain.
    BandPass,
}

/// One second-order section, transposed direct form II.
#[derive(Debug, Clone, PartialEq)]
struct Section {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Section {
    fn design(kind: FilterKind, sample_rate: u32, freq: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * freq / f64::from(sample_rate);
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);

        let (b0, b1, b2) = match kind {
            FilterKind::LowPass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
            FilterKind::HighPass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
            FilterKind::BandPass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    fn tick(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// A cascade of RBJ biquad sections with an output gain.
///
/// # Example
///
/// ```
/// use audio_pipe::dsp::Biquad;
/// use audio_pipe::AudioProcessor;
///
/// let voice_band = Biquad::parse("HpBq2/300xLpBq2/3400", 8000)?;
/// assert_eq!(voice_band.section_count(), 4);
///
/// let _band_filter = AudioProcessor::new(voice_band);
/// # Ok::<(), audio_pipe::AudioError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Biquad {
    sections: Vec<Section>,
    output_gain: f32,
}

impl Biquad {
    /// A single low-pass section with Butterworth Q.
    pub fn low_pass(sample_rate: u32, freq: f32) -> Result<Self, AudioError> {
        Self::single(FilterKind::LowPass, sample_rate, freq, FRAC_1_SQRT_2)
    }

    /// A single high-pass section with Butterworth Q.
    pub fn high_pass(sample_rate: u32, freq: f32) -> Result<Self, AudioError> {
        Self::single(FilterKind::HighPass, sample_rate, freq, FRAC_1_SQRT_2)
    }

    /// A single band-pass section covering `low..high`.
    pub fn band_pass(sample_rate: u32, low: f32, high: f32) -> Result<Self, AudioError> {
        let spec = format!("BpBq/{low}-{high}");
        Self::parse(&spec, sample_rate)
    }

    /// Builds a filter from its text description.
    pub fn parse(spec: &str, sample_rate: u32) -> Result<Self, AudioError> {
        let err = |reason: String| AudioError::filter_spec(spec, reason);

        let (chain, gain_db) = match spec.split_once(':') {
            Some((chain, gain)) => {
                let gain_db = gain
                    .trim()
                    .parse::<f32>()
                    .map_err(|_| err(format!("bad output gain '{gain}'")))?;
                (chain, gain_db)
            }
            None => (spec, 0.0),
        };

        let mut sections = Vec::new();
        for stage in chain.split('x') {
            parse_stage(stage.trim(), sample_rate, &mut sections).map_err(err)?;
        }

        tracing::debug!(spec, sections = sections.len(), "filter created");
        Ok(Self {
            sections,
            output_gain: db_to_gain(gain_db),
        })
    }

    fn single(
        kind: FilterKind,
        sample_rate: u32,
        freq: f32,
        q: f64,
    ) -> Result<Self, AudioError> {
        let freq = f64::from(freq);
        check_freq(freq, sample_rate)
            .map_err(|reason| AudioError::filter_spec(format!("{kind:?}/{freq}"), reason))?;
        Ok(Self {
            sections: vec![Section::design(kind, sample_rate, freq, q)],
            output_gain: 1.0,
        })
    }

    /// Appends the sections of `other` after the sections of `self`. The
    /// output gains multiply.
    #[must_use]
    pub fn cascade(mut self, other: Biquad) -> Self {
        self.sections.extend(other.sections);
        self.output_gain *= other.output_gain;
        self
    }

    /// Sets the gain applied after the last section.
    pub fn set_output_gain(&mut self, gain_db: f32) {
        self.output_gain = db_to_gain(gain_db);
    }

    /// Number of second-order sections.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Clears the filter state.
    pub fn reset(&mut self) {
        self.sections.iter_mut().for_each(Section::reset);
    }
}

impl SampleProcessor for Biquad {
    fn process(&mut self, dst: &mut [f32], src: &[f32]) {
        for (d, &s) in dst.iter_mut().zip(src) {
            let y = self
                .sections
                .iter_mut()
                .fold(f64::from(s), |x, section| section.tick(x));
            *d = self.output_gain * y as f32;
        }
    }
}

fn parse_stage(stage: &str, sample_rate: u32, sections: &mut Vec<Section>) -> Result<(), String> {
    let (head, freqs) = stage
        .split_once('/')
        .ok_or_else(|| format!("stage '{stage}' has no frequency"))?;

    let kind = match head.get(..2) {
        Some("Lp") => FilterKind::LowPass,
        Some("Hp") => FilterKind::HighPass,
        Some("Bp") => FilterKind::BandPass,
        _ => return Err(format!("unknown filter type in '{stage}'")),
    };
    let order = head[2..]
        .strip_prefix("Bq")
        .ok_or_else(|| format!("unsupported design in '{stage}', only Bq is available"))?;
    let count = if order.is_empty() {
        1
    } else {
        order
            .parse::<usize>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| format!("bad section count '{order}'"))?
    };

    let parse_freq = |text: &str| {
        text.trim()
            .parse::<f64>()
            .map_err(|_| format!("bad frequency '{text}'"))
    };
    let (freq, q) = match (kind, freqs.split_once('-')) {
        (FilterKind::BandPass, Some((low, high))) => {
            let (low, high) = (parse_freq(low)?, parse_freq(high)?);
            if low >= high {
                return Err(format!("empty band {low}-{high}"));
            }
            check_freq(low, sample_rate)?;
            check_freq(high, sample_rate)?;
            let centre = (low * high).sqrt();
            (centre, centre / (high - low))
        }
        (_, Some(_)) => return Err(format!("'{stage}' takes a single frequency")),
        (_, None) => (parse_freq(freqs)?, FRAC_1_SQRT_2),
    };
    check_freq(freq, sample_rate)?;

    sections.extend((0..count).map(|_| Section::design(kind, sample_rate, freq, q)));
    Ok(())
}

fn check_freq(freq: f64, sample_rate: u32) -> Result<(), String> {
    let nyquist = f64::from(sample_rate) / 2.0;
    if freq > 0.0 && freq < nyquist {
        Ok(())
    } else {
        Err(format!("frequency {freq} outside (0, {nyquist})"))
    }
}
