//! Sample transforms to run inside an [`AudioProcessor`](crate::AudioProcessor).
//!
//! Each type here implements [`SampleProcessor`](crate::SampleProcessor) and
//! does nothing about flow control itself:
//!
//! ```
//! use audio_pipe::dsp::Amplifier;
//! use audio_pipe::AudioProcessor;
//!
//! let gain = AudioProcessor::new(Amplifier::new(-6.0));
//! gain.processor().set_gain_db(3.0);
//! ```

mod amp;
mod clipper;
mod filter;
mod rate;

pub use amp::Amplifier;
pub use clipper::Clipper;
pub use filter::{Biquad, FilterKind};
pub use rate::{Decimator, Interpolator};
