//! Audio format conversion utilities.
//!
//! Samples travel through the pipeline as `f32` in `[-1.0, 1.0]`. These
//! helpers convert at the edges, where 16-bit PCM is read or written.

mod convert;

pub use convert::{db_to_gain, f32_slice_to_i16, f32_to_i16, gain_to_db, i16_to_f32};
