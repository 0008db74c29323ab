//! Audio data chunk with metadata.

use std::sync::Arc;
use std::time::Duration;

/// A block of samples leaving the pipeline, with timing information.
///
/// Samples are stored in an `Arc<Vec<f32>>` so a chunk can be handed to
/// several consumers without copying.
///
/// # Example
///
/// ```
/// use audio_pipe::AudioChunk;
/// use std::time::Duration;
///
/// let chunk = AudioChunk::new(vec![0.0; 800], Duration::ZERO, 8000);
/// assert_eq!(chunk.duration(), Duration::from_millis(100));
///
/// let shared = chunk.clone(); // shares sample data
/// assert_eq!(shared.len(), 800);
/// ```
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono samples, nominally in `[-1.0, 1.0]`.
    pub samples: Arc<Vec<f32>>,

    /// Position of the first sample, measured from the first chunk produced
    /// by the same sink.
    pub timestamp: Duration,

    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Creates a new `AudioChunk`.
    pub fn new(samples: Vec<f32>, timestamp: Duration, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            timestamp,
            sample_rate,
        }
    }

    /// Returns the duration of this chunk.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if this chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
