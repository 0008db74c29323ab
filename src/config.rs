//! Configuration types for pipelines and codecs.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::AudioError;

/// Sizing parameters shared by the pipeline nodes.
///
/// Use [`PipelineConfig::default()`] for the usual 8 kHz radio setup, or
/// customize as needed.
///
/// # Example
///
/// ```
/// use audio_pipe::PipelineConfig;
///
/// let config = PipelineConfig {
///     sample_rate: 16000,
///     ..Default::default()
/// };
/// assert_eq!(config.fifo_size(), 16000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Internal sample rate in Hz.
    ///
    /// Default: 8000
    pub sample_rate: u32,

    /// FIFO capacity, in milliseconds of audio.
    ///
    /// Default: 1000ms
    pub fifo_ms: u32,

    /// Amount of audio a FIFO collects before it starts writing, in
    /// milliseconds. Zero disables prebuffering.
    ///
    /// Default: 0
    pub prebuf_ms: u32,

    /// Output buffer size of processors, in samples.
    ///
    /// Default: 256
    pub processor_buffer: usize,
}

impl PipelineConfig {
    /// FIFO capacity in samples.
    #[must_use]
    pub fn fifo_size(&self) -> usize {
        self.ms_to_samples(self.fifo_ms)
    }

    /// Prebuffer size in samples.
    #[must_use]
    pub fn prebuf_samples(&self) -> usize {
        self.ms_to_samples(self.prebuf_ms)
    }

    /// Checks that every size is usable.
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidConfig("sample rate must be non-zero".into()));
        }
        if self.fifo_size() == 0 {
            return Err(AudioError::InvalidConfig("FIFO size must be non-zero".into()));
        }
        if self.prebuf_samples() > self.fifo_size() {
            return Err(AudioError::InvalidConfig(format!(
                "prebuffer ({}ms) larger than FIFO ({}ms)",
                self.prebuf_ms, self.fifo_ms
            )));
        }
        if self.processor_buffer == 0 {
            return Err(AudioError::InvalidConfig(
                "processor buffer must be non-zero".into(),
            ));
        }
        Ok(())
    }

    fn ms_to_samples(&self, ms: u32) -> usize {
        (u64::from(self.sample_rate) * u64::from(ms) / 1000) as usize
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            fifo_ms: 1000,
            prebuf_ms: 0,
            processor_buffer: 256,
        }
    }
}

/// Free-form `name=value` options passed to codecs.
///
/// Each codec picks the options it understands; the rest are logged and
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecOptions {
    values: BTreeMap<String, String>,
}

impl CodecOptions {
    /// Creates an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Raw value of an option.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Parses an option into `T`.
    ///
    /// Returns `Ok(None)` if the option is not set.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, AudioError> {
        self.get(name)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| AudioError::invalid_option(name, value))
            })
            .transpose()
    }

    /// Iterates the options in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns `true` if no option is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CodecOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
