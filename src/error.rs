//! Error types for audio-pipe.
//!
//! Errors are split into two categories:
//! - **Setup errors** ([`AudioError`]): building a node or a codec failed
//! - **Flow control**: registration results are plain `bool`s and contract
//!   violations (a sink accepting more than offered) are panics

use std::path::PathBuf;

/// Errors raised while constructing or configuring pipeline components.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// No codec with this name is known.
    #[error("unknown codec: {name}")]
    UnknownCodec {
        /// Name that was looked up.
        name: String,
    },

    /// The codec is known but needs an external library that was not
    /// registered.
    #[error("codec {name} is not available (no constructor registered)")]
    CodecUnavailable {
        /// Name of the codec.
        name: String,
    },

    /// A codec option had a value the codec cannot use.
    #[error("invalid value for codec option '{option}': {value}")]
    InvalidOption {
        /// Option name.
        option: String,
        /// The rejected value.
        value: String,
    },

    /// A filter description string could not be parsed.
    #[error("invalid filter spec '{spec}': {reason}")]
    InvalidFilterSpec {
        /// The description that failed to parse.
        spec: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// File I/O error.
    #[error("file error: {path}: {source}")]
    FileError {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl AudioError {
    /// Creates a filter spec error.
    pub fn filter_spec(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilterSpec {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid option error.
    pub fn invalid_option(option: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            value: value.into(),
        }
    }

    /// Creates a file error for the given path.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileError {
            path: path.into(),
            source,
        }
    }
}
