//! Located diagnostics for declarative Mapper specs.
//!
//! A [`SpecError`] carries a stable [`ErrorCode`], a JSON pointer `path` into
//! the spec document, a message, and an optional hint. Validation collects
//! them; the builder turns the first error into a [`MapperError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error_code::ErrorCode;
use crate::errors::MapperError;

/// A problem found in a [`MapperSpec`](super::spec::MapperSpec).
///
/// # Display format
///
/// ```text
/// [configuration] /graph/min_intersection: min_intersection must be >= 1
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{code}] {path}: {message}")]
pub struct SpecError {
    pub code: ErrorCode,

    /// JSON pointer, e.g. `"/cover/n_intervals"`; `""` is the root.
    pub path: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl SpecError {
    pub fn new(code: ErrorCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
            hint: None,
        }
    }

    pub fn configuration(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Configuration, path, message)
    }

    pub fn invalid_cover(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidCoverConfig, path, message)
    }

    /// Attach a hint suggesting how to fix the problem.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<SpecError> for MapperError {
    fn from(err: SpecError) -> Self {
        let message = match &err.hint {
            Some(hint) => format!("{}: {} ({})", err.path, err.message, hint),
            None => format!("{}: {}", err.path, err.message),
        };
        match err.code {
            ErrorCode::InvalidCoverConfig => MapperError::invalid_cover(message),
            ErrorCode::Serialization => MapperError::serialization(message),
            _ => MapperError::configuration(message),
        }
    }
}
