//! Error types for rapid_mapper
//!
//! This module defines the error types used throughout the library.
//! Every error carries enough context (row index, region label, point count)
//! to localize the fault without re-running in verbose mode.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::error_code::ErrorCode;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MapperError>;

/// Main error type for rapid_mapper
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapperError {
    /// The filter function failed (or produced unusable output) on a row
    #[error("Filter evaluation failed on row {row}: {message}")]
    FilterEvaluation { row: usize, message: String },

    /// Cover parameters are malformed
    #[error("Invalid cover configuration: {message}")]
    InvalidCoverConfig { message: String },

    /// Clustering failed on a region
    #[error(transparent)]
    ClusterExecution(#[from] ClusterExecutionError),

    /// Pipeline configuration is invalid or inconsistent between fit and transform
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Internal invariant violation (should not occur in normal usage)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MapperError {
    /// Create a filter evaluation error for the given row
    pub fn filter_evaluation(row: usize, message: impl Into<String>) -> Self {
        Self::FilterEvaluation {
            row,
            message: message.into(),
        }
    }

    /// Create an invalid cover config error
    pub fn invalid_cover(message: impl Into<String>) -> Self {
        Self::InvalidCoverConfig {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable code for programmatic matching
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::FilterEvaluation { .. } => ErrorCode::FilterEvaluation,
            Self::InvalidCoverConfig { .. } => ErrorCode::InvalidCoverConfig,
            Self::ClusterExecution(_) => ErrorCode::ClusterExecution,
            Self::Configuration { .. } => ErrorCode::Configuration,
            Self::Serialization { .. } => ErrorCode::Serialization,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Check if this error is a per-region clustering failure
    /// (which the pipeline may be configured to skip)
    pub fn is_cluster_failure(&self) -> bool {
        matches!(self, Self::ClusterExecution(_))
    }
}

impl From<serde_json::Error> for MapperError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// What went wrong while clustering one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterFailureKind {
    /// The clustering procedure returned an error.
    Failed,
    /// The procedure returned a partition that does not match its input.
    MalformedPartition,
    /// The procedure ran longer than the configured per-region budget.
    Timeout,
}

impl ClusterFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::MalformedPartition => "malformed_partition",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ClusterFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A clustering failure attached to a single region.
///
/// # Display format
///
/// ```text
/// Clustering failed on region 3 (12 points, failed): eps must be positive
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Clustering failed on region {region_label} ({n_points} points, {kind}): {message}")]
pub struct ClusterExecutionError {
    /// Label of the region whose clustering failed.
    pub region_label: usize,

    /// Size of the region's preimage.
    pub n_points: usize,

    /// Failure category.
    pub kind: ClusterFailureKind,

    /// Human-readable description of the failure.
    pub message: String,
}

impl ClusterExecutionError {
    pub fn new(
        region_label: usize,
        n_points: usize,
        kind: ClusterFailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            region_label,
            n_points,
            kind,
            message: message.into(),
        }
    }
}
