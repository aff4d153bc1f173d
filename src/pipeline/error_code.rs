//! Stable error codes shared by every [`MapperError`](crate::MapperError).
//!
//! Codes serialize as snake_case strings and never change meaning between
//! releases, so callers can match on them instead of parsing messages.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The filter function failed on a row.
    FilterEvaluation,
    /// Cover parameters are malformed.
    InvalidCoverConfig,
    /// Clustering failed on a region.
    ClusterExecution,
    /// Incompatible or invalid pipeline configuration.
    Configuration,
    /// JSON (de)serialization failed.
    Serialization,
    /// Internal invariant violation.
    Internal,
}

impl ErrorCode {
    /// The wire name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FilterEvaluation => "filter_evaluation",
            Self::InvalidCoverConfig => "invalid_cover_config",
            Self::ClusterExecution => "cluster_execution",
            Self::Configuration => "configuration",
            Self::Serialization => "serialization",
            Self::Internal => "internal",
        }
    }

    /// Whether the pipeline can be configured to continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ClusterExecution)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
