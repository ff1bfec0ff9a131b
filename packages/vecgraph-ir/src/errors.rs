//! Error types for vecgraph-ir
//!
//! Provides unified error handling across the crate. Queries on statements
//! unknown to the ICFG/PDG return empty collections instead of errors.

use thiserror::Error;

/// Main error type for vecgraph-ir operations
#[derive(Debug, Error)]
pub enum VecgraphError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Analysis error
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl VecgraphError {
    /// Create a parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        VecgraphError::Parse(msg.into())
    }

    /// Create an internal error (alias for analysis error)
    pub fn internal(msg: impl Into<String>) -> Self {
        VecgraphError::Analysis(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        VecgraphError::Config(msg.into())
    }
}

/// Result type alias for vecgraph operations
pub type Result<T> = std::result::Result<T, VecgraphError>;
