// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Kompakt.

use thiserror::Error;

/// Top-level error type for all Kompakt operations.
#[derive(Debug, Error)]
pub enum KompaktError {
    // -- Input --
    #[error("input is not a usable document: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -- Candidate-scoped --
    #[error("page rendering failed: {0}")]
    Render(String),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("compression backend failed: {0}")]
    Backend(String),

    #[error("candidate failed validation: {0}")]
    Validation(String),

    // -- Background tasks --
    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("task {0} has not finished yet")]
    TaskNotReady(String),

    #[error("task failed: {0}")]
    TaskFailed(String),

    // -- Storage / serialization --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KompaktError {
    /// Whether the error only invalidates the candidate being evaluated.
    ///
    /// The search controller swallows these and moves on to the next ladder
    /// entry; everything else aborts the invocation.
    pub fn is_candidate_scoped(&self) -> bool {
        matches!(
            self,
            Self::Render(_) | Self::Encode(_) | Self::Backend(_) | Self::Validation(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KompaktError>;
