// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error types for dataset handling and metric tracking

use crate::datasets::BodyId;
use thiserror::Error;

/// Errors raised by the stance store, the splitter and the epoch accumulator.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("stance row {row} references body id {body_id}, which has no article")]
    MissingArticle { body_id: BodyId, row: usize },

    #[error("malformed input in {origin}: {reason}")]
    MalformedInput { origin: String, reason: String },

    #[error("degenerate split: {0}")]
    DegenerateSplit(String),

    #[error("{metric} is undefined: {reason}")]
    UndefinedMetric { metric: String, reason: &'static str },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid accumulator state: {0}")]
    InvalidState(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EvalError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn malformed(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, EvalError>;
