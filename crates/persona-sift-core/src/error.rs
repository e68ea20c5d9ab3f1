//! Error taxonomy for a pipeline run.
//!
//! [`PipelineIssue`]s are isolated, per-document or per-section failures:
//! they are collected and reported, and the run continues. A
//! [`PipelineError`] aborts the run.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::models::ExtractionOrder;

/// Pipeline stage an issue originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Embedding,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extraction => write!(f, "extraction"),
            Stage::Embedding => write!(f, "embedding"),
        }
    }
}

/// A non-fatal failure; the affected document or section is skipped.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineIssue {
    /// The document produced no text runs (or could not be decoded).
    #[error("{document}: no text runs extracted{}", .reason.as_ref().map(|r| format!(" ({r})")).unwrap_or_default())]
    ExtractionEmpty {
        document: String,
        reason: Option<String>,
    },
    /// A section could not be embedded and was left out of the ranking.
    #[error("{document}: section {order} could not be embedded: {message}")]
    EmbeddingFailure {
        document: String,
        order: ExtractionOrder,
        message: String,
    },
}

impl PipelineIssue {
    pub fn document(&self) -> &str {
        match self {
            PipelineIssue::ExtractionEmpty { document, .. } => document,
            PipelineIssue::EmbeddingFailure { document, .. } => document,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineIssue::ExtractionEmpty { .. } => Stage::Extraction,
            PipelineIssue::EmbeddingFailure { .. } => Stage::Embedding,
        }
    }
}

/// A failure that makes a meaningful ranking impossible.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("query could not be embedded: {0:#}")]
    QueryEncoding(anyhow::Error),
    #[error("embedding provider returned {got} vectors for the query, expected 1")]
    QueryVectorCount { got: usize },
    #[error("constraint vocabulary failed to compile: {0}")]
    Guardrail(#[from] regex::Error),
}
