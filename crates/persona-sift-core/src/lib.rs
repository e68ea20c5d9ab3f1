//! # Persona Sift Core
//!
//! Pure pipeline logic for Persona Sift: data models, layout-aware section
//! extraction, embedding-based relevance ranking, and hard-constraint
//! guardrail filtering.
//!
//! This crate performs no file or network I/O. PDF decoding and concrete
//! embedding backends live in the `persona-sift` app crate and are handed
//! in as text runs and an [`embedding::EmbeddingProvider`].

pub mod embedding;
pub mod error;
pub mod extract;
pub mod guardrail;
pub mod models;
pub mod pipeline;
pub mod rank;

#[cfg(test)]
mod testing;
