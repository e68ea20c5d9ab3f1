//! Deterministic providers for unit tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embedding::EmbeddingProvider;
use crate::models::{EmbeddingVector, ExtractionOrder, Section};

/// Counts occurrences of a fixed vocabulary; one dimension per word.
///
/// Any text containing `FAIL` is rejected, and so is any batch holding
/// such a text.
pub struct VocabProvider {
    vocab: Vec<&'static str>,
    pub calls: AtomicUsize,
}

impl VocabProvider {
    pub fn new(vocab: &[&'static str]) -> Self {
        Self {
            vocab: vocab.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for VocabProvider {
    fn model_name(&self) -> &str {
        "vocab"
    }

    fn dims(&self) -> usize {
        self.vocab.len()
    }

    fn max_input_chars(&self) -> usize {
        10_000
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|t| t.contains("FAIL")) {
            bail!("rejected input");
        }
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                self.vocab
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect()
            })
            .collect())
    }
}

pub fn section(doc_index: usize, position: usize, heading: &str, body: &str) -> Section {
    Section {
        heading: heading.to_string(),
        body: body.to_string(),
        document: format!("doc{}.pdf", doc_index),
        page: 1,
        order: ExtractionOrder {
            document: doc_index,
            position,
        },
    }
}
