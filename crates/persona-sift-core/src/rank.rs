//! Query encoding and relevance ranking.
//!
//! The [`QueryEncoder`] embeds the persona+task query once and keeps the
//! vector for its lifetime. The [`Ranker`] embeds every section, scores it
//! against the query vector with cosine similarity, and returns a total
//! order.
//!
//! # Ordering
//!
//! Sections are sorted by score (desc), then extraction order (asc). Ranks
//! are assigned `1..=N` after sorting. Repeated runs over identical input
//! therefore produce identical output.
//!
//! # Failure Isolation
//!
//! Sections are embedded `batch_size` texts per provider call. When a
//! batch call fails, each text of that batch is retried on its own so
//! a single bad section does not take its neighbours down with it.
//! Sections that still fail are reported as
//! [`PipelineIssue::EmbeddingFailure`] and left out of the ranking.

use tracing::{debug, warn};

use crate::embedding::{cosine_similarity, truncate_for_embedding, EmbeddingProvider};
use crate::error::{PipelineError, PipelineIssue};
use crate::models::{EmbeddingVector, Query, ScoredSection, Section};

/// Embeds the query, once.
pub struct QueryEncoder<'a> {
    provider: &'a dyn EmbeddingProvider,
    cached: Option<(String, EmbeddingVector)>,
}

impl<'a> QueryEncoder<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider) -> Self {
        Self {
            provider,
            cached: None,
        }
    }

    /// Embed `query`, reusing the cached vector for a repeated query.
    ///
    /// # Errors
    ///
    /// Fails with [`PipelineError::QueryEncoding`] when the provider
    /// errors; a run cannot continue without a query vector.
    pub async fn encode(&mut self, query: &Query) -> Result<EmbeddingVector, PipelineError> {
        let text = query.text();
        if let Some((cached_text, vector)) = &self.cached {
            if *cached_text == text {
                return Ok(vector.clone());
            }
        }

        let input = truncate_for_embedding(&text, self.provider.max_input_chars()).to_string();
        let mut vectors = self
            .provider
            .embed(&[input])
            .await
            .map_err(PipelineError::QueryEncoding)?;
        if vectors.len() != 1 {
            return Err(PipelineError::QueryVectorCount { got: vectors.len() });
        }
        let vector = vectors.remove(0);

        self.cached = Some((text, vector.clone()));
        Ok(vector)
    }
}

/// Ranking output: the ordered sections plus any isolated failures.
#[derive(Debug, Clone, Default)]
pub struct RankOutcome {
    pub ranked: Vec<ScoredSection>,
    pub issues: Vec<PipelineIssue>,
}

/// Scores sections against a query vector.
pub struct Ranker<'a> {
    provider: &'a dyn EmbeddingProvider,
    batch_size: usize,
}

impl<'a> Ranker<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Rank `sections` against `query_vec`.
    ///
    /// The input slice is not reordered; a new sequence is returned. Every
    /// section appears in the output exactly once unless its embedding
    /// failed, in which case it appears in [`RankOutcome::issues`].
    pub async fn rank(&self, query_vec: &[f32], sections: &[Section]) -> RankOutcome {
        let max_chars = self.provider.max_input_chars();
        let texts: Vec<String> = sections
            .iter()
            .map(|s| truncate_for_embedding(&s.combined_text(), max_chars).to_string())
            .collect();

        let mut outcome = RankOutcome::default();
        let mut scored: Vec<(f32, &Section)> = Vec::with_capacity(sections.len());

        for (batch_sections, batch_texts) in sections
            .chunks(self.batch_size)
            .zip(texts.chunks(self.batch_size))
        {
            let vectors = self.embed_isolated(batch_texts).await;
            for (section, result) in batch_sections.iter().zip(vectors) {
                let failure = match result {
                    Ok(vector) if vector.len() == query_vec.len() => {
                        let score = cosine_similarity(query_vec, &vector);
                        scored.push((if score.is_nan() { 0.0 } else { score }, section));
                        continue;
                    }
                    Ok(vector) => format!(
                        "dimension mismatch: section has {}, query has {}",
                        vector.len(),
                        query_vec.len()
                    ),
                    Err(message) => message,
                };
                warn!(
                    document = %section.document,
                    order = %section.order,
                    error = %failure,
                    "section excluded from ranking"
                );
                outcome.issues.push(PipelineIssue::EmbeddingFailure {
                    document: section.document.clone(),
                    order: section.order,
                    message: failure,
                });
            }
        }

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.order.cmp(&b.1.order)));

        outcome.ranked = scored
            .into_iter()
            .enumerate()
            .map(|(i, (score, section))| ScoredSection {
                section: section.clone(),
                score,
                rank: i + 1,
            })
            .collect();
        outcome
    }

    /// Embed one batch, falling back to per-text calls when the batch fails.
    async fn embed_isolated(&self, texts: &[String]) -> Vec<Result<EmbeddingVector, String>> {
        let batch_error = match self.provider.embed(texts).await {
            Ok(vectors) if vectors.len() == texts.len() => {
                return vectors.into_iter().map(Ok).collect();
            }
            Ok(vectors) => format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            ),
            Err(e) => format!("{:#}", e),
        };

        if texts.len() == 1 {
            return vec![Err(batch_error)];
        }
        debug!(
            batch = texts.len(),
            error = %batch_error,
            "embedding batch failed, retrying texts individually"
        );

        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            let single = std::slice::from_ref(text);
            let result = match self.provider.embed(single).await {
                Ok(mut vectors) if vectors.len() == 1 => Ok(vectors.remove(0)),
                Ok(vectors) => Err(format!("provider returned {} vectors for 1 text", vectors.len())),
                Err(e) => Err(format!("{:#}", e)),
            };
            results.push(result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{section, VocabProvider};

    const VOCAB: &[&str] = &["vegetable", "chicken", "picnic", "salad", "bread"];

    #[tokio::test]
    async fn test_identical_text_scores_one() {
        let provider = VocabProvider::new(VOCAB);
        let mut encoder = QueryEncoder::new(&provider);
        let query = Query::new("Planner", "vegetable picnic");
        let qv = encoder.encode(&query).await.unwrap();

        let same = section(0, 0, "", &query.text());
        let outcome = Ranker::new(&provider, 8).rank(&qv, &[same]).await;
        assert!((outcome.ranked[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_query_is_cached() {
        let provider = VocabProvider::new(VOCAB);
        let mut encoder = QueryEncoder::new(&provider);
        let query = Query::new("Planner", "salad");
        let a = encoder.encode(&query).await.unwrap();
        let b = encoder.encode(&query).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.calls(), 1);

        encoder.encode(&Query::new("Planner", "bread")).await.unwrap();
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_query_failure_is_fatal() {
        let provider = VocabProvider::new(VOCAB);
        let mut encoder = QueryEncoder::new(&provider);
        let err = encoder.encode(&Query::new("FAIL", "x")).await.unwrap_err();
        assert!(matches!(err, PipelineError::QueryEncoding(_)));
    }

    #[tokio::test]
    async fn test_order_and_tie_break() {
        let provider = VocabProvider::new(VOCAB);
        let qv = vec![1.0, 0.0, 0.0, 0.0, 0.0];
        let sections = vec![
            section(0, 0, "Bread", "bread bread"),
            section(0, 1, "Veg", "vegetable"),
            section(1, 0, "Veg again", "vegetable"),
            section(1, 1, "Mixed", "vegetable chicken"),
        ];
        let outcome = Ranker::new(&provider, 2).rank(&qv, &sections).await;
        let order: Vec<(usize, usize)> = outcome
            .ranked
            .iter()
            .map(|s| (s.section.order.document, s.section.order.position))
            .collect();
        assert_eq!(order, vec![(0, 1), (1, 0), (1, 1), (0, 0)]);
        let ranks: Vec<usize> = outcome.ranked.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert!(outcome.issues.is_empty());
    }

    #[tokio::test]
    async fn test_output_is_permutation_and_stable() {
        let provider = VocabProvider::new(VOCAB);
        let qv = vec![1.0, 1.0, 0.0, 1.0, 0.0];
        let sections: Vec<Section> = (0..12)
            .map(|i| {
                let body = match i % 4 {
                    0 => "vegetable salad",
                    1 => "chicken",
                    2 => "picnic salad",
                    _ => "bread",
                };
                section(i / 6, i % 6, "", body)
            })
            .collect();

        let ranker = Ranker::new(&provider, 5);
        let first = ranker.rank(&qv, &sections).await.ranked;
        let second = ranker.rank(&qv, &sections).await.ranked;
        assert_eq!(first, second);
        assert_eq!(first.len(), sections.len());

        let mut orders: Vec<_> = first.iter().map(|s| s.section.order).collect();
        orders.sort();
        let mut expected: Vec<_> = sections.iter().map(|s| s.order).collect();
        expected.sort();
        assert_eq!(orders, expected);

        let mut resorted = first.clone();
        resorted.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.section.order.cmp(&b.section.order))
        });
        assert_eq!(resorted, first);
    }

    #[tokio::test]
    async fn test_failure_isolated_to_section() {
        let provider = VocabProvider::new(VOCAB);
        let qv = vec![1.0, 0.0, 0.0, 0.0, 0.0];
        let sections = vec![
            section(0, 0, "", "vegetable"),
            section(0, 1, "", "FAIL here"),
            section(0, 2, "", "vegetable salad"),
        ];
        let outcome = Ranker::new(&provider, 3).rank(&qv, &sections).await;
        assert_eq!(outcome.ranked.len(), 2);
        assert_eq!(outcome.issues.len(), 1);
        match &outcome.issues[0] {
            PipelineIssue::EmbeddingFailure { order, .. } => assert_eq!(order.position, 1),
            other => panic!("unexpected issue: {:?}", other),
        }
        // one batch call plus three single retries
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_batching_reduces_calls() {
        let provider = VocabProvider::new(VOCAB);
        let qv = vec![1.0, 0.0, 0.0, 0.0, 0.0];
        let sections: Vec<Section> = (0..10).map(|i| section(0, i, "", "salad")).collect();
        Ranker::new(&provider, 4).rank(&qv, &sections).await;
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_reported() {
        let provider = VocabProvider::new(VOCAB);
        let qv = vec![1.0, 0.0];
        let outcome = Ranker::new(&provider, 4)
            .rank(&qv, &[section(0, 0, "", "salad")])
            .await;
        assert!(outcome.ranked.is_empty());
        assert_eq!(outcome.issues.len(), 1);
    }

    #[tokio::test]
    async fn test_input_not_reordered() {
        let provider = VocabProvider::new(VOCAB);
        let qv = vec![0.0, 1.0, 0.0, 0.0, 0.0];
        let sections = vec![section(0, 0, "", "bread"), section(0, 1, "", "chicken")];
        let before = sections.clone();
        let outcome = Ranker::new(&provider, 4).rank(&qv, &sections).await;
        assert_eq!(sections, before);
        assert_eq!(outcome.ranked[0].section.order.position, 1);
    }
}
