//! The extract → rank → filter pipeline.
//!
//! [`run_pipeline`] is the single entry point the application calls. It
//! operates entirely on in-memory runs and an injected
//! [`EmbeddingProvider`]; reading PDFs and writing output are the caller's
//! job.
//!
//! # Stages
//!
//! 1. Embed the query. Failure here aborts the run.
//! 2. Compile the guardrail predicate from the query.
//! 3. Extract sections from every document in input order. Documents
//!    without runs are reported and skipped.
//! 4. Rank all sections against the query vector.
//! 5. Remove sections that violate a detected constraint.

use tracing::{debug, info, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{PipelineError, PipelineIssue};
use crate::extract::{extract_sections, ExtractionParams};
use crate::guardrail::{filter, DetectedConstraint, Guardrail, Removal};
use crate::models::{DocumentRuns, Query, ScoredSection, Section};
use crate::rank::{QueryEncoder, Ranker};

/// Tuning knobs for one run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub extraction: ExtractionParams,
    /// Section texts per embedding provider call.
    pub batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            extraction: ExtractionParams::default(),
            batch_size: 64,
        }
    }
}

/// Everything a run produced, for the result assembler.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub query: Query,
    pub constraints: Vec<DetectedConstraint>,
    /// Ranked sections that passed the guardrail, best first.
    pub results: Vec<ScoredSection>,
    pub removed: Vec<Removal>,
    pub issues: Vec<PipelineIssue>,
    /// Sections extracted before ranking.
    pub section_count: usize,
}

/// Extract sections from every document, in document input order.
///
/// Each document's position in `documents` becomes the major component of
/// its sections' extraction order.
pub fn extract_all(
    documents: &[DocumentRuns],
    params: &ExtractionParams,
) -> (Vec<Section>, Vec<PipelineIssue>) {
    let mut sections = Vec::new();
    let mut issues = Vec::new();

    for (index, doc) in documents.iter().enumerate() {
        let extracted = extract_sections(&doc.document, index, &doc.runs, params);
        if extracted.is_empty() && (doc.failure.is_some() || !has_text(doc)) {
            let issue = PipelineIssue::ExtractionEmpty {
                document: doc.document.clone(),
                reason: doc.failure.clone(),
            };
            warn!(document = %doc.document, "{}", issue);
            issues.push(issue);
            continue;
        }
        debug!(
            document = %doc.document,
            runs = doc.runs.len(),
            sections = extracted.len(),
            "extracted sections"
        );
        sections.extend(extracted);
    }

    (sections, issues)
}

fn has_text(doc: &DocumentRuns) -> bool {
    doc.runs.iter().any(|r| !r.content.trim().is_empty())
}

/// Run the full pipeline for `query` over `documents`.
///
/// # Errors
///
/// Only failures that make ranking meaningless are returned: the query
/// cannot be embedded, or the constraint vocabulary does not compile.
/// Per-document and per-section failures are collected in
/// [`PipelineOutput::issues`].
pub async fn run_pipeline(
    provider: &dyn EmbeddingProvider,
    guardrail: &Guardrail,
    query: &Query,
    documents: &[DocumentRuns],
    settings: &PipelineSettings,
) -> Result<PipelineOutput, PipelineError> {
    let mut encoder = QueryEncoder::new(provider);
    let query_vec = encoder.encode(query).await?;

    let predicate = guardrail.detect(&query.text())?;
    for constraint in predicate.constraints() {
        info!(
            constraint = %constraint.name,
            trigger = %constraint.trigger,
            terms = constraint.terms.len(),
            "hard constraint detected"
        );
    }

    let (sections, mut issues) = extract_all(documents, &settings.extraction);
    let section_count = sections.len();

    let ranker = Ranker::new(provider, settings.batch_size);
    let ranked = ranker.rank(&query_vec, &sections).await;
    issues.extend(ranked.issues);

    let filtered = filter(&predicate, ranked.ranked);
    for removal in &filtered.removed {
        debug!(
            document = %removal.document,
            rank = removal.rank,
            constraint = %removal.violation.constraint,
            matched = %removal.violation.matched,
            "section removed by guardrail"
        );
    }
    if filtered.kept.is_empty() {
        info!(sections = section_count, "no sections survived ranking and filtering");
    }

    Ok(PipelineOutput {
        query: query.clone(),
        constraints: predicate.constraints().to_vec(),
        results: filtered.kept,
        removed: filtered.removed,
        issues,
        section_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TextRun;
    use crate::testing::VocabProvider;

    const VOCAB: &[&str] = &["vegetable", "chicken", "grilled", "picnic", "salad", "menu"];

    fn picnic_doc() -> DocumentRuns {
        DocumentRuns::new(
            "picnic.pdf",
            vec![
                TextRun::new("Chicken Skewers", 16.0, 1, 72.0),
                TextRun::new(
                    "Grilled chicken for a picnic menu with grilled sides and picnic salad",
                    10.0,
                    1,
                    96.0,
                ),
                TextRun::new("Vegetable Platter", 16.0, 1, 200.0),
                TextRun::new(
                    "Grilled vegetables, a simple choice for outdoor eating in summer",
                    10.0,
                    1,
                    224.0,
                ),
            ],
        )
    }

    #[tokio::test]
    async fn test_picnic_end_to_end() {
        let provider = VocabProvider::new(VOCAB);
        let query = Query::new("Caterer", "vegetarian picnic menu with grilled salad");
        let out = run_pipeline(
            &provider,
            &Guardrail::builtin(),
            &query,
            &[picnic_doc()],
            &PipelineSettings::default(),
        )
        .await
        .unwrap();

        assert_eq!(out.section_count, 2);
        assert_eq!(out.removed.len(), 1);
        assert_eq!(out.removed[0].rank, 1);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].section.heading, "Vegetable Platter");
        assert_eq!(out.results[0].rank, 2);
        assert_eq!(out.constraints[0].name, "vegetarian");
    }

    #[tokio::test]
    async fn test_empty_document_is_not_fatal() {
        let provider = VocabProvider::new(VOCAB);
        let docs = vec![
            DocumentRuns::new("empty.pdf", Vec::new()),
            DocumentRuns::failed("broken.pdf", "invalid file header"),
            picnic_doc(),
        ];
        let out = run_pipeline(
            &provider,
            &Guardrail::disabled(),
            &Query::new("Caterer", "picnic"),
            &docs,
            &PipelineSettings::default(),
        )
        .await
        .unwrap();

        assert_eq!(out.results.len(), 2);
        assert_eq!(out.issues.len(), 2);
        assert_eq!(out.issues[0].document(), "empty.pdf");
        assert_eq!(out.issues[1].document(), "broken.pdf");
        // picnic.pdf is the third input document
        assert!(out.results.iter().all(|r| r.section.order.document == 2));
    }

    #[tokio::test]
    async fn test_query_failure_aborts() {
        let provider = VocabProvider::new(VOCAB);
        let err = run_pipeline(
            &provider,
            &Guardrail::builtin(),
            &Query::new("FAIL", "picnic"),
            &[picnic_doc()],
            &PipelineSettings::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::QueryEncoding(_)));
    }

    #[tokio::test]
    async fn test_idempotent() {
        let provider = VocabProvider::new(VOCAB);
        let query = Query::new("Caterer", "grilled salad");
        let docs = vec![picnic_doc(), picnic_doc()];
        let settings = PipelineSettings::default();

        let a = run_pipeline(&provider, &Guardrail::builtin(), &query, &docs, &settings)
            .await
            .unwrap();
        let b = run_pipeline(&provider, &Guardrail::builtin(), &query, &docs, &settings)
            .await
            .unwrap();
        assert_eq!(a.results, b.results);
        assert_eq!(a.results.len(), 4);
        // identical documents tie; the earlier document wins
        assert_eq!(a.results[0].section.order.document, 0);
        assert_eq!(a.results[1].section.order.document, 1);
    }

    #[tokio::test]
    async fn test_everything_filtered_returns_empty() {
        let provider = VocabProvider::new(VOCAB);
        let doc = DocumentRuns::new(
            "meat.pdf",
            vec![TextRun::new("Roast chicken with lemon", 10.0, 1, 72.0)],
        );
        let out = run_pipeline(
            &provider,
            &Guardrail::builtin(),
            &Query::new("Cook", "vegetarian dinner"),
            &[doc],
            &PipelineSettings::default(),
        )
        .await
        .unwrap();
        assert!(out.results.is_empty());
        assert_eq!(out.removed.len(), 1);
        assert!(out.issues.is_empty());
    }
}
