//! Result assembler: pipeline output → JSON report.
//!
//! The report keeps the ranker's `importance_rank` for every emitted
//! section, so ranks can have gaps where the guardrail removed sections.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use persona_sift_core::embedding::truncate_for_embedding;
use persona_sift_core::pipeline::PipelineOutput;

use crate::config::OutputConfig;

/// Title reported for text that precedes a document's first heading.
pub const UNTITLED_SECTION: &str = "General Information";

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: Metadata,
    pub extracted_sections: Vec<ExtractedSection>,
    pub subsection_analysis: Vec<SubsectionAnalysis>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub input_documents: Vec<String>,
    pub persona: String,
    pub job_to_be_done: String,
    pub processing_timestamp: DateTime<Utc>,
    /// Hard constraints the guardrail enforced.
    pub constraints: Vec<ConstraintSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstraintSummary {
    pub name: String,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedSection {
    pub document: String,
    pub section_title: String,
    pub importance_rank: usize,
    pub page_number: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubsectionAnalysis {
    pub document: String,
    pub refined_text: String,
    pub page_number: u32,
}

/// Build the report from the surviving ranked sections.
///
/// Untitled sections are reported as [`UNTITLED_SECTION`]. Sections titled
/// with one of `drop_titles` (case-insensitive) are skipped, then at most
/// `top_k` are emitted.
pub fn assemble(
    output: &PipelineOutput,
    input_documents: &[String],
    settings: &OutputConfig,
    timestamp: DateTime<Utc>,
) -> RunReport {
    let mut input_documents = input_documents.to_vec();
    input_documents.sort();

    let selected: Vec<_> = output
        .results
        .iter()
        .filter(|scored| {
            !is_dropped_title(section_title(&scored.section.heading), &settings.drop_titles)
        })
        .take(settings.top_k)
        .collect();

    let extracted_sections = selected
        .iter()
        .map(|scored| ExtractedSection {
            document: scored.section.document.clone(),
            section_title: section_title(&scored.section.heading).to_string(),
            importance_rank: scored.rank,
            page_number: scored.section.page,
        })
        .collect();

    let subsection_analysis = selected
        .iter()
        .map(|scored| SubsectionAnalysis {
            document: scored.section.document.clone(),
            refined_text: refine(&scored.section.body, settings.snippet_chars),
            page_number: scored.section.page,
        })
        .collect();

    RunReport {
        metadata: Metadata {
            input_documents,
            persona: output.query.persona.clone(),
            job_to_be_done: output.query.task.clone(),
            processing_timestamp: timestamp,
            constraints: output
                .constraints
                .iter()
                .map(|c| ConstraintSummary {
                    name: c.name.clone(),
                    terms: c.terms.clone(),
                })
                .collect(),
        },
        extracted_sections,
        subsection_analysis,
    }
}

fn section_title(heading: &str) -> &str {
    let heading = heading.trim();
    if heading.is_empty() {
        UNTITLED_SECTION
    } else {
        heading
    }
}

fn is_dropped_title(heading: &str, drop_titles: &[String]) -> bool {
    let heading = heading.trim();
    drop_titles
        .iter()
        .any(|t| t.trim().eq_ignore_ascii_case(heading))
}

fn refine(body: &str, snippet_chars: usize) -> String {
    let body = body.trim();
    if snippet_chars == 0 {
        body.to_string()
    } else {
        truncate_for_embedding(body, snippet_chars).to_string()
    }
}

/// Write the report as pretty JSON, creating parent directories.
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;
    Ok(())
}
