//! The `sift run` command: discover inputs, decode PDFs, run the pipeline,
//! write the report.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, warn};

use persona_sift_core::error::PipelineIssue;
use persona_sift_core::models::DocumentRuns;
use persona_sift_core::pipeline::run_pipeline;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::inputs::{self, PdfInput};
use crate::output::{assemble, write_report, RunReport};
use crate::pdf_runs::read_document;

/// Command-line overrides for a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub request: Option<PathBuf>,
    pub top_k: Option<usize>,
}

/// What a run did, for the summary line.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub documents: usize,
    pub sections: usize,
    pub removed: usize,
    pub emitted: usize,
    pub issues: Vec<PipelineIssue>,
}

pub async fn run(config: &Config, options: RunOptions) -> Result<(RunSummary, RunReport)> {
    let mut config = config.clone();
    if let Some(top_k) = options.top_k {
        config.output.top_k = top_k;
    }
    crate::config::validate(&config)?;

    let input_dir = options.input.unwrap_or_else(|| config.input.dir.clone());
    let output_path = options.output.unwrap_or_else(|| config.output.path.clone());

    let pdfs = inputs::discover_pdfs(
        &input_dir,
        &config.input.include_globs,
        &config.input.exclude_globs,
    )?;
    if pdfs.is_empty() {
        warn!(dir = %input_dir.display(), "no PDFs found");
    }

    let request = match options.request.or_else(|| config.input.request.clone()) {
        Some(path) => Some(path),
        None => inputs::find_request(&input_dir)?,
    };
    let query = match &request {
        Some(path) => inputs::load_request(path)?,
        None => {
            warn!("no request file found; using default persona and task");
            inputs::default_query()
        }
    };
    info!(persona = %query.persona, task = %query.task, documents = pdfs.len(), "starting run");

    let documents = read_all(&pdfs).await;

    let provider = create_provider(&config.embedding)?;
    let guardrail = config.guardrails.guardrail();
    let output = run_pipeline(
        provider.as_ref(),
        &guardrail,
        &query,
        &documents,
        &config.pipeline_settings(),
    )
    .await
    .context("Pipeline failed")?;

    let names: Vec<String> = pdfs.iter().map(|p| p.document.clone()).collect();
    let report = assemble(&output, &names, &config.output, Utc::now());
    write_report(&output_path, &report)?;

    let summary = RunSummary {
        output_path,
        documents: pdfs.len(),
        sections: output.section_count,
        removed: output.removed.len(),
        emitted: report.extracted_sections.len(),
        issues: output.issues,
    };
    info!(
        sections = summary.sections,
        removed = summary.removed,
        emitted = summary.emitted,
        issues = summary.issues.len(),
        "run complete"
    );
    Ok((summary, report))
}

/// Decode every PDF on the blocking pool, collected in input order.
async fn read_all(pdfs: &[PdfInput]) -> Vec<DocumentRuns> {
    let handles: Vec<_> = pdfs
        .iter()
        .map(|pdf| {
            let pdf = pdf.clone();
            tokio::task::spawn_blocking(move || read_document(&pdf.path, &pdf.document))
        })
        .collect();

    let mut documents = Vec::with_capacity(handles.len());
    for (pdf, handle) in pdfs.iter().zip(handles) {
        match handle.await {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                warn!(document = %pdf.document, error = %e, "PDF decoding task failed");
                documents.push(DocumentRuns::failed(&pdf.document, e.to_string()));
            }
        }
    }
    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_with_corrupt_pdf_only() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("input");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("broken.pdf"), b"not a valid pdf").unwrap();
        fs::write(
            input.join("request.json"),
            r#"{"persona":{"role":"Cook"},"job_to_be_done":{"task":"dinner"}}"#,
        )
        .unwrap();

        let options = RunOptions {
            input: Some(input),
            output: Some(tmp.path().join("out.json")),
            ..RunOptions::default()
        };
        let (summary, report) = run(&Config::default(), options).await.unwrap();
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.issues.len(), 1);
        assert_eq!(summary.issues[0].document(), "broken.pdf");
        assert!(report.extracted_sections.is_empty());
        assert_eq!(report.metadata.persona, "Cook");
        assert!(tmp.path().join("out.json").exists());
    }

    #[tokio::test]
    async fn test_run_rejects_zero_top_k_override() {
        let tmp = TempDir::new().unwrap();
        let options = RunOptions {
            input: Some(tmp.path().to_path_buf()),
            top_k: Some(0),
            ..RunOptions::default()
        };
        assert!(run(&Config::default(), options).await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_aborts() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.embedding.provider = "disabled".to_string();
        let options = RunOptions {
            input: Some(tmp.path().to_path_buf()),
            output: Some(tmp.path().join("out.json")),
            ..RunOptions::default()
        };
        let err = run(&config, options).await.unwrap_err();
        assert!(format!("{:#}", err).contains("disabled"));
        assert!(!tmp.path().join("out.json").exists());
    }
}
