//! Core data models shared by every pipeline stage.
//!
//! Runs come in from the PDF collaborator, sections come out of the
//! extractor, and scored sections flow through ranking and filtering.
//! Nothing here is mutated after construction.

use serde::Serialize;
use std::fmt;

/// Embedding produced by an [`EmbeddingProvider`](crate::embedding::EmbeddingProvider).
pub type EmbeddingVector = Vec<f32>;

/// Position of a run on its page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunPosition {
    /// 1-based page number.
    pub page: u32,
    /// Baseline distance from the top of the page, in points.
    pub y: f32,
}

/// An atomic piece of text from the PDF collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRun {
    pub content: String,
    pub font_size: f32,
    pub position: RunPosition,
    pub bold: bool,
}

impl TextRun {
    pub fn new(content: impl Into<String>, font_size: f32, page: u32, y: f32) -> Self {
        Self {
            content: content.into(),
            font_size,
            position: RunPosition { page, y },
            bold: false,
        }
    }

    /// Builder-style setter for the bold flag.
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    /// Whether `other` sits on the same printed line as `self`.
    ///
    /// Two runs share a line when they are on the same page and their
    /// baselines are within a third of the larger font size.
    pub fn same_line(&self, other: &TextRun) -> bool {
        if self.position.page != other.position.page {
            return false;
        }
        let tolerance = self.font_size.max(other.font_size).max(1.0) / 3.0;
        (self.position.y - other.position.y).abs() <= tolerance
    }
}

/// All runs of one input document, in reading order.
#[derive(Debug, Clone)]
pub struct DocumentRuns {
    /// Document identifier (file name).
    pub document: String,
    pub runs: Vec<TextRun>,
    /// Why the PDF collaborator produced no runs, when it failed.
    pub failure: Option<String>,
}

impl DocumentRuns {
    pub fn new(document: impl Into<String>, runs: Vec<TextRun>) -> Self {
        Self {
            document: document.into(),
            runs,
            failure: None,
        }
    }

    /// A document the PDF collaborator could not decode.
    pub fn failed(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            runs: Vec::new(),
            failure: Some(reason.into()),
        }
    }
}

/// Stable extraction order of a section.
///
/// Ordered by document input position first, then by position within the
/// document, so merging per-document output in input order yields a
/// strictly increasing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ExtractionOrder {
    pub document: usize,
    pub position: usize,
}

impl fmt::Display for ExtractionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.document, self.position)
    }
}

/// A heading plus the body text that follows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub heading: String,
    pub body: String,
    pub document: String,
    pub page: u32,
    pub order: ExtractionOrder,
}

impl Section {
    /// Heading and body joined for embedding and constraint matching.
    pub fn combined_text(&self) -> String {
        match (self.heading.is_empty(), self.body.is_empty()) {
            (true, _) => self.body.clone(),
            (false, true) => self.heading.clone(),
            (false, false) => format!("{}\n{}", self.heading, self.body),
        }
    }
}

/// A section with its similarity to the query and its 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSection {
    pub section: Section,
    pub score: f32,
    pub rank: usize,
}

/// The persona + task a run is evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub persona: String,
    pub task: String,
}

impl Query {
    pub fn new(persona: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            task: task.into(),
        }
    }

    /// The string handed to the embedding provider and the guardrail.
    pub fn text(&self) -> String {
        format!("Persona: {}. Task: {}", self.persona, self.task)
    }
}
