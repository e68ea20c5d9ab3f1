//! Layout-aware section extraction.
//!
//! Groups the text runs of one document into [`Section`]s. A run opens a
//! new section when it is classified as a heading; every other run is body
//! text appended to the open section.
//!
//! # Heading Classification
//!
//! Classification is a pure function of the run, the document's
//! [`FontStats`], and [`ExtractionParams`]:
//!
//! 1. The body baseline is the character-weighted median font size.
//! 2. A run is *prominent* if its size exceeds the baseline by
//!    `heading_margin`, or if it is bold while bold is not the dominant
//!    style of the document and its size is not below the baseline.
//! 3. A prominent run is a heading unless it is longer than
//!    `max_heading_words`, ends with a period, or is on the stop list.
//!
//! # Example
//!
//! ```rust
//! use persona_sift_core::extract::{extract_sections, ExtractionParams};
//! use persona_sift_core::models::TextRun;
//!
//! let runs = vec![
//!     TextRun::new("Ingredients", 18.0, 1, 72.0).bold(),
//!     TextRun::new("flour, sugar, eggs", 10.0, 1, 96.0),
//! ];
//! let sections = extract_sections("cake.pdf", 0, &runs, &ExtractionParams::default());
//! assert_eq!(sections.len(), 1);
//! assert_eq!(sections[0].heading, "Ingredients");
//! ```

use serde::Serialize;

use crate::models::{ExtractionOrder, Section, TextRun};

/// Bold text covering at least this share of a document is treated as
/// body style, not emphasis.
const DOMINANT_BOLD_SHARE: f32 = 0.5;

/// Tunable heading heuristics.
#[derive(Debug, Clone)]
pub struct ExtractionParams {
    /// Points above the body baseline a run must exceed to count as larger.
    pub heading_margin: f32,
    /// Runs with more words than this are never headings.
    pub max_heading_words: usize,
    /// Lowercased texts (trailing `:` stripped) that are never headings.
    pub heading_stop_list: Vec<String>,
    /// Sections with fewer body words are dropped. `0` disables the check.
    pub min_body_words: usize,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            heading_margin: 0.5,
            max_heading_words: 14,
            heading_stop_list: Vec::new(),
            min_body_words: 0,
        }
    }
}

/// Font statistics over every non-blank run of one document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FontStats {
    /// Character-weighted median font size: the body text baseline.
    pub baseline: f32,
    pub max: f32,
    /// Share of characters set in bold, in `[0, 1]`.
    pub bold_share: f32,
}

impl FontStats {
    /// Returns `None` when the document has no visible text.
    pub fn from_runs(runs: &[TextRun]) -> Option<Self> {
        let mut weighted: Vec<(f32, usize)> = Vec::with_capacity(runs.len());
        let mut bold_chars = 0usize;
        let mut max = f32::MIN;

        for run in runs {
            let chars = run.content.trim().chars().count();
            if chars == 0 {
                continue;
            }
            if run.bold {
                bold_chars += chars;
            }
            max = max.max(run.font_size);
            weighted.push((run.font_size, chars));
        }

        if weighted.is_empty() {
            return None;
        }

        weighted.sort_by(|a, b| a.0.total_cmp(&b.0));
        let total: usize = weighted.iter().map(|(_, w)| w).sum();

        let mut cumulative = 0usize;
        let mut baseline = weighted[0].0;
        for (size, weight) in &weighted {
            cumulative += weight;
            if cumulative * 2 >= total {
                baseline = *size;
                break;
            }
        }

        Some(Self {
            baseline,
            max,
            bold_share: bold_chars as f32 / total as f32,
        })
    }
}

/// Decide whether `run` is a heading within a document described by `stats`.
pub fn is_heading(run: &TextRun, stats: &FontStats, params: &ExtractionParams) -> bool {
    let text = run.content.trim();
    if text.is_empty() {
        return false;
    }

    let larger = run.font_size > stats.baseline + params.heading_margin;
    let emphasized = run.bold
        && stats.bold_share < DOMINANT_BOLD_SHARE
        && run.font_size >= stats.baseline;

    if !(larger || emphasized) {
        return false;
    }

    if text.split_whitespace().count() > params.max_heading_words {
        return false;
    }
    if text.ends_with('.') {
        return false;
    }

    let normalized = text.trim_end_matches(':').trim().to_lowercase();
    !params
        .heading_stop_list
        .iter()
        .any(|stop| stop.trim().to_lowercase() == normalized)
}

/// Whether heading run `next` continues heading run `prev` (a wrapped title).
fn continues_heading(prev: &TextRun, next: &TextRun) -> bool {
    if prev.position.page != next.position.page
        || prev.bold != next.bold
        || (prev.font_size - next.font_size).abs() > 0.1
    {
        return false;
    }
    if prev.same_line(next) {
        return true;
    }
    let gap = next.position.y - prev.position.y;
    gap > 0.0 && gap <= next.font_size * 2.0
}

/// Split one document's runs into sections.
///
/// `doc_index` is the document's position in the run's input order; it
/// becomes the major component of every emitted [`ExtractionOrder`].
///
/// # Guarantees
///
/// - Empty input (or input with only blank runs) yields no sections.
/// - Positions are contiguous from `0` and strictly increasing.
/// - No emitted section has both a blank heading and an empty body.
/// - Page breaks never split a section; only headings do.
pub fn extract_sections(
    document: &str,
    doc_index: usize,
    runs: &[TextRun],
    params: &ExtractionParams,
) -> Vec<Section> {
    let Some(stats) = FontStats::from_runs(runs) else {
        return Vec::new();
    };

    let mut builder = SectionBuilder::new(document, doc_index, params);
    let mut prev: Option<(&TextRun, bool)> = None;

    for run in runs {
        if run.content.trim().is_empty() {
            continue;
        }

        let heading = is_heading(run, &stats, params);
        if heading {
            match prev {
                Some((p, true)) if continues_heading(p, run) => builder.extend_heading(run),
                _ => builder.open(run),
            }
        } else {
            builder.push_body(run, prev.map(|(p, _)| p));
        }
        prev = Some((run, heading));
    }

    builder.finish()
}

struct OpenSection {
    heading: String,
    body: String,
    page: u32,
}

/// Accumulates the open section and assigns extraction positions.
struct SectionBuilder<'a> {
    document: &'a str,
    doc_index: usize,
    params: &'a ExtractionParams,
    current: Option<OpenSection>,
    sections: Vec<Section>,
}

impl<'a> SectionBuilder<'a> {
    fn new(document: &'a str, doc_index: usize, params: &'a ExtractionParams) -> Self {
        Self {
            document,
            doc_index,
            params,
            current: None,
            sections: Vec::new(),
        }
    }

    /// Start a new section at heading `run`.
    ///
    /// The open section is emitted only if it accumulated body text; a
    /// pending heading without body is replaced.
    fn open(&mut self, run: &TextRun) {
        if let Some(open) = self.current.take() {
            if !open.body.is_empty() {
                self.emit(open);
            }
        }
        self.current = Some(OpenSection {
            heading: run.content.trim().to_string(),
            body: String::new(),
            page: run.position.page,
        });
    }

    fn extend_heading(&mut self, run: &TextRun) {
        match self.current.as_mut() {
            Some(open) if open.body.is_empty() => {
                if !open.heading.ends_with('-') {
                    open.heading.push(' ');
                }
                open.heading.push_str(run.content.trim());
            }
            _ => self.open(run),
        }
    }

    fn push_body(&mut self, run: &TextRun, prev: Option<&TextRun>) {
        let open = self.current.get_or_insert_with(|| OpenSection {
            heading: String::new(),
            body: String::new(),
            page: run.position.page,
        });

        if open.body.is_empty() {
            open.body.push_str(run.content.trim_start());
            return;
        }

        match prev {
            Some(p) if p.same_line(run) => open.body.push_str(&run.content),
            _ => {
                let kept = open.body.trim_end().len();
                open.body.truncate(kept);
                open.body.push(' ');
                open.body.push_str(run.content.trim_start());
            }
        }
    }

    fn emit(&mut self, open: OpenSection) {
        let heading = open.heading.trim().to_string();
        let body = open.body.trim().to_string();

        if heading.is_empty() && body.is_empty() {
            return;
        }
        if self.params.min_body_words > 0
            && body.split_whitespace().count() < self.params.min_body_words
        {
            return;
        }

        let position = self.sections.len();
        self.sections.push(Section {
            heading,
            body,
            document: self.document.to_string(),
            page: open.page,
            order: ExtractionOrder {
                document: self.doc_index,
                position,
            },
        });
    }

    fn finish(mut self) -> Vec<Section> {
        if let Some(open) = self.current.take() {
            self.emit(open);
        }
        self.sections
    }
}
