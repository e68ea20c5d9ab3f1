//! PDF → text runs via `lopdf`.
//!
//! Walks each page's content stream in page order and tracks just enough of
//! the graphics and text state to place every show operator:
//!
//! | Operator | Effect |
//! |----------|--------|
//! | `q` / `Q` / `cm` | save / restore / concatenate the CTM |
//! | `BT` | reset text and line matrices |
//! | `Tf` | select font resource and size |
//! | `Tm` / `Td` / `TD` / `T*` / `TL` | position and leading |
//! | `Tj` / `TJ` / `'` / `"` | emit one [`TextRun`] |
//!
//! Font size is the `Tf` size scaled by the vertical scale of the combined
//! text and CTM matrices. The `y` of a run is measured from the top of the
//! page's MediaBox. Bold comes from the font's `BaseFont` name, and string
//! operands are decoded through the font (see [`crate::pdf_fonts`]).

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

use persona_sift_core::models::{DocumentRuns, TextRun};

use crate::pdf_fonts::{decode_bytes, FontCache, PageFont};

/// US Letter height, used when a page has no readable MediaBox.
const DEFAULT_PAGE_HEIGHT: f32 = 792.0;
/// TJ adjustments more negative than this (thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to parse PDF: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("PDF is encrypted")]
    Encrypted,
    #[error("PDF has no pages")]
    NoPages,
}

/// Read one PDF from disk into [`DocumentRuns`].
///
/// I/O and decoding failures do not abort the run; they are recorded on the
/// returned value so the pipeline can report them.
pub fn read_document(path: &Path, document: &str) -> DocumentRuns {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!(document, error = %e, "failed to read PDF");
            return DocumentRuns::failed(document, e.to_string());
        }
    };
    match extract_runs(&bytes) {
        Ok(runs) => {
            debug!(document, runs = runs.len(), "decoded PDF");
            DocumentRuns::new(document, runs)
        }
        Err(e) => {
            warn!(document, error = %e, "failed to decode PDF");
            DocumentRuns::failed(document, e.to_string())
        }
    }
}

/// Decode every text run of a PDF, in page then content-stream order.
pub fn extract_runs(bytes: &[u8]) -> Result<Vec<TextRun>, ExtractError> {
    let doc = Document::load_mem(bytes)?;
    if doc.is_encrypted() {
        return Err(ExtractError::Encrypted);
    }

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(ExtractError::NoPages);
    }

    let mut runs = Vec::new();
    let mut cache = FontCache::default();
    for (page_number, page_id) in pages {
        let content = match doc
            .get_page_content(page_id)
            .and_then(|data| Content::decode(&data))
        {
            Ok(c) => c,
            Err(e) => {
                warn!(page = page_number, error = %e, "skipping undecodable page content");
                continue;
            }
        };

        let fonts = page_fonts(&doc, page_id, &mut cache);
        let height = page_height(&doc, page_id);
        let mut state = TextState::new(page_number, height, &fonts);
        for op in &content.operations {
            state.apply(&op.operator, &op.operands, &mut runs);
        }
    }
    Ok(runs)
}

// ============ Page resources ============

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

/// Look up `key` on the page, then on its ancestors (inheritable attributes).
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_object(page_id).ok();
    // Page trees are shallow; the cap guards against cyclic Parent links.
    for _ in 0..32 {
        let dict = match current? {
            Object::Dictionary(d) => d,
            _ => return None,
        };
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        current = dict.get(b"Parent").ok().and_then(|p| resolve(doc, p));
    }
    None
}

fn page_height(doc: &Document, page_id: ObjectId) -> f32 {
    let media_box = match inherited(doc, page_id, b"MediaBox") {
        Some(Object::Array(values)) if values.len() == 4 => values,
        _ => return DEFAULT_PAGE_HEIGHT,
    };
    match (number(&media_box[1]), number(&media_box[3])) {
        (Some(y0), Some(y1)) if (y1 - y0).abs() > 0.0 => (y1 - y0).abs(),
        _ => DEFAULT_PAGE_HEIGHT,
    }
}

/// Page font resources by name, including those inherited from the page tree.
fn page_fonts(
    doc: &Document,
    page_id: ObjectId,
    cache: &mut FontCache,
) -> HashMap<Vec<u8>, Rc<PageFont>> {
    let mut fonts = HashMap::new();
    let Some(resources) = inherited(doc, page_id, b"Resources").and_then(|r| resolve_dict(doc, r))
    else {
        return fonts;
    };
    let Some(font_dict) = resources
        .get(b"Font")
        .ok()
        .and_then(|f| resolve_dict(doc, f))
    else {
        return fonts;
    };

    for (name, value) in font_dict.iter() {
        if let Some(font) = cache.get(doc, value) {
            fonts.insert(name.clone(), font);
        }
    }
    fonts
}

// ============ Text state ============

/// Affine matrix `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other`
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn vertical_scale(&self) -> f32 {
        let [_, _, c, d, _, _] = self.0;
        (c * c + d * d).sqrt()
    }

    fn y(&self) -> f32 {
        self.0[5]
    }
}

struct TextState<'a> {
    page: u32,
    page_height: f32,
    fonts: &'a HashMap<Vec<u8>, Rc<PageFont>>,
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font: Vec<u8>,
    font_size: f32,
    leading: f32,
}

impl<'a> TextState<'a> {
    fn new(page: u32, page_height: f32, fonts: &'a HashMap<Vec<u8>, Rc<PageFont>>) -> Self {
        Self {
            page,
            page_height,
            fonts,
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font: Vec::new(),
            font_size: 0.0,
            leading: 0.0,
        }
    }

    fn apply(&mut self, operator: &str, operands: &[Object], runs: &mut Vec<TextRun>) {
        match operator {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                if let Some(m) = self.ctm_stack.pop() {
                    self.ctm = m;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operand(operands) {
                    self.ctm = m.then(&self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let [Object::Name(name), size] = operands {
                    self.font = name.clone();
                    self.font_size = number(size).unwrap_or(self.font_size);
                }
            }
            "TL" => {
                if let Some(tl) = operands.first().and_then(number) {
                    self.leading = tl;
                }
            }
            "Tm" => {
                if let Some(m) = matrix_operand(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "Td" => {
                if let Some((tx, ty)) = pair(operands) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let Some((tx, ty)) = pair(operands) {
                    self.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(text) = operands.first().and_then(|o| self.decode_string(o)) {
                    self.emit(text, runs);
                }
            }
            "'" => {
                self.next_line();
                if let Some(text) = operands.first().and_then(|o| self.decode_string(o)) {
                    self.emit(text, runs);
                }
            }
            "\"" => {
                self.next_line();
                if let Some(text) = operands.get(2).and_then(|o| self.decode_string(o)) {
                    self.emit(text, runs);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let text = self.decode_tj(items);
                    self.emit(text, runs);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn current_font(&self) -> Option<&PageFont> {
        self.fonts.get(&self.font).map(|f| &**f)
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match self.current_font() {
            Some(font) => font.decode(bytes),
            None => decode_bytes(bytes),
        }
    }

    fn decode_string(&self, obj: &Object) -> Option<String> {
        match obj {
            Object::String(bytes, _) => Some(self.decode(bytes)),
            _ => None,
        }
    }

    fn decode_tj(&self, items: &[Object]) -> String {
        let mut text = String::new();
        for item in items {
            match item {
                Object::String(bytes, _) => text.push_str(&self.decode(bytes)),
                other => {
                    if let Some(adjust) = number(other) {
                        if adjust < TJ_SPACE_THRESHOLD && !text.ends_with(' ') {
                            text.push(' ');
                        }
                    }
                }
            }
        }
        text
    }

    fn emit(&self, text: String, runs: &mut Vec<TextRun>) {
        if text.trim().is_empty() {
            return;
        }
        let rendered = self.text_matrix.then(&self.ctm);
        let size = self.font_size.abs() * rendered.vertical_scale();
        let y = self.page_height - rendered.y();

        let mut run = TextRun::new(text, size, self.page, y);
        if self.current_font().map(|f| f.bold).unwrap_or(false) {
            run = run.bold();
        }
        runs.push(run);
    }
}

// ============ Operand helpers ============

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn pair(operands: &[Object]) -> Option<(f32, f32)> {
    match operands {
        [x, y] => Some((number(x)?, number(y)?)),
        _ => None,
    }
}

fn matrix_operand(operands: &[Object]) -> Option<Matrix> {
    if operands.len() != 6 {
        return None;
    }
    let mut m = [0.0f32; 6];
    for (slot, obj) in m.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    Some(Matrix(m))
}
