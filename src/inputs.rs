//! Input discovery: PDFs in the input directory and the request file.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use persona_sift_core::models::Query;

pub const DEFAULT_PERSONA: &str = "Professional";
pub const DEFAULT_TASK: &str = "Document Analysis";

/// One PDF selected for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfInput {
    pub path: PathBuf,
    /// Path relative to the input directory; used as the document identifier.
    pub document: String,
}

/// Find PDFs under `root`, sorted by relative path.
///
/// The sort order is the document-input order of the run.
pub fn discover_pdfs(
    root: &Path,
    include_globs: &[String],
    exclude_globs: &[String],
) -> Result<Vec<PdfInput>> {
    if !root.is_dir() {
        bail!("Input directory does not exist: {}", root.display());
    }

    let include_set = build_globset(include_globs)?;
    let exclude_set = build_globset(exclude_globs)?;

    let mut inputs = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        inputs.push(PdfInput {
            path: path.to_path_buf(),
            document: rel_str,
        });
    }

    inputs.sort_by(|a, b| a.document.cmp(&b.document));
    inputs.dedup_by(|a, b| a.document == b.document);
    Ok(inputs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// The first `*.json` file directly inside `dir`, by file name.
pub fn find_request(dir: &Path) -> Result<Option<PathBuf>> {
    let mut candidates = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read input directory: {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json && path.is_file() {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Load the persona and task from a request file.
///
/// Accepts `{"persona": {"role": ...}, "job_to_be_done": {"task": ...}}`
/// as well as plain strings for either field. Missing or empty fields fall
/// back to [`DEFAULT_PERSONA`] and [`DEFAULT_TASK`].
pub fn load_request(path: &Path) -> Result<Query> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {}", path.display()))?;
    let json: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse request file: {}", path.display()))?;
    Ok(query_from_json(&json))
}

pub fn query_from_json(json: &Value) -> Query {
    let persona = text_field(json.get("persona"), "role").unwrap_or_else(|| {
        warn!("request has no persona.role; using default");
        DEFAULT_PERSONA.to_string()
    });
    let task = text_field(json.get("job_to_be_done"), "task").unwrap_or_else(|| {
        warn!("request has no job_to_be_done.task; using default");
        DEFAULT_TASK.to_string()
    });
    Query::new(persona, task)
}

fn text_field(value: Option<&Value>, key: &str) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get(key)?.as_str()?,
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

pub fn default_query() -> Query {
    Query::new(DEFAULT_PERSONA, DEFAULT_TASK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn globs(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("b/drafts")).unwrap();
        fs::write(tmp.path().join("zeta.pdf"), b"").unwrap();
        fs::write(tmp.path().join("alpha.pdf"), b"").unwrap();
        fs::write(tmp.path().join("b/mid.pdf"), b"").unwrap();
        fs::write(tmp.path().join("b/drafts/old.pdf"), b"").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"").unwrap();

        let found = discover_pdfs(tmp.path(), &globs(&["**/*.pdf"]), &globs(&["**/drafts/**"]))
            .unwrap();
        let names: Vec<&str> = found.iter().map(|p| p.document.as_str()).collect();
        assert_eq!(names, vec!["alpha.pdf", "b/mid.pdf", "zeta.pdf"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(discover_pdfs(&tmp.path().join("nope"), &globs(&["**/*.pdf"]), &[]).is_err());
    }

    #[test]
    fn test_find_request_picks_first_json() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.json"), "{}").unwrap();
        fs::write(tmp.path().join("a.json"), "{}").unwrap();
        fs::write(tmp.path().join("c.pdf"), b"").unwrap();
        let found = find_request(tmp.path()).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "a.json");
    }

    #[test]
    fn test_find_request_none() {
        let tmp = TempDir::new().unwrap();
        assert!(find_request(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn test_query_from_structured_request() {
        let json = serde_json::json!({
            "persona": { "role": "Food Contractor" },
            "job_to_be_done": { "task": "Prepare a vegetarian buffet" },
            "documents": [{ "filename": "Dinner.pdf" }]
        });
        let q = query_from_json(&json);
        assert_eq!(q.persona, "Food Contractor");
        assert_eq!(q.task, "Prepare a vegetarian buffet");
    }

    #[test]
    fn test_query_from_plain_strings_and_defaults() {
        let q = query_from_json(&serde_json::json!({ "persona": "Travel Planner" }));
        assert_eq!(q.persona, "Travel Planner");
        assert_eq!(q.task, DEFAULT_TASK);

        let q = query_from_json(&serde_json::json!({ "persona": { "role": "  " } }));
        assert_eq!(q, default_query());
    }

    #[test]
    fn test_load_request_rejects_invalid_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("req.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_request(&path).is_err());
    }
}
