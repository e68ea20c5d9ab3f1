//! Audit commands: `sift sections` and `sift constraints`.
//!
//! Both print to stdout and never write files.

use anyhow::{bail, Result};
use std::path::Path;

use persona_sift_core::extract::{extract_sections, FontStats};
use persona_sift_core::guardrail::ConstraintPredicate;
use persona_sift_core::models::Section;

use crate::config::Config;
use crate::pdf_runs::read_document;

/// Extract sections from one PDF and print them with its font statistics.
pub fn print_sections(config: &Config, pdf: &Path) -> Result<()> {
    let name = pdf
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| pdf.display().to_string());

    let doc = read_document(pdf, &name);
    if let Some(reason) = &doc.failure {
        bail!("{}: {}", name, reason);
    }

    match FontStats::from_runs(&doc.runs) {
        Some(stats) => println!(
            "{}: {} runs, baseline {:.1}pt, max {:.1}pt, bold share {:.0}%",
            name,
            doc.runs.len(),
            stats.baseline,
            stats.max,
            stats.bold_share * 100.0
        ),
        None => {
            println!("{}: no text runs", name);
            return Ok(());
        }
    }

    let sections = extract_sections(&name, 0, &doc.runs, &config.extraction.params());
    println!("{} sections\n", sections.len());
    for section in &sections {
        println!("{}", format_section(section));
    }
    Ok(())
}

fn format_section(section: &Section) -> String {
    let heading = if section.heading.is_empty() {
        "(untitled)"
    } else {
        section.heading.as_str()
    };
    let words = section.body.split_whitespace().count();
    format!(
        "[{}] p.{} {} ({} words)",
        section.order.position, section.page, heading, words
    )
}

/// Detect the hard constraints a query would enforce.
pub fn detect_constraints(config: &Config, query: &str) -> Result<ConstraintPredicate> {
    Ok(config.guardrails.guardrail().detect(query)?)
}

pub fn print_constraints(config: &Config, query: &str) -> Result<()> {
    let predicate = detect_constraints(config, query)?;
    if predicate.is_empty() {
        println!("No hard constraints detected.");
        return Ok(());
    }
    for constraint in predicate.constraints() {
        println!(
            "{} (trigger: \"{}\")\n  excludes: {}",
            constraint.name,
            constraint.trigger,
            constraint.terms.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_sift_core::models::ExtractionOrder;

    #[test]
    fn test_detect_constraints_uses_config_rules() {
        let config: Config = toml::from_str(
            r#"
[[guardrails.rules]]
name = "low-sugar"
triggers = ["diabetic"]
exclude = ["sugar"]
"#,
        )
        .unwrap();
        let predicate = detect_constraints(&config, "Persona: Chef. Task: diabetic menu").unwrap();
        let names: Vec<&str> = predicate
            .constraints()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["low-sugar"]);
    }

    #[test]
    fn test_detect_constraints_disabled() {
        let mut config = Config::default();
        config.guardrails.enabled = false;
        assert!(detect_constraints(&config, "vegan dinner").unwrap().is_empty());
    }

    #[test]
    fn test_format_section() {
        let section = Section {
            heading: String::new(),
            body: "one two three".to_string(),
            document: "a.pdf".to_string(),
            page: 2,
            order: ExtractionOrder {
                document: 0,
                position: 4,
            },
        };
        assert_eq!(format_section(&section), "[4] p.2 (untitled) (3 words)");
    }

    #[test]
    fn test_print_sections_rejects_corrupt_pdf() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.pdf");
        std::fs::write(&path, b"nope").unwrap();
        assert!(print_sections(&Config::default(), &path).is_err());
    }
}
