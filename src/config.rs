//! TOML configuration.
//!
//! Every section and field has a default, so a run works without a config
//! file. `load_config` parses and validates a file; `Config::default()` is
//! used when `--config` is not given.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use persona_sift_core::extract::ExtractionParams;
use persona_sift_core::guardrail::{ConstraintRule, Guardrail};
use persona_sift_core::pipeline::PipelineSettings;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub guardrails: GuardrailConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_input_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Request file; the first `*.json` in `dir` when unset.
    #[serde(default)]
    pub request: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: default_input_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            request: None,
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("./input")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string(), "**/*.PDF".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum characters of `refined_text`; `0` keeps the full body.
    #[serde(default)]
    pub snippet_chars: usize,
    /// Headings that are never emitted.
    #[serde(default = "default_drop_titles")]
    pub drop_titles: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            top_k: default_top_k(),
            snippet_chars: 0,
            drop_titles: default_drop_titles(),
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from("./output/output.json")
}
fn default_top_k() -> usize {
    5
}
fn default_drop_titles() -> Vec<String> {
    vec![
        "General Information".to_string(),
        "Document Section".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_heading_margin")]
    pub heading_margin: f32,
    #[serde(default = "default_max_heading_words")]
    pub max_heading_words: usize,
    #[serde(default)]
    pub heading_stop_list: Vec<String>,
    #[serde(default)]
    pub min_body_words: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            heading_margin: default_heading_margin(),
            max_heading_words: default_max_heading_words(),
            heading_stop_list: Vec::new(),
            min_body_words: 0,
        }
    }
}

fn default_heading_margin() -> f32 {
    0.5
}
fn default_max_heading_words() -> usize {
    14
}

impl ExtractionConfig {
    pub fn params(&self) -> ExtractionParams {
        ExtractionParams {
            heading_margin: self.heading_margin,
            max_heading_words: self.max_heading_words,
            heading_stop_list: self.heading_stop_list.clone(),
            min_body_words: self.min_body_words,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Directory holding local models; nothing is downloaded into it.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_input_chars: default_max_input_chars(),
            cache_dir: None,
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_input_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuardrailConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Rules added to the built-in vocabulary.
    #[serde(default)]
    pub rules: Vec<ConstraintRule>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl GuardrailConfig {
    pub fn guardrail(&self) -> Guardrail {
        if self.enabled {
            Guardrail::with_rules(self.rules.iter().cloned())
        } else {
            Guardrail::disabled()
        }
    }
}

impl Config {
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            extraction: self.extraction.params(),
            batch_size: self.embedding.batch_size,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` when given, otherwise fall back to defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => Ok(Config::default()),
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.output.top_k == 0 {
        bail!("output.top_k must be >= 1");
    }

    if config.extraction.heading_margin < 0.0 || !config.extraction.heading_margin.is_finite() {
        bail!("extraction.heading_margin must be a finite value >= 0");
    }
    if config.extraction.max_heading_words == 0 {
        bail!("extraction.max_heading_words must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }
    if config.embedding.max_input_chars == 0 {
        bail!("embedding.max_input_chars must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, or local.",
            other
        ),
    }

    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.provider == "local" && config.embedding.cache_dir.is_none() {
        bail!("embedding.cache_dir must be set when provider is 'local'");
    }

    for rule in &config.guardrails.rules {
        if rule.name.trim().is_empty() {
            bail!("guardrails.rules: every rule needs a name");
        }
        if rule.triggers.iter().all(|t| t.trim().is_empty()) {
            bail!("guardrails.rules '{}': triggers must not be empty", rule.name);
        }
        if rule.exclude.iter().all(|t| t.trim().is_empty()) {
            bail!("guardrails.rules '{}': exclude must not be empty", rule.name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.output.top_k, 5);
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.extraction.max_heading_words, 14);
        assert!(config.guardrails.enabled);
        assert_eq!(config.input.include_globs, vec!["**/*.pdf", "**/*.PDF"]);
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
[input]
dir = "./docs"
exclude_globs = ["drafts/**"]

[output]
path = "./out.json"
top_k = 10
snippet_chars = 400

[extraction]
heading_margin = 1.5
heading_stop_list = ["instructions", "notes"]
min_body_words = 20

[embedding]
provider = "local"
model = "bge-small-en-v1.5"
cache_dir = "./models"

[[guardrails.rules]]
name = "low-sugar"
triggers = ["diabetic"]
exclude = ["sugar", "syrup"]
"#,
        )
        .unwrap();
        assert_eq!(config.output.top_k, 10);
        assert_eq!(config.extraction.params().min_body_words, 20);
        assert_eq!(config.guardrails.rules[0].name, "low-sugar");
        assert_eq!(config.pipeline_settings().batch_size, 64);
        assert_eq!(config.embedding.cache_dir, Some(PathBuf::from("./models")));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        assert!(parse("[output]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = parse("[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_network_provider_rejected() {
        let err = parse("[embedding]\nprovider = \"ollama\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_local_requires_cache_dir() {
        assert!(parse("[embedding]\nprovider = \"local\"\n").is_err());
    }

    #[test]
    fn test_rejects_rule_without_terms() {
        let toml_str = r#"
[[guardrails.rules]]
name = "x"
triggers = ["y"]
exclude = []
"#;
        assert!(parse(toml_str).is_err());
    }

    #[test]
    fn test_disabled_guardrail() {
        let config = parse("[guardrails]\nenabled = false\n").unwrap();
        let predicate = config.guardrails.guardrail().detect("vegetarian").unwrap();
        assert!(predicate.is_empty());
    }
}
