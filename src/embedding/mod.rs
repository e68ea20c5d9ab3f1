//! Embedding provider implementations.
//!
//! Concrete backends for the [`EmbeddingProvider`] trait defined in
//! `persona-sift-core`:
//! - **[`DisabledProvider`]** — returns errors; used when `provider = "disabled"`.
//! - **[`HashProvider`]** — SHA-256 feature hashing; the default.
//! - **`LocalProvider`** — runs ONNX models via fastembed (feature
//!   `local-embeddings-fastembed`), loaded from files already present in
//!   `embedding.cache_dir`.
//!
//! Neither backend touches the network during a run.
//!
//! [`CachedProvider`] wraps any of these and memoizes vectors by content
//! hash, so texts repeated across documents are embedded once per run.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to instantiate the appropriate provider based
//! on the configuration:
//!
//! ```rust,no_run
//! # use persona_sift::config::EmbeddingConfig;
//! # use persona_sift::embedding::create_provider;
//! # use persona_sift_core::embedding::EmbeddingProvider;
//! let config = EmbeddingConfig::default(); // provider = "hash"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "hash");
//! ```

mod hash;

pub use hash::{HashProvider, DEFAULT_HASH_DIMS};

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

use persona_sift_core::embedding::EmbeddingProvider;
use persona_sift_core::models::EmbeddingVector;

use crate::config::EmbeddingConfig;

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// A run with this provider fails at query encoding.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn max_input_chars(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local ONNX inference via fastembed.
///
/// The model is loaded once from `embedding.cache_dir` and shared across
/// calls. Inference runs on the blocking thread pool. Construction fails
/// when the model's files are not already in the cache, so nothing is
/// downloaded.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    max_input_chars: usize,
    batch_size: usize,
    model: std::sync::Arc<Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        let fastembed_model = config_to_fastembed_model(&model_name)?;
        let Some(cache_dir) = &config.cache_dir else {
            bail!("embedding.cache_dir must be set when provider is 'local'");
        };
        if !cached_model_present(cache_dir, &fastembed_model)? {
            bail!(
                "Local embedding model '{}' not found in {}; copy the model files there first",
                model_name,
                cache_dir.display()
            );
        }

        let options = fastembed::InitOptions::new(fastembed_model)
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir.clone());
        let model = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name,
            dims,
            max_input_chars: config.max_input_chars,
            batch_size: config.batch_size,
            model: std::sync::Arc::new(Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("Local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Whether the hf-hub cache layout under `cache_dir` holds the model's ONNX
/// file (`models--<org>--<repo>/snapshots/<rev>/<file>`).
#[cfg(feature = "local-embeddings-fastembed")]
fn cached_model_present(
    cache_dir: &std::path::Path,
    model: &fastembed::EmbeddingModel,
) -> Result<bool> {
    let info = fastembed::TextEmbedding::get_model_info(model)
        .map_err(|e| anyhow::anyhow!("Unknown local embedding model: {}", e))?;
    let snapshots = cache_dir
        .join(format!("models--{}", info.model_code.replace('/', "--")))
        .join("snapshots");
    let Ok(entries) = std::fs::read_dir(&snapshots) else {
        return Ok(false);
    };
    Ok(entries
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.path().join(&info.model_file).is_file()))
}

#[cfg(feature = "local-embeddings-fastembed")]
fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        _ => 384,
    });

    (model_name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base",
            other
        ),
    }
}

// ============ Cached Provider ============

/// Memoizes another provider's vectors by SHA-256 of the input text.
///
/// Only texts not seen before reach the inner provider, each once per
/// call even when repeated in the batch. A failed inner call caches
/// nothing.
pub struct CachedProvider {
    inner: Box<dyn EmbeddingProvider>,
    memo: Mutex<HashMap<[u8; 32], EmbeddingVector>>,
}

impl CachedProvider {
    pub fn new(inner: Box<dyn EmbeddingProvider>) -> Self {
        Self {
            inner,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.memo.lock().map(|m| m.len()).unwrap_or(0)
    }
}

fn content_key(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

#[async_trait]
impl EmbeddingProvider for CachedProvider {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
    fn dims(&self) -> usize {
        self.inner.dims()
    }
    fn max_input_chars(&self) -> usize {
        self.inner.max_input_chars()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let keys: Vec<[u8; 32]> = texts.iter().map(|t| content_key(t)).collect();

        let mut misses: Vec<String> = Vec::new();
        let mut miss_keys: Vec<[u8; 32]> = Vec::new();
        {
            let memo = self
                .memo
                .lock()
                .map_err(|_| anyhow::anyhow!("embedding cache lock poisoned"))?;
            for (text, key) in texts.iter().zip(&keys) {
                if !memo.contains_key(key) && !miss_keys.contains(key) {
                    misses.push(text.clone());
                    miss_keys.push(*key);
                }
            }
        }

        if !misses.is_empty() {
            let fresh = self.inner.embed(&misses).await?;
            if fresh.len() != misses.len() {
                bail!(
                    "embedding provider returned {} vectors for {} texts",
                    fresh.len(),
                    misses.len()
                );
            }
            let mut memo = self
                .memo
                .lock()
                .map_err(|_| anyhow::anyhow!("embedding cache lock poisoned"))?;
            for (key, vec) in miss_keys.into_iter().zip(fresh) {
                memo.insert(key, vec);
            }
        }

        let memo = self
            .memo
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding cache lock poisoned"))?;
        keys.iter()
            .map(|key| {
                memo.get(key)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("embedding cache miss after fill"))
            })
            .collect()
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// # Supported Providers
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"hash"` | [`HashProvider`] |
/// | `"local"` | `LocalProvider` (requires `local-embeddings-fastembed`) |
///
/// Every provider except `disabled` is wrapped in a [`CachedProvider`].
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider
/// cannot be initialized (missing config, model, or feature flag).
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let inner: Box<dyn EmbeddingProvider> = match config.provider.as_str() {
        "disabled" => return Ok(Box::new(DisabledProvider)),
        "hash" => Box::new(HashProvider::new(
            config.dims.unwrap_or(DEFAULT_HASH_DIMS),
            config.max_input_chars,
        )),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Box::new(LocalProvider::new(config)?),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires: --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    };
    Ok(Box::new(CachedProvider::new(inner)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProvider {
        texts_seen: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            1
        }
        fn max_input_chars(&self) -> usize {
            100
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            if self.fail {
                bail!("backend down");
            }
            self.texts_seen.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    fn cached(fail: bool) -> (CachedProvider, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let inner = CountingProvider {
            texts_seen: seen.clone(),
            fail,
        };
        (CachedProvider::new(Box::new(inner)), seen)
    }

    #[tokio::test]
    async fn test_cache_embeds_each_text_once() {
        let (provider, seen) = cached(false);
        let batch = vec!["a".to_string(), "bb".to_string(), "a".to_string()];
        let out = provider.embed(&batch).await.unwrap();
        assert_eq!(out, vec![vec![1.0], vec![2.0], vec![1.0]]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        let again = provider.embed(&["bb".to_string()]).await.unwrap();
        assert_eq!(again, vec![vec![2.0]]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(provider.cached_len(), 2);
    }

    #[tokio::test]
    async fn test_cache_propagates_failure() {
        let (provider, _) = cached(true);
        assert!(provider.embed(&["x".to_string()]).await.is_err());
        assert_eq!(provider.cached_len(), 0);
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let err = DisabledProvider
            .embed(&["x".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_create_provider_default_is_hash() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "hash");
        assert_eq!(provider.dims(), DEFAULT_HASH_DIMS);
    }

    #[test]
    fn test_create_provider_unknown() {
        let config = EmbeddingConfig {
            provider: "nope".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_ollama_is_not_a_provider() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[cfg(feature = "local-embeddings-fastembed")]
    #[test]
    fn test_local_refuses_empty_cache() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = EmbeddingConfig {
            provider: "local".to_string(),
            cache_dir: Some(tmp.path().to_path_buf()),
            ..EmbeddingConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("not found"), "{}", err);
    }

    #[cfg(not(feature = "local-embeddings-fastembed"))]
    #[test]
    fn test_local_requires_feature() {
        let config = EmbeddingConfig {
            provider: "local".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("local-embeddings-fastembed"));
    }
}
