//! Text encoder selection.
//!
//! | Config Value | Encoder |
//! |-------------|----------|
//! | `"hashing"` | [`HashingEncoder`]: deterministic, no download |
//! | `"local"` | `FastembedEncoder`: local sentence-encoder model via fastembed |
//!
//! Local models are downloaded on first use from Hugging Face and cached.
//! After the initial download no network calls are needed.

use std::sync::Arc;

use anyhow::{bail, Result};
use lexspace_core::embedding::{HashingEncoder, TextEncoder};

use crate::config::EmbeddingConfig;

/// Default dimensionality of the hashing encoder.
pub const DEFAULT_HASHING_DIMS: usize = 384;

/// Build the encoder named by `config.provider`.
pub fn create_encoder(config: &EmbeddingConfig) -> Result<Arc<dyn TextEncoder>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEncoder::new(
            config.dims.unwrap_or(DEFAULT_HASHING_DIMS),
        )?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(local::FastembedEncoder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use lexspace_core::embedding::TextEncoder;
    use lexspace_core::Error;

    use crate::config::EmbeddingConfig;

    const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

    /// Sentence encoder running a local ONNX model through fastembed.
    ///
    /// `TextEmbedding::embed` needs `&mut self`, so the model sits behind a
    /// mutex; encoding calls from parallel workers serialize on it.
    pub struct FastembedEncoder {
        model: Mutex<fastembed::TextEmbedding>,
        model_id: String,
        dims: usize,
        batch_size: usize,
    }

    impl FastembedEncoder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let name = config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string());
            let dims = config.dims.unwrap_or_else(|| default_dims(&name));
            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(to_fastembed_model(&name)?)
                    .with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

            tracing::info!(model = %name, dims, "loaded local embedding model");
            Ok(Self {
                model: Mutex::new(model),
                model_id: format!("fastembed/{}", name),
                dims,
                batch_size: config.batch_size,
            })
        }
    }

    impl TextEncoder for FastembedEncoder {
        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn dims(&self) -> usize {
            self.dims
        }

        fn encode_batch(&self, texts: &[&str]) -> lexspace_core::Result<Vec<Vec<f32>>> {
            let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
            let mut model = self
                .model
                .lock()
                .map_err(|_| Error::Encoder("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, Some(self.batch_size))
                .map_err(|e| Error::Encoder(format!("local embedding failed: {}", e)))
        }
    }

    fn default_dims(name: &str) -> usize {
        match name {
            "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
            "multilingual-e5-base" => 768,
            "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
            _ => 384,
        }
    }

    fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
            "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
            "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
                 nomic-embed-text-v1, nomic-embed-text-v1.5, \
                 multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
                other
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_encoder_default_dims() {
        let encoder = create_encoder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(encoder.dims(), DEFAULT_HASHING_DIMS);
        assert_eq!(encoder.model_id(), "lexspace-hashing-v1/384");
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            ..Default::default()
        };
        assert!(create_encoder(&config).is_err());
    }
}
