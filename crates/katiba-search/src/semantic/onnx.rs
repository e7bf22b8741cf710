//! Local sentence-transformer embeddings through ONNX Runtime.
//!
//! Runs a MiniLM-style model exported to ONNX: WordPiece tokenization from
//! `tokenizer.json`, one batched forward pass, attention-masked mean pooling
//! and L2 normalization, matching how sentence-transformers produces its
//! embeddings.

use super::embed::Embedder;
use super::model::{self, ModelFiles};
use anyhow::{anyhow, bail};
use katiba_core::error::{KatibaError, Result};
use ort::session::Session;
use ort::value::Tensor;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokenizers::{Encoding, PaddingParams, Tokenizer, TruncationParams};
use tracing::{debug, info};

/// Longest token sequence passed to the model.
const MAX_TOKENS: usize = 512;

/// Settings for [`OrtEmbedder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrtEmbedderConfig {
    /// Model repository, e.g. `sentence-transformers/multi-qa-MiniLM-L6-cos-v1`.
    pub repo: String,
    pub model_dir: PathBuf,
    pub mirror: String,
    pub dimension: usize,
    /// Connect and read timeout for model downloads.
    pub download_timeout: Duration,
}

/// Sentence embeddings from a local ONNX model.
pub struct OrtEmbedder {
    // `Session::run` needs `&mut self`.
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model_id: String,
    dimension: usize,
}

impl fmt::Debug for OrtEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrtEmbedder")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl OrtEmbedder {
    /// Load the model from `config.model_dir`, downloading missing files
    /// from `config.mirror` first.
    ///
    /// # Errors
    ///
    /// Returns [`KatibaError::EmbeddingModel`] when the files cannot be
    /// fetched or the runtime rejects them.
    pub fn load(config: &OrtEmbedderConfig) -> Result<Self> {
        Self::try_load(config).map_err(|err| {
            KatibaError::EmbeddingModel(format!("load {}: {err:#}", config.repo))
        })
    }

    fn try_load(config: &OrtEmbedderConfig) -> anyhow::Result<Self> {
        let mut files = ModelFiles::in_dir(&config.model_dir);
        if !files.are_present() {
            let agent = ureq::AgentBuilder::new()
                .timeout_connect(config.download_timeout)
                .timeout_read(config.download_timeout)
                .build();
            files =
                model::fetch_missing(&agent, &config.mirror, &config.repo, &config.model_dir)?;
        }

        let session = Session::builder()
            .map_err(|err| anyhow!("create ONNX Runtime session: {err}"))?
            .commit_from_file(&files.model)
            .map_err(|err| anyhow!("load {}: {err}", files.model.display()))?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|err| anyhow!("load {}: {err}", files.tokenizer.display()))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..TruncationParams::default()
            }))
            .map_err(|err| anyhow!("configure truncation: {err}"))?;

        info!(
            model = %config.repo,
            dir = %config.model_dir.display(),
            "loaded ONNX embedding model"
        );
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model_id: format!("onnx:{}", config.repo),
            dimension: config.dimension,
        })
    }

    fn infer(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|err| anyhow!("tokenize: {err}"))?;
        let seq_len = encodings.first().map_or(0, |enc| enc.get_ids().len());

        let mut ids = Vec::with_capacity(encodings.len() * seq_len);
        let mut mask = Vec::with_capacity(encodings.len() * seq_len);
        let mut type_ids = Vec::with_capacity(encodings.len() * seq_len);
        for enc in &encodings {
            ids.extend(enc.get_ids().iter().map(|&v| i64::from(v)));
            mask.extend(enc.get_attention_mask().iter().map(|&v| i64::from(v)));
            type_ids.extend(enc.get_type_ids().iter().map(|&v| i64::from(v)));
        }
        let shape = vec![i64::try_from(encodings.len())?, i64::try_from(seq_len)?];
        let tensor = |values: Vec<i64>| {
            Tensor::from_array((shape.clone(), values))
                .map_err(|err| anyhow!("build input tensor: {err}"))
        };
        let inputs = ort::inputs![
            "input_ids" => tensor(ids)?,
            "attention_mask" => tensor(mask)?,
            "token_type_ids" => tensor(type_ids)?,
        ];

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("ONNX session lock poisoned"))?;
        let outputs = session
            .run(inputs)
            .map_err(|err| anyhow!("run model: {err}"))?;
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let (out_shape, hidden) = output
            .try_extract_tensor::<f32>()
            .map_err(|err| anyhow!("read model output: {err}"))?;
        if out_shape.len() != 3 {
            bail!("unexpected model output shape {out_shape:?}");
        }
        let dims = usize::try_from(out_shape[2])?;
        debug!(batch = encodings.len(), seq_len, dims, "ran embedding model");

        let masks: Vec<&[u32]> = encodings.iter().map(Encoding::get_attention_mask).collect();
        let pooled = model::mean_pool(hidden, seq_len, dims, &masks)?;
        Ok(pooled)
    }
}

impl Embedder for OrtEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.infer(texts)
            .map_err(|err| KatibaError::EmbeddingModel(format!("{}: {err:#}", self.model_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use katiba_core::error::ErrorCode;

    #[test]
    fn unreachable_mirror_is_an_embedding_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = OrtEmbedder::load(&OrtEmbedderConfig {
            repo: "org/model".into(),
            model_dir: dir.path().join("org--model"),
            mirror: "http://127.0.0.1:9".into(),
            dimension: 384,
            download_timeout: Duration::from_millis(200),
        })
        .expect_err("no model available");
        assert_eq!(err.code(), ErrorCode::EmbeddingModelFailed);
        assert!(err.to_string().contains("org/model"));
    }

    #[test]
    fn corrupt_model_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(model::MODEL_FILENAME), b"not onnx").expect("write");
        std::fs::write(dir.path().join(model::TOKENIZER_FILENAME), b"{}").expect("write");
        let err = OrtEmbedder::load(&OrtEmbedderConfig {
            repo: "org/model".into(),
            model_dir: dir.path().to_path_buf(),
            mirror: "http://127.0.0.1:9".into(),
            dimension: 384,
            download_timeout: Duration::from_millis(200),
        })
        .expect_err("garbage model");
        assert_eq!(err.code(), ErrorCode::EmbeddingModelFailed);
    }
}
