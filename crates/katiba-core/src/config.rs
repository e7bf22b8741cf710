use crate::error::{KatibaError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application directory name under the OS data/config roots.
pub const APP_DIR: &str = "katiba";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const CORPUS_FILENAME: &str = "constitution_articles.json";
pub const LEXICAL_INDEX_DIRNAME: &str = "lexical_index";
pub const SEMANTIC_INDEX_DIRNAME: &str = "semantic_index";
/// Sentence-transformer run locally by the `onnx` embedder.
pub const DEFAULT_ONNX_MODEL: &str = "sentence-transformers/multi-qa-MiniLM-L6-cos-v1";
pub const HUGGING_FACE_URL: &str = "https://huggingface.co";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KatibaConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Prefer the `LLM_API_KEY` environment variable over storing this on disk.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model_name: None,
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which embedder backs the semantic index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// `onnx` when built with the `semantic-ort` feature, `hash` otherwise.
    Auto,
    /// Local sentence-transformer through ONNX Runtime.
    Onnx,
    /// OpenAI-compatible `/embeddings` endpoint.
    Api,
    /// Offline feature hashing. Shared vocabulary only; no synonyms or
    /// inflections.
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_num_results")]
    pub num_results: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,
    /// Multiplier applied to `num_results` for each sub-search before fusion.
    #[serde(default = "default_candidate_pool_factor")]
    pub candidate_pool_factor: usize,
    #[serde(default = "default_embedder")]
    pub embedder: EmbedderKind,
    /// Remote model name for the `api` embedder.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    /// Hugging Face repository of the `onnx` embedder.
    #[serde(default = "default_onnx_model")]
    pub onnx_model: String,
    /// Directory holding `model.onnx` and `tokenizer.json`. Defaults to the
    /// OS cache directory; files are downloaded there when missing.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
    /// Where missing model files are downloaded from.
    #[serde(default = "default_model_mirror")]
    pub model_mirror: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_results: default_num_results(),
            rrf_k: default_rrf_k(),
            candidate_pool_factor: default_candidate_pool_factor(),
            embedder: default_embedder(),
            embedding_model: default_embedding_model(),
            embedding_dim: default_embedding_dim(),
            onnx_model: default_onnx_model(),
            model_dir: None,
            model_mirror: default_model_mirror(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub corpus: Option<PathBuf>,
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            corpus: None,
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl IndexConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

impl KatibaConfig {
    /// Load the config file at `path`, or defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`KatibaError::Config`] if the file exists but cannot be read
    /// or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|err| KatibaError::Config {
            path: path.to_path_buf(),
            reason: format!("read failed: {err}"),
        })?;

        toml::from_str::<Self>(&content).map_err(|err| KatibaError::Config {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    /// Load configuration from `KATIBA_CONFIG` or the user config directory,
    /// then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`KatibaError::Config`] for an unreadable or invalid file.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("KATIBA_CONFIG")
            .map(PathBuf::from)
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Recognised: `LLM_API_KEY`, `LLM_BASE_URL`, `LLM_MODEL_NAME`,
    /// `KATIBA_DATA_DIR`, `KATIBA_CORPUS`. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = get("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = get("LLM_MODEL_NAME") {
            self.llm.model_name = Some(model);
        }
        if let Some(dir) = get("KATIBA_DATA_DIR") {
            self.index.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(corpus) = get("KATIBA_CORPUS") {
            self.index.corpus = Some(PathBuf::from(corpus));
        }
    }

    /// Resolved data directory: configured value or the OS default.
    ///
    /// # Errors
    ///
    /// Fails when no data dir is configured and the OS location is unknown.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.index.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => user_data_dir().ok_or_else(|| KatibaError::Config {
                path: PathBuf::new(),
                reason: "unable to determine OS data directory; set KATIBA_DATA_DIR".into(),
            }),
        }
    }

    /// Resolved corpus path: configured value or `<data_dir>/constitution_articles.json`.
    ///
    /// # Errors
    ///
    /// Same as [`KatibaConfig::data_dir`].
    pub fn corpus_path(&self) -> Result<PathBuf> {
        match &self.index.corpus {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join(CORPUS_FILENAME)),
        }
    }

    /// Lexical index location under the data directory.
    ///
    /// # Errors
    ///
    /// Same as [`KatibaConfig::data_dir`].
    pub fn lexical_index_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(LEXICAL_INDEX_DIRNAME))
    }

    /// Directory for the `onnx` embedder's model files: configured value or
    /// `<cache_dir>/katiba/models/<owner>--<name>`.
    ///
    /// # Errors
    ///
    /// Fails when no model dir is configured and the OS cache location is
    /// unknown.
    pub fn model_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.search.model_dir {
            return Ok(dir.clone());
        }
        let cache = dirs::cache_dir().ok_or_else(|| KatibaError::Config {
            path: PathBuf::new(),
            reason: "unable to determine OS cache directory; set [search] model_dir".into(),
        })?;
        Ok(cache
            .join(APP_DIR)
            .join("models")
            .join(self.search.onnx_model.replace('/', "--")))
    }

    /// Semantic index location under the data directory.
    ///
    /// # Errors
    ///
    /// Same as [`KatibaConfig::data_dir`].
    pub fn semantic_index_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(SEMANTIC_INDEX_DIRNAME))
    }
}

/// OS-specific application data directory.
///
/// `XDG_DATA_HOME` or `~/.local/share` on Linux, `LOCALAPPDATA` on Windows,
/// `~/Library/Application Support` on macOS; always suffixed with `katiba`.
#[must_use]
pub fn user_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(APP_DIR))
}

/// Default config file location: `<config_dir>/katiba/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

fn default_base_url() -> String {
    OPENAI_BASE_URL.to_string()
}

const fn default_llm_timeout_secs() -> u64 {
    60
}

const fn default_num_results() -> usize {
    5
}

const fn default_rrf_k() -> usize {
    60
}

const fn default_candidate_pool_factor() -> usize {
    1
}

const fn default_embedder() -> EmbedderKind {
    EmbedderKind::Auto
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_embedding_dim() -> usize {
    384
}

fn default_onnx_model() -> String {
    DEFAULT_ONNX_MODEL.to_string()
}

fn default_model_mirror() -> String {
    HUGGING_FACE_URL.to_string()
}

const fn default_lock_timeout_secs() -> u64 {
    30
}
