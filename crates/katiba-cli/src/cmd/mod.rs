//! Subcommand implementations and the state they share.

pub mod ask;
pub mod completions;
pub mod index;
pub mod search;

use katiba_core::Corpus;
use katiba_core::config::KatibaConfig;
use katiba_core::error::Result;
use katiba_search::{
    HybridIndex, HybridOptions, LexicalIndex, SemanticIndex, StoreOptions, build_embedder,
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Flags that override the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub corpus: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

/// Resolved configuration and paths for one invocation.
#[derive(Debug)]
pub struct Context {
    pub config: KatibaConfig,
    lexical_dir: PathBuf,
    semantic_dir: PathBuf,
    corpus_path: PathBuf,
}

impl Context {
    /// Load configuration (file, then environment, then flags).
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let mut config = KatibaConfig::load()?;
        apply_overrides(&mut config, overrides);
        Self::resolve(config)
    }

    fn resolve(config: KatibaConfig) -> Result<Self> {
        let lexical_dir = config.lexical_index_dir()?;
        let semantic_dir = config.semantic_index_dir()?;
        let corpus_path = config.corpus_path()?;
        debug!(
            corpus = %corpus_path.display(),
            lexical = %lexical_dir.display(),
            semantic = %semantic_dir.display(),
            "resolved locations"
        );
        Ok(Self {
            config,
            lexical_dir,
            semantic_dir,
            corpus_path,
        })
    }

    pub fn lexical_dir(&self) -> &Path {
        &self.lexical_dir
    }

    pub fn semantic_dir(&self) -> &Path {
        &self.semantic_dir
    }

    pub fn corpus(&self) -> Result<Corpus> {
        Corpus::load(&self.corpus_path)
    }

    pub fn store_options(&self, force_rebuild: bool) -> StoreOptions {
        StoreOptions {
            lock_timeout: self.config.index.lock_timeout(),
            force_rebuild,
        }
    }

    pub fn open_lexical(&self, corpus: &Corpus, store: &StoreOptions) -> Result<LexicalIndex> {
        LexicalIndex::open_or_build(&self.lexical_dir, corpus, store)
    }

    pub fn open_semantic(&self, corpus: &Corpus, store: &StoreOptions) -> Result<SemanticIndex> {
        let embedder = build_embedder(&self.config)?;
        SemanticIndex::open_or_build(&self.semantic_dir, corpus, embedder, store)
    }

    pub fn open_hybrid(&self, corpus: &Corpus, store: &StoreOptions) -> Result<HybridIndex> {
        let lexical = self.open_lexical(corpus, store)?;
        let semantic = self.open_semantic(corpus, store)?;
        Ok(HybridIndex::with_options(
            Box::new(lexical),
            Box::new(semantic),
            HybridOptions::from(&self.config.search),
        ))
    }
}

fn apply_overrides(config: &mut KatibaConfig, overrides: &Overrides) {
    if let Some(corpus) = &overrides.corpus {
        config.index.corpus = Some(corpus.clone());
    }
    if let Some(dir) = &overrides.data_dir {
        config.index.data_dir = Some(dir.clone());
    }
}
