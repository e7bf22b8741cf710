//! Semantic retrieval: dense embeddings with cosine KNN.
//!
//! - [`embed`]: the [`Embedder`] trait and the offline hashing fallback
//! - `onnx`: local sentence-transformer (feature `semantic-ort`)
//! - [`model`]: model file download and mean pooling for the local model
//! - [`api`]: OpenAI-compatible remote embeddings
//! - [`knn`]: cosine similarity and top-k selection
//!
//! The published index stores each article with its corpus position and its
//! embedding as JSON text. Opening loads the whole matrix into memory; the
//! constitution is a few hundred articles, so brute-force KNN is exact and
//! fast enough.

pub mod api;
pub mod embed;
pub mod knn;
pub mod model;
#[cfg(feature = "semantic-ort")]
pub mod onnx;

pub use api::{ApiEmbedder, ApiEmbedderConfig};
pub use embed::{DEFAULT_EMBEDDING_DIM, Embedder, HashEmbedder};
#[cfg(feature = "semantic-ort")]
pub use onnx::{OrtEmbedder, OrtEmbedderConfig};

use crate::store::{BuildInputs, IndexKind, IndexLocation, StoreOptions};
use anyhow::{Context, bail};
use katiba_core::article::{Article, Query};
use katiba_core::config::{EmbedderKind, KatibaConfig};
use katiba_core::corpus::Corpus;
use katiba_core::error::{KatibaError, Result};
use katiba_core::index::ArticleIndex;
use rusqlite::{Connection, Transaction, params};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Articles embedded per backend call during a build.
pub const EMBED_BATCH_SIZE: usize = 32;

const SCHEMA: &str = "
CREATE TABLE articles (
    position INTEGER PRIMARY KEY,
    number   INTEGER NOT NULL UNIQUE,
    title    TEXT NOT NULL,
    clauses  TEXT NOT NULL,
    chapter  TEXT NOT NULL,
    part     TEXT
);

CREATE TABLE article_embeddings (
    number         INTEGER PRIMARY KEY REFERENCES articles(number),
    embedding_json TEXT NOT NULL
);
";

/// Construct the embedder selected by `[search] embedder`.
///
/// `auto` resolves to the local ONNX model when this crate is built with
/// `semantic-ort` and to the hash fallback otherwise.
///
/// # Errors
///
/// Returns [`KatibaError::EmbeddingModel`] when the local model cannot be
/// loaded, or `onnx` is requested from a build without `semantic-ort`.
pub fn build_embedder(config: &KatibaConfig) -> Result<Arc<dyn Embedder>> {
    let search = &config.search;
    match search.embedder {
        EmbedderKind::Hash => Ok(Arc::new(HashEmbedder::new(search.embedding_dim))),
        EmbedderKind::Api => Ok(Arc::new(ApiEmbedder::new(ApiEmbedderConfig {
            base_url: config.llm.base_url.clone(),
            api_key: config.llm.api_key.clone(),
            model: search.embedding_model.clone(),
            dimension: search.embedding_dim,
            timeout: config.llm.timeout(),
        }))),
        EmbedderKind::Onnx => onnx_embedder(config),
        EmbedderKind::Auto if cfg!(feature = "semantic-ort") => onnx_embedder(config),
        EmbedderKind::Auto => {
            warn!(
                "built without `semantic-ort`; using the hash embedder (set \
                 [search] embedder = \"hash\" to silence)"
            );
            Ok(Arc::new(HashEmbedder::new(search.embedding_dim)))
        }
    }
}

#[cfg(feature = "semantic-ort")]
fn onnx_embedder(config: &KatibaConfig) -> Result<Arc<dyn Embedder>> {
    let embedder = OrtEmbedder::load(&OrtEmbedderConfig {
        repo: config.search.onnx_model.clone(),
        model_dir: config.model_dir()?,
        mirror: config.search.model_mirror.clone(),
        dimension: config.search.embedding_dim,
        download_timeout: config.llm.timeout(),
    })?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "semantic-ort"))]
fn onnx_embedder(_config: &KatibaConfig) -> Result<Arc<dyn Embedder>> {
    Err(KatibaError::EmbeddingModel(
        "the onnx embedder needs a build with the `semantic-ort` feature".into(),
    ))
}

/// Embedding similarity search over whole articles.
pub struct SemanticIndex {
    articles: Vec<Article>,
    embeddings: Vec<Vec<f32>>,
    embedder: Arc<dyn Embedder>,
    location: PathBuf,
}

impl fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("articles", &self.articles.len())
            .field("embedder", &self.embedder.model_id())
            .field("location", &self.location)
            .finish()
    }
}

impl SemanticIndex {
    /// Open the semantic index at `dir`, embedding `corpus` with `embedder`
    /// first if the location is empty or was built by another embedder.
    ///
    /// # Errors
    ///
    /// - [`KatibaError::EmbeddingModel`] if the embedder fails or returns
    ///   vectors of the wrong width during the build.
    /// - [`KatibaError::IndexUnavailable`] if the location is corrupt.
    /// - [`KatibaError::Timeout`] if the build lock or a remote embedder
    ///   times out.
    pub fn open_or_build(
        dir: &Path,
        corpus: &Corpus,
        embedder: Arc<dyn Embedder>,
        options: &StoreOptions,
    ) -> Result<Self> {
        let location = IndexLocation::new(dir);
        let inputs = BuildInputs {
            kind: IndexKind::Semantic,
            corpus,
            embedder: Some((embedder.model_id(), embedder.dimension())),
        };
        let conn = location.open_or_build(&inputs, options, |tx| {
            build_tables(tx, corpus.articles(), embedder.as_ref())
        })?;

        let (articles, embeddings) = load(&conn, embedder.dimension())
            .map_err(|err| KatibaError::index_unavailable(dir, &err))?;
        debug!(
            location = %dir.display(),
            articles = articles.len(),
            embedder = embedder.model_id(),
            "semantic index loaded"
        );

        Ok(Self {
            articles,
            embeddings,
            embedder,
            location: dir.to_path_buf(),
        })
    }

    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

impl ArticleIndex for SemanticIndex {
    #[instrument(skip(self), fields(index = "semantic"))]
    fn search(&self, query: &Query, num_results: usize) -> Result<Vec<Article>> {
        if num_results == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(&query.text)?;
        if query_embedding.len() != self.embedder.dimension() {
            return Err(KatibaError::EmbeddingModel(format!(
                "query embedding dimension mismatch: expected {}, got {}",
                self.embedder.dimension(),
                query_embedding.len()
            )));
        }

        let hits = knn::top_k(&query_embedding, &self.embeddings, num_results, |pos| {
            self.articles[pos].number
        });
        debug!(hits = hits.len(), "semantic search complete");
        Ok(hits
            .into_iter()
            .map(|hit| self.articles[hit.position].clone())
            .collect())
    }
}

fn build_tables(
    tx: &Transaction<'_>,
    articles: &[Article],
    embedder: &dyn Embedder,
) -> anyhow::Result<()> {
    tx.execute_batch(SCHEMA)
        .context("create semantic index tables")?;

    let mut insert_article = tx
        .prepare(
            "INSERT INTO articles (position, number, title, clauses, chapter, part)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .context("prepare article insert")?;
    let mut insert_embedding = tx
        .prepare("INSERT INTO article_embeddings (number, embedding_json) VALUES (?1, ?2)")
        .context("prepare embedding insert")?;

    let dimension = embedder.dimension();
    let mut position = 0_i64;
    for (batch_no, batch) in articles.chunks(EMBED_BATCH_SIZE).enumerate() {
        let texts: Vec<String> = batch.iter().map(ToString::to_string).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = embedder
            .embed_batch(&refs)
            .with_context(|| format!("embed article batch {batch_no}"))?;

        if vectors.len() != batch.len() {
            return Err(KatibaError::EmbeddingModel(format!(
                "embedder returned {} vectors for {} articles",
                vectors.len(),
                batch.len()
            ))
            .into());
        }

        for (article, vector) in batch.iter().zip(&vectors) {
            if vector.len() != dimension {
                return Err(KatibaError::EmbeddingModel(format!(
                    "article {} embedded with dimension {}, expected {dimension}",
                    article.number,
                    vector.len()
                ))
                .into());
            }
            insert_article
                .execute(params![
                    position,
                    article.number,
                    article.title,
                    article.clauses,
                    article.chapter,
                    article.part,
                ])
                .with_context(|| format!("insert article {}", article.number))?;
            insert_embedding
                .execute(params![article.number, knn::encode_embedding_json(vector)])
                .with_context(|| format!("insert embedding for article {}", article.number))?;
            position += 1;
        }
        info!(
            embedded = position,
            total = articles.len(),
            "embedded article batch"
        );
    }
    Ok(())
}

fn load(conn: &Connection, dimension: usize) -> anyhow::Result<(Vec<Article>, Vec<Vec<f32>>)> {
    let mut stmt = conn
        .prepare(
            "SELECT a.number, a.title, a.clauses, a.chapter, a.part, e.embedding_json
             FROM articles a
             INNER JOIN article_embeddings e ON e.number = a.number
             ORDER BY a.position",
        )
        .context("prepare semantic index load (index corrupt?)")?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                Article {
                    number: row.get(0)?,
                    title: row.get(1)?,
                    clauses: row.get(2)?,
                    chapter: row.get(3)?,
                    part: row.get(4)?,
                },
                row.get::<_, String>(5)?,
            ))
        })
        .context("load semantic index rows")?;

    let mut articles = Vec::new();
    let mut embeddings = Vec::new();
    for row in rows {
        let (article, embedding_json) = row.context("read semantic index row")?;
        let embedding: Vec<f32> = serde_json::from_str(&embedding_json)
            .with_context(|| format!("decode embedding for article {}", article.number))?;
        if embedding.len() != dimension {
            bail!(
                "stored embedding for article {} has dimension {}, expected {dimension}",
                article.number,
                embedding.len()
            );
        }
        articles.push(article);
        embeddings.push(embedding);
    }
    Ok((articles, embeddings))
}
