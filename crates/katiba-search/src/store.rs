//! Index location lifecycle: open a published index or build one atomically.
//!
//! # Directory Layout
//!
//! ```text
//! <location>/
//!   index.sqlite3           # published index (data + index_meta)
//!   index.sqlite3.partial   # in-progress build, never opened by readers
//!   .build.lock             # advisory lock held while building
//! ```
//!
//! # Invariants
//!
//! - A location is either empty (no `index.sqlite3`) or fully populated.
//! - `index.sqlite3` only ever appears through `rename` of a completed build.
//! - Builds for one location are serialized by the advisory lock; the
//!   populated check is repeated after the lock is taken.
//! - A published index whose metadata no longer matches the build inputs
//!   (schema version, corpus fingerprint, embedder) is rebuilt in place.

use anyhow::{Context, anyhow, bail};
use katiba_core::corpus::Corpus;
use katiba_core::error::{KatibaError, Result};
use katiba_core::lock::{BuildLock, LockError};
use rusqlite::{Connection, OpenFlags, Transaction, params};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const INDEX_FILENAME: &str = "index.sqlite3";
const PARTIAL_FILENAME: &str = "index.sqlite3.partial";
const LOCK_FILENAME: &str = ".build.lock";

/// On-disk format version; bump when table layouts change.
pub const SCHEMA_VERSION: u32 = 1;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Which retrieval strategy owns an index location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Lexical,
    Semantic,
}

impl IndexKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Semantic => "semantic",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "lexical" => Some(Self::Lexical),
            "semantic" => Some(Self::Semantic),
            _ => None,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options controlling how a location is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long to wait for another builder to release the location.
    pub lock_timeout: Duration,
    /// Rebuild even when a fresh index is already published.
    pub force_rebuild: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            force_rebuild: false,
        }
    }
}

/// Metadata stored in the `index_meta` table of every published index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMeta {
    pub schema_version: u32,
    pub kind: IndexKind,
    pub corpus_fingerprint: String,
    pub article_count: usize,
    pub built_at: String,
    pub embedder: Option<String>,
    pub embedding_dim: Option<usize>,
}

/// What a build would produce; compared against published metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInputs<'a> {
    pub kind: IndexKind,
    pub corpus: &'a Corpus,
    pub embedder: Option<(&'a str, usize)>,
}

impl BuildInputs<'_> {
    /// Why `meta` does not describe an index built from these inputs, if so.
    fn staleness(&self, meta: &IndexMeta) -> Option<String> {
        if meta.schema_version != SCHEMA_VERSION {
            return Some(format!(
                "schema version {} (expected {SCHEMA_VERSION})",
                meta.schema_version
            ));
        }
        if meta.kind != self.kind {
            return Some(format!("index kind {} (expected {})", meta.kind, self.kind));
        }
        if meta.corpus_fingerprint != self.corpus.fingerprint() {
            return Some("corpus fingerprint changed".to_string());
        }
        let published = meta.embedder.as_deref().zip(meta.embedding_dim);
        if published != self.embedder {
            return Some(format!("embedder {published:?} (expected {:?})", self.embedder));
        }
        None
    }

    fn meta(&self) -> IndexMeta {
        IndexMeta {
            schema_version: SCHEMA_VERSION,
            kind: self.kind,
            corpus_fingerprint: self.corpus.fingerprint().to_string(),
            article_count: self.corpus.len(),
            built_at: chrono::Utc::now().to_rfc3339(),
            embedder: self.embedder.map(|(id, _)| id.to_string()),
            embedding_dim: self.embedder.map(|(_, dim)| dim),
        }
    }
}

/// Status of a location, reported without searching it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub location: PathBuf,
    pub populated: bool,
    pub meta: Option<IndexMeta>,
}

/// A storage directory owned by one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLocation {
    dir: PathBuf,
}

impl IndexLocation {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILENAME)
    }

    fn partial_path(&self) -> PathBuf {
        self.dir.join(PARTIAL_FILENAME)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILENAME)
    }

    /// True when a completed build has been published here.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.index_path().is_file()
    }

    /// Read the published metadata.
    ///
    /// # Errors
    ///
    /// Returns [`KatibaError::IndexUnavailable`] if the index file is missing,
    /// is not a readable SQLite database, or has incomplete metadata.
    pub fn read_meta(&self) -> Result<IndexMeta> {
        open_read_only(&self.index_path())
            .and_then(|conn| read_meta(&conn))
            .map_err(|err| KatibaError::index_unavailable(&self.dir, &err))
    }

    /// Report whether the location is populated and, if so, its metadata.
    ///
    /// # Errors
    ///
    /// Same as [`IndexLocation::read_meta`] for a populated location.
    pub fn status(&self) -> Result<IndexStatus> {
        let meta = if self.is_populated() {
            Some(self.read_meta()?)
        } else {
            None
        };
        Ok(IndexStatus {
            location: self.dir.clone(),
            populated: meta.is_some(),
            meta,
        })
    }

    /// Open the published index, building it first when the location is
    /// empty, stale, or `options.force_rebuild` is set.
    ///
    /// `build` fills the data tables inside the build transaction; metadata
    /// is written by this function. The returned connection is read-only.
    ///
    /// # Errors
    ///
    /// - [`KatibaError::IndexUnavailable`] when the location cannot be created,
    ///   the published index is corrupt, or the build fails.
    /// - [`KatibaError::Timeout`] when the build lock cannot be acquired.
    /// - Any [`KatibaError`] raised by `build` (wrapped in `anyhow`) is
    ///   returned unchanged.
    pub fn open_or_build<F>(
        &self,
        inputs: &BuildInputs<'_>,
        options: &StoreOptions,
        build: F,
    ) -> Result<Connection>
    where
        F: FnOnce(&Transaction<'_>) -> anyhow::Result<()>,
    {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create index directory {}", self.dir.display()))
            .map_err(|err| KatibaError::index_unavailable(&self.dir, &err))?;

        if !options.force_rebuild && self.is_fresh(inputs)? {
            debug!(location = %self.dir.display(), kind = %inputs.kind, "opening published index");
            return self.open_published();
        }

        let lock = BuildLock::acquire(&self.lock_path(), options.lock_timeout)
            .map_err(|err| self.lock_error(err))?;

        // Another process may have published while we waited for the lock.
        if !options.force_rebuild && self.is_fresh(inputs)? {
            lock.release();
            return self.open_published();
        }

        let started = Instant::now();
        info!(
            location = %self.dir.display(),
            kind = %inputs.kind,
            articles = inputs.corpus.len(),
            "building index"
        );

        self.build_and_publish(inputs, build).map_err(|err| {
            match err.downcast::<KatibaError>() {
                Ok(katiba) => katiba,
                Err(err) => KatibaError::index_unavailable(&self.dir, &err),
            }
        })?;
        lock.release();

        info!(
            location = %self.dir.display(),
            kind = %inputs.kind,
            elapsed_ms = started.elapsed().as_millis(),
            "index published"
        );
        self.open_published()
    }

    fn is_fresh(&self, inputs: &BuildInputs<'_>) -> Result<bool> {
        if !self.is_populated() {
            return Ok(false);
        }
        let meta = self.read_meta()?;
        match inputs.staleness(&meta) {
            None => Ok(true),
            Some(reason) => {
                warn!(
                    location = %self.dir.display(),
                    kind = %inputs.kind,
                    %reason,
                    "published index is stale, rebuilding"
                );
                Ok(false)
            }
        }
    }

    fn open_published(&self) -> Result<Connection> {
        open_read_only(&self.index_path())
            .map_err(|err| KatibaError::index_unavailable(&self.dir, &err))
    }

    fn build_and_publish<F>(&self, inputs: &BuildInputs<'_>, build: F) -> anyhow::Result<()>
    where
        F: FnOnce(&Transaction<'_>) -> anyhow::Result<()>,
    {
        let partial = self.partial_path();
        remove_if_exists(&partial)?;

        let result = write_partial(&partial, inputs, build).and_then(|()| {
            std::fs::rename(&partial, self.index_path()).with_context(|| {
                format!(
                    "publish {} as {}",
                    partial.display(),
                    self.index_path().display()
                )
            })
        });

        result.inspect_err(|_| {
            if let Err(cleanup) = remove_if_exists(&partial) {
                warn!(
                    path = %partial.display(),
                    error = %format!("{cleanup:#}"),
                    "could not remove partial index after failed build"
                );
            }
        })
    }

    fn lock_error(&self, err: LockError) -> KatibaError {
        match err {
            LockError::Io { source, .. } => KatibaError::index_unavailable(
                &self.dir,
                &anyhow!(source).context("acquire index build lock"),
            ),
            timeout @ LockError::Timeout { .. } => timeout.into(),
        }
    }
}

fn write_partial<F>(path: &Path, inputs: &BuildInputs<'_>, build: F) -> anyhow::Result<()>
where
    F: FnOnce(&Transaction<'_>) -> anyhow::Result<()>,
{
    let mut conn = Connection::open(path)
        .with_context(|| format!("create index database {}", path.display()))?;
    let tx = conn.transaction().context("begin index build transaction")?;

    tx.execute_batch(
        "CREATE TABLE index_meta (
             key TEXT PRIMARY KEY,
             value TEXT NOT NULL
         );",
    )
    .context("create index_meta table")?;

    build(&tx)?;
    write_meta(&tx, &inputs.meta())?;

    tx.commit().context("commit index build")?;
    conn.close()
        .map_err(|(_, err)| err)
        .context("close index database")?;
    Ok(())
}

fn write_meta(tx: &Transaction<'_>, meta: &IndexMeta) -> anyhow::Result<()> {
    let mut rows = vec![
        ("schema_version", meta.schema_version.to_string()),
        ("index_kind", meta.kind.as_str().to_string()),
        ("corpus_fingerprint", meta.corpus_fingerprint.clone()),
        ("article_count", meta.article_count.to_string()),
        ("built_at", meta.built_at.clone()),
    ];
    if let Some(embedder) = &meta.embedder {
        rows.push(("embedder", embedder.clone()));
    }
    if let Some(dim) = meta.embedding_dim {
        rows.push(("embedding_dim", dim.to_string()));
    }

    for (key, value) in rows {
        tx.execute(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .with_context(|| format!("write index metadata {key}"))?;
    }
    Ok(())
}

fn read_meta(conn: &Connection) -> anyhow::Result<IndexMeta> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM index_meta")
        .context("read index_meta (index corrupt?)")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .context("query index_meta")?;

    let mut values = HashMap::new();
    for row in rows {
        let (key, value) = row.context("read index_meta row")?;
        values.insert(key, value);
    }

    let required = |key: &str| {
        values
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("index metadata missing '{key}'"))
    };

    let kind_raw = required("index_kind")?;
    let Some(kind) = IndexKind::parse(&kind_raw) else {
        bail!("unknown index kind '{kind_raw}'");
    };

    Ok(IndexMeta {
        schema_version: required("schema_version")?
            .parse()
            .context("parse schema_version")?,
        kind,
        corpus_fingerprint: required("corpus_fingerprint")?,
        article_count: required("article_count")?
            .parse()
            .context("parse article_count")?,
        built_at: required("built_at")?,
        embedder: values.get("embedder").cloned(),
        embedding_dim: values
            .get("embedding_dim")
            .map(|raw| raw.parse())
            .transpose()
            .context("parse embedding_dim")?,
    })
}

fn open_read_only(path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("open index database {}", path.display()))?;
    // Touch the schema so a non-database file fails here, not on first search.
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .with_context(|| format!("read index database {}", path.display()))?;
    Ok(conn)
}

fn remove_if_exists(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}
