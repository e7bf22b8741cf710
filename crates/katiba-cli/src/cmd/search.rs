//! `katiba search`: ranked constitution articles for a question.
//!
//! Hybrid (lexical BM25 fused with semantic KNN) by default; `--lexical` or
//! `--semantic` query one index alone. Single-index scores use the same RRF
//! contribution as fused results so scores read the same in every mode.

use super::Context;
use crate::output::{CliError, OutputMode, pretty_rule, pretty_section, render_mode};
use clap::Args;
use katiba_core::article::{Article, Query};
use katiba_core::index::ArticleIndex;
use katiba_search::HybridHit;
use katiba_search::fusion::rrf_score;
use serde::Serialize;
use std::io::{self, Write};
use tracing::{debug, instrument};

#[derive(Args, Debug)]
#[command(
    about = "Search constitution articles",
    long_about = "Search the constitution using hybrid ranking: lexical BM25 over titles and \
                  clauses fused with embedding similarity via Reciprocal Rank Fusion.\n\n\
                  Indexes are built on first use under the data directory.",
    after_help = "EXAMPLES:\n    # Who holds power under the constitution?\n    katiba search 'Who holds sovereign power?'\n\n\
                  # Fewer results\n    katiba search 'rights of arrested persons' -n 3\n\n\
                  # Lexical only, full article text\n    katiba search senate --lexical --full\n\n\
                  # Machine-readable output\n    katiba search 'land ownership' --format json"
)]
pub struct SearchArgs {
    /// Free-text question or keywords.
    pub query: String,

    /// Maximum number of articles to return.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Lexical search only (FTS5/BM25).
    #[arg(long, conflicts_with = "semantic")]
    pub lexical: bool,

    /// Semantic search only (embedding KNN).
    #[arg(long)]
    pub semantic: bool,

    /// Include each article's clauses in the output.
    #[arg(long)]
    pub full: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Hybrid,
    Lexical,
    Semantic,
}

impl SearchMode {
    const fn from_args(args: &SearchArgs) -> Self {
        if args.lexical {
            Self::Lexical
        } else if args.semantic {
            Self::Semantic
        } else {
            Self::Hybrid
        }
    }
}

/// A single search result row.
#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub number: u32,
    pub title: String,
    pub chapter: String,
    pub part: Option<String>,
    /// RRF score; higher is better.
    pub score: f64,
    pub lexical_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clauses: Option<String>,
}

/// JSON envelope for search output.
#[derive(Debug, Serialize)]
pub struct SearchOutput {
    pub query: String,
    pub mode: SearchMode,
    pub count: usize,
    /// Best match first.
    pub results: Vec<SearchResult>,
}

/// Execute `katiba search <query>`.
#[instrument(skip_all, fields(query = %args.query))]
pub fn run_search(args: &SearchArgs, output: OutputMode, ctx: &Context) -> anyhow::Result<()> {
    let query = Query::new(args.query.as_str());
    if query.is_blank() {
        return Err(CliError::with_details(
            "search query must not be empty",
            "provide a question such as 'Who holds sovereign power?'",
            "empty_query",
        )
        .into());
    }

    let mode = SearchMode::from_args(args);
    let limit = args.limit.unwrap_or(ctx.config.search.num_results);
    let rrf_k = ctx.config.search.rrf_k;

    let corpus = ctx.corpus()?;
    let store = ctx.store_options(false);

    let hits = match mode {
        SearchMode::Hybrid => ctx
            .open_hybrid(&corpus, &store)?
            .search_explained(&query, limit)?,
        SearchMode::Lexical => {
            let index = ctx.open_lexical(&corpus, &store)?;
            single_index_hits(index.search(&query, limit)?, rrf_k, |hit, rank| {
                hit.lexical_rank = Some(rank);
            })
        }
        SearchMode::Semantic => {
            let index = ctx.open_semantic(&corpus, &store)?;
            single_index_hits(index.search(&query, limit)?, rrf_k, |hit, rank| {
                hit.semantic_rank = Some(rank);
            })
        }
    };
    debug!(?mode, count = hits.len(), "search complete");

    let results: Vec<SearchResult> = hits
        .into_iter()
        .map(|hit| SearchResult {
            number: hit.article.number,
            clauses: args.full.then(|| hit.article.clauses.clone()),
            title: hit.article.title,
            chapter: hit.article.chapter,
            part: hit.article.part,
            score: hit.score,
            lexical_rank: hit.lexical_rank,
            semantic_rank: hit.semantic_rank,
        })
        .collect();

    let search_output = SearchOutput {
        query: args.query.clone(),
        mode,
        count: results.len(),
        results,
    };

    render_mode(
        output,
        &search_output,
        |out, w| render_search_text(out, w),
        |out, w| render_search_pretty(out, w),
    )
}

fn single_index_hits(
    articles: Vec<Article>,
    rrf_k: usize,
    set_rank: impl Fn(&mut HybridHit, usize),
) -> Vec<HybridHit> {
    articles
        .into_iter()
        .enumerate()
        .map(|(i, article)| {
            let rank = i + 1;
            let mut hit = HybridHit {
                article,
                score: rrf_score(rank, rrf_k),
                lexical_rank: None,
                semantic_rank: None,
            };
            set_rank(&mut hit, rank);
            hit
        })
        .collect()
}

fn rank_label(rank: Option<usize>) -> String {
    rank.map_or_else(|| "-".to_string(), |r| r.to_string())
}

fn render_search_text(out: &SearchOutput, w: &mut dyn Write) -> io::Result<()> {
    if out.results.is_empty() {
        return writeln!(w, "no results");
    }

    for (i, r) in out.results.iter().enumerate() {
        writeln!(
            w,
            "{}  article {}  score={:.4}  {}  (chapter: {})",
            i + 1,
            r.number,
            r.score,
            r.title,
            r.chapter
        )?;
        if let Some(clauses) = &r.clauses {
            writeln!(w, "{clauses}")?;
            writeln!(w)?;
        }
    }
    Ok(())
}

fn render_search_pretty(out: &SearchOutput, w: &mut dyn Write) -> io::Result<()> {
    let heading = format!(
        "Search: \"{}\" ({:?}, {} result{})",
        out.query,
        out.mode,
        out.count,
        if out.count == 1 { "" } else { "s" }
    );
    pretty_section(w, &heading)?;

    if out.results.is_empty() {
        writeln!(w, "No matching articles.")?;
        return Ok(());
    }

    writeln!(
        w,
        "{:<4}  {:<7}  {:>8}  {:>3}  {:>3}  TITLE",
        "#", "ARTICLE", "SCORE", "LEX", "SEM"
    )?;
    pretty_rule(w)?;
    for (i, r) in out.results.iter().enumerate() {
        writeln!(
            w,
            "{:<4}  {:<7}  {:>8.4}  {:>3}  {:>3}  {}",
            i + 1,
            r.number,
            r.score,
            rank_label(r.lexical_rank),
            rank_label(r.semantic_rank),
            r.title
        )?;
        writeln!(w, "{:<30}Chapter: {}", "", r.chapter)?;
        if let Some(part) = &r.part {
            writeln!(w, "{:<30}Part: {part}", "")?;
        }
        if let Some(clauses) = &r.clauses {
            writeln!(w)?;
            writeln!(w, "{clauses}")?;
            writeln!(w)?;
        }
    }
    Ok(())
}
