//! `katiba index`: build (or rebuild) both indexes and report their status.

use super::Context;
use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_mode};
use clap::Args;
use katiba_search::IndexStatus;
use katiba_search::store::IndexLocation;
use serde::Serialize;
use std::io::{self, Write};
use std::time::Instant;
use tracing::{info, instrument};

#[derive(Args, Debug)]
#[command(
    about = "Build the search indexes and show their status",
    long_about = "Open the lexical and semantic indexes, building any that are missing or \
                  stale for the current corpus, then print where they live and what they hold.",
    after_help = "EXAMPLES:\n    # Build on first use, report status\n    katiba index\n\n\
                  # Recreate both indexes from the corpus\n    katiba index --rebuild"
)]
pub struct IndexArgs {
    /// Rebuild both indexes even when they are up to date.
    #[arg(long)]
    pub rebuild: bool,
}

/// JSON envelope for index output.
#[derive(Debug, Serialize)]
pub struct IndexOutput {
    pub corpus: String,
    pub articles: usize,
    pub rebuilt: bool,
    pub elapsed_ms: u128,
    pub lexical: IndexStatus,
    pub semantic: IndexStatus,
}

/// Execute `katiba index`.
#[instrument(skip_all, fields(rebuild = args.rebuild))]
pub fn run_index(args: &IndexArgs, output: OutputMode, ctx: &Context) -> anyhow::Result<()> {
    let started = Instant::now();
    let corpus = ctx.corpus()?;
    let store = ctx.store_options(args.rebuild);

    ctx.open_lexical(&corpus, &store)?;
    ctx.open_semantic(&corpus, &store)?;
    let elapsed = started.elapsed();
    info!(
        articles = corpus.len(),
        elapsed_ms = elapsed.as_millis(),
        "indexes ready"
    );

    let index_output = IndexOutput {
        corpus: corpus.path().display().to_string(),
        articles: corpus.len(),
        rebuilt: args.rebuild,
        elapsed_ms: elapsed.as_millis(),
        lexical: IndexLocation::new(ctx.lexical_dir()).status()?,
        semantic: IndexLocation::new(ctx.semantic_dir()).status()?,
    };

    render_mode(
        output,
        &index_output,
        |out, w| render_index_text(out, w),
        |out, w| render_index_pretty(out, w),
    )
}

fn status_line(status: &IndexStatus) -> String {
    status.meta.as_ref().map_or_else(
        || "not built".to_string(),
        |meta| {
            let mut line = format!("{} articles, built {}", meta.article_count, meta.built_at);
            if let (Some(embedder), Some(dim)) = (&meta.embedder, meta.embedding_dim) {
                line.push_str(&format!(", embedder {embedder} ({dim} dims)"));
            }
            line
        },
    )
}

fn render_index_text(out: &IndexOutput, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "corpus\t{}\t{} articles", out.corpus, out.articles)?;
    for (name, status) in [("lexical", &out.lexical), ("semantic", &out.semantic)] {
        writeln!(
            w,
            "{name}\t{}\t{}",
            status.location.display(),
            status_line(status)
        )?;
    }
    Ok(())
}

fn render_index_pretty(out: &IndexOutput, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, if out.rebuilt { "Indexes rebuilt" } else { "Indexes ready" })?;
    pretty_kv(w, "Corpus", &out.corpus)?;
    pretty_kv(w, "Articles", out.articles.to_string())?;
    pretty_kv(w, "Elapsed", format!("{} ms", out.elapsed_ms))?;
    for (name, status) in [("Lexical", &out.lexical), ("Semantic", &out.semantic)] {
        writeln!(w)?;
        writeln!(w, "{name}")?;
        pretty_rule(w)?;
        pretty_kv(w, "Location", status.location.display().to_string())?;
        pretty_kv(w, "Status", status_line(status))?;
        if let Some(meta) = &status.meta {
            pretty_kv(w, "Fingerprint", &meta.corpus_fingerprint)?;
            pretty_kv(w, "Schema", meta.schema_version.to_string())?;
        }
    }
    Ok(())
}
