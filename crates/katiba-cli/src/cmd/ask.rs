//! `katiba ask`: retrieval-augmented answer from the configured LLM.

use super::Context;
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_mode};
use clap::Args;
use katiba_core::article::Query;
use katiba_core::prompt::DEFAULT_PROMPT_TEMPLATE;
use katiba_llm::OpenAiCompatibleLlm;
use katiba_llm::rag::{AI_NOTICE, Answer, answer};
use serde::Serialize;
use std::io::{self, Write};
use tracing::{info, instrument};

#[derive(Args, Debug)]
#[command(
    about = "Answer a question using retrieved articles as context",
    long_about = "Retrieve the most relevant articles with hybrid search, pass them to an \
                  OpenAI-compatible chat model, and print its answer followed by the \
                  referenced article titles.\n\n\
                  Requires LLM_API_KEY and LLM_MODEL_NAME (environment, .env, or [llm] in config.toml). \
                  LLM_BASE_URL selects another compatible endpoint.",
    after_help = "EXAMPLES:\n    katiba ask 'Can the President dissolve Parliament?'\n\n\
                  # More context articles\n    katiba ask 'What rights does an arrested person have?' -n 8"
)]
pub struct AskArgs {
    /// The question to answer.
    pub query: String,

    /// Number of articles passed to the model as context.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ReferenceRow {
    pub number: u32,
    pub title: String,
}

/// JSON envelope for ask output.
#[derive(Debug, Serialize)]
pub struct AskOutput {
    pub query: String,
    pub model: String,
    pub answer: String,
    pub notice: &'static str,
    pub references: Vec<ReferenceRow>,
    #[serde(skip)]
    rendered: String,
}

impl AskOutput {
    fn new(query: &str, model: &str, result: &Answer) -> Self {
        Self {
            query: query.to_string(),
            model: model.to_string(),
            answer: result.response.text.clone(),
            notice: AI_NOTICE,
            references: result
                .references
                .iter()
                .map(|article| ReferenceRow {
                    number: article.number,
                    title: article.title.clone(),
                })
                .collect(),
            rendered: result.to_string(),
        }
    }
}

/// Execute `katiba ask <query>`.
#[instrument(skip_all, fields(query = %args.query))]
pub fn run_ask(args: &AskArgs, output: OutputMode, ctx: &Context) -> anyhow::Result<()> {
    let query = Query::new(args.query.as_str());
    if query.is_blank() {
        return Err(CliError::with_details(
            "question must not be empty",
            "ask something like 'Who holds sovereign power?'",
            "empty_query",
        )
        .into());
    }

    // Fail on missing credentials before spending time on index builds.
    let llm = OpenAiCompatibleLlm::from_config(&ctx.config.llm)?;
    let limit = args.limit.unwrap_or(ctx.config.search.num_results);

    let corpus = ctx.corpus()?;
    let index = ctx.open_hybrid(&corpus, &ctx.store_options(false))?;
    let result = answer(&index, &llm, DEFAULT_PROMPT_TEMPLATE, &query, limit)?;
    info!(
        model = llm.model_name(),
        references = result.references.len(),
        "answer generated"
    );

    let ask_output = AskOutput::new(&args.query, llm.model_name(), &result);
    render_mode(
        output,
        &ask_output,
        |out, w| writeln!(w, "{}", out.rendered),
        |out, w| render_ask_pretty(out, w),
    )
}

fn render_ask_pretty(out: &AskOutput, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Q: {}", out.query))?;
    writeln!(w, "{}", out.answer)?;
    writeln!(w)?;
    writeln!(w, "{}", out.notice)?;
    writeln!(w)?;
    pretty_section(w, "Context")?;
    for reference in &out.references {
        pretty_kv(w, &format!("Article {}", reference.number), &reference.title)?;
    }
    pretty_kv(w, "Model", &out.model)
}
