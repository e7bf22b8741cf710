#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use cmd::{Context, Overrides};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "katiba: ask questions about the Constitution of Kenya",
    long_about = None
)]
struct Cli {
    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty, text, or json.
    #[arg(long, value_enum, global = true)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Article corpus (JSON array). Defaults to <data-dir>/constitution_articles.json.
    #[arg(long, global = true, value_name = "PATH")]
    corpus: Option<PathBuf>,

    /// Directory holding the indexes. Defaults to the OS data directory.
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            corpus: self.corpus.clone(),
            data_dir: self.data_dir.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    Search(cmd::search::SearchArgs),
    Ask(cmd::ask::AskArgs),
    Index(cmd::index::IndexArgs),
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("KATIBA_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "katiba=debug,info"
        } else {
            "katiba=info,warn"
        })
    });

    let format = env::var("KATIBA_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Search(args) => {
            cmd::search::run_search(args, output, &Context::load(&cli.overrides())?)
        }
        Commands::Ask(args) => cmd::ask::run_ask(args, output, &Context::load(&cli.overrides())?),
        Commands::Index(args) => {
            cmd::index::run_index(args, output, &Context::load(&cli.overrides())?)
        }
        Commands::Completions(args) => {
            let mut out = std::io::stdout();
            cmd::completions::run_completions(args.shell, &mut Cli::command(), &mut out);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    // A missing .env is normal; anything it sets is read by KatibaConfig::load.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Ok(path) = &dotenv {
        debug!(path = %path.display(), "loaded .env");
    }

    let output = cli.output_mode();
    match run(&cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let cli_error = CliError::from_anyhow(&err);
            error!(
                code = cli_error.error_code.as_deref().unwrap_or("-"),
                "{err:#}"
            );
            if let Err(render_err) = render_error(output, &cli_error) {
                eprintln!("error: {err:#} (while rendering: {render_err})");
            }
            ExitCode::FAILURE
        }
    }
}
