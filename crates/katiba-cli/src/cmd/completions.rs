use clap::Args;
use clap_complete::{Shell, generate};
use std::io::Write;

/// Arguments for `katiba completions`.
#[derive(Args, Debug)]
#[command(
    about = "Generate shell completions",
    after_help = "EXAMPLES:\n    katiba completions bash > ~/.local/share/bash-completion/completions/katiba\n    \
                  katiba completions zsh > ~/.zfunc/_katiba"
)]
pub struct CompletionsArgs {
    /// Target shell for the completion script.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Write the completion script for `shell` to `out`.
pub fn run_completions(shell: Shell, command: &mut clap::Command, out: &mut dyn Write) {
    generate(shell, command, "katiba", out);
}
