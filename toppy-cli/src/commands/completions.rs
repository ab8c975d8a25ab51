//! Shell completion generation.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io;

use crate::Cli;

/// Write the completion script for `shell` to `out`.
fn write_completions(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    write_completions(shell, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(shell: Shell) -> String {
        let mut buf = Vec::new();
        write_completions(shell, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_bash_completions_list_subcommands() {
        let out = script(Shell::Bash);
        for sub in ["ready", "turbo", "dir", "get", "put", "mkdir"] {
            assert!(out.contains(sub), "missing {sub}");
        }
    }

    #[test]
    fn test_zsh_completions_name_binary() {
        assert!(script(Shell::Zsh).contains("#compdef toppy"));
    }
}
