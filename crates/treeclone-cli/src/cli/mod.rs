//! CLI for treeclone.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use treeclone_core::checksum::HashAlgorithm;
use treeclone_core::config::{self, CloneConfig};

use commands::{run_checksum, run_clone, run_completions, run_manpage, CloneArgs};

/// Top-level CLI for treeclone.
#[derive(Debug, Parser)]
#[command(name = "treeclone")]
#[command(about = "Mirror the files listed in CSV manifests from a remote root into a local directory", long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of the XDG config file.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Clone every entry of one or more manifests, one job per manifest.
    Clone(CloneArgs),

    /// Print the fingerprint of a local file, as compared against remote ETags.
    Checksum {
        /// Path to the file.
        path: PathBuf,

        /// Hash function (md5 or sha256).
        #[arg(long, default_value_t = HashAlgorithm::Md5)]
        algorithm: HashAlgorithm,
    },

    /// Print a shell completion script to stdout.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the man page (roff) to stdout.
    Manpage,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Clone(args) => {
                let cfg = load_config(cli.config.as_deref())?;
                run_clone(cfg, args).await?
            }
            CliCommand::Checksum { path, algorithm } => run_checksum(&path, algorithm)?,
            CliCommand::Completions { shell } => run_completions(shell)?,
            CliCommand::Manpage => run_manpage()?,
        }

        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<CloneConfig> {
    let cfg = match path {
        Some(p) => config::load_from_path(p)?,
        None => config::load_or_init()?,
    };
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}

#[cfg(test)]
mod tests;
