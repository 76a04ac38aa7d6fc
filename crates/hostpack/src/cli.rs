//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// hostpack - package, back up and self-update a hosted deployment
#[derive(Parser, Debug)]
#[command(name = "hostpack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to hostpack.yaml config file
    #[arg(short, long, global = true, env = "HOSTPACK_CONFIG")]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check whether a newer release is available
    Check(CheckArgs),

    /// Back up the deployment and install the latest (or a given) release
    Update(UpdateArgs),

    /// Restore the most recent backup
    Restore(RestoreArgs),

    /// Build a deployable package from the configured roots
    Package(PackageArgs),

    /// Manage backups
    #[command(subcommand)]
    Backups(BackupsCommands),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Install the package at this URL instead of the latest release
    #[arg(long, requires = "version")]
    pub url: Option<String>,

    /// Version of the package given with --url
    #[arg(long, requires = "url")]
    pub version: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PackageArgs {
    /// Package file to write (.zip, .tar.gz or .tgz)
    #[arg(short, long)]
    pub output: Utf8PathBuf,

    /// Compression level (1-9)
    #[arg(long)]
    pub level: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum BackupsCommands {
    /// List backups, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete all but the most recent backups
    Prune {
        /// Number of backups to keep (defaults to the configured retention)
        #[arg(long, value_parser = parse_keep)]
        keep: Option<usize>,
    },
}

fn parse_keep(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("at least one backup must be kept".to_string()),
        Ok(keep) => Ok(keep),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_update_url_requires_version() {
        assert!(Cli::try_parse_from(["hostpack", "update", "--url", "https://x/p.zip"]).is_err());

        let cli = Cli::try_parse_from([
            "hostpack",
            "-vv",
            "update",
            "--url",
            "https://x/p.zip",
            "--version",
            "2.1.0",
            "--yes",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Update(args) => {
                assert_eq!(args.version.as_deref(), Some("2.1.0"));
                assert!(args.yes);
                assert!(!args.json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_backups_prune_keep() {
        let cli = Cli::try_parse_from(["hostpack", "backups", "prune", "--keep", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Backups(BackupsCommands::Prune { keep: Some(5) })
        ));
    }

    #[test]
    fn test_backups_prune_rejects_keep_zero() {
        let result = Cli::try_parse_from(["hostpack", "backups", "prune", "--keep", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["hostpack", "check", "--json", "-c", "/etc/hostpack.yaml"])
                .unwrap();
        assert_eq!(cli.config.as_deref(), Some(camino::Utf8Path::new("/etc/hostpack.yaml")));
        assert!(matches!(cli.command, Commands::Check(CheckArgs { json: true })));
    }
}
