use std::path::PathBuf;

use clap::{Parser, Subcommand};
use grimoire_core::Version;

#[derive(Debug, Parser)]
#[command(
    name = "grimoire",
    version,
    about = "Keep character sheet data libraries up to date"
)]
pub struct Cli {
    /// Log debug output to stderr and the log file.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show every registered library with its location and versions.
    List,

    /// Ask GitHub whether any library has a newer release.
    Check,

    /// Download a release of a library into its directory.
    Download {
        /// Library key, `<account>/<repo>`.
        key: String,

        /// Install this release instead of the newest available one.
        #[arg(long)]
        version: Option<Version>,
    },

    /// Move a library to another directory.
    SetPath { key: String, path: PathBuf },

    /// Register a library published on GitHub.
    Add {
        account: String,
        repo: String,
        title: String,
        path: PathBuf,
    },

    /// Unregister a library. Files on disk are left alone.
    Remove { key: String },
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use grimoire_core::Version;

    use super::{Cli, Command};

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn download_accepts_optional_version() {
        let cli = Cli::try_parse_from([
            "grimoire",
            "download",
            "richardwilkes/gcs_master_library",
            "--version",
            "5.2",
        ])
        .expect("download arguments should parse");

        match cli.command {
            Command::Download { key, version } => {
                assert_eq!(key, "richardwilkes/gcs_master_library");
                assert_eq!(version, Some(Version::new(5, 2, 0)));
            }
            other => panic!("expected download, got {other:?}"),
        }
    }

    #[test]
    fn malformed_version_is_rejected() {
        let result = Cli::try_parse_from(["grimoire", "download", "a/b", "--version", "five"]);

        assert!(result.is_err());
    }

    #[test]
    fn verbose_is_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from(["grimoire", "check", "--verbose"])
            .expect("global flag should parse after subcommand");

        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Check));
    }

    #[test]
    fn add_takes_all_four_arguments() {
        let cli = Cli::try_parse_from(["grimoire", "add", "alice", "extras", "Extras", "/tmp/x"])
            .expect("add arguments should parse");

        assert!(matches!(
            cli.command,
            Command::Add { ref account, ref repo, ref title, .. }
                if account == "alice" && repo == "extras" && title == "Extras"
        ));
    }
}
