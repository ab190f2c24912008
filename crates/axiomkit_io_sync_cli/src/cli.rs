use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Default, Parser)]
#[command(name = "axiomkit-sync")]
#[command(about = "Mirror a source directory tree onto a destination tree", long_about = None)]
pub struct Cli {
    /// Source directory (overrides config file and directories file)
    pub source: Option<PathBuf>,

    /// Destination directory (overrides config file and directories file)
    pub destination: Option<PathBuf>,

    /// TOML config file [default: axiomkit_sync.toml, if present]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Two-line file: source on line 1, destination on line 2
    #[arg(long, value_name = "FILE", default_value = "directories.txt")]
    pub directories_file: PathBuf,

    /// Name pattern hidden from both sides; repeatable
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub patterns_ignore: Vec<String>,

    /// Also ignore RCS, CVS, tags, .git, .hg, .bzr, _darcs, __pycache__
    #[arg(long)]
    pub default_ignores: bool,

    /// How ignore patterns are interpreted: glob, regex or literal
    #[arg(long, value_name = "MODE")]
    pub pattern_mode: Option<String>,

    /// How same-named files are compared: shallow, content or metadata
    #[arg(long, value_name = "MODE")]
    pub compare: Option<String>,

    /// Maximum worker threads (1 runs serially)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Copy content only; skip permissions, times and extended attributes
    #[arg(long)]
    pub no_preserve_metadata: bool,

    /// Report what would change without touching the destination
    #[arg(long)]
    pub dry_run: bool,

    /// Log file [default: sync.log]
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::{CommandFactory, Parser};

    use super::Cli;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_parses_repeated_ignores_and_flags() {
        let args = Cli::try_parse_from([
            "axiomkit-sync",
            "src",
            "dst",
            "--ignore",
            "*.tmp",
            "--ignore",
            ".cache",
            "--workers",
            "3",
            "--dry-run",
        ])
        .expect("parse");

        assert_eq!(args.source, Some(PathBuf::from("src")));
        assert_eq!(args.destination, Some(PathBuf::from("dst")));
        assert_eq!(args.patterns_ignore, vec!["*.tmp", ".cache"]);
        assert_eq!(args.workers, Some(3));
        assert!(args.dry_run);
        assert!(!args.no_preserve_metadata);
        assert_eq!(args.directories_file, PathBuf::from("directories.txt"));
    }
}
