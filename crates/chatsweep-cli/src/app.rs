//! CLI argument definitions

use chatsweep_core::{Config, SweepOptions};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chatsweep")]
#[command(
    author,
    version,
    about = "Remove stale chats and orphaned files, vector collections and uploads"
)]
pub struct Cli {
    /// Main database (sqlite://path or postgres://user@host/db)
    #[arg(long, env = "CHATSWEEP_MAIN_DB_URL")]
    pub main_db_url: String,

    /// Vector database (sqlite://path or postgres://user@host/db); may equal the main URL
    #[arg(long, env = "CHATSWEEP_VECTOR_DB_URL")]
    pub vector_db_url: String,

    /// Directory holding uploaded files
    #[arg(long, env = "CHATSWEEP_UPLOADS_DIR")]
    pub uploads_dir: PathBuf,

    /// Days to keep unarchived chats, 0 or more; negative values are rejected
    #[arg(long, env = "CHATSWEEP_KEEP_DAYS")]
    pub keep_days: u32,

    /// Do not delete uploads or commit database changes
    #[arg(long)]
    pub dry_run: bool,

    /// Log progress
    #[arg(short, long)]
    pub verbose: bool,

    /// Select instead of delete and list everything; implies --dry-run
    #[arg(long)]
    pub debug: bool,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn sweep_options(&self, config: &Config) -> SweepOptions {
        SweepOptions::new(self.keep_days)
            .with_dry_run(self.dry_run)
            .with_debug(self.debug)
            .with_memory_collection_prefix(config.memory_collection_prefix.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const REQUIRED: [&str; 9] = [
        "chatsweep",
        "--main-db-url",
        "sqlite://main.db",
        "--vector-db-url",
        "sqlite://vector.db",
        "--uploads-dir",
        "/data/uploads",
        "--keep-days",
        "30",
    ];

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_debug_implies_dry_run() {
        let mut args = REQUIRED.to_vec();
        args.push("--debug");
        let cli = Cli::try_parse_from(args).unwrap();
        let options = cli.sweep_options(&Config::default());
        assert!(options.debug);
        assert!(options.is_dry_run());
        assert_eq!(options.keep_days, 30);
    }

    #[test]
    fn test_config_prefix_flows_into_options() {
        let cli = Cli::try_parse_from(REQUIRED).unwrap();
        let config = Config {
            memory_collection_prefix: "mem-".to_string(),
        };
        assert_eq!(cli.sweep_options(&config).memory_collection_prefix, "mem-");
        assert!(!cli.sweep_options(&config).is_dry_run());
    }

    #[test]
    fn test_negative_keep_days_rejected() {
        let mut args = REQUIRED.to_vec();
        args[8] = "-1";
        assert!(Cli::try_parse_from(args).is_err());
    }
}
