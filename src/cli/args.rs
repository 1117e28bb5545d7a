//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Adaptive capture loop for an all-sky camera
#[derive(Parser, Debug)]
#[command(name = "allsky-capture")]
#[command(version, about = "Day/night adaptive all-sky camera capture", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Take dark frames instead of normal images
    #[arg(long)]
    pub dark_frames: bool,

    /// Don't capture during the day
    #[arg(long)]
    pub no_daytime: bool,

    /// Show a preview window while capturing
    #[arg(long)]
    pub preview: bool,

    /// Log verbosity: 0-1 info, 2-3 debug, 4+ trace (RUST_LOG overrides)
    #[arg(long, short = 'd', default_value = "1")]
    pub debug_level: u8,
}

impl Args {
    /// Default log filter for the requested debug level.
    pub fn log_filter(&self) -> &'static str {
        match self.debug_level {
            0 | 1 => "info",
            2 | 3 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show whether it is day or night at the configured location
    Sun,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["allsky-capture"]);
        assert!(args.command.is_none());
        assert!(args.config.is_none());
        assert!(!args.dark_frames);
        assert!(!args.no_daytime);
        assert!(!args.preview);
        assert_eq!(args.debug_level, 1);
        assert_eq!(args.log_filter(), "info");
    }

    #[test]
    fn test_args_capture_flags() {
        let args = Args::parse_from([
            "allsky-capture",
            "--dark-frames",
            "--no-daytime",
            "--preview",
        ]);
        assert!(args.dark_frames);
        assert!(args.no_daytime);
        assert!(args.preview);
    }

    #[test]
    fn test_args_debug_level_filters() {
        let args = Args::parse_from(["allsky-capture", "--debug-level", "0"]);
        assert_eq!(args.log_filter(), "info");
        let args = Args::parse_from(["allsky-capture", "-d", "3"]);
        assert_eq!(args.log_filter(), "debug");
        let args = Args::parse_from(["allsky-capture", "-d", "4"]);
        assert_eq!(args.log_filter(), "trace");
    }

    #[test]
    fn test_args_config_option() {
        let args = Args::parse_from(["allsky-capture", "--config", "/tmp/config.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/config.toml")));

        let args = Args::parse_from(["allsky-capture", "-c", "/tmp/test.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/test.toml")));
    }

    #[test]
    fn test_args_config_after_subcommand() {
        let args = Args::parse_from(["allsky-capture", "sun", "--config", "/tmp/c.toml"]);
        assert!(matches!(args.command, Some(Command::Sun)));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_args_config_show_subcommand() {
        let args = Args::parse_from(["allsky-capture", "config", "show"]);
        match args.command {
            Some(Command::Config {
                action: ConfigAction::Show,
            }) => (),
            _ => panic!("Expected Config Show subcommand"),
        }
    }

    #[test]
    fn test_args_config_init_subcommand() {
        let args = Args::parse_from(["allsky-capture", "config", "init"]);
        match args.command {
            Some(Command::Config {
                action: ConfigAction::Init,
            }) => (),
            _ => panic!("Expected Config Init subcommand"),
        }
    }
}
