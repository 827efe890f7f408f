use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "live-coders")]
#[command(version)]
#[command(about = "Watch AtCoder problems being solved live, with chat and likes")]
pub struct Args {
    /// TOML config file (defaults apply when omitted)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Serve the login, driver and viewer pages plus the JSON API
    Serve {
        #[arg(long, default_value = "8888")]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },

    /// Print the filtered problem working set, newest contest first
    Problems {
        /// Show at most this many problems
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Fetch problem statements through the configured proxies
    Statement {
        /// Official task page URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Scrape a contest's task list (e.g. abc300)
    Contest { id: String },

    /// List a comment room
    Comments {
        /// Room id (defaults to the configured room)
        #[arg(long)]
        room: Option<u64>,
    },

    /// Store a YouTube live URL for the live card, or clear it with "stop"
    Live { url: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_serve_defaults() {
        let args = Args::parse_from(["live-coders", "serve"]);
        assert!(!args.verbose);
        assert!(args.config.is_none());
        assert_eq!(
            args.command,
            Command::Serve {
                port: 8888,
                bind: "127.0.0.1".to_string()
            }
        );
    }

    #[test]
    fn test_args_parse_serve_custom() {
        let args = Args::parse_from(["live-coders", "serve", "--port", "9000", "--bind", "0.0.0.0"]);
        assert_eq!(
            args.command,
            Command::Serve {
                port: 9000,
                bind: "0.0.0.0".to_string()
            }
        );
    }

    #[test]
    fn test_args_global_flags_after_subcommand() {
        let args = Args::parse_from(["live-coders", "problems", "--limit", "5", "-v", "--config", "lc.toml"]);
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("lc.toml")));
        assert_eq!(args.command, Command::Problems { limit: Some(5) });
    }

    #[test]
    fn test_args_statement_takes_many_urls() {
        let args = Args::parse_from(["live-coders", "statement", "https://a", "https://b"]);
        assert_eq!(
            args.command,
            Command::Statement {
                urls: vec!["https://a".to_string(), "https://b".to_string()]
            }
        );
    }

    #[test]
    fn test_args_statement_requires_url() {
        assert!(Args::try_parse_from(["live-coders", "statement"]).is_err());
    }

    #[test]
    fn test_args_contest_and_comments() {
        let args = Args::parse_from(["live-coders", "contest", "abc300"]);
        assert_eq!(args.command, Command::Contest { id: "abc300".to_string() });
        let args = Args::parse_from(["live-coders", "comments", "--room", "3"]);
        assert_eq!(args.command, Command::Comments { room: Some(3) });
    }

    #[test]
    fn test_args_missing_subcommand_fails() {
        assert!(Args::try_parse_from(["live-coders"]).is_err());
    }
}
