//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::notify::ChannelKind;
use crate::skills::normalize_skill_name;
use clap::Parser;
use std::path::PathBuf;

/// Skillwatch - continuous storefront monitoring
///
/// Runs a set of checks against a target on a fixed interval and whenever a
/// deployment event arrives, and alerts through rate-limited channels.
///
/// Examples:
///   skillwatch --url https://shop.example.com
///   skillwatch --url https://shop.example.com --interval 5 --channel slack --webhook-url https://hooks.slack.com/...
///   skillwatch --url https://shop.example.com --listen 0.0.0.0:8000
///   skillwatch --url https://shop.example.com --once --output summary.json
///   skillwatch --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// URL of the target to monitor
    #[arg(short, long, value_name = "URL", env = "SKILLWATCH_URL")]
    pub url: Option<String>,

    /// Minutes between interval-triggered checks
    #[arg(short, long, value_name = "MINUTES")]
    pub interval: Option<u64>,

    /// Run only the specified skill(s) (repeatable)
    #[arg(short, long = "skill", value_name = "NAME")]
    pub skills: Vec<String>,

    /// Alert channel(s) to notify (repeatable)
    #[arg(long = "channel", value_name = "CHANNEL")]
    pub channels: Vec<ChannelKind>,

    /// Webhook URL for Discord/Slack alerts
    #[arg(long, value_name = "URL", env = "SKILLWATCH_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Seconds between repeated alerts for the same skill and status
    #[arg(long, value_name = "SECS")]
    pub cooldown: Option<u64>,

    /// Accept deployment events over HTTP on this address
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Run a single check cycle and exit
    ///
    /// Exit code 2 when any skill fails.
    #[arg(long)]
    pub once: bool,

    /// Write the JSON run summary to this file after each cycle
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Do not record results to the local store
    #[arg(long)]
    pub no_store: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .skillwatch.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .skillwatch.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments and normalize skill names.
    pub fn parse_args() -> Self {
        let mut args = Self::parse();
        args.skills = args.skills.iter().map(|s| normalize_skill_name(s)).collect();
        args
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Target URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.interval == Some(0) {
            return Err("Interval must be at least 1 minute".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.once && self.listen.is_some() {
            return Err("--listen has no effect with --once".to_string());
        }

        if let Some(ref webhook) = self.webhook_url {
            if !webhook.starts_with("http://") && !webhook.starts_with("https://") {
                return Err("Webhook URL must start with 'http://' or 'https://'".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
