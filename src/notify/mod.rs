//! Alert delivery.
//!
//! The [`Notifier`] separates "should we try" (the shared [`RateLimiter`])
//! from "did it work" (the channel transport). Delivery is best effort:
//! `send` reports success as a `bool` and never returns an error.

pub mod format;
pub mod rate_limit;

pub use rate_limit::RateLimiter;

use crate::models::SkillResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info};

/// Kind of alert channel, as named in config files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Stdout,
    Discord,
    Slack,
}

/// A configured alert destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    /// Print to the console. Always delivers.
    Stdout,
    /// Discord incoming webhook.
    Discord { webhook_url: String },
    /// Slack incoming webhook.
    Slack { webhook_url: String },
}

impl Channel {
    /// Build a channel of `kind`. Remote kinds need a webhook URL.
    pub fn from_kind(kind: ChannelKind, webhook_url: Option<&str>) -> Option<Self> {
        match kind {
            ChannelKind::Stdout => Some(Channel::Stdout),
            ChannelKind::Discord => webhook_url.map(|url| Channel::Discord {
                webhook_url: url.to_string(),
            }),
            ChannelKind::Slack => webhook_url.map(|url| Channel::Slack {
                webhook_url: url.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Stdout => "stdout",
            Channel::Discord { .. } => "discord",
            Channel::Slack { .. } => "slack",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-send knobs.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Consult the rate limiter before sending.
    pub rate_limited: bool,
    /// Override the limiter's default cooldown.
    pub cooldown: Option<Duration>,
    /// Monitored target, linked from the alert when present.
    pub target_url: Option<String>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            rate_limited: true,
            cooldown: None,
            target_url: None,
        }
    }
}

/// Alert notification handler for multiple channels.
pub struct Notifier {
    rate_limiter: RateLimiter,
    http_client: reqwest::Client,
}

impl Notifier {
    /// Create a notifier whose HTTP deliveries are bounded by `timeout`.
    pub fn new(cooldown: Duration, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(RateLimiter::new(cooldown), http_client))
    }

    pub fn with_client(rate_limiter: RateLimiter, http_client: reqwest::Client) -> Self {
        Self {
            rate_limiter,
            http_client,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Send `result` to `channel` with default options.
    pub async fn send(&self, channel: &Channel, result: &SkillResult, rate_limited: bool) -> bool {
        let options = SendOptions {
            rate_limited,
            ..SendOptions::default()
        };
        self.send_with(channel, result, &options).await
    }

    /// Send `result` to `channel`. Returns whether the alert was delivered.
    ///
    /// A rate-limited send performs no I/O at all.
    pub async fn send_with(
        &self,
        channel: &Channel,
        result: &SkillResult,
        options: &SendOptions,
    ) -> bool {
        if options.rate_limited {
            let key = result.notification_key();
            if !self.rate_limiter.admit(&key, options.cooldown) {
                info!("Alert rate limited for {}", key);
                return false;
            }
        }

        let target = options.target_url.as_deref();

        match channel {
            Channel::Stdout => {
                println!("{}", format::format_stdout(result, target));
                info!("Alert sent to stdout for {}", result.skill_name);
                true
            }
            Channel::Discord { webhook_url } => {
                let payload = format::format_discord(result, target);
                self.post_webhook(channel, webhook_url, &payload, result)
                    .await
            }
            Channel::Slack { webhook_url } => {
                let payload = format::format_slack(result, target);
                self.post_webhook(channel, webhook_url, &payload, result)
                    .await
            }
        }
    }

    /// Send `result` to every channel. Returns how many delivered.
    ///
    /// The rate limiter is consulted once for the whole fan-out, so all
    /// channels share one admit or suppress decision.
    pub async fn broadcast(
        &self,
        channels: &[Channel],
        result: &SkillResult,
        options: &SendOptions,
    ) -> usize {
        if options.rate_limited {
            let key = result.notification_key();
            if !self.rate_limiter.admit(&key, options.cooldown) {
                info!("Alert rate limited for {}", key);
                return 0;
            }
        }

        let per_channel = SendOptions {
            rate_limited: false,
            ..options.clone()
        };
        let mut delivered = 0;
        for channel in channels {
            if self.send_with(channel, result, &per_channel).await {
                delivered += 1;
            } else {
                debug!("Alert for {} not delivered via {}", result.skill_name, channel);
            }
        }
        delivered
    }

    async fn post_webhook(
        &self,
        channel: &Channel,
        url: &str,
        payload: &Value,
        result: &SkillResult,
    ) -> bool {
        if !result.artifacts.is_empty() {
            debug!(
                "Artifacts available but not attached: {}",
                result.artifacts.len()
            );
        }

        let response = match self.http_client.post(url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                if e.is_timeout() {
                    error!("{} webhook timed out for {}", channel, result.skill_name);
                } else {
                    error!("Error sending alert to {}: {}", channel, e);
                }
                return false;
            }
        };

        let status = response.status();
        if status.is_success() {
            info!("Alert sent to {} for {}", channel, result.skill_name);
            true
        } else {
            let body = response.text().await.unwrap_or_default();
            error!("{} webhook failed: {} - {}", channel, status, body);
            false
        }
    }
}
