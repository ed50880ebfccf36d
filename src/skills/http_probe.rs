//! Basic availability probe for the monitored target.

use super::{Skill, SkillContext};
use crate::config::SkillsConfig;
use crate::models::{SkillResult, Status};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

/// GETs the target URL and grades the response.
///
/// FAIL on transport errors and 5xx, WARN on 4xx or a slow response,
/// PASS otherwise.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    slow_threshold: Duration,
}

impl HttpProbe {
    pub const NAME: &'static str = "http_probe";

    pub fn new(slow_threshold: Duration) -> Self {
        Self { slow_threshold }
    }

    pub fn from_config(config: &SkillsConfig) -> Self {
        Self::new(Duration::from_millis(config.slow_threshold_ms))
    }
}

#[async_trait]
impl Skill for HttpProbe {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: &SkillContext) -> anyhow::Result<SkillResult> {
        debug!("Probing {}", ctx.target_url);

        let started = Instant::now();
        let response = ctx.http.get(&ctx.target_url).send().await?;
        let latency = started.elapsed();
        let code = response.status();

        let (status, summary) = if code.is_server_error() {
            (Status::Fail, format!("Target returned {}", code))
        } else if code.is_client_error() {
            (Status::Warn, format!("Target returned {}", code))
        } else if latency > self.slow_threshold {
            (
                Status::Warn,
                format!(
                    "Target responded slowly: {}ms (threshold {}ms)",
                    latency.as_millis(),
                    self.slow_threshold.as_millis()
                ),
            )
        } else {
            (
                Status::Pass,
                format!("Target is up ({}ms)", latency.as_millis()),
            )
        };

        Ok(SkillResult::new(Self::NAME, status, summary)
            .with_detail("status_code", code.as_u16())
            .with_detail("latency_ms", latency.as_millis() as u64)
            .with_detail("trigger", ctx.trigger.kind.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::TriggerEvent;
    use axum::{http::StatusCode, routing::get, Router};
    use std::sync::Arc;

    async fn serve(code: StatusCode) -> String {
        let app = Router::new().route("/", get(move || async move { code }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn context(url: String) -> SkillContext {
        SkillContext::new(
            url,
            TriggerEvent::interval(),
            reqwest::Client::new(),
            Arc::new(Config::default()),
        )
    }

    #[tokio::test]
    async fn test_probe_pass() {
        let url = serve(StatusCode::OK).await;
        let probe = HttpProbe::new(Duration::from_secs(30));
        let result = probe.run(&context(url)).await.unwrap();

        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.details["status_code"], 200);
        assert_eq!(result.details["trigger"], "interval");
    }

    #[tokio::test]
    async fn test_probe_client_error_warns() {
        let url = serve(StatusCode::NOT_FOUND).await;
        let result = HttpProbe::new(Duration::from_secs(30))
            .run(&context(url))
            .await
            .unwrap();
        assert_eq!(result.status, Status::Warn);
    }

    #[tokio::test]
    async fn test_probe_server_error_fails() {
        let url = serve(StatusCode::BAD_GATEWAY).await;
        let result = HttpProbe::new(Duration::from_secs(30))
            .run(&context(url))
            .await
            .unwrap();
        assert_eq!(result.status, Status::Fail);
        assert!(result.summary.contains("502"));
    }

    #[tokio::test]
    async fn test_probe_unreachable_is_error() {
        let probe = HttpProbe::new(Duration::from_secs(30));
        assert!(probe
            .run(&context("http://127.0.0.1:9/".to_string()))
            .await
            .is_err());
    }
}
