//! The monitor loop.
//!
//! Each iteration waits for a trigger, builds a fresh skill context, runs
//! one orchestrator cycle, stores the results and sends alerts. A failed
//! iteration is logged and followed by a fixed backoff; only shutdown ends
//! the loop, and shutdown is observed only while waiting, never mid-cycle.

use crate::config::Config;
use crate::models::{RunSummary, SkillResult, Status, TriggerEvent};
use crate::notify::{Channel, Notifier, SendOptions};
use crate::orchestrator::Orchestrator;
use crate::scheduler::Scheduler;
use crate::skills::SkillContext;
use crate::store::{Incident, ResultStore};
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Severity recorded on incidents opened from FAIL results.
const INCIDENT_SEVERITY: &str = "P1";

/// Long-lived components for one monitored target.
pub struct Monitor {
    config: Arc<Config>,
    scheduler: Arc<Scheduler>,
    orchestrator: Orchestrator,
    notifier: Notifier,
    channels: Vec<Channel>,
    store: Option<Arc<dyn ResultStore>>,
    http: reqwest::Client,
}

impl Monitor {
    pub fn new(
        config: Arc<Config>,
        scheduler: Arc<Scheduler>,
        orchestrator: Orchestrator,
        notifier: Notifier,
        http: reqwest::Client,
    ) -> Self {
        let channels = config.channels();
        Self {
            config,
            scheduler,
            orchestrator,
            notifier,
            channels,
            store: None,
            http,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Context shared by every skill in one cycle.
    pub fn build_context(&self, trigger: TriggerEvent) -> SkillContext {
        let deployment = trigger.deployment.clone().unwrap_or_default();
        let mut ctx = SkillContext::new(
            self.config.general.target_url.clone(),
            trigger,
            self.http.clone(),
            Arc::clone(&self.config),
        );

        if let Some(env) = deployment.environment {
            ctx = ctx.with_extra("environment", env);
        }
        if let Some(sha) = deployment.sha {
            ctx = ctx.with_extra("sha", sha);
        }

        ctx
    }

    /// Run a single cycle outside the scheduler.
    pub async fn run_once(&mut self) -> Result<RunSummary> {
        self.run_cycle(TriggerEvent::interval()).await
    }

    /// One full cycle for `trigger`.
    pub async fn run_cycle(&mut self, trigger: TriggerEvent) -> Result<RunSummary> {
        info!("Starting check cycle ({} trigger)", trigger.kind);
        let ctx = self.build_context(trigger);

        let selected = self.config.skills.enabled.clone();
        let names = if selected.is_empty() {
            None
        } else {
            Some(selected.as_slice())
        };
        let results = self.orchestrator.execute(names, &ctx).await.to_vec();
        let summary = self.orchestrator.summary();

        info!(
            "Cycle complete: {} passed, {} warned, {} failed",
            summary.passed, summary.warned, summary.failed
        );

        self.persist(&results);
        self.alert(&results).await;

        if let Some(ref path) = self.config.general.output {
            let json = serde_json::to_string_pretty(&summary)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write summary to {}", path.display()))?;
            debug!("Summary written to {}", path.display());
        }

        Ok(summary)
    }

    fn persist(&self, results: &[SkillResult]) {
        let Some(ref store) = self.store else {
            return;
        };
        let target = &self.config.general.target_url;
        for result in results {
            if let Err(e) = store.record_check(target, result) {
                warn!("Failed to record {} result: {}", result.skill_name, e);
            }
        }
        if let Err(e) = self.track_incidents(store.as_ref(), results) {
            warn!("Failed to update incidents: {}", e);
        }
    }

    /// A FAIL opens one incident per skill; a later PASS resolves it.
    fn track_incidents(
        &self,
        store: &dyn ResultStore,
        results: &[SkillResult],
    ) -> crate::error::Result<()> {
        let target = &self.config.general.target_url;
        let open = store.open_incidents(Some(target))?;

        for result in results {
            let existing: Vec<&Incident> = open
                .iter()
                .filter(|i| i.skill_name == result.skill_name)
                .collect();
            match result.status {
                Status::Fail if existing.is_empty() => {
                    store.create_incident(
                        target,
                        &result.skill_name,
                        INCIDENT_SEVERITY,
                        &result.summary,
                        Value::Object(result.details.clone()),
                    )?;
                }
                Status::Pass => {
                    for incident in existing {
                        store.resolve_incident(incident.id)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn alert(&self, results: &[SkillResult]) {
        let options = SendOptions {
            rate_limited: true,
            cooldown: None,
            target_url: Some(self.config.general.target_url.clone()),
        };

        for result in results {
            if !self.should_notify(result) {
                continue;
            }
            let delivered = self
                .notifier
                .broadcast(&self.channels, result, &options)
                .await;
            debug!(
                "Alert for {} delivered to {}/{} channel(s)",
                result.skill_name,
                delivered,
                self.channels.len()
            );
        }
    }

    fn should_notify(&self, result: &SkillResult) -> bool {
        result.status != Status::Pass || self.config.alerts.notify_on_pass
    }

    /// Loop until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Monitoring {} every {} minute(s)",
            self.config.general.target_url, self.config.schedule.interval_minutes
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let scheduler = Arc::clone(&self.scheduler);
            let trigger = tokio::select! {
                event = scheduler.next_trigger() => event,
                _ = shutdown.changed() => break,
            };
            info!("Trigger fired: {}", trigger.kind);

            if let Err(e) = self.run_cycle(trigger).await {
                error!("Error in monitor loop: {:#}", e);
                let backoff = self.config.error_backoff();
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        info!("Monitoring stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelKind, RateLimiter};
    use crate::skills::Skill;
    use crate::store::JsonlStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingSkill {
        name: &'static str,
        status: Status,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<TriggerEvent>>>,
    }

    #[async_trait]
    impl Skill for RecordingSkill {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, ctx: &SkillContext) -> anyhow::Result<SkillResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(ctx.trigger.clone());
            Ok(SkillResult::new(self.name, self.status, "checked"))
        }
    }

    struct Harness {
        monitor: Monitor,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<TriggerEvent>>>,
    }

    fn harness(config: Config, status: Status) -> Harness {
        let config = Arc::new(config);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut orchestrator = Orchestrator::new(config.skill_timeout());
        orchestrator.register(Arc::new(RecordingSkill {
            name: "recorder",
            status,
            calls: Arc::clone(&calls),
            seen: Arc::clone(&seen),
        }));

        let scheduler = Arc::new(Scheduler::new(config.interval()));
        let notifier = Notifier::with_client(
            RateLimiter::new(config.alert_cooldown()),
            reqwest::Client::new(),
        );
        let monitor = Monitor::new(
            config,
            scheduler,
            orchestrator,
            notifier,
            reqwest::Client::new(),
        );

        Harness {
            monitor,
            calls,
            seen,
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.general.target_url = "https://shop.example.com".to_string();
        config.schedule.interval_minutes = 1;
        config
    }

    #[tokio::test]
    async fn test_run_once_records_and_summarizes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonlStore::open(dir.path()).unwrap());
        let mut h = harness(config(), Status::Warn);
        h.monitor = h.monitor.with_store(store.clone());

        let summary = h.monitor.run_once().await.unwrap();
        assert_eq!(summary.total_skills, 1);
        assert_eq!(summary.warned, 1);

        let recorded = store.recent_checks("https://shop.example.com", 10).unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].skill_name, "recorder");
    }

    #[tokio::test]
    async fn test_fail_opens_incident_and_pass_resolves_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonlStore::open(dir.path()).unwrap());
        let h = harness(config(), Status::Pass);
        let monitor = h.monitor.with_store(store.clone());
        let target = "https://shop.example.com";

        let down = SkillResult::failed("recorder", "connection refused");
        monitor.persist(std::slice::from_ref(&down));
        monitor.persist(std::slice::from_ref(&down));

        let open = store.open_incidents(Some(target)).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].severity, "P1");
        assert!(open[0].title.contains("connection refused"));

        monitor.persist(&[SkillResult::warn("recorder", "slow")]);
        assert_eq!(store.open_incidents(Some(target)).unwrap().len(), 1);

        monitor.persist(&[SkillResult::pass("recorder", "back up")]);
        assert!(store.open_incidents(Some(target)).unwrap().is_empty());
        assert_eq!(store.recent_checks(target, 10).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_failures_alert_and_pass_does_not() {
        let h = harness(config(), Status::Fail);
        let failing = SkillResult::failed("recorder", "down");
        h.monitor.alert(std::slice::from_ref(&failing)).await;
        // The alert consumed the key's window.
        assert!(!h
            .monitor
            .notifier
            .rate_limiter()
            .admit(&failing.notification_key(), None));

        let passing = SkillResult::pass("recorder", "fine");
        h.monitor.alert(std::slice::from_ref(&passing)).await;
        assert!(h
            .monitor
            .notifier
            .rate_limiter()
            .admit(&passing.notification_key(), None));
    }

    #[tokio::test]
    async fn test_alert_fans_out_to_every_channel() {
        use axum::{http::StatusCode, routing::post, Router};

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/hook",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NO_CONTENT
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = config();
        config.alerts.channels = vec![ChannelKind::Stdout, ChannelKind::Discord];
        config.alerts.webhook_url = Some(format!("http://{}/hook", addr));
        let h = harness(config, Status::Fail);

        let failing = SkillResult::failed("recorder", "down");
        h.monitor.alert(std::slice::from_ref(&failing)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Same key inside the cooldown: suppressed on every channel.
        h.monitor.alert(std::slice::from_ref(&failing)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_external_trigger_reaches_skills() {
        let mut h = harness(config(), Status::Pass);
        let trigger = crate::scheduler::normalize_deployment(&json!({
            "deployment": { "environment": "staging", "sha": "abc123" }
        }));

        h.monitor.run_cycle(trigger).await.unwrap();

        let seen = h.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].deployment.as_ref().unwrap().environment.as_deref(),
            Some("staging")
        );
    }

    #[test]
    fn test_build_context_exposes_deployment() {
        let h = harness(config(), Status::Pass);
        let trigger = crate::scheduler::normalize_deployment(&json!({
            "environment": "production", "sha": "abc123"
        }));
        let ctx = h.monitor.build_context(trigger);

        assert_eq!(ctx.target_url, "https://shop.example.com");
        assert_eq!(ctx.extras["environment"], "production");
        assert_eq!(ctx.extras["sha"], "abc123");
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_failed_iterations() {
        let mut config = config();
        config.general.output = Some("/nonexistent-dir/summary.json".into());
        let Harness {
            mut monitor, calls, ..
        } = harness(config, Status::Pass);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { monitor.run(rx).await });

        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_while_waiting() {
        let Harness {
            mut monitor,
            calls,
            seen,
        } = harness(config(), Status::Pass);
        let scheduler = Arc::clone(monitor.scheduler());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { monitor.run(rx).await });

        tokio::time::sleep(Duration::from_secs(10)).await;
        scheduler.receive(json!({ "sha": "abc123" }));
        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let kinds: Vec<_> = seen.lock().unwrap().iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                crate::models::TriggerKind::Interval,
                crate::models::TriggerKind::External
            ]
        );
    }
}
