//! Skill contract.
//!
//! A skill is one independently pluggable check. Skills are built once at
//! startup, registered with the orchestrator, and reused every cycle. They
//! receive a shared, read-only [`SkillContext`].

pub mod http_probe;

pub use http_probe::HttpProbe;

use crate::config::Config;
use crate::models::{SkillResult, TriggerEvent};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A monitoring check.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Unique, stable name used for registration and alert keys.
    fn name(&self) -> &str;

    /// Run the check. An `Err` is turned into a FAIL result by the
    /// orchestrator, so skills may use `?` freely.
    async fn run(&self, ctx: &SkillContext) -> anyhow::Result<SkillResult>;
}

/// Everything a skill may read during one cycle.
#[derive(Clone)]
pub struct SkillContext {
    /// The monitored target.
    pub target_url: String,
    /// What caused this cycle.
    pub trigger: TriggerEvent,
    /// Shared HTTP client.
    pub http: reqwest::Client,
    /// Loaded settings.
    pub settings: Arc<Config>,
    /// Extra collaborator values, keyed by name.
    pub extras: Map<String, Value>,
}

impl SkillContext {
    pub fn new(
        target_url: impl Into<String>,
        trigger: TriggerEvent,
        http: reqwest::Client,
        settings: Arc<Config>,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            trigger,
            http,
            settings,
            extras: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

/// Normalize a user supplied skill name (`Http-Probe` -> `http_probe`).
pub fn normalize_skill_name(name: &str) -> String {
    name.trim().to_lowercase().replace('-', "_")
}

/// Skills bundled with the binary.
pub fn builtin_skills(config: &Config) -> Vec<Arc<dyn Skill>> {
    vec![Arc::new(HttpProbe::from_config(&config.skills))]
}
