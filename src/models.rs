//! Data models for the monitor.
//!
//! This module contains the core data structures shared by the scheduler,
//! the orchestrator and the notifier: skill results, trigger events and
//! notification keys.

use crate::error::WatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Outcome of a single skill run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Everything checked out.
    Pass,
    /// Degraded but not broken.
    Warn,
    /// Broken, or the skill itself failed.
    Fail,
}

impl Status {
    /// Wire representation (`PASS`, `WARN`, `FAIL`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Warn => "WARN",
            Status::Fail => "FAIL",
        }
    }

    /// Returns an emoji representation of the status.
    pub fn emoji(&self) -> &'static str {
        status_emoji(self.as_str())
    }

    /// Returns the embed color used by chat channels.
    pub fn color(&self) -> u32 {
        status_color(self.as_str())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PASS" => Ok(Status::Pass),
            "WARN" => Ok(Status::Warn),
            "FAIL" => Ok(Status::Fail),
            other => Err(WatchError::InvalidStatus(other.to_string())),
        }
    }
}

/// Emoji for a status string. Unknown statuses get a neutral marker.
pub fn status_emoji(status: &str) -> &'static str {
    match status {
        "PASS" => "✅",
        "WARN" => "⚠️",
        "FAIL" => "❌",
        _ => "ℹ️",
    }
}

/// Embed color for a status string. Unknown statuses are grey.
pub fn status_color(status: &str) -> u32 {
    match status {
        "PASS" => 0x00FF00,
        "WARN" => 0xFFFF00,
        "FAIL" => 0xFF0000,
        _ => 0x808080,
    }
}

/// Result of one skill invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResult {
    /// Name of the skill that produced this result.
    pub skill_name: String,
    /// Outcome.
    pub status: Status,
    /// One-line human readable summary.
    pub summary: String,
    /// Structured, ordered detail fields.
    #[serde(default)]
    pub details: Map<String, Value>,
    /// References to artifacts (screenshots, dumps) produced by the run.
    #[serde(default)]
    pub artifacts: Vec<String>,
    /// When the result was produced.
    pub timestamp: DateTime<Utc>,
    /// Error message if the skill itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SkillResult {
    /// Creates a result with no details or artifacts.
    pub fn new(skill_name: impl Into<String>, status: Status, summary: impl Into<String>) -> Self {
        Self {
            skill_name: skill_name.into(),
            status,
            summary: summary.into(),
            details: Map::new(),
            artifacts: Vec::new(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn pass(skill_name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(skill_name, Status::Pass, summary)
    }

    pub fn warn(skill_name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(skill_name, Status::Warn, summary)
    }

    /// Creates the FAIL result synthesized when a skill errors, panics or times out.
    pub fn failed(skill_name: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            summary: format!("Skill execution failed: {}", error),
            error: Some(error),
            ..Self::new(skill_name, Status::Fail, String::new())
        }
    }

    /// Adds a detail field.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Adds an artifact reference.
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifacts.push(artifact.into());
        self
    }

    /// The rate-limiting identity of this result.
    pub fn notification_key(&self) -> NotificationKey {
        NotificationKey::new(&self.skill_name, self.status)
    }
}

/// Identifies a class of notification: one skill reporting one status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub skill_name: String,
    pub status: Status,
}

impl NotificationKey {
    pub fn new(skill_name: impl Into<String>, status: Status) -> Self {
        Self {
            skill_name: skill_name.into(),
            status,
        }
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.skill_name, self.status)
    }
}

/// What caused a scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// The wall-clock interval elapsed.
    Interval,
    /// An event was pushed in from outside (deployment webhook).
    External,
    /// Nothing was ready after waiting; carries only a timestamp.
    Fallback,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Interval => write!(f, "interval"),
            TriggerKind::External => write!(f, "external"),
            TriggerKind::Fallback => write!(f, "fallback"),
        }
    }
}

/// Fields extracted from an inbound deployment notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub environment: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub sha: Option<String>,
    pub repository: Option<String>,
}

/// One scheduling decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    pub timestamp: DateTime<Utc>,
    /// Normalized fields, present for external events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentInfo>,
    /// The raw inbound payload, kept for annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl TriggerEvent {
    pub fn interval() -> Self {
        Self::bare(TriggerKind::Interval)
    }

    pub fn fallback() -> Self {
        Self::bare(TriggerKind::Fallback)
    }

    pub fn external(deployment: DeploymentInfo, payload: Value) -> Self {
        Self {
            kind: TriggerKind::External,
            timestamp: Utc::now(),
            deployment: Some(deployment),
            payload: Some(payload),
        }
    }

    fn bare(kind: TriggerKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            deployment: None,
            payload: None,
        }
    }
}

/// Aggregate view of one orchestrator cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_skills: usize,
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
    pub results: Vec<SkillResult>,
}

impl RunSummary {
    /// Creates a summary from a list of results.
    pub fn from_results(results: &[SkillResult]) -> Self {
        let mut summary = Self {
            total_skills: results.len(),
            results: results.to_vec(),
            ..Self::default()
        };

        for result in results {
            match result.status {
                Status::Pass => summary.passed += 1,
                Status::Warn => summary.warned += 1,
                Status::Fail => summary.failed += 1,
            }
        }

        summary
    }
}
