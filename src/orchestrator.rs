//! Skill orchestration.
//!
//! The orchestrator owns the registered skills and runs a requested subset
//! against one shared context. Every skill is isolated: an error, a panic or
//! a timeout becomes a FAIL result for that skill and the cycle moves on to
//! the next one.

use crate::error::WatchError;
use crate::models::{RunSummary, SkillResult};
use crate::skills::{Skill, SkillContext};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Runs registered skills sequentially with per-skill isolation.
pub struct Orchestrator {
    /// Registration order is execution order.
    skills: Vec<Arc<dyn Skill>>,
    /// Results of the most recent cycle.
    results: Vec<SkillResult>,
    skill_timeout: Duration,
}

impl Orchestrator {
    pub fn new(skill_timeout: Duration) -> Self {
        Self {
            skills: Vec::new(),
            results: Vec::new(),
            skill_timeout,
        }
    }

    /// Register a skill. A skill with the same name replaces the old one in place.
    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        let name = skill.name().to_string();
        match self.skills.iter().position(|s| s.name() == name) {
            Some(index) => {
                warn!("Replacing already registered skill: {}", name);
                self.skills[index] = skill;
            }
            None => self.skills.push(skill),
        }
        info!("Registered skill: {}", name);
    }

    /// Remove a skill by name. Returns whether it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.skills.len();
        self.skills.retain(|s| s.name() != name);
        let removed = self.skills.len() != before;
        if removed {
            info!("Unregistered skill: {}", name);
        }
        removed
    }

    pub fn skill_names(&self) -> Vec<String> {
        self.skills.iter().map(|s| s.name().to_string()).collect()
    }

    /// Check that every requested name is registered.
    pub fn resolve(&self, requested: &[String]) -> Result<Vec<String>, WatchError> {
        let unknown: Vec<&str> = requested
            .iter()
            .filter(|name| self.find(name).is_none())
            .map(String::as_str)
            .collect();

        if unknown.is_empty() {
            Ok(requested.to_vec())
        } else {
            let mut available = self.skill_names();
            available.sort();
            Err(WatchError::UnknownSkills {
                unknown: unknown.join(", "),
                available: available.join(", "),
            })
        }
    }

    /// Run `names` (or every registered skill) and return one result per
    /// skill that was found, in request order.
    ///
    /// Unknown names are skipped with a warning rather than reported as
    /// failures. Results replace those of the previous cycle.
    pub async fn execute(&mut self, names: Option<&[String]>, ctx: &SkillContext) -> &[SkillResult] {
        let selected: Vec<Arc<dyn Skill>> = match names {
            Some(names) if !names.is_empty() => names
                .iter()
                .filter_map(|name| {
                    let skill = self.find(name);
                    if skill.is_none() {
                        warn!("Skill not found: {}", name);
                    }
                    skill
                })
                .collect(),
            _ => self.skills.clone(),
        };

        let mut results = Vec::with_capacity(selected.len());
        for skill in selected {
            results.push(self.run_isolated(skill.as_ref(), ctx).await);
        }

        self.results = results;
        &self.results
    }

    async fn run_isolated(&self, skill: &dyn Skill, ctx: &SkillContext) -> SkillResult {
        let name = skill.name().to_string();
        info!("Executing skill: {}", name);

        let run = AssertUnwindSafe(skill.run(ctx)).catch_unwind();
        let outcome = match tokio::time::timeout(self.skill_timeout, run).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
            Ok(Err(panic)) => {
                Err(WatchError::SkillPanicked(panic_message(panic.as_ref())).to_string())
            }
            Err(_) => Err(WatchError::SkillTimeout(self.skill_timeout).to_string()),
        };

        match outcome {
            Ok(result) => {
                info!("Skill {} completed with status: {}", name, result.status);
                result
            }
            Err(message) => {
                error!("Error executing skill {}: {}", name, message);
                SkillResult::failed(name, message)
            }
        }
    }

    /// Results of the most recent cycle.
    pub fn results(&self) -> &[SkillResult] {
        &self.results
    }

    /// Counts by status plus the result list of the most recent cycle.
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }

    fn find(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.iter().find(|s| s.name() == name).cloned()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
