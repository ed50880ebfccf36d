//! Result history and baselines.
//!
//! The runtime hands every result to a [`ResultStore`]. The bundled
//! [`JsonlStore`] keeps two files in one directory:
//!
//! - `checks.jsonl`: one [`CheckRecord`] per line, append-only;
//! - `baselines.json`: baseline documents keyed by `skill|target`,
//!   rewritten through a temp file and rename on every upsert;
//! - `incidents.json`: incident records, rewritten the same way.

use crate::error::{Result, WatchError};
use crate::models::{SkillResult, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

const CHECKS_FILE: &str = "checks.jsonl";
const BASELINES_FILE: &str = "baselines.json";
const INCIDENTS_FILE: &str = "incidents.json";

/// One persisted skill run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub timestamp: DateTime<Utc>,
    pub target_url: String,
    pub skill_name: String,
    pub status: Status,
    pub summary: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CheckRecord {
    pub fn from_result(target_url: &str, result: &SkillResult) -> Self {
        Self {
            timestamp: result.timestamp,
            target_url: target_url.to_string(),
            skill_name: result.skill_name.clone(),
            status: result.status,
            summary: result.summary.clone(),
            details: result.details.clone(),
            artifacts: result.artifacts.clone(),
            error: result.error.clone(),
        }
    }
}

/// A stored baseline for one skill against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub skill_name: String,
    pub target_url: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

/// A problem detected by a skill, open until explicitly resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub target_url: String,
    pub skill_name: String,
    /// Free-form level such as `P1`.
    pub severity: String,
    pub title: String,
    #[serde(default)]
    pub details: Value,
    pub status: IncidentStatus,
}

/// Persistence collaborator for results, baselines and incidents.
pub trait ResultStore: Send + Sync {
    /// Append one result to the history.
    fn record_check(&self, target_url: &str, result: &SkillResult) -> Result<()>;

    /// Most recent results for `target_url`, newest first.
    fn recent_checks(&self, target_url: &str, limit: usize) -> Result<Vec<CheckRecord>>;

    /// Create or replace the baseline for `(skill, target)`.
    fn update_baseline(&self, skill_name: &str, target_url: &str, data: Value) -> Result<()>;

    fn latest_baseline(&self, skill_name: &str, target_url: &str) -> Result<Option<Value>>;

    /// Open an incident and return its id.
    fn create_incident(
        &self,
        target_url: &str,
        skill_name: &str,
        severity: &str,
        title: &str,
        details: Value,
    ) -> Result<u64>;

    /// Mark an incident resolved. Resolving twice keeps the first timestamp.
    fn resolve_incident(&self, id: u64) -> Result<()>;

    /// Open incidents, newest first, optionally limited to one target.
    fn open_incidents(&self, target_url: Option<&str>) -> Result<Vec<Incident>>;
}

/// File-backed store in a single directory.
pub struct JsonlStore {
    dir: PathBuf,
    /// Serializes writers within this process.
    write_lock: Mutex<()>,
}

impl JsonlStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| WatchError::StoreIo {
            path: dir.clone(),
            source,
        })?;
        info!("Result store at {}", dir.display());
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn checks_path(&self) -> PathBuf {
        self.dir.join(CHECKS_FILE)
    }

    fn baselines_path(&self) -> PathBuf {
        self.dir.join(BASELINES_FILE)
    }

    fn read_baselines(&self) -> Result<BTreeMap<String, Baseline>> {
        let path = self.baselines_path();
        match fs::read_to_string(&path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(WatchError::StoreIo { path, source }),
        }
    }

    fn write_baselines(&self, baselines: &BTreeMap<String, Baseline>) -> Result<()> {
        write_atomic(&self.baselines_path(), &serde_json::to_string_pretty(baselines)?)
    }

    fn read_incidents(&self) -> Result<Vec<Incident>> {
        let path = self.dir.join(INCIDENTS_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(WatchError::StoreIo { path, source }),
        }
    }

    fn write_incidents(&self, incidents: &[Incident]) -> Result<()> {
        write_atomic(
            &self.dir.join(INCIDENTS_FILE),
            &serde_json::to_string_pretty(incidents)?,
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Replace `path` through a sibling temp file and rename.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(|source| WatchError::StoreIo {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| WatchError::StoreIo {
        path: path.to_path_buf(),
        source,
    })
}

fn baseline_key(skill_name: &str, target_url: &str) -> String {
    format!("{}|{}", skill_name, target_url)
}

impl ResultStore for JsonlStore {
    fn record_check(&self, target_url: &str, result: &SkillResult) -> Result<()> {
        let record = CheckRecord::from_result(target_url, result);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let path = self.checks_path();
        let _guard = self.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| WatchError::StoreIo {
                path: path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|source| WatchError::StoreIo { path, source })?;

        debug!(
            "Recorded check run: {} -> {}",
            record.skill_name, record.status
        );
        Ok(())
    }

    fn recent_checks(&self, target_url: &str, limit: usize) -> Result<Vec<CheckRecord>> {
        let path = self.checks_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(WatchError::StoreIo { path, source }),
        };

        let mut records = Vec::new();
        for line in content.lines().rev() {
            if records.len() >= limit {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            // A torn trailing line from an interrupted write is skipped.
            match serde_json::from_str::<CheckRecord>(line) {
                Ok(record) if record.target_url == target_url => records.push(record),
                Ok(_) => {}
                Err(e) => debug!("Skipping unreadable check record: {}", e),
            }
        }

        Ok(records)
    }

    fn update_baseline(&self, skill_name: &str, target_url: &str, data: Value) -> Result<()> {
        let _guard = self.lock();
        let mut baselines = self.read_baselines()?;
        let now = Utc::now();
        let key = baseline_key(skill_name, target_url);

        let created_at = baselines.get(&key).map(|b| b.created_at).unwrap_or(now);
        baselines.insert(
            key,
            Baseline {
                skill_name: skill_name.to_string(),
                target_url: target_url.to_string(),
                data,
                created_at,
                updated_at: now,
            },
        );

        self.write_baselines(&baselines)?;
        info!("Updated baseline: {} for {}", skill_name, target_url);
        Ok(())
    }

    fn latest_baseline(&self, skill_name: &str, target_url: &str) -> Result<Option<Value>> {
        let baselines = self.read_baselines()?;
        Ok(baselines
            .get(&baseline_key(skill_name, target_url))
            .map(|b| b.data.clone()))
    }

    fn create_incident(
        &self,
        target_url: &str,
        skill_name: &str,
        severity: &str,
        title: &str,
        details: Value,
    ) -> Result<u64> {
        let _guard = self.lock();
        let mut incidents = self.read_incidents()?;
        let id = incidents.iter().map(|i| i.id).max().unwrap_or(0) + 1;

        incidents.push(Incident {
            id,
            created_at: Utc::now(),
            resolved_at: None,
            target_url: target_url.to_string(),
            skill_name: skill_name.to_string(),
            severity: severity.to_string(),
            title: title.to_string(),
            details,
            status: IncidentStatus::Open,
        });

        self.write_incidents(&incidents)?;
        info!("Created incident #{}: {} (severity: {})", id, title, severity);
        Ok(id)
    }

    fn resolve_incident(&self, id: u64) -> Result<()> {
        let _guard = self.lock();
        let mut incidents = self.read_incidents()?;
        let incident = incidents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(WatchError::IncidentNotFound(id))?;

        if incident.status == IncidentStatus::Resolved {
            return Ok(());
        }
        incident.status = IncidentStatus::Resolved;
        incident.resolved_at = Some(Utc::now());

        self.write_incidents(&incidents)?;
        info!("Resolved incident #{}", id);
        Ok(())
    }

    fn open_incidents(&self, target_url: Option<&str>) -> Result<Vec<Incident>> {
        let mut open: Vec<Incident> = self
            .read_incidents()?
            .into_iter()
            .filter(|i| i.status == IncidentStatus::Open)
            .filter(|i| target_url.map_or(true, |t| i.target_url == t))
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(open)
    }
}
