//! Data types persisted by the performance monitor.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugins::PluginKind;

/// What kind of operation a metric belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationCategory {
    Command,
    Step,
    Agent,
    Plugin,
    Hook,
}

impl OperationCategory {
    pub const ALL: [OperationCategory; 5] = [
        OperationCategory::Command,
        OperationCategory::Step,
        OperationCategory::Agent,
        OperationCategory::Plugin,
        OperationCategory::Hook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationCategory::Command => "command",
            OperationCategory::Step => "step",
            OperationCategory::Agent => "agent",
            OperationCategory::Plugin => "plugin",
            OperationCategory::Hook => "hook",
        }
    }

    /// Key of this category in `metrics.json`.
    pub fn plural(&self) -> &'static str {
        match self {
            OperationCategory::Command => "commands",
            OperationCategory::Step => "steps",
            OperationCategory::Agent => "agents",
            OperationCategory::Plugin => "plugins",
            OperationCategory::Hook => "hooks",
        }
    }
}

impl From<PluginKind> for OperationCategory {
    fn from(kind: PluginKind) -> Self {
        match kind {
            PluginKind::Command => OperationCategory::Command,
            PluginKind::Step => OperationCategory::Step,
            PluginKind::Agent => OperationCategory::Agent,
        }
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated durations for one `(category, name)` key. Durations in ms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetric {
    pub count: u64,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    pub last_duration_ms: u64,
}

impl OperationMetric {
    /// Fold one observation into the aggregate.
    pub fn record(&mut self, duration_ms: u64) {
        self.min_duration_ms = if self.count == 0 {
            duration_ms
        } else {
            self.min_duration_ms.min(duration_ms)
        };
        self.count += 1;
        self.total_duration_ms += duration_ms;
        self.avg_duration_ms = self.total_duration_ms as f64 / self.count as f64;
        self.max_duration_ms = self.max_duration_ms.max(duration_ms);
        self.last_duration_ms = duration_ms;
    }
}

/// Contents of `metrics.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsStore {
    pub commands: BTreeMap<String, OperationMetric>,
    pub steps: BTreeMap<String, OperationMetric>,
    pub agents: BTreeMap<String, OperationMetric>,
    pub plugins: BTreeMap<String, OperationMetric>,
    pub hooks: BTreeMap<String, OperationMetric>,
}

impl MetricsStore {
    pub fn category(&self, category: OperationCategory) -> &BTreeMap<String, OperationMetric> {
        match category {
            OperationCategory::Command => &self.commands,
            OperationCategory::Step => &self.steps,
            OperationCategory::Agent => &self.agents,
            OperationCategory::Plugin => &self.plugins,
            OperationCategory::Hook => &self.hooks,
        }
    }

    pub fn category_mut(
        &mut self,
        category: OperationCategory,
    ) -> &mut BTreeMap<String, OperationMetric> {
        match category {
            OperationCategory::Command => &mut self.commands,
            OperationCategory::Step => &mut self.steps,
            OperationCategory::Agent => &mut self.agents,
            OperationCategory::Plugin => &mut self.plugins,
            OperationCategory::Hook => &mut self.hooks,
        }
    }

    /// Every metric with its key.
    pub fn iter(&self) -> impl Iterator<Item = (OperationCategory, &str, &OperationMetric)> {
        OperationCategory::ALL.into_iter().flat_map(move |c| {
            self.category(c)
                .iter()
                .map(move |(name, metric)| (c, name.as_str(), metric))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Total operation count and total duration across all categories.
    pub fn totals(&self) -> (u64, u64) {
        self.iter().fold((0, 0), |(ops, ms), (_, _, m)| {
            (ops + m.count, ms + m.total_duration_ms)
        })
    }
}

/// One timed operation inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub category: OperationCategory,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Host facts captured when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub cpus: usize,
}

impl SystemInfo {
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// A monitoring session, written to `session-<id>.json` when it ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub operations: Vec<Operation>,
    pub system: SystemInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<SessionAnalysis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub message: String,
    pub suggestion: String,
}

/// An operation that exceeded its threshold within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBottleneck {
    pub category: OperationCategory,
    pub name: String,
    pub duration_ms: u64,
    /// Share of the session's wall time.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalysis {
    pub session_id: String,
    pub duration_ms: u64,
    pub operation_count: usize,
    pub bottlenecks: Vec<SessionBottleneck>,
    pub recommendations: Vec<Recommendation>,
}

/// Aggregate-level bottleneck: a metric ranked by average duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub category: OperationCategory,
    pub name: String,
    pub avg_duration_ms: f64,
    pub max_duration_ms: u64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_sessions: usize,
    pub avg_duration_ms: f64,
    pub total_operations: usize,
    pub avg_operations_per_session: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub timestamp: DateTime<Utc>,
    pub summary: Summary,
    pub metrics: MetricsStore,
    pub top_bottlenecks: Vec<Bottleneck>,
    pub recommendations: Vec<Recommendation>,
}

/// Entry of `warnings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorWarning {
    /// `threshold-exceeded` or `error`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<OperationCategory>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl MonitorWarning {
    pub fn threshold(category: OperationCategory, name: &str, duration_ms: u64, threshold_ms: u64) -> Self {
        Self {
            kind: "threshold-exceeded".to_string(),
            category: Some(category),
            name: name.to_string(),
            duration_ms: Some(duration_ms),
            threshold_ms: Some(threshold_ms),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(name: &str, error: &str) -> Self {
        Self {
            kind: "error".to_string(),
            category: None,
            name: name.to_string(),
            duration_ms: None,
            threshold_ms: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// Entry of the rolling `performance.json` log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Human-friendly duration: `850ms`, `2.35s`, `3m12s`.
pub fn format_duration(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{:.0}ms", ms)
    } else if ms < 60_000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        let minutes = (ms / 60_000.0).floor();
        let seconds = (ms % 60_000.0) / 1000.0;
        format!("{}m{:.0}s", minutes, seconds)
    }
}
