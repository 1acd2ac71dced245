//! Performance monitor for JDC
//!
//! Times commands, steps, agents, plugins and hooks, aggregates durations per
//! `(category, name)` and persists everything as flat JSON under one
//! directory:
//!
//! | File | Contents |
//! |---|---|
//! | `metrics.json` | aggregated [`OperationMetric`]s |
//! | `performance.json` | rolling session log, last 1000 entries |
//! | `warnings.json` | threshold and error warnings, last 100 entries |
//! | `session-<id>.json` | one finished session with its analysis |
//!
//! Thresholds are observational: an operation that runs past its threshold
//! is logged and recorded as a warning, never aborted.
//!
//! All recording methods take `&self`; state sits behind a `Mutex` so a
//! monitor can be shared with hook handlers through an `Arc`.

pub mod types;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{Config, ThresholdsConfig};
use crate::error::Result;

pub use types::{
    format_duration, Bottleneck, LogEntry, MetricsStore, MonitorWarning, Operation,
    OperationCategory, OperationMetric, PerformanceReport, Priority, Recommendation, Session,
    SessionAnalysis, SessionBottleneck, Summary, SystemInfo,
};

pub const METRICS_FILE: &str = "metrics.json";
pub const LOG_FILE: &str = "performance.json";
pub const WARNINGS_FILE: &str = "warnings.json";

const MAX_LOG_ENTRIES: usize = 1000;
const MAX_WARNINGS: usize = 100;

/// Average duration above which a metric earns a high-priority recommendation.
const SLOW_AVG_MS: f64 = 30_000.0;
/// Session share above which a bottleneck counts as severe.
const SEVERE_SHARE_PCT: f64 = 50.0;
const BUSY_SESSION_OPS: usize = 50;

#[derive(Default)]
struct MonitorState {
    metrics: MetricsStore,
    sessions: Vec<Session>,
    current: Option<String>,
    /// Start instants of open operations, keyed by operation id.
    open: HashMap<String, Instant>,
    session_clock: HashMap<String, Instant>,
}

impl MonitorState {
    fn session_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }
}

pub struct PerformanceMonitor {
    enabled: bool,
    log_dir: PathBuf,
    thresholds: ThresholdsConfig,
    state: Mutex<MonitorState>,
}

impl PerformanceMonitor {
    /// Create a monitor writing to `log_dir`, loading any existing metrics.
    ///
    /// A disabled monitor touches nothing on disk and records nothing.
    pub fn new(log_dir: PathBuf, thresholds: ThresholdsConfig, enabled: bool) -> Result<Self> {
        let mut state = MonitorState::default();

        if enabled {
            fs::create_dir_all(&log_dir)?;
            state.metrics = load_metrics(&log_dir.join(METRICS_FILE));
        }

        Ok(Self {
            enabled,
            log_dir,
            thresholds,
            state: Mutex::new(state),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.monitor_log_dir(),
            config.monitor.thresholds_ms,
            config.monitor.enabled,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn threshold_ms(&self, category: OperationCategory) -> u64 {
        match category {
            OperationCategory::Command => self.thresholds.command,
            OperationCategory::Step => self.thresholds.step,
            OperationCategory::Agent => self.thresholds.agent,
            OperationCategory::Plugin => self.thresholds.plugin,
            OperationCategory::Hook => self.thresholds.hook,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Begin a session and make it current. Returns its id.
    pub fn start_session(&self, id: Option<&str>) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let id = id.map(str::to_string).unwrap_or_else(new_session_id);
        let mut state = self.lock();
        state.sessions.push(Session {
            id: id.clone(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            operations: Vec::new(),
            system: SystemInfo::current(),
            analysis: None,
        });
        state.session_clock.insert(id.clone(), Instant::now());
        state.current = Some(id.clone());

        debug!(session = %id, "Performance session started");
        Some(id)
    }

    pub fn current_session(&self) -> Option<String> {
        self.lock().current.clone()
    }

    /// Finish a session (the current one when `id` is `None`), persist it and
    /// return its analysis.
    pub fn end_session(&self, id: Option<&str>) -> Result<Option<SessionAnalysis>> {
        if !self.enabled {
            return Ok(None);
        }

        let session = {
            let mut state = self.lock();
            let Some(id) = id.map(str::to_string).or_else(|| state.current.clone()) else {
                return Ok(None);
            };
            let elapsed = state
                .session_clock
                .remove(&id)
                .map(|t| t.elapsed().as_millis() as u64);
            if state.current.as_deref() == Some(id.as_str()) {
                state.current = None;
            }

            let thresholds = self.thresholds;
            let Some(session) = state.session_mut(&id) else {
                return Ok(None);
            };
            if session.ended_at.is_some() {
                return Ok(session.analysis.clone());
            }

            session.ended_at = Some(Utc::now());
            session.duration_ms = Some(elapsed.unwrap_or(0));
            session.analysis = Some(analyze_session(session, &thresholds));
            session.clone()
        };

        self.save_session(&session)?;
        debug!(session = %session.id, "Performance session ended");
        Ok(session.analysis)
    }

    fn save_session(&self, session: &Session) -> Result<()> {
        let path = self.log_dir.join(format!("session-{}.json", session.id));
        write_json(&path, session)?;

        let entry = LogEntry {
            kind: "session".to_string(),
            data: serde_json::json!({
                "id": session.id,
                "duration_ms": session.duration_ms,
                "operation_count": session.operations.len(),
            }),
            timestamp: Utc::now(),
        };
        append_capped(&self.log_dir.join(LOG_FILE), entry, MAX_LOG_ENTRIES)
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Start timing an operation in the current session.
    ///
    /// Returns `None` when disabled or when no session is active.
    pub fn start_operation(
        &self,
        category: OperationCategory,
        name: &str,
        metadata: Value,
    ) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let mut state = self.lock();
        let Some(current) = state.current.clone() else {
            warn!(category = %category, name = name, "No active performance session");
            return None;
        };

        let id = uuid::Uuid::new_v4().to_string();
        state.open.insert(id.clone(), Instant::now());
        if let Some(session) = state.session_mut(&current) {
            session.operations.push(Operation {
                id: id.clone(),
                category,
                name: name.to_string(),
                started_at: Utc::now(),
                ended_at: None,
                duration_ms: None,
                metadata,
                result: None,
            });
        }
        Some(id)
    }

    /// Stop timing an operation, fold it into the metrics and check its
    /// threshold. Returns the measured duration.
    pub fn end_operation(&self, id: &str, result: Value) -> Result<Option<Duration>> {
        if !self.enabled {
            return Ok(None);
        }

        let (category, name, elapsed) = {
            let mut state = self.lock();
            let Some(started) = state.open.remove(id) else {
                return Ok(None);
            };
            let elapsed = started.elapsed();

            let op = state
                .sessions
                .iter_mut()
                .flat_map(|s| s.operations.iter_mut())
                .find(|op| op.id == id);
            let Some(op) = op else {
                return Ok(None);
            };
            op.ended_at = Some(Utc::now());
            op.duration_ms = Some(elapsed.as_millis() as u64);
            op.result = Some(result);
            (op.category, op.name.clone(), elapsed)
        };

        self.observe(category, &name, elapsed)?;
        Ok(Some(elapsed))
    }

    /// Fold a measured duration into the aggregate for `(category, name)`.
    pub fn observe(&self, category: OperationCategory, name: &str, duration: Duration) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let duration_ms = duration.as_millis() as u64;
        let metrics = {
            let mut state = self.lock();
            state
                .metrics
                .category_mut(category)
                .entry(name.to_string())
                .or_default()
                .record(duration_ms);
            state.metrics.clone()
        };
        write_json(&self.log_dir.join(METRICS_FILE), &metrics)?;

        let threshold = self.threshold_ms(category);
        if duration_ms > threshold {
            warn!(
                category = %category,
                name = name,
                duration_ms,
                threshold_ms = threshold,
                "Operation exceeded its performance threshold"
            );
            self.record_warning(MonitorWarning::threshold(
                category,
                name,
                duration_ms,
                threshold,
            ))?;
        }
        Ok(())
    }

    /// Append to `warnings.json`, keeping the newest entries.
    pub fn record_warning(&self, warning: MonitorWarning) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        append_capped(&self.log_dir.join(WARNINGS_FILE), warning, MAX_WARNINGS)
    }

    pub fn warnings(&self) -> Vec<MonitorWarning> {
        read_list(&self.log_dir.join(WARNINGS_FILE))
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        read_list(&self.log_dir.join(LOG_FILE))
    }

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    pub fn metrics(&self) -> MetricsStore {
        self.lock().metrics.clone()
    }

    /// Summary over the finished sessions stored in the log directory.
    pub fn summary(&self) -> Summary {
        let done = self.stored_sessions();
        if done.is_empty() {
            return Summary::default();
        }

        let sessions = done.len() as f64;
        let total_ms: u64 = done.iter().filter_map(|s| s.duration_ms).sum();
        let total_ops: usize = done.iter().map(|s| s.operations.len()).sum();
        Summary {
            total_sessions: done.len(),
            avg_duration_ms: total_ms as f64 / sessions,
            total_operations: total_ops,
            avg_operations_per_session: total_ops as f64 / sessions,
        }
    }

    /// Metrics ranked by average duration, slowest first.
    pub fn top_bottlenecks(&self, limit: usize) -> Vec<Bottleneck> {
        let metrics = self.metrics();
        let mut all: Vec<Bottleneck> = metrics
            .iter()
            .map(|(category, name, m)| Bottleneck {
                category,
                name: name.to_string(),
                avg_duration_ms: m.avg_duration_ms,
                max_duration_ms: m.max_duration_ms,
                count: m.count,
            })
            .collect();
        all.sort_by(|a, b| b.avg_duration_ms.total_cmp(&a.avg_duration_ms));
        all.truncate(limit);
        all
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.top_bottlenecks(5)
            .into_iter()
            .filter(|b| b.avg_duration_ms > SLOW_AVG_MS)
            .map(|b| Recommendation {
                priority: Priority::High,
                category: b.category.plural().to_string(),
                message: format!(
                    "{} averages {:.2}s",
                    b.name,
                    b.avg_duration_ms / 1000.0
                ),
                name: Some(b.name),
                suggestion: "Optimize the execution logic or cache intermediate results"
                    .to_string(),
            })
            .collect()
    }

    pub fn report(&self, limit: usize) -> PerformanceReport {
        PerformanceReport {
            timestamp: Utc::now(),
            summary: self.summary(),
            metrics: self.metrics(),
            top_bottlenecks: self.top_bottlenecks(limit),
            recommendations: self.recommendations(),
        }
    }

    /// Write the report as pretty JSON to `path`.
    pub fn export_report(&self, path: &Path) -> Result<PathBuf> {
        write_json(path, &self.report(10))?;
        Ok(path.to_path_buf())
    }

    /// Finished sessions stored on disk, oldest first.
    pub fn stored_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = session_files(&self.log_dir)
            .into_iter()
            .filter_map(|path| {
                let content = fs::read_to_string(&path).ok()?;
                serde_json::from_str(&content).ok()
            })
            .collect();
        sessions.sort_by_key(|s: &Session| s.started_at);
        sessions
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Delete session files older than `days`. Returns how many were removed.
    pub fn cleanup(&self, days: u64) -> Result<usize> {
        let max_age = Duration::from_secs(days * 24 * 60 * 60);
        let now = SystemTime::now();
        let mut removed = 0;

        for path in session_files(&self.log_dir) {
            let modified = fs::metadata(&path)?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age > max_age {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }

        debug!(removed, days, "Old performance sessions cleaned");
        Ok(removed)
    }

    /// Delete every file in the log directory and forget all metrics.
    pub fn reset(&self) -> Result<usize> {
        let mut removed = 0;
        if self.log_dir.is_dir() {
            for entry in fs::read_dir(&self.log_dir)? {
                let path = entry?.path();
                if path.is_file() {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }
        self.lock().metrics = MetricsStore::default();
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Plain-text rendering of a report.
pub fn render_report(report: &PerformanceReport) -> String {
    let rule = "=".repeat(60);
    let mut out = format!("\n{}\nPerformance Report\n{}\n", rule, rule);

    let (ops, total_ms) = report.metrics.totals();
    out.push_str("\nSummary:\n");
    out.push_str(&format!("  Sessions:    {}\n", report.summary.total_sessions));
    out.push_str(&format!("  Operations:  {}\n", ops));
    out.push_str(&format!("  Total time:  {}\n", format_duration(total_ms as f64)));
    if ops > 0 {
        out.push_str(&format!(
            "  Average:     {}\n",
            format_duration(total_ms as f64 / ops as f64)
        ));
    }

    for category in OperationCategory::ALL {
        let items = report.metrics.category(category);
        if items.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{}:\n", category.plural()));
        out.push_str(&format!(
            "  {:<24} {:>6} {:>10} {:>10} {:>10}\n",
            "name", "count", "avg", "max", "min"
        ));
        for (name, m) in items {
            out.push_str(&format!(
                "  {:<24} {:>6} {:>10} {:>10} {:>10}\n",
                name,
                m.count,
                format_duration(m.avg_duration_ms),
                format_duration(m.max_duration_ms as f64),
                format_duration(m.min_duration_ms as f64),
            ));
        }
    }

    out.push_str(&render_bottlenecks(&report.top_bottlenecks, &report.recommendations));
    out.push_str(&format!("{}\n", rule));
    out
}

/// Ranked bottleneck table followed by recommendations.
pub fn render_bottlenecks(bottlenecks: &[Bottleneck], recommendations: &[Recommendation]) -> String {
    let mut out = String::new();
    if !bottlenecks.is_empty() {
        out.push_str(&format!("\nTop {} bottlenecks:\n", bottlenecks.len()));
        for (i, b) in bottlenecks.iter().enumerate() {
            out.push_str(&format!(
                "  {:>2}. {:<34} avg {:>10}  max {:>10}  x{}\n",
                i + 1,
                format!("{}/{}", b.category.plural(), b.name),
                format_duration(b.avg_duration_ms),
                format_duration(b.max_duration_ms as f64),
                b.count
            ));
        }
    }

    if !recommendations.is_empty() {
        out.push_str("\nRecommendations:\n");
        for (i, r) in recommendations.iter().enumerate() {
            out.push_str(&format!("  {}. [{}] {}\n", i + 1, r.priority, r.message));
            out.push_str(&format!("     {}\n", r.suggestion));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_session_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%d%H%M%S"), &suffix[..8])
}

fn analyze_session(session: &Session, thresholds: &ThresholdsConfig) -> SessionAnalysis {
    let duration_ms = session.duration_ms.unwrap_or(0);
    let threshold = |c: OperationCategory| match c {
        OperationCategory::Command => thresholds.command,
        OperationCategory::Step => thresholds.step,
        OperationCategory::Agent => thresholds.agent,
        OperationCategory::Plugin => thresholds.plugin,
        OperationCategory::Hook => thresholds.hook,
    };

    let mut bottlenecks: Vec<SessionBottleneck> = session
        .operations
        .iter()
        .filter_map(|op| {
            let d = op.duration_ms?;
            (d > threshold(op.category)).then(|| SessionBottleneck {
                category: op.category,
                name: op.name.clone(),
                duration_ms: d,
                percentage: if duration_ms == 0 {
                    0.0
                } else {
                    d as f64 / duration_ms as f64 * 100.0
                },
            })
        })
        .collect();
    bottlenecks.sort_by(|a, b| b.duration_ms.cmp(&a.duration_ms));

    let mut recommendations = Vec::new();
    let severe: Vec<&str> = bottlenecks
        .iter()
        .filter(|b| b.percentage > SEVERE_SHARE_PCT)
        .map(|b| b.name.as_str())
        .collect();
    if !severe.is_empty() {
        recommendations.push(Recommendation {
            priority: Priority::High,
            category: "bottleneck".to_string(),
            name: None,
            message: format!("Severe bottlenecks: {}", severe.join(", ")),
            suggestion: "Optimize these operations or move them off the critical path"
                .to_string(),
        });
    }
    if session.operations.len() > BUSY_SESSION_OPS {
        recommendations.push(Recommendation {
            priority: Priority::Low,
            category: "operation-count".to_string(),
            name: None,
            message: format!("{} operations in one session", session.operations.len()),
            suggestion: "Split complex work across several sessions".to_string(),
        });
    }

    SessionAnalysis {
        session_id: session.id.clone(),
        duration_ms,
        operation_count: session.operations.len(),
        bottlenecks,
        recommendations,
    }
}

fn load_metrics(path: &Path) -> MetricsStore {
    let Ok(content) = fs::read_to_string(path) else {
        return MetricsStore::default();
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Failed to parse metrics, starting fresh");
        MetricsStore::default()
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Read a JSON array file; a missing or corrupt file reads as empty.
fn read_list<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

/// Append to a JSON array file, dropping the oldest entries beyond `cap`.
fn append_capped<T: Serialize + DeserializeOwned>(path: &Path, entry: T, cap: usize) -> Result<()> {
    let mut items: Vec<T> = read_list(path);
    items.push(entry);
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
    write_json(path, &items)
}

fn session_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("session-") && n.ends_with(".json"))
        })
        .collect();
    files.sort();
    files
}
