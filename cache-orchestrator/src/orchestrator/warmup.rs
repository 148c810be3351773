//! Warmup Scheduler
//!
//! Registered jobs warm sets of key patterns on their own cadence. Each job
//! moves `Scheduled -> Running -> Scheduled`, recording the outcome of the
//! run in its stats. Jobs due in the same tick run one after another in
//! registration order.

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Timelike, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::compression::ValueCodec;
use crate::core::pattern;
use crate::core::{CacheOperation, OperationLog, OperationType, OrchestratorError, Result};
use crate::orchestrator::strategy::{DEFAULT_TTL, StrategyRegistry};
use crate::stores::{BackingStore, LocalCache, WarmupSource};

/// Parsed warmup schedule. Only two cron shapes are understood:
/// `*/N * * * *` (every N minutes) and `0 * * * *` (hourly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupSchedule {
    EveryMinutes(u32),
    Hourly,
}

impl WarmupSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let invalid = || OrchestratorError::InvalidSchedule(expr.to_string());

        if fields.len() != 5 || fields[1..].iter().any(|f| *f != "*") {
            return Err(invalid());
        }

        match fields[0] {
            "0" => Ok(Self::Hourly),
            minute => {
                let step: u32 = minute
                    .strip_prefix("*/")
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(invalid)?;
                if step == 0 || step > 59 {
                    return Err(invalid());
                }
                Ok(Self::EveryMinutes(step))
            }
        }
    }

    /// First firing strictly after `from`
    pub fn next_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Hourly => truncate(from, ChronoDuration::hours(1)) + ChronoDuration::hours(1),
            Self::EveryMinutes(step) => {
                let mut next =
                    truncate(from, ChronoDuration::minutes(1)) + ChronoDuration::minutes(1);
                while next.minute() % step != 0 {
                    next += ChronoDuration::minutes(1);
                }
                next
            }
        }
    }
}

fn truncate(ts: DateTime<Utc>, unit: ChronoDuration) -> DateTime<Utc> {
    ts.duration_trunc(unit).unwrap_or(ts)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Scheduled,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmupStats {
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_duration_ms: f64,
    pub keys_warmed: u64,
}

impl WarmupStats {
    fn record(&mut self, outcome: &JobOutcome) {
        self.runs += 1;
        if outcome.success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        let n = self.runs as f64;
        self.avg_duration_ms = (self.avg_duration_ms * (n - 1.0) + outcome.duration_ms) / n;
        self.keys_warmed += outcome.keys_warmed as u64;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WarmupJob {
    pub id: String,
    pub name: String,
    pub patterns: Vec<String>,
    pub priority: u8,
    pub schedule: String,
    #[serde(skip)]
    parsed: WarmupSchedule,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
    pub enabled: bool,
    pub state: JobState,
    pub last_status: Option<RunStatus>,
    pub stats: WarmupStats,
}

impl WarmupJob {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        patterns: Vec<String>,
        schedule: &str,
    ) -> Result<Self> {
        let parsed = WarmupSchedule::parse(schedule)?;
        Ok(Self {
            id: id.into(),
            name: name.into(),
            patterns,
            priority: 0,
            schedule: schedule.to_string(),
            parsed,
            last_run: None,
            next_run: parsed.next_after(Utc::now()),
            enabled: true,
            state: JobState::Scheduled,
            last_status: None,
            stats: WarmupStats::default(),
        })
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Override the next firing time
    pub fn with_next_run(mut self, next_run: DateTime<Utc>) -> Self {
        self.next_run = next_run;
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.state == JobState::Scheduled && self.next_run <= now
    }
}

/// Jobs registered by default when warmup is enabled
pub fn default_jobs() -> Result<Vec<WarmupJob>> {
    Ok(vec![
        WarmupJob::new(
            "popular_content",
            "Popular content",
            vec![
                "content:popular:*".to_string(),
                "content:trending:*".to_string(),
            ],
            "*/15 * * * *",
        )?
        .with_priority(1),
        WarmupJob::new(
            "user_sessions",
            "Active user sessions",
            vec!["session:active:*".to_string()],
            "0 * * * *",
        )?
        .with_priority(2),
    ])
}

/// Outcome of one job run
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub success: bool,
    pub keys_warmed: usize,
    pub duration_ms: f64,
}

/// Result of a warmup batch
#[derive(Debug, Clone, Serialize)]
pub struct WarmupResult {
    pub success: bool,
    pub keys_warmed: usize,
    pub duration_ms: f64,
    pub failed_patterns: Vec<String>,
}

impl WarmupResult {
    pub fn disabled() -> Self {
        Self {
            success: false,
            keys_warmed: 0,
            duration_ms: 0.0,
            failed_patterns: Vec::new(),
        }
    }
}

/// Registered jobs, in registration order
#[derive(Default)]
pub struct WarmupScheduler {
    jobs: RwLock<Vec<WarmupJob>>,
}

impl WarmupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job, replacing one with the same id in place. A replaced job
    /// keeps its run history, and stays `Running` until its in-flight run
    /// finishes.
    pub fn register(&self, mut job: WarmupJob) {
        let mut jobs = self.jobs.write();
        info!(
            "Registered warmup job '{}' ({}, next run {})",
            job.id, job.schedule, job.next_run
        );
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => {
                job.state = existing.state;
                job.stats = existing.stats.clone();
                job.last_run = existing.last_run;
                job.last_status = existing.last_status;
                *existing = job;
            }
            None => jobs.push(job),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.read().iter().any(|j| j.id == id)
    }

    pub fn jobs(&self) -> Vec<WarmupJob> {
        self.jobs.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<WarmupJob> {
        self.jobs.read().iter().find(|j| j.id == id).cloned()
    }

    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<String> {
        self.jobs
            .read()
            .iter()
            .filter(|j| j.is_due(now))
            .map(|j| j.id.clone())
            .collect()
    }

    /// Move a due job to `Running`; returns its patterns, or `None` when the
    /// job is missing, disabled or already running
    pub fn try_begin(&self, id: &str) -> Option<Vec<String>> {
        let mut jobs = self.jobs.write();
        let job = jobs.iter_mut().find(|j| j.id == id)?;
        if !job.enabled || job.state == JobState::Running {
            return None;
        }
        job.state = JobState::Running;
        Some(job.patterns.clone())
    }

    /// Record a finished run and reschedule the job
    pub fn finish(&self, outcome: &JobOutcome, now: DateTime<Utc>) {
        let mut jobs = self.jobs.write();
        let Some(job) = jobs.iter_mut().find(|j| j.id == outcome.job_id) else {
            return;
        };

        job.stats.record(outcome);
        job.last_status = Some(if outcome.success {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        });
        job.last_run = Some(now);
        job.next_run = job.parsed.next_after(now);
        job.state = JobState::Scheduled;
    }
}

/// Warms patterns: loads from the source of truth into the backing store
/// (framed by the codec), then decodes matching backing store values into
/// the local cache
pub struct PatternWarmer {
    backing: Arc<dyn BackingStore>,
    local: Arc<dyn LocalCache>,
    source: Option<Arc<dyn WarmupSource>>,
    registry: Arc<StrategyRegistry>,
    codec: ValueCodec,
    oplog: OperationLog,
}

impl PatternWarmer {
    pub fn new(
        backing: Arc<dyn BackingStore>,
        local: Arc<dyn LocalCache>,
        source: Option<Arc<dyn WarmupSource>>,
        registry: Arc<StrategyRegistry>,
        codec: ValueCodec,
        oplog: OperationLog,
    ) -> Self {
        Self {
            backing,
            local,
            source,
            registry,
            codec,
            oplog,
        }
    }

    fn ttl_for(&self, key: &str) -> Duration {
        self.registry
            .for_key(key)
            .map(|s| s.ttl())
            .unwrap_or(DEFAULT_TTL)
    }

    /// Warm one pattern; returns the number of keys promoted
    pub async fn warm_pattern(&self, pattern: &str) -> Result<usize> {
        let started = Instant::now();
        let result = self.load_and_promote(pattern).await;

        let mut op = CacheOperation::new(OperationType::Warm)
            .with_pattern(pattern)
            .with_duration(started.elapsed())
            .with_success(result.is_ok());
        if let Ok(keys) = &result {
            op = op.with_size(*keys);
        }
        self.oplog.record(op);

        result
    }

    async fn load_and_promote(&self, pattern: &str) -> Result<usize> {
        pattern::validate(pattern)?;

        if let Some(source) = &self.source {
            for (key, value) in source.load(pattern).await? {
                let strategy = self.registry.for_key(&key);
                let ttl = strategy.as_ref().map(|s| s.ttl()).unwrap_or(DEFAULT_TTL);
                let threshold = strategy.as_ref().map_or(0, |s| s.compression_threshold);
                let framed = self.codec.encode(&value, threshold)?;
                self.backing.set(&key, framed, Some(ttl)).await?;
            }
        }

        let mut promoted = 0;
        for key in self.backing.keys(pattern).await? {
            let Some(framed) = self.backing.get(&key).await? else {
                continue;
            };
            // The local tier holds decoded values
            match self.codec.decode(&framed) {
                Ok(value) => {
                    let ttl = self.ttl_for(&key);
                    self.local.put(key, value, Some(ttl));
                    promoted += 1;
                }
                Err(e) => warn!("Skipping undecodable value at {}: {}", key, e),
            }
        }

        debug!("Warmed {} keys for pattern {}", promoted, pattern);
        Ok(promoted)
    }

    /// Best-effort batch: per-pattern failures are logged and collected,
    /// never abort the batch. Duplicate patterns are warmed once.
    pub async fn warm_patterns(&self, patterns: &[String]) -> WarmupResult {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let mut keys_warmed = 0;
        let mut failed_patterns = Vec::new();

        for pattern in patterns {
            if !seen.insert(pattern.as_str()) {
                continue;
            }
            match self.warm_pattern(pattern).await {
                Ok(keys) => keys_warmed += keys,
                Err(e) => {
                    warn!("Warmup failed for pattern {}: {}", pattern, e);
                    failed_patterns.push(pattern.clone());
                }
            }
        }

        WarmupResult {
            success: true,
            keys_warmed,
            duration_ms: started.elapsed().as_micros() as f64 / 1000.0,
            failed_patterns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_parse_observed_shapes() {
        assert_eq!(
            WarmupSchedule::parse("*/15 * * * *").unwrap(),
            WarmupSchedule::EveryMinutes(15)
        );
        assert_eq!(
            WarmupSchedule::parse("0 * * * *").unwrap(),
            WarmupSchedule::Hourly
        );
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for expr in ["", "*/0 * * * *", "5 * * * *", "0 3 * * *", "*/15 * * *", "@hourly"] {
            assert!(WarmupSchedule::parse(expr).is_err(), "{} should fail", expr);
        }
    }

    #[test]
    fn test_next_after_every_minutes() {
        let schedule = WarmupSchedule::EveryMinutes(15);
        assert_eq!(schedule.next_after(at(10, 7, 30)), at(10, 15, 0));
        assert_eq!(schedule.next_after(at(10, 15, 0)), at(10, 30, 0));
        assert_eq!(schedule.next_after(at(10, 50, 0)), at(11, 0, 0));
    }

    #[test]
    fn test_next_after_hourly() {
        let schedule = WarmupSchedule::Hourly;
        assert_eq!(schedule.next_after(at(10, 0, 0)), at(11, 0, 0));
        assert_eq!(schedule.next_after(at(23, 59, 59)), at(23, 0, 0) + ChronoDuration::hours(1));
    }

    #[test]
    fn test_running_average() {
        let mut stats = WarmupStats::default();
        for (duration_ms, success) in [(10.0, true), (20.0, false), (30.0, true)] {
            stats.record(&JobOutcome {
                job_id: "j".to_string(),
                success,
                keys_warmed: 2,
                duration_ms,
            });
        }
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.avg_duration_ms, 20.0);
        assert_eq!(stats.keys_warmed, 6);
    }

    #[test]
    fn test_single_flight() {
        let scheduler = WarmupScheduler::new();
        let job = WarmupJob::new("j1", "Job", vec!["users:*".to_string()], "*/5 * * * *")
            .unwrap()
            .with_next_run(Utc::now() - ChronoDuration::minutes(1));
        scheduler.register(job);

        assert_eq!(scheduler.due_jobs(Utc::now()), vec!["j1".to_string()]);
        assert!(scheduler.try_begin("j1").is_some());
        assert!(scheduler.try_begin("j1").is_none());
        assert!(scheduler.due_jobs(Utc::now()).is_empty());

        let now = Utc::now();
        scheduler.finish(
            &JobOutcome {
                job_id: "j1".to_string(),
                success: true,
                keys_warmed: 0,
                duration_ms: 1.0,
            },
            now,
        );
        let job = scheduler.get("j1").unwrap();
        assert_eq!(job.state, JobState::Scheduled);
        assert_eq!(job.last_status, Some(RunStatus::Succeeded));
        assert!(job.next_run >= job.last_run.unwrap());
    }

    #[test]
    fn test_disabled_job_never_due() {
        let scheduler = WarmupScheduler::new();
        let job = WarmupJob::new("off", "Off", vec![], "0 * * * *")
            .unwrap()
            .with_enabled(false)
            .with_next_run(Utc::now() - ChronoDuration::hours(1));
        scheduler.register(job);

        assert!(scheduler.due_jobs(Utc::now()).is_empty());
        assert!(scheduler.try_begin("off").is_none());
    }

    #[test]
    fn test_register_replaces_in_place() {
        let scheduler = WarmupScheduler::new();
        for job in default_jobs().unwrap() {
            scheduler.register(job);
        }
        let replacement =
            WarmupJob::new("popular_content", "Popular", vec![], "*/5 * * * *").unwrap();
        scheduler.register(replacement);

        let jobs = scheduler.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, "popular_content");
        assert_eq!(jobs[0].schedule, "*/5 * * * *");
    }

    #[test]
    fn test_replacing_running_job_keeps_single_flight() {
        let scheduler = WarmupScheduler::new();
        let past = Utc::now() - ChronoDuration::minutes(1);
        let job = WarmupJob::new("j1", "Job", vec!["users:*".to_string()], "*/5 * * * *")
            .unwrap()
            .with_next_run(past);
        scheduler.register(job.clone());
        assert!(scheduler.try_begin("j1").is_some());

        let replacement =
            WarmupJob::new("j1", "Job v2", vec!["content:*".to_string()], "*/10 * * * *")
                .unwrap()
                .with_next_run(past);
        scheduler.register(replacement);

        // The in-flight run still owns the id
        assert_eq!(scheduler.get("j1").unwrap().state, JobState::Running);
        assert!(scheduler.due_jobs(Utc::now()).is_empty());
        assert!(scheduler.try_begin("j1").is_none());

        scheduler.finish(
            &JobOutcome {
                job_id: "j1".to_string(),
                success: true,
                keys_warmed: 3,
                duration_ms: 2.0,
            },
            Utc::now(),
        );
        let finished = scheduler.get("j1").unwrap();
        assert_eq!(finished.state, JobState::Scheduled);
        assert_eq!(finished.name, "Job v2");

        // History survives a later replacement
        scheduler.register(job);
        let replaced = scheduler.get("j1").unwrap();
        assert_eq!(replaced.stats.runs, 1);
        assert_eq!(replaced.stats.keys_warmed, 3);
        assert_eq!(replaced.last_status, Some(RunStatus::Succeeded));
    }
}
