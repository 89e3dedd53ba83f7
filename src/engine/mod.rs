pub mod anomaly;
pub mod archive;
pub mod classify;
pub mod config;
pub mod daily_cap;
pub mod error;
pub mod lifecycle;
pub mod progress;
pub mod scoring;
pub mod segment;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::engine::anomaly::SessionSnapshot;
use crate::engine::classify::{Interval, SessionContext, SessionDescriptor};
use crate::engine::config::EngineConfig;
use crate::engine::daily_cap::CapOutcome;
use crate::engine::error::EngineError;
use crate::engine::types::{
    AnomalyStatus, BehaviorEvent, BehaviorType, EffectiveStudyRecord, LearnAnomaly,
};
use crate::store::operations::sessions::LearnSession;
use crate::store::{Store, StoreError};

/// Per-unit flags supplied by the caller (batch job).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// 结课评定认定考试门槛未过时置位，本次分类全程按 rule 2 作废
    pub course_test_failed: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub record: EffectiveStudyRecord,
    pub anomalies: Vec<LearnAnomaly>,
}

/// Stateless per-unit classification engine. Units are serialized per
/// session id through an in-process advisory lock; everything between
/// fetch and write-back is pure, synchronous computation.
pub struct StudyTimeEngine {
    config: Arc<RwLock<EngineConfig>>,
    store: Arc<Store>,
    session_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl StudyTimeEngine {
    pub fn new(config: EngineConfig, store: Arc<Store>) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Configuration)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            session_locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub async fn reload_config(&self, new_config: EngineConfig) -> Result<(), EngineError> {
        new_config.validate().map_err(EngineError::Configuration)?;
        let mut cfg = self.config.write().await;
        *cfg = new_config;
        tracing::info!("Engine config reloaded");
        Ok(())
    }

    pub async fn get_config(&self) -> EngineConfig {
        self.config.read().await.clone()
    }

    async fn acquire_session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;

        // Prune entries no one else holds: strong_count == 1 means only
        // the map still references the lock.
        if locks.len() > 1000 {
            locks.retain(|_, v| Arc::strong_count(v) > 1);
        }

        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Classify one session end-to-end and write the result back. Safe to
    /// re-run: record and anomaly ids are deterministic, so a recompute
    /// overwrites the previous pass.
    pub async fn process_session(
        &self,
        session_id: &str,
        options: ProcessOptions,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, EngineError> {
        let session_lock = self.acquire_session_lock(session_id).await;
        let _guard = session_lock.lock().await;

        let config = self.config.read().await.clone();

        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        let window_start = session.started_at;
        let window_end = session.ended_at.unwrap_or(now);

        let events = self.store.get_events_for_session(session_id)?;

        let overlapping =
            self.store
                .get_user_sessions_overlapping(&session.user_id, window_start, window_end)?;
        let ctx = build_session_context(&session, &events, window_end, &overlapping, options);
        let snapshot = build_session_snapshot(&session, &events, window_start, window_end, &overlapping);

        let segments = segment::build_segments(session_id, window_start, window_end, &events)?;
        let classified = classify::classify_segments(&segments, &ctx, &config.classifier);

        let interaction_count = events
            .iter()
            .filter(|e| e.behavior_type.is_interaction())
            .count() as u32;
        let scores = scoring::compute_scores(&classified, interaction_count, &config.scoring);

        let descriptor = SessionDescriptor {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            course_id: session.course_id.clone(),
            lesson_id: session.lesson_id.clone(),
            window_start,
            window_end,
        };
        let record = classify::aggregate_session(&descriptor, &classified, &scores, now)?;

        let anomalies = anomaly::detect_anomalies(&snapshot, &config.detectors, now);

        self.store.persist_classification(&record, &session)?;
        for found in &anomalies {
            self.store.upsert_anomaly(found)?;
        }

        tracing::info!(
            session_id,
            user_id = %session.user_id,
            effective_secs = record.effective_secs,
            invalid_secs = record.invalid_secs,
            status = record.status.as_str(),
            anomalies = anomalies.len(),
            "Session classified"
        );

        Ok(ProcessOutcome { record, anomalies })
    }

    /// Apply the daily ceiling to one (user, date) bucket. Must run after
    /// all of that day's classifications are committed.
    pub async fn enforce_daily_cap(
        &self,
        user_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CapOutcome, EngineError> {
        let config = self.config.read().await.clone();
        let records = self.store.get_daily_records(user_id, date)?;
        let outcome = daily_cap::enforce_daily_cap(&records, config.daily_cap.ceiling_secs, now);
        for changed in &outcome.changed {
            self.store.upsert_record(changed)?;
        }
        if outcome.trimmed_secs > 0.0 {
            tracing::info!(
                user_id,
                %date,
                trimmed_secs = outcome.trimmed_secs,
                records = outcome.changed.len(),
                "Daily cap enforced"
            );
        }
        Ok(outcome)
    }

    /// Single entry point for anomaly status changes coming from review
    /// tooling.
    pub async fn transition_anomaly(
        &self,
        anomaly_id: &str,
        to: AnomalyStatus,
        actor: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<LearnAnomaly, EngineError> {
        let anomaly = self
            .store
            .get_anomaly(anomaly_id)?
            .ok_or_else(|| {
                EngineError::Store(StoreError::NotFound {
                    entity: "anomaly".to_string(),
                    key: anomaly_id.to_string(),
                })
            })?;
        let updated = lifecycle::transition(anomaly, to, actor, note, now)?;
        self.store.upsert_anomaly(&updated)?;
        Ok(updated)
    }

    /// Auto-resolve pending low-severity anomalies. Returns how many were
    /// closed.
    pub async fn auto_resolve_pending(&self, now: DateTime<Utc>) -> Result<u64, EngineError> {
        let pending = self.store.list_auto_resolvable_anomalies()?;
        let mut resolved = 0u64;
        for anomaly in pending {
            let closed = lifecycle::auto_resolve(anomaly, now)?;
            self.store.upsert_anomaly(&closed)?;
            resolved += 1;
        }
        Ok(resolved)
    }

    /// Refresh the long-term (user, course) archive from its records.
    pub async fn summarize_course(
        &self,
        user_id: &str,
        course_id: &str,
        now: DateTime<Utc>,
    ) -> Result<archive::LearnArchive, EngineError> {
        let records = self.store.get_course_records(user_id, course_id)?;
        let session_ids: HashSet<String> =
            records.iter().map(|r| r.session_id.clone()).collect();
        let anomaly_count = self.store.count_anomalies_for_sessions(&session_ids)?;
        let summary = archive::summarize(user_id, course_id, &records, anomaly_count, now);
        self.store.upsert_archive(&summary)?;
        Ok(summary)
    }
}

/// Derive the session-scoped rule inputs from the event stream and the
/// user's overlapping sessions.
fn build_session_context(
    session: &LearnSession,
    events: &[BehaviorEvent],
    window_end: DateTime<Utc>,
    overlapping: &[LearnSession],
    options: ProcessOptions,
) -> SessionContext {
    let mut ctx = SessionContext {
        course_test_failed: options.course_test_failed,
        ..SessionContext::default()
    };

    // 活体检测失败：从失败事件起算，到下一次通过为止
    let mut open_failure: Option<DateTime<Utc>> = None;
    for event in events {
        match event.behavior_type {
            BehaviorType::FaceCheckFailed => {
                if open_failure.is_none() {
                    open_failure = Some(event.timestamp);
                }
            }
            BehaviorType::FaceCheckPassed => {
                if let Some(start) = open_failure.take() {
                    ctx.liveness_failed.push(Interval::new(start, event.timestamp));
                }
            }
            _ => {}
        }
        if event.behavior_type.is_suspicious() {
            ctx.suspicious_at.push(event.timestamp);
        }
        if event.behavior_type.is_interaction() {
            ctx.interaction_at.push(event.timestamp);
        }
    }
    if let Some(start) = open_failure {
        ctx.liveness_failed.push(Interval::new(start, window_end));
    }

    // 页面活动标记：payload.activity = lesson | browsing | testing
    let mut activity_open: Option<(String, DateTime<Utc>)> = None;
    for event in events {
        let Some(marker) = event
            .payload
            .as_ref()
            .and_then(|p| p.get("activity"))
            .and_then(|v| v.as_str())
        else {
            continue;
        };
        if let Some((kind, start)) = activity_open.take() {
            push_activity(&mut ctx, &kind, start, event.timestamp);
        }
        if marker != "lesson" {
            activity_open = Some((marker.to_string(), event.timestamp));
        }
    }
    if let Some((kind, start)) = activity_open {
        push_activity(&mut ctx, &kind, start, window_end);
    }

    // 并发设备时间窗：同一用户、不同指纹、与本会话窗口重叠的部分
    for other in overlapping {
        if other.id == session.id || other.device_fingerprint == session.device_fingerprint {
            continue;
        }
        let other_end = other.ended_at.unwrap_or(window_end);
        let start = other.started_at.max(session.started_at);
        let end = other_end.min(window_end);
        if end > start {
            ctx.multi_device.push(Interval::new(start, end));
        }
    }

    ctx
}

fn push_activity(ctx: &mut SessionContext, kind: &str, start: DateTime<Utc>, end: DateTime<Utc>) {
    if end <= start {
        return;
    }
    match kind {
        "browsing" => ctx.browsing.push(Interval::new(start, end)),
        "testing" => ctx.testing.push(Interval::new(start, end)),
        _ => {}
    }
}

/// Fold the event stream into the aggregate snapshot the detectors read.
fn build_session_snapshot(
    session: &LearnSession,
    events: &[BehaviorEvent],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    overlapping: &[LearnSession],
) -> SessionSnapshot {
    let mut snapshot = SessionSnapshot {
        session_id: session.id.clone(),
        user_id: session.user_id.clone(),
        wall_clock_secs: ((window_end - window_start).num_milliseconds() as f64 / 1000.0).max(0.0),
        ..SessionSnapshot::default()
    };

    let mut devices: HashSet<&str> = HashSet::new();
    devices.insert(session.device_fingerprint.as_str());
    for other in overlapping {
        devices.insert(other.device_fingerprint.as_str());
    }
    snapshot.distinct_device_count = devices.len() as u32;

    let mut min_position: Option<f64> = None;
    let mut max_position: Option<f64> = None;
    let mut idle_start: Option<DateTime<Utc>> = None;
    let mut face_fail_run = 0u32;

    for event in events {
        match event.behavior_type {
            BehaviorType::FocusLost => snapshot.focus_loss_count += 1,
            BehaviorType::NetworkOffline => snapshot.network_disconnect_count += 1,
            BehaviorType::MultiDeviceLogin => {
                // 客户端侧已识别的并发登录，至少按两台计
                snapshot.distinct_device_count = snapshot.distinct_device_count.max(2);
            }
            BehaviorType::IdleStart => idle_start = Some(event.timestamp),
            BehaviorType::IdleEnd => {
                if let Some(start) = idle_start.take() {
                    let gap = (event.timestamp - start).num_milliseconds() as f64 / 1000.0;
                    snapshot.max_idle_gap_secs = snapshot.max_idle_gap_secs.max(gap);
                }
            }
            BehaviorType::FaceCheckFailed => {
                face_fail_run += 1;
                snapshot.max_consecutive_face_fails =
                    snapshot.max_consecutive_face_fails.max(face_fail_run);
            }
            BehaviorType::FaceCheckPassed => face_fail_run = 0,
            _ => {}
        }
        if let Some(position) = event.video_position {
            min_position = Some(min_position.map_or(position, |m: f64| m.min(position)));
            max_position = Some(max_position.map_or(position, |m: f64| m.max(position)));
        }
    }

    // 空闲到会话结束仍未恢复的，也计入最大空闲间隔
    if let Some(start) = idle_start {
        let gap = (window_end - start).num_milliseconds() as f64 / 1000.0;
        snapshot.max_idle_gap_secs = snapshot.max_idle_gap_secs.max(gap);
    }

    if let (Some(min), Some(max)) = (min_position, max_position) {
        snapshot.progress_secs = (max - min).max(0.0);
    }

    snapshot
}
