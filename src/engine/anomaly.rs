use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::config::DetectorConfig;
use crate::engine::types::{AnomalyStatus, AnomalyType, LearnAnomaly};

/// 会话级聚合输入。检测器只读该快照，彼此独立，可任意顺序执行。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub user_id: String,
    pub wall_clock_secs: f64,
    /// 视频播放头前进量（秒）
    pub progress_secs: f64,
    pub distinct_device_count: u32,
    pub focus_loss_count: u32,
    pub max_idle_gap_secs: f64,
    pub max_consecutive_face_fails: u32,
    pub network_disconnect_count: u32,
}

/// Run every detector against the snapshot. Each candidate enters the
/// lifecycle in state Detected; ids are deterministic per (session, type)
/// so a recompute overwrites instead of duplicating.
pub fn detect_anomalies(
    snapshot: &SessionSnapshot,
    config: &DetectorConfig,
    now: DateTime<Utc>,
) -> Vec<LearnAnomaly> {
    let detectors: [fn(&SessionSnapshot, &DetectorConfig, DateTime<Utc>) -> Option<LearnAnomaly>;
        6] = [
        detect_multiple_device,
        detect_rapid_progress,
        detect_window_switch,
        detect_idle_timeout,
        detect_face_fail,
        detect_network_anomaly,
    ];
    detectors
        .iter()
        .filter_map(|detector| detector(snapshot, config, now))
        .collect()
}

fn detect_multiple_device(
    snapshot: &SessionSnapshot,
    config: &DetectorConfig,
    now: DateTime<Utc>,
) -> Option<LearnAnomaly> {
    if snapshot.distinct_device_count < config.multi_device_count {
        return None;
    }
    Some(candidate(
        snapshot,
        AnomalyType::MultipleDevice,
        format!(
            "{} devices active concurrently for the same user",
            snapshot.distinct_device_count
        ),
        serde_json::json!({
            "deviceCount": snapshot.distinct_device_count,
            "threshold": config.multi_device_count,
        }),
        now,
    ))
}

fn detect_rapid_progress(
    snapshot: &SessionSnapshot,
    config: &DetectorConfig,
    now: DateTime<Utc>,
) -> Option<LearnAnomaly> {
    if snapshot.wall_clock_secs <= 0.0 {
        return None;
    }
    let ratio = snapshot.progress_secs / snapshot.wall_clock_secs;
    if ratio <= config.rapid_progress_ratio {
        return None;
    }
    Some(candidate(
        snapshot,
        AnomalyType::RapidProgress,
        format!("progress advanced {ratio:.2}x faster than wall clock"),
        serde_json::json!({
            "ratio": ratio,
            "threshold": config.rapid_progress_ratio,
            "progressSecs": snapshot.progress_secs,
            "wallClockSecs": snapshot.wall_clock_secs,
        }),
        now,
    ))
}

fn detect_window_switch(
    snapshot: &SessionSnapshot,
    config: &DetectorConfig,
    now: DateTime<Utc>,
) -> Option<LearnAnomaly> {
    if snapshot.focus_loss_count <= config.window_switch_count {
        return None;
    }
    Some(candidate(
        snapshot,
        AnomalyType::WindowSwitch,
        format!(
            "{} focus losses in one session",
            snapshot.focus_loss_count
        ),
        serde_json::json!({
            "focusLossCount": snapshot.focus_loss_count,
            "threshold": config.window_switch_count,
        }),
        now,
    ))
}

fn detect_idle_timeout(
    snapshot: &SessionSnapshot,
    config: &DetectorConfig,
    now: DateTime<Utc>,
) -> Option<LearnAnomaly> {
    if snapshot.max_idle_gap_secs <= config.idle_gap_secs {
        return None;
    }
    Some(candidate(
        snapshot,
        AnomalyType::IdleTimeout,
        format!(
            "idle gap of {:.0}s exceeds {:.0}s",
            snapshot.max_idle_gap_secs, config.idle_gap_secs
        ),
        serde_json::json!({
            "maxIdleGapSecs": snapshot.max_idle_gap_secs,
            "threshold": config.idle_gap_secs,
        }),
        now,
    ))
}

fn detect_face_fail(
    snapshot: &SessionSnapshot,
    config: &DetectorConfig,
    now: DateTime<Utc>,
) -> Option<LearnAnomaly> {
    if snapshot.max_consecutive_face_fails <= config.face_fail_count {
        return None;
    }
    Some(candidate(
        snapshot,
        AnomalyType::FaceDetectFail,
        format!(
            "{} consecutive liveness-check failures",
            snapshot.max_consecutive_face_fails
        ),
        serde_json::json!({
            "consecutiveFailures": snapshot.max_consecutive_face_fails,
            "threshold": config.face_fail_count,
        }),
        now,
    ))
}

fn detect_network_anomaly(
    snapshot: &SessionSnapshot,
    config: &DetectorConfig,
    now: DateTime<Utc>,
) -> Option<LearnAnomaly> {
    if snapshot.network_disconnect_count <= config.network_disconnect_count {
        return None;
    }
    Some(candidate(
        snapshot,
        AnomalyType::NetworkAnomaly,
        format!(
            "{} network drops in one session",
            snapshot.network_disconnect_count
        ),
        serde_json::json!({
            "disconnectCount": snapshot.network_disconnect_count,
            "threshold": config.network_disconnect_count,
        }),
        now,
    ))
}

fn candidate(
    snapshot: &SessionSnapshot,
    anomaly_type: AnomalyType,
    description: String,
    data: serde_json::Value,
    now: DateTime<Utc>,
) -> LearnAnomaly {
    LearnAnomaly {
        id: format!("an:{}:{}", snapshot.session_id, anomaly_type.as_str()),
        session_id: snapshot.session_id.clone(),
        user_id: snapshot.user_id.clone(),
        anomaly_type,
        description,
        data,
        severity: anomaly_type.default_severity(),
        status: AnomalyStatus::Detected,
        auto_detected: true,
        evidence: vec![],
        resolution: None,
        resolved_by: None,
        resolved_at: None,
        detected_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::AnomalySeverity;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            wall_clock_secs: 3600.0,
            progress_secs: 3600.0,
            distinct_device_count: 1,
            focus_loss_count: 0,
            max_idle_gap_secs: 0.0,
            max_consecutive_face_fails: 0,
            network_disconnect_count: 0,
        }
    }

    #[test]
    fn clean_session_raises_nothing() {
        let found = detect_anomalies(&snapshot(), &DetectorConfig::default(), Utc::now());
        assert!(found.is_empty());
    }

    #[test]
    fn thirty_focus_losses_raise_one_medium_window_switch() {
        let mut snap = snapshot();
        snap.focus_loss_count = 30;
        let found = detect_anomalies(&snap, &DetectorConfig::default(), Utc::now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anomaly_type, AnomalyType::WindowSwitch);
        assert_eq!(found[0].severity, AnomalySeverity::Medium);
        assert_eq!(found[0].status, AnomalyStatus::Detected);
        assert!(found[0].auto_detected);
    }

    #[test]
    fn two_devices_raise_critical() {
        let mut snap = snapshot();
        snap.distinct_device_count = 2;
        let found = detect_anomalies(&snap, &DetectorConfig::default(), Utc::now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anomaly_type, AnomalyType::MultipleDevice);
        assert_eq!(found[0].severity, AnomalySeverity::Critical);
    }

    #[test]
    fn rapid_progress_uses_the_configured_ratio() {
        let mut snap = snapshot();
        snap.progress_secs = 4.0 * snap.wall_clock_secs;
        let found = detect_anomalies(&snap, &DetectorConfig::default(), Utc::now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anomaly_type, AnomalyType::RapidProgress);
        assert_eq!(found[0].severity, AnomalySeverity::High);

        let mut lenient = DetectorConfig::default();
        lenient.rapid_progress_ratio = 5.0;
        assert!(detect_anomalies(&snap, &lenient, Utc::now()).is_empty());
    }

    #[test]
    fn zero_wall_clock_never_divides() {
        let mut snap = snapshot();
        snap.wall_clock_secs = 0.0;
        snap.progress_secs = 100.0;
        let found = detect_anomalies(&snap, &DetectorConfig::default(), Utc::now());
        assert!(found.is_empty());
    }

    #[test]
    fn detectors_are_independent_and_can_fire_together() {
        let mut snap = snapshot();
        snap.distinct_device_count = 3;
        snap.focus_loss_count = 40;
        snap.max_idle_gap_secs = 900.0;
        snap.max_consecutive_face_fails = 5;
        snap.network_disconnect_count = 10;
        snap.progress_secs = 20_000.0;
        let found = detect_anomalies(&snap, &DetectorConfig::default(), Utc::now());
        assert_eq!(found.len(), 6);
    }

    #[test]
    fn anomaly_ids_are_stable_per_session_and_type() {
        let mut snap = snapshot();
        snap.focus_loss_count = 30;
        let now = Utc::now();
        let a = detect_anomalies(&snap, &DetectorConfig::default(), now);
        let b = detect_anomalies(&snap, &DetectorConfig::default(), now);
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[0].id, "an:s1:window_switch");
    }
}
