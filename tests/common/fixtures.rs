use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use studytime_backend::engine::config::EngineConfig;
use studytime_backend::engine::types::{BehaviorEvent, BehaviorType};
use studytime_backend::engine::StudyTimeEngine;
use studytime_backend::store::operations::sessions::{LearnSession, SessionStatus};
use studytime_backend::store::Store;

pub struct TestEnv {
    pub store: Arc<Store>,
    pub engine: StudyTimeEngine,
    _temp_dir: TempDir,
}

pub fn test_env() -> TestEnv {
    test_env_with(EngineConfig::default())
}

pub fn test_env_with(config: EngineConfig) -> TestEnv {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("studytime-test.sled");
    let store = Arc::new(
        Store::open(sled_path.to_str().expect("utf8 path")).expect("open test store"),
    );
    let engine = StudyTimeEngine::new(config, store.clone()).expect("engine config");
    TestEnv {
        store,
        engine,
        _temp_dir: temp_dir,
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    base_time() + chrono::Duration::seconds(secs)
}

pub fn seed_session(
    store: &Store,
    session_id: &str,
    user_id: &str,
    device_fingerprint: &str,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> LearnSession {
    let session = LearnSession {
        id: session_id.to_string(),
        user_id: user_id.to_string(),
        course_id: "course-101".to_string(),
        lesson_id: "lesson-7".to_string(),
        device_fingerprint: device_fingerprint.to_string(),
        ip: "10.0.0.1".to_string(),
        started_at: start,
        ended_at: end,
        status: if end.is_some() {
            SessionStatus::Ended
        } else {
            SessionStatus::Active
        },
        created_at: start,
        updated_at: start,
    };
    store.create_session(&session).expect("seed session");
    session
}

pub fn seed_event(
    store: &Store,
    session_id: &str,
    idx: usize,
    behavior: BehaviorType,
    timestamp: DateTime<Utc>,
) -> BehaviorEvent {
    let event = BehaviorEvent {
        id: format!("ev-{idx}"),
        session_id: session_id.to_string(),
        behavior_type: behavior,
        timestamp,
        video_position: None,
        payload: None,
        device_fingerprint: "fp-1".to_string(),
        ip: "10.0.0.1".to_string(),
    };
    store.append_event(&event).expect("seed event");
    event
}

pub fn seed_events(
    store: &Store,
    session_id: &str,
    events: &[(BehaviorType, i64)],
) -> Vec<BehaviorEvent> {
    events
        .iter()
        .enumerate()
        .map(|(idx, (behavior, offset))| {
            seed_event(store, session_id, idx, *behavior, at(*offset))
        })
        .collect()
}
