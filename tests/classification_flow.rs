mod common;

use common::fixtures::{at, seed_events, seed_session, test_env};
use studytime_backend::engine::error::EngineError;
use studytime_backend::engine::types::{BehaviorType, InvalidTimeReason, StudyTimeStatus};
use studytime_backend::engine::ProcessOptions;
use studytime_backend::store::operations::sessions::SessionStatus;

#[tokio::test]
async fn one_hour_session_with_a_twelve_minute_blur_window() {
    let env = test_env();
    seed_session(&env.store, "s1", "u1", "fp-1", at(0), Some(at(3600)));
    seed_events(
        &env.store,
        "s1",
        &[
            (BehaviorType::Play, 5),
            (BehaviorType::FocusLost, 24 * 60),
            (BehaviorType::FocusGained, 36 * 60),
        ],
    );

    let outcome = env
        .engine
        .process_session("s1", ProcessOptions::default(), at(3600))
        .await
        .expect("classify");

    let record = &outcome.record;
    assert_eq!(record.total_secs, 3600.0);
    assert_eq!(record.effective_secs, 2880.0);
    assert_eq!(record.invalid_secs, 720.0);
    assert_eq!(record.status, StudyTimeStatus::Partial);
    assert_eq!(record.invalid_reason, Some(InvalidTimeReason::WindowFocusLost));
    assert!(record.durations_consistent());
    assert!(outcome.anomalies.is_empty());

    // 写回后会话进入已分类状态，记录可按 (user, date) 取回
    let session = env.store.get_session("s1").unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Classified);
    let stored = env
        .store
        .get_record("u1", at(0).date_naive(), "s1")
        .unwrap()
        .unwrap();
    assert_eq!(stored.effective_secs, 2880.0);
}

#[tokio::test]
async fn recompute_overwrites_with_identical_output() {
    let env = test_env();
    seed_session(&env.store, "s1", "u1", "fp-1", at(0), Some(at(1800)));
    seed_events(
        &env.store,
        "s1",
        &[
            (BehaviorType::Play, 10),
            (BehaviorType::IdleStart, 400),
            (BehaviorType::IdleEnd, 900),
        ],
    );

    let first = env
        .engine
        .process_session("s1", ProcessOptions::default(), at(1800))
        .await
        .expect("first pass");
    let second = env
        .engine
        .process_session("s1", ProcessOptions::default(), at(1800))
        .await
        .expect("second pass");

    assert_eq!(
        serde_json::to_string(&first.record).unwrap(),
        serde_json::to_string(&second.record).unwrap()
    );

    let daily = env
        .store
        .get_daily_records("u1", at(0).date_naive())
        .unwrap();
    assert_eq!(daily.len(), 1);
}

#[tokio::test]
async fn malformed_event_batch_rejects_the_unit() {
    let env = test_env();
    seed_session(&env.store, "s1", "u1", "fp-1", at(0), Some(at(600)));
    // 两条事件时间戳相同：批次必须整体拒绝
    seed_events(
        &env.store,
        "s1",
        &[(BehaviorType::Play, 100), (BehaviorType::Pause, 100)],
    );

    let err = env
        .engine
        .process_session("s1", ProcessOptions::default(), at(600))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedEvent { .. }));

    // 拒绝的单元不得留下任何半成品写入
    assert!(env
        .store
        .get_record("u1", at(0).date_naive(), "s1")
        .unwrap()
        .is_none());
    let session = env.store.get_session("s1").unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Ended);
}

#[tokio::test]
async fn concurrent_second_device_invalidates_the_overlap() {
    let env = test_env();
    seed_session(&env.store, "s1", "u1", "fp-1", at(0), Some(at(3600)));
    // 同一用户另一设备 1000s-2000s 在线
    seed_session(&env.store, "s2", "u1", "fp-2", at(1000), Some(at(2000)));
    seed_events(&env.store, "s1", &[(BehaviorType::Play, 5)]);

    let outcome = env
        .engine
        .process_session("s1", ProcessOptions::default(), at(3600))
        .await
        .expect("classify");

    let record = &outcome.record;
    assert_eq!(record.invalid_secs, 1000.0);
    assert_eq!(record.effective_secs, 2600.0);
    assert_eq!(
        record.invalid_reason,
        Some(InvalidTimeReason::MultipleDeviceLogin)
    );
    assert_eq!(record.status, StudyTimeStatus::Partial);

    // 两台设备并发也触发 multiple_device 异常
    assert!(outcome
        .anomalies
        .iter()
        .any(|a| a.id == "an:s1:multiple_device"));
}

#[tokio::test]
async fn course_test_gate_voids_the_whole_record() {
    let env = test_env();
    seed_session(&env.store, "s1", "u1", "fp-1", at(0), Some(at(1200)));
    seed_events(&env.store, "s1", &[(BehaviorType::Play, 5)]);

    let options = ProcessOptions {
        course_test_failed: true,
    };
    let outcome = env
        .engine
        .process_session("s1", options, at(1200))
        .await
        .expect("classify");

    assert_eq!(outcome.record.effective_secs, 0.0);
    assert_eq!(outcome.record.status, StudyTimeStatus::Invalid);
    assert_eq!(
        outcome.record.invalid_reason,
        Some(InvalidTimeReason::IncompleteCourseTest)
    );
}

#[tokio::test]
async fn empty_session_is_no_activity_detected() {
    let env = test_env();
    seed_session(&env.store, "s1", "u1", "fp-1", at(0), Some(at(900)));

    let outcome = env
        .engine
        .process_session("s1", ProcessOptions::default(), at(900))
        .await
        .expect("classify");

    assert_eq!(outcome.record.status, StudyTimeStatus::Invalid);
    assert_eq!(
        outcome.record.invalid_reason,
        Some(InvalidTimeReason::NoActivityDetected)
    );
    assert_eq!(outcome.record.quality_score, 0.0);
}

#[tokio::test]
async fn archive_summarizer_folds_classified_sessions() {
    let env = test_env();
    seed_session(&env.store, "s1", "u1", "fp-1", at(0), Some(at(3600)));
    seed_events(&env.store, "s1", &[(BehaviorType::Play, 5)]);
    seed_session(&env.store, "s2", "u1", "fp-1", at(7200), Some(at(10_800)));
    seed_events(
        &env.store,
        "s2",
        &[
            (BehaviorType::Play, 7205),
            (BehaviorType::FocusLost, 7800),
            (BehaviorType::FocusGained, 8400),
        ],
    );

    env.engine
        .process_session("s1", ProcessOptions::default(), at(3600))
        .await
        .expect("classify s1");
    env.engine
        .process_session("s2", ProcessOptions::default(), at(10_800))
        .await
        .expect("classify s2");

    let archive = env
        .engine
        .summarize_course("u1", "course-101", at(11_000))
        .await
        .expect("summarize");

    assert_eq!(archive.session_count, 2);
    assert_eq!(archive.total_effective_secs, 3600.0 + 3000.0);
    assert_eq!(archive.total_invalid_secs, 600.0);
    assert_eq!(archive.first_learn_time, Some(at(0)));
    assert_eq!(archive.last_learn_time, Some(at(10_800)));

    let stored = env.store.get_archive("u1", "course-101").unwrap().unwrap();
    assert_eq!(stored.session_count, 2);
}
