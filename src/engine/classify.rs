use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DURATION_EPSILON_SECS;
use crate::engine::config::ClassifierConfig;
use crate::engine::error::EngineError;
use crate::engine::scoring::SessionScores;
use crate::engine::segment::TimeSegment;
use crate::engine::types::{
    EffectiveStudyRecord, EvidenceEntry, EvidenceKind, InvalidTimeReason, StudyTimeStatus,
};

/// 半开区间 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration_secs(&self) -> f64 {
        ((self.end - self.start).num_milliseconds() as f64 / 1000.0).max(0.0)
    }
}

/// Session-scoped facts the rule set consults beyond the segment stream.
/// Assembled by the engine facade from events and store lookups.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// 活体检测失败/缺失覆盖的时间窗
    pub liveness_failed: Vec<Interval>,
    /// 结课考试门槛未通过（结课评定时由调用方置位）
    pub course_test_failed: bool,
    /// 同一用户 >= 阈值台设备并发在线的时间窗
    pub multi_device: Vec<Interval>,
    /// 非课程浏览时间窗
    pub browsing: Vec<Interval>,
    /// 在线测试时间窗
    pub testing: Vec<Interval>,
    /// 可疑行为事件时刻（rapid seek / multi tab / devtools / copy）
    pub suspicious_at: Vec<DateTime<Utc>>,
    /// 有意义交互事件时刻，升序
    pub interaction_at: Vec<DateTime<Utc>>,
}

/// Per-segment classification outcome. `effective + invalid == duration`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedSegment {
    pub segment: TimeSegment,
    pub status: StudyTimeStatus,
    pub reason: Option<InvalidTimeReason>,
    pub effective_secs: f64,
    pub invalid_secs: f64,
}

/// Reason precedence for picking the dominant reason of an aggregated
/// record. Mirrors the rule order: earlier entries win ties.
const REASON_PRECEDENCE: [InvalidTimeReason; 12] = [
    InvalidTimeReason::IdentityVerificationFailed,
    InvalidTimeReason::IncompleteCourseTest,
    InvalidTimeReason::MultipleDeviceLogin,
    InvalidTimeReason::BrowsingWebInfo,
    InvalidTimeReason::OnlineTesting,
    InvalidTimeReason::WindowFocusLost,
    InvalidTimeReason::PageHidden,
    InvalidTimeReason::InteractionTimeout,
    InvalidTimeReason::IdleTimeout,
    InvalidTimeReason::NoActivityDetected,
    InvalidTimeReason::NetworkDisconnected,
    InvalidTimeReason::SuspiciousBehavior,
];

/// Apply the ordered rule set to every segment. The first matching rule
/// fixes the segment's reason; later rules never override it, and the
/// unaffected remainder of a partially hit segment stays effective.
pub fn classify_segments(
    segments: &[TimeSegment],
    ctx: &SessionContext,
    config: &ClassifierConfig,
) -> Vec<ClassifiedSegment> {
    let idle_runs = invalid_idle_runs(segments, config.idle_timeout_secs);
    let interaction_gaps = interaction_timeout_intervals(
        &ctx.interaction_at,
        config.interaction_timeout_secs,
    );
    let unfocused = smoothed_unfocused(segments, config.min_focus_regain_secs);

    segments
        .iter()
        .enumerate()
        .map(|(idx, segment)| classify_one(segment, idx, ctx, &idle_runs, &interaction_gaps, &unfocused))
        .collect()
}

fn classify_one(
    segment: &TimeSegment,
    idx: usize,
    ctx: &SessionContext,
    idle_runs: &[Interval],
    interaction_gaps: &[Interval],
    unfocused: &[bool],
) -> ClassifiedSegment {
    let duration = segment.duration_secs();

    // Rule 1: 活体检测失败整段作废（且作废整门课程，聚合时再传播）
    let liveness_overlap = overlap_total(segment, &ctx.liveness_failed);
    if liveness_overlap > 0.0 {
        return invalidated(
            segment,
            InvalidTimeReason::IdentityVerificationFailed,
            duration,
        );
    }

    // Rule 2: end-of-course test gate
    if ctx.course_test_failed {
        return invalidated(segment, InvalidTimeReason::IncompleteCourseTest, duration);
    }

    // Rule 3: concurrent multi-device time, interval-precise
    let device_overlap = overlap_total(segment, &ctx.multi_device);
    if device_overlap > 0.0 {
        return invalidated(segment, InvalidTimeReason::MultipleDeviceLogin, device_overlap);
    }

    // Rule 4: non-lesson browsing / online testing
    let browsing_overlap = overlap_total(segment, &ctx.browsing);
    if browsing_overlap > 0.0 {
        return invalidated(segment, InvalidTimeReason::BrowsingWebInfo, browsing_overlap);
    }
    let testing_overlap = overlap_total(segment, &ctx.testing);
    if testing_overlap > 0.0 {
        return invalidated(segment, InvalidTimeReason::OnlineTesting, testing_overlap);
    }

    // Rule 5: hidden page wins over plain focus loss
    if !segment.context.visible {
        return invalidated(segment, InvalidTimeReason::PageHidden, duration);
    }
    if unfocused[idx] {
        return invalidated(segment, InvalidTimeReason::WindowFocusLost, duration);
    }

    // Rule 6: timeouts and the no-signal fallback
    if !segment.context.has_signal {
        return invalidated(segment, InvalidTimeReason::NoActivityDetected, duration);
    }
    let idle_overlap = overlap_total(segment, idle_runs);
    if idle_overlap > 0.0 {
        return invalidated(segment, InvalidTimeReason::IdleTimeout, idle_overlap);
    }
    let gap_overlap = overlap_total(segment, interaction_gaps);
    if gap_overlap > 0.0 {
        return invalidated(segment, InvalidTimeReason::InteractionTimeout, gap_overlap);
    }

    // Rule 7: offline time
    if !segment.context.online {
        return invalidated(segment, InvalidTimeReason::NetworkDisconnected, duration);
    }

    // Rule 8: suspicious behavior taints the enclosing segment
    let tainted = ctx
        .suspicious_at
        .iter()
        .any(|at| *at >= segment.start && *at < segment.end);
    if tainted {
        return invalidated(segment, InvalidTimeReason::SuspiciousBehavior, duration);
    }

    ClassifiedSegment {
        segment: segment.clone(),
        status: StudyTimeStatus::Valid,
        reason: None,
        effective_secs: duration,
        invalid_secs: 0.0,
    }
}

fn invalidated(
    segment: &TimeSegment,
    reason: InvalidTimeReason,
    invalid_secs: f64,
) -> ClassifiedSegment {
    let duration = segment.duration_secs();
    let invalid = invalid_secs.min(duration);
    let status = if duration - invalid < DURATION_EPSILON_SECS {
        StudyTimeStatus::Invalid
    } else {
        StudyTimeStatus::Partial
    };
    ClassifiedSegment {
        segment: segment.clone(),
        status,
        reason: Some(reason),
        effective_secs: (duration - invalid).max(0.0),
        invalid_secs: invalid,
    }
}

fn overlap_total(segment: &TimeSegment, intervals: &[Interval]) -> f64 {
    intervals
        .iter()
        .map(|iv| segment.overlap_secs(iv.start, iv.end))
        .sum()
}

/// Maximal runs of idle segments whose total span exceeds the threshold.
/// Short idles are tolerated as think time.
fn invalid_idle_runs(segments: &[TimeSegment], idle_timeout_secs: f64) -> Vec<Interval> {
    let mut runs = Vec::new();
    let mut current: Option<Interval> = None;
    for segment in segments {
        if segment.context.idle {
            current = Some(match current {
                Some(run) => Interval::new(run.start, segment.end),
                None => Interval::new(segment.start, segment.end),
            });
        } else if let Some(run) = current.take() {
            if run.duration_secs() > idle_timeout_secs {
                runs.push(run);
            }
        }
    }
    if let Some(run) = current {
        if run.duration_secs() > idle_timeout_secs {
            runs.push(run);
        }
    }
    runs
}

/// The portion of each over-threshold gap between consecutive interactions
/// beyond the grace period. Needs at least two interaction events; the
/// no-signal rule covers sessions with none.
fn interaction_timeout_intervals(
    interaction_at: &[DateTime<Utc>],
    interaction_timeout_secs: f64,
) -> Vec<Interval> {
    let mut gaps = Vec::new();
    let grace = chrono::Duration::milliseconds((interaction_timeout_secs * 1000.0) as i64);
    for pair in interaction_at.windows(2) {
        let gap_secs = (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0;
        if gap_secs > interaction_timeout_secs {
            gaps.push(Interval::new(pair[0] + grace, pair[1]));
        }
    }
    gaps
}

/// Per-segment focus flags with short-regain smoothing: a focused gap
/// shorter than the regain threshold between two unfocused segments
/// still counts as unfocused.
fn smoothed_unfocused(segments: &[TimeSegment], min_focus_regain_secs: f64) -> Vec<bool> {
    let raw: Vec<bool> = segments.iter().map(|s| !s.context.focused).collect();
    let mut smoothed = raw.clone();
    for i in 0..segments.len() {
        if !raw[i]
            && segments[i].duration_secs() < min_focus_regain_secs
            && i > 0
            && i + 1 < segments.len()
            && raw[i - 1]
            && raw[i + 1]
        {
            smoothed[i] = true;
        }
    }
    smoothed
}

/// Inputs that scope an aggregation pass to one (user, session, day).
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    pub session_id: String,
    pub user_id: String,
    pub course_id: String,
    pub lesson_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// Fold classified segments into the persisted record. Record ids are
/// deterministic so a recompute overwrites rather than duplicates, and
/// re-running on the same inputs yields identical output.
pub fn aggregate_session(
    descriptor: &SessionDescriptor,
    classified: &[ClassifiedSegment],
    scores: &SessionScores,
    now: DateTime<Utc>,
) -> Result<EffectiveStudyRecord, EngineError> {
    let total: f64 = classified.iter().map(|c| c.segment.duration_secs()).sum();
    let mut effective: f64 = classified.iter().map(|c| c.effective_secs).sum();
    let mut invalid: f64 = classified.iter().map(|c| c.invalid_secs).sum();

    let study_date = descriptor.window_start.date_naive();
    let mut evidence = Vec::new();

    // 任一整课作废原因出现时，本条记录的全部时长一并作废
    let whole_course = REASON_PRECEDENCE
        .iter()
        .copied()
        .filter(|r| r.affects_whole_course())
        .find(|r| classified.iter().any(|c| c.reason == Some(*r)));
    if let Some(reason) = whole_course {
        effective = 0.0;
        invalid = total;
        evidence.push(EvidenceEntry {
            kind: EvidenceKind::SegmentInvalidated,
            detail: format!(
                "{} voids the whole course record ({total:.0}s)",
                reason.as_str()
            ),
            recorded_at: now,
        });
    } else {
        for reason in REASON_PRECEDENCE {
            let secs: f64 = classified
                .iter()
                .filter(|c| c.reason == Some(reason))
                .map(|c| c.invalid_secs)
                .sum();
            if secs > 0.0 {
                evidence.push(EvidenceEntry {
                    kind: EvidenceKind::SegmentInvalidated,
                    detail: format!("{}: {secs:.0}s invalidated", reason.as_str()),
                    recorded_at: now,
                });
            }
        }
    }

    if effective < 0.0
        || invalid < 0.0
        || (effective + invalid - total).abs() >= DURATION_EPSILON_SECS
    {
        return Err(EngineError::InvariantViolation {
            session_id: descriptor.session_id.clone(),
            effective,
            invalid,
            total,
        });
    }

    let status = if invalid < DURATION_EPSILON_SECS {
        StudyTimeStatus::Valid
    } else if effective < DURATION_EPSILON_SECS {
        StudyTimeStatus::Invalid
    } else {
        StudyTimeStatus::Partial
    };

    let invalid_reason = if let Some(reason) = whole_course {
        Some(reason)
    } else {
        dominant_reason(classified)
    };

    Ok(EffectiveStudyRecord {
        id: format!("esr:{}:{}", descriptor.session_id, study_date),
        user_id: descriptor.user_id.clone(),
        session_id: descriptor.session_id.clone(),
        course_id: descriptor.course_id.clone(),
        lesson_id: descriptor.lesson_id.clone(),
        study_date,
        window_start: descriptor.window_start,
        window_end: descriptor.window_end,
        total_secs: total,
        effective_secs: effective,
        invalid_secs: invalid,
        status,
        invalid_reason: if status == StudyTimeStatus::Valid {
            None
        } else {
            invalid_reason
        },
        quality_score: scores.quality,
        focus_score: scores.focus,
        interaction_score: scores.interaction,
        continuity_score: scores.continuity,
        evidence,
        reviewed_by: None,
        review_comment: None,
        reviewed_at: None,
        include_in_daily_total: true,
        student_notified: false,
        created_at: now,
        updated_at: now,
    })
}

/// Reason accounting for the most invalidated seconds; rule precedence
/// breaks ties.
fn dominant_reason(classified: &[ClassifiedSegment]) -> Option<InvalidTimeReason> {
    let mut best: Option<(InvalidTimeReason, f64)> = None;
    for reason in REASON_PRECEDENCE {
        let secs: f64 = classified
            .iter()
            .filter(|c| c.reason == Some(reason))
            .map(|c| c.invalid_secs)
            .sum();
        if secs > 0.0 && best.map(|(_, b)| secs > b).unwrap_or(true) {
            best = Some((reason, secs));
        }
    }
    best.map(|(reason, _)| reason)
}
