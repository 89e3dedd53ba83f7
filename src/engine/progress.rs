use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::PROGRESS_HISTORY_LIMIT;

/// 已观看的视频区间（播放头秒数）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedSpan {
    pub start_secs: f64,
    pub end_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressHistoryEntry {
    pub percent: f64,
    pub watched_secs: f64,
    pub recorded_at: DateTime<Utc>,
}

/// 每 (user, lesson) 一条的累计观看状态
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnProgress {
    pub user_id: String,
    pub lesson_id: String,
    pub progress_percent: f64,
    pub watched_secs: f64,
    pub effective_secs: f64,
    pub watched_segments: Vec<WatchedSpan>,
    /// 最近 100 条，旧的淘汰
    pub history: Vec<ProgressHistoryEntry>,
    pub completed: bool,
    pub first_learn_time: Option<DateTime<Utc>>,
    pub last_learn_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// One client progress report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub percent: f64,
    pub span: Option<WatchedSpan>,
    pub watched_delta_secs: f64,
    pub effective_delta_secs: f64,
    pub reported_at: DateTime<Utc>,
}

impl LearnProgress {
    pub fn new(user_id: &str, lesson_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            lesson_id: lesson_id.to_string(),
            progress_percent: 0.0,
            watched_secs: 0.0,
            effective_secs: 0.0,
            watched_segments: vec![],
            history: vec![],
            completed: false,
            first_learn_time: None,
            last_learn_time: None,
            updated_at: now,
        }
    }

    /// 行为加权有效比。观看时长为零时返回 1.0，避免冷启动即被扣分。
    pub fn effective_ratio(&self) -> f64 {
        if self.watched_secs <= 0.0 {
            return 1.0;
        }
        (self.effective_secs / self.watched_secs).clamp(0.0, 1.0)
    }
}

/// Fold one report into the progress row. Percentage never regresses,
/// history entries are appended (never rewritten) and the log is bounded,
/// completion latches at 100%.
pub fn apply_progress(mut progress: LearnProgress, report: &ProgressReport) -> LearnProgress {
    let percent = report.percent.clamp(0.0, 100.0);
    progress.progress_percent = progress.progress_percent.max(percent);
    progress.watched_secs += report.watched_delta_secs.max(0.0);
    progress.effective_secs += report.effective_delta_secs.max(0.0);

    if let Some(span) = report.span {
        if span.end_secs > span.start_secs {
            progress.watched_segments.push(span);
        }
    }

    progress.history.push(ProgressHistoryEntry {
        percent: progress.progress_percent,
        watched_secs: progress.watched_secs,
        recorded_at: report.reported_at,
    });
    if progress.history.len() > PROGRESS_HISTORY_LIMIT {
        let overflow = progress.history.len() - PROGRESS_HISTORY_LIMIT;
        progress.history.drain(..overflow);
    }

    if progress.progress_percent >= 100.0 {
        progress.completed = true;
    }

    if progress.first_learn_time.is_none() {
        progress.first_learn_time = Some(report.reported_at);
    }
    progress.last_learn_time = Some(report.reported_at);
    progress.updated_at = report.reported_at;

    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn report(percent: f64, at: DateTime<Utc>) -> ProgressReport {
        ProgressReport {
            percent,
            span: None,
            watched_delta_secs: 60.0,
            effective_delta_secs: 50.0,
            reported_at: at,
        }
    }

    #[test]
    fn percent_is_clamped_and_never_regresses() {
        let p = LearnProgress::new("u1", "l1", ts(0));
        let p = apply_progress(p, &report(150.0, ts(10)));
        assert_eq!(p.progress_percent, 100.0);
        assert!(p.completed);

        let p = apply_progress(p, &report(40.0, ts(20)));
        assert_eq!(p.progress_percent, 100.0);
        assert!(p.completed);
    }

    #[test]
    fn history_is_bounded_to_the_most_recent_entries() {
        let mut p = LearnProgress::new("u1", "l1", ts(0));
        for i in 0..130 {
            p = apply_progress(p, &report(i as f64 / 2.0, ts(i)));
        }
        assert_eq!(p.history.len(), PROGRESS_HISTORY_LIMIT);
        // 淘汰最旧的 30 条
        assert_eq!(p.history[0].recorded_at, ts(30));
        assert_eq!(p.history.last().unwrap().recorded_at, ts(129));
    }

    #[test]
    fn first_learn_time_is_set_once() {
        let p = LearnProgress::new("u1", "l1", ts(0));
        let p = apply_progress(p, &report(10.0, ts(100)));
        let p = apply_progress(p, &report(20.0, ts(200)));
        assert_eq!(p.first_learn_time, Some(ts(100)));
        assert_eq!(p.last_learn_time, Some(ts(200)));
    }

    #[test]
    fn effective_ratio_handles_zero_watched() {
        let p = LearnProgress::new("u1", "l1", ts(0));
        assert_eq!(p.effective_ratio(), 1.0);

        let p = apply_progress(p, &report(10.0, ts(100)));
        assert!((p.effective_ratio() - 50.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn zero_length_spans_are_dropped() {
        let p = LearnProgress::new("u1", "l1", ts(0));
        let mut r = report(10.0, ts(100));
        r.span = Some(WatchedSpan {
            start_secs: 30.0,
            end_secs: 30.0,
        });
        let p = apply_progress(p, &r);
        assert!(p.watched_segments.is_empty());
    }
}
