use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::types::EffectiveStudyRecord;

/// 按 (user, course) 归档的长期汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnArchive {
    pub user_id: String,
    pub course_id: String,
    pub total_effective_secs: f64,
    pub total_invalid_secs: f64,
    pub session_count: u64,
    pub anomaly_count: u64,
    pub first_learn_time: Option<DateTime<Utc>>,
    pub last_learn_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Recompute the archive row from the full record set of one
/// (user, course). First/last learn times are derived here and flow one
/// way, from session records into the archive; nothing writes back.
pub fn summarize(
    user_id: &str,
    course_id: &str,
    records: &[EffectiveStudyRecord],
    anomaly_count: u64,
    now: DateTime<Utc>,
) -> LearnArchive {
    let mut archive = LearnArchive {
        user_id: user_id.to_string(),
        course_id: course_id.to_string(),
        total_effective_secs: 0.0,
        total_invalid_secs: 0.0,
        session_count: 0,
        anomaly_count,
        first_learn_time: None,
        last_learn_time: None,
        updated_at: now,
    };

    for record in records {
        archive.total_effective_secs += record.effective_secs;
        archive.total_invalid_secs += record.invalid_secs;
        archive.session_count += 1;

        archive.first_learn_time = Some(match archive.first_learn_time {
            Some(first) => first.min(record.window_start),
            None => record.window_start,
        });
        archive.last_learn_time = Some(match archive.last_learn_time {
            Some(last) => last.max(record.window_end),
            None => record.window_end,
        });
    }

    archive
}
