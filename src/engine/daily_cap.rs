use chrono::{DateTime, Utc};

use crate::constants::DURATION_EPSILON_SECS;
use crate::engine::types::{
    EffectiveStudyRecord, EvidenceEntry, EvidenceKind, InvalidTimeReason, StudyTimeStatus,
};

/// Result of one enforcement pass. Only mutated records are returned;
/// the caller persists them.
#[derive(Debug, Clone, Default)]
pub struct CapOutcome {
    pub changed: Vec<EffectiveStudyRecord>,
    pub trimmed_secs: f64,
}

/// Trim a user's records for one calendar date down to the daily ceiling.
/// Latest records (by window start) are reduced first; the removed portion
/// is reclassified as daily_limit_exceeded. Running the pass twice on the
/// same day is a no-op the second time.
pub fn enforce_daily_cap(
    records: &[EffectiveStudyRecord],
    ceiling_secs: f64,
    now: DateTime<Utc>,
) -> CapOutcome {
    let counted: f64 = records
        .iter()
        .filter(|r| r.include_in_daily_total)
        .map(|r| r.effective_secs)
        .sum();

    let mut excess = counted - ceiling_secs;
    if excess <= DURATION_EPSILON_SECS {
        return CapOutcome::default();
    }

    let mut ordered: Vec<&EffectiveStudyRecord> = records
        .iter()
        .filter(|r| r.include_in_daily_total && r.effective_secs > 0.0)
        .collect();
    // 从最晚开始的记录往前裁剪
    ordered.sort_by(|a, b| b.window_start.cmp(&a.window_start));

    let mut outcome = CapOutcome::default();
    for original in ordered {
        if excess <= DURATION_EPSILON_SECS {
            break;
        }
        let trim = excess.min(original.effective_secs);
        let mut record = original.clone();
        record.effective_secs -= trim;
        record.invalid_secs += trim;
        record.evidence.push(EvidenceEntry {
            kind: EvidenceKind::DailyCapTrim,
            detail: format!(
                "daily_limit_exceeded: {trim:.0}s trimmed (ceiling {ceiling_secs:.0}s)"
            ),
            recorded_at: now,
        });
        if record.effective_secs < DURATION_EPSILON_SECS {
            record.effective_secs = 0.0;
            record.invalid_secs = record.total_secs;
            record.status = StudyTimeStatus::Invalid;
            record.invalid_reason = Some(InvalidTimeReason::DailyLimitExceeded);
            record.include_in_daily_total = false;
        } else {
            record.status = StudyTimeStatus::Partial;
            if record.invalid_reason.is_none() {
                record.invalid_reason = Some(InvalidTimeReason::DailyLimitExceeded);
            }
        }
        record.updated_at = now;

        excess -= trim;
        outcome.trimmed_secs += trim;
        outcome.changed.push(record);
    }

    outcome
}
