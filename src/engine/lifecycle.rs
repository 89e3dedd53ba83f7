use chrono::{DateTime, Utc};

use crate::engine::error::EngineError;
use crate::engine::types::{AnomalySeverity, AnomalyStatus, EvidenceEntry, EvidenceKind, LearnAnomaly};

/// 显式状态转移表：detected → {investigating, resolved, ignored}；
/// investigating → {resolved, ignored}；resolved 为终态；
/// ignored 只能重新打开为 investigating。
pub fn allowed_transitions(from: AnomalyStatus) -> &'static [AnomalyStatus] {
    match from {
        AnomalyStatus::Detected => &[
            AnomalyStatus::Investigating,
            AnomalyStatus::Resolved,
            AnomalyStatus::Ignored,
        ],
        AnomalyStatus::Investigating => &[AnomalyStatus::Resolved, AnomalyStatus::Ignored],
        AnomalyStatus::Resolved => &[],
        AnomalyStatus::Ignored => &[AnomalyStatus::Investigating],
    }
}

pub fn can_transition(from: AnomalyStatus, to: AnomalyStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Single entry point for every status change. Anything outside the table
/// is rejected, never silently applied.
pub fn transition(
    mut anomaly: LearnAnomaly,
    to: AnomalyStatus,
    actor: &str,
    note: &str,
    now: DateTime<Utc>,
) -> Result<LearnAnomaly, EngineError> {
    let from = anomaly.status;
    if !can_transition(from, to) {
        return Err(EngineError::InvalidTransition { from, to });
    }

    anomaly.status = to;
    anomaly.updated_at = now;
    anomaly.evidence.push(EvidenceEntry {
        kind: EvidenceKind::ReviewAction,
        detail: format!("{} -> {} by {actor}: {note}", from.as_str(), to.as_str()),
        recorded_at: now,
    });

    match to {
        AnomalyStatus::Resolved => {
            anomaly.resolution = Some(note.to_string());
            anomaly.resolved_by = Some(actor.to_string());
            anomaly.resolved_at = Some(now);
        }
        AnomalyStatus::Investigating => {
            // 重新打开时清空上一次的处理结论
            anomaly.resolution = None;
            anomaly.resolved_by = None;
            anomaly.resolved_at = None;
        }
        _ => {}
    }

    Ok(anomaly)
}

/// 仅低风险异常允许系统自动关闭；高危/致命必须人工处理
pub fn auto_resolve(
    anomaly: LearnAnomaly,
    now: DateTime<Utc>,
) -> Result<LearnAnomaly, EngineError> {
    if anomaly.severity != AnomalySeverity::Low {
        return Err(EngineError::Configuration(format!(
            "auto-resolution is limited to low severity, got {}",
            anomaly.severity.as_str()
        )));
    }
    transition(
        anomaly,
        AnomalyStatus::Resolved,
        "system",
        "auto-resolved: low severity, no review required",
        now,
    )
}
