use serde::{Deserialize, Serialize};

use crate::engine::classify::ClassifiedSegment;
use crate::engine::config::ScoringWeights;
use crate::engine::types::InvalidTimeReason;

/// 会话/单日级连续质量指标。quality 0-10，其余 0-1。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScores {
    pub quality: f64,
    pub focus: f64,
    pub interaction: f64,
    pub continuity: f64,
}

/// Compute the four bounded scores from the classified segment set and
/// the meaningful-interaction count. Zero denominators yield 0, never NaN.
pub fn compute_scores(
    classified: &[ClassifiedSegment],
    interaction_count: u32,
    weights: &ScoringWeights,
) -> SessionScores {
    let total: f64 = classified.iter().map(|c| c.segment.duration_secs()).sum();
    let effective: f64 = classified.iter().map(|c| c.effective_secs).sum();

    let focus = if total > 0.0 {
        // 无信号分段不计入聚焦时长
        let focused: f64 = classified
            .iter()
            .filter(|c| {
                c.segment.context.has_signal
                    && c.segment.context.focused
                    && c.segment.context.visible
            })
            .map(|c| c.segment.duration_secs())
            .sum();
        (focused / total).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let interaction = if effective > 0.0 {
        let expected = (effective / 60.0) * weights.interactions_per_minute;
        if expected > 0.0 {
            (f64::from(interaction_count) / expected).clamp(0.0, 1.0)
        } else {
            0.0
        }
    } else {
        0.0
    };

    // 因空闲/交互超时损失的部分；断网等其他原因不计入连续性
    let gap_lost: f64 = classified
        .iter()
        .filter(|c| {
            matches!(
                c.reason,
                Some(InvalidTimeReason::IdleTimeout) | Some(InvalidTimeReason::InteractionTimeout)
            )
        })
        .map(|c| c.invalid_secs)
        .sum();
    let continuity_base = effective + gap_lost;
    let continuity = if continuity_base > 0.0 {
        (1.0 - gap_lost / continuity_base).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let effective_ratio = if total > 0.0 {
        (effective / total).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let weight_sum =
        weights.focus + weights.interaction + weights.continuity + weights.effective_ratio;
    let quality = if weight_sum > 0.0 {
        let blended = (weights.focus * focus
            + weights.interaction * interaction
            + weights.continuity * continuity
            + weights.effective_ratio * effective_ratio)
            / weight_sum;
        (blended * 10.0).clamp(0.0, 10.0)
    } else {
        0.0
    };

    SessionScores {
        quality,
        focus,
        interaction,
        continuity,
    }
}
