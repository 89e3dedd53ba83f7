use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;
use crate::engine::types::{BehaviorEvent, BehaviorType};

/// 分段时刻的客户端状态快照，由边界事件逐步推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentContext {
    pub focused: bool,
    pub visible: bool,
    pub idle: bool,
    pub online: bool,
    pub playing: bool,
    /// false 仅出现在零事件会话的兜底分段上
    pub has_signal: bool,
}

impl Default for SegmentContext {
    fn default() -> Self {
        Self {
            focused: true,
            visible: true,
            idle: false,
            online: true,
            playing: false,
            has_signal: true,
        }
    }
}

/// [start, end) 区间，会话内严格有序且不重叠，整体覆盖会话窗口
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSegment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub opened_by: Option<BehaviorType>,
    pub context: SegmentContext,
}

impl TimeSegment {
    pub fn duration_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }

    /// Overlap with [from, to) in seconds.
    pub fn overlap_secs(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
        let lo = self.start.max(from);
        let hi = self.end.min(to);
        if hi <= lo {
            0.0
        } else {
            (hi - lo).num_milliseconds() as f64 / 1000.0
        }
    }
}

/// Walk the ordered event stream and cut a new segment at every
/// state-changing event. Ordering is a precondition: out-of-order or
/// duplicate timestamps reject the whole batch.
pub fn build_segments(
    session_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    events: &[BehaviorEvent],
) -> Result<Vec<TimeSegment>, EngineError> {
    if window_end <= window_start {
        return Err(EngineError::MalformedEvent {
            session_id: session_id.to_string(),
            detail: format!(
                "session window has non-positive span: {window_start} .. {window_end}"
            ),
        });
    }

    let mut prev: Option<DateTime<Utc>> = None;
    for event in events {
        if let Some(prev_ts) = prev {
            if event.timestamp <= prev_ts {
                return Err(EngineError::MalformedEvent {
                    session_id: session_id.to_string(),
                    detail: format!(
                        "event {} at {} is not strictly after {}",
                        event.id, event.timestamp, prev_ts
                    ),
                });
            }
        }
        if event.timestamp < window_start || event.timestamp > window_end {
            return Err(EngineError::MalformedEvent {
                session_id: session_id.to_string(),
                detail: format!(
                    "event {} at {} falls outside the session window",
                    event.id, event.timestamp
                ),
            });
        }
        prev = Some(event.timestamp);
    }

    if events.is_empty() {
        // 无任何信号：整个窗口作为一个低置信度分段交给下游保守处理
        return Ok(vec![TimeSegment {
            start: window_start,
            end: window_end,
            opened_by: None,
            context: SegmentContext {
                has_signal: false,
                ..SegmentContext::default()
            },
        }]);
    }

    let mut segments = Vec::new();
    let mut context = SegmentContext::default();
    let mut cursor = window_start;
    let mut opened_by: Option<BehaviorType> = None;

    for event in events {
        if event.behavior_type.is_segment_boundary() {
            if event.timestamp > cursor {
                segments.push(TimeSegment {
                    start: cursor,
                    end: event.timestamp,
                    opened_by,
                    context,
                });
                cursor = event.timestamp;
            }
            apply_transition(&mut context, event.behavior_type);
            opened_by = Some(event.behavior_type);
        }
    }

    if cursor < window_end {
        segments.push(TimeSegment {
            start: cursor,
            end: window_end,
            opened_by,
            context,
        });
    }

    Ok(segments)
}

fn apply_transition(context: &mut SegmentContext, behavior: BehaviorType) {
    match behavior {
        BehaviorType::Play => context.playing = true,
        BehaviorType::Pause => context.playing = false,
        BehaviorType::FocusGained => context.focused = true,
        BehaviorType::FocusLost => context.focused = false,
        BehaviorType::PageVisible => context.visible = true,
        BehaviorType::PageHidden => context.visible = false,
        BehaviorType::IdleStart => context.idle = true,
        BehaviorType::IdleEnd => context.idle = false,
        BehaviorType::NetworkOnline => context.online = true,
        BehaviorType::NetworkOffline => context.online = false,
        // 设备切换不改变客户端状态位，仅作为边界记录在 opened_by 上
        BehaviorType::DeviceChange | BehaviorType::MultiDeviceLogin => {}
        _ => {}
    }
}
