use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DURATION_EPSILON_SECS;

/// 行为事件大类，用于分段与规则分派
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorCategory {
    VideoControl,
    Focus,
    Input,
    Idle,
    Network,
    Device,
    Liveness,
    Suspicious,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorType {
    // Video control
    Play,
    Pause,
    Seek,
    RateChange,
    Buffering,
    VideoEnded,
    VideoError,
    // Window focus / page visibility
    FocusGained,
    FocusLost,
    PageVisible,
    PageHidden,
    // Mouse / keyboard
    MouseMove,
    MouseClick,
    Scroll,
    KeyPress,
    TouchStart,
    // Idle
    IdleStart,
    IdleEnd,
    // Network
    NetworkOnline,
    NetworkOffline,
    // Device
    DeviceChange,
    MultiDeviceLogin,
    // Liveness checks
    FaceCheckPassed,
    FaceCheckFailed,
    // Suspicious
    RapidSeek,
    MultiTab,
    DevToolsOpen,
    CopyAttempt,
    // Session lifecycle
    SessionStart,
    SessionEnd,
    Heartbeat,
}

impl BehaviorType {
    pub fn category(self) -> BehaviorCategory {
        match self {
            Self::Play
            | Self::Pause
            | Self::Seek
            | Self::RateChange
            | Self::Buffering
            | Self::VideoEnded
            | Self::VideoError => BehaviorCategory::VideoControl,
            Self::FocusGained | Self::FocusLost | Self::PageVisible | Self::PageHidden => {
                BehaviorCategory::Focus
            }
            Self::MouseMove
            | Self::MouseClick
            | Self::Scroll
            | Self::KeyPress
            | Self::TouchStart => BehaviorCategory::Input,
            Self::IdleStart | Self::IdleEnd => BehaviorCategory::Idle,
            Self::NetworkOnline | Self::NetworkOffline => BehaviorCategory::Network,
            Self::DeviceChange | Self::MultiDeviceLogin => BehaviorCategory::Device,
            Self::FaceCheckPassed | Self::FaceCheckFailed => BehaviorCategory::Liveness,
            Self::RapidSeek | Self::MultiTab | Self::DevToolsOpen | Self::CopyAttempt => {
                BehaviorCategory::Suspicious
            }
            Self::SessionStart | Self::SessionEnd | Self::Heartbeat => BehaviorCategory::Session,
        }
    }

    /// 是否触发新分段边界（状态切换类事件）
    pub fn is_segment_boundary(self) -> bool {
        matches!(
            self,
            Self::Play
                | Self::Pause
                | Self::FocusGained
                | Self::FocusLost
                | Self::PageVisible
                | Self::PageHidden
                | Self::IdleStart
                | Self::IdleEnd
                | Self::NetworkOnline
                | Self::NetworkOffline
                | Self::DeviceChange
                | Self::MultiDeviceLogin
        )
    }

    pub fn is_suspicious(self) -> bool {
        self.category() == BehaviorCategory::Suspicious
    }

    /// 计入交互密度的"有意义交互"事件
    pub fn is_interaction(self) -> bool {
        matches!(
            self,
            Self::Play
                | Self::Pause
                | Self::Seek
                | Self::MouseClick
                | Self::Scroll
                | Self::KeyPress
                | Self::TouchStart
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Seek => "seek",
            Self::RateChange => "rate_change",
            Self::Buffering => "buffering",
            Self::VideoEnded => "video_ended",
            Self::VideoError => "video_error",
            Self::FocusGained => "focus_gained",
            Self::FocusLost => "focus_lost",
            Self::PageVisible => "page_visible",
            Self::PageHidden => "page_hidden",
            Self::MouseMove => "mouse_move",
            Self::MouseClick => "mouse_click",
            Self::Scroll => "scroll",
            Self::KeyPress => "key_press",
            Self::TouchStart => "touch_start",
            Self::IdleStart => "idle_start",
            Self::IdleEnd => "idle_end",
            Self::NetworkOnline => "network_online",
            Self::NetworkOffline => "network_offline",
            Self::DeviceChange => "device_change",
            Self::MultiDeviceLogin => "multi_device_login",
            Self::FaceCheckPassed => "face_check_passed",
            Self::FaceCheckFailed => "face_check_failed",
            Self::RapidSeek => "rapid_seek",
            Self::MultiTab => "multi_tab",
            Self::DevToolsOpen => "dev_tools_open",
            Self::CopyAttempt => "copy_attempt",
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// 客户端上报的行为事实，入库后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorEvent {
    pub id: String,
    pub session_id: String,
    pub behavior_type: BehaviorType,
    pub timestamp: DateTime<Utc>,
    /// 视频播放头位置（秒）
    pub video_position: Option<f64>,
    pub payload: Option<serde_json::Value>,
    pub device_fingerprint: String,
    pub ip: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyTimeStatus {
    Valid,
    Invalid,
    Partial,
}

impl StudyTimeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidTimeReason {
    IdentityVerificationFailed,
    IncompleteCourseTest,
    MultipleDeviceLogin,
    BrowsingWebInfo,
    OnlineTesting,
    WindowFocusLost,
    PageHidden,
    InteractionTimeout,
    IdleTimeout,
    NoActivityDetected,
    NetworkDisconnected,
    SuspiciousBehavior,
    DailyLimitExceeded,
}

impl InvalidTimeReason {
    /// 身份核验失败与课程考试未完成会作废整门课程的学时，
    /// 其余原因只影响所在时段
    pub fn affects_whole_course(self) -> bool {
        matches!(
            self,
            Self::IdentityVerificationFailed | Self::IncompleteCourseTest
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdentityVerificationFailed => "identity_verification_failed",
            Self::IncompleteCourseTest => "incomplete_course_test",
            Self::MultipleDeviceLogin => "multiple_device_login",
            Self::BrowsingWebInfo => "browsing_web_info",
            Self::OnlineTesting => "online_testing",
            Self::WindowFocusLost => "window_focus_lost",
            Self::PageHidden => "page_hidden",
            Self::InteractionTimeout => "interaction_timeout",
            Self::IdleTimeout => "idle_timeout",
            Self::NoActivityDetected => "no_activity_detected",
            Self::NetworkDisconnected => "network_disconnected",
            Self::SuspiciousBehavior => "suspicious_behavior",
            Self::DailyLimitExceeded => "daily_limit_exceeded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    SegmentInvalidated,
    DetectorSignal,
    DailyCapTrim,
    ReviewAction,
    Reclassification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceEntry {
    pub kind: EvidenceKind,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

/// 分类产出的持久化单元，按 (user, session, day) 聚合
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveStudyRecord {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub course_id: String,
    pub lesson_id: String,
    pub study_date: NaiveDate,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_secs: f64,
    pub effective_secs: f64,
    pub invalid_secs: f64,
    pub status: StudyTimeStatus,
    pub invalid_reason: Option<InvalidTimeReason>,
    pub quality_score: f64,
    pub focus_score: f64,
    pub interaction_score: f64,
    pub continuity_score: f64,
    pub evidence: Vec<EvidenceEntry>,
    pub reviewed_by: Option<String>,
    pub review_comment: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub include_in_daily_total: bool,
    pub student_notified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EffectiveStudyRecord {
    /// 有效 + 无效 == 总时长，两者均非负
    pub fn durations_consistent(&self) -> bool {
        self.effective_secs >= 0.0
            && self.invalid_secs >= 0.0
            && (self.effective_secs + self.invalid_secs - self.total_secs).abs()
                < DURATION_EPSILON_SECS
    }

    /// Review sign-off. Returns the updated record; the caller persists it.
    pub fn mark_as_reviewed(mut self, reviewer: &str, comment: &str, now: DateTime<Utc>) -> Self {
        self.reviewed_by = Some(reviewer.to_string());
        self.review_comment = Some(comment.to_string());
        self.reviewed_at = Some(now);
        self.evidence.push(EvidenceEntry {
            kind: EvidenceKind::ReviewAction,
            detail: format!("reviewed by {reviewer}"),
            recorded_at: now,
        });
        self.updated_at = now;
        self
    }

    /// Corrective reclassification to fully valid.
    pub fn mark_as_valid(mut self, actor: &str, note: &str, now: DateTime<Utc>) -> Self {
        self.status = StudyTimeStatus::Valid;
        self.invalid_reason = None;
        self.effective_secs = self.total_secs;
        self.invalid_secs = 0.0;
        self.include_in_daily_total = true;
        self.evidence.push(EvidenceEntry {
            kind: EvidenceKind::Reclassification,
            detail: format!("marked valid by {actor}: {note}"),
            recorded_at: now,
        });
        self.updated_at = now;
        self
    }

    /// Corrective reclassification to fully invalid.
    pub fn mark_as_invalid(
        mut self,
        reason: InvalidTimeReason,
        actor: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Self {
        self.status = StudyTimeStatus::Invalid;
        self.invalid_reason = Some(reason);
        self.effective_secs = 0.0;
        self.invalid_secs = self.total_secs;
        self.include_in_daily_total = false;
        self.evidence.push(EvidenceEntry {
            kind: EvidenceKind::Reclassification,
            detail: format!("marked invalid ({}) by {actor}: {note}", reason.as_str()),
            recorded_at: now,
        });
        self.updated_at = now;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    MultipleDevice,
    RapidProgress,
    WindowSwitch,
    IdleTimeout,
    FaceDetectFail,
    NetworkAnomaly,
}

impl AnomalyType {
    pub fn default_severity(self) -> AnomalySeverity {
        match self {
            Self::MultipleDevice => AnomalySeverity::Critical,
            Self::RapidProgress => AnomalySeverity::High,
            Self::WindowSwitch => AnomalySeverity::Medium,
            Self::IdleTimeout => AnomalySeverity::Low,
            Self::FaceDetectFail => AnomalySeverity::High,
            Self::NetworkAnomaly => AnomalySeverity::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MultipleDevice => "multiple_device",
            Self::RapidProgress => "rapid_progress",
            Self::WindowSwitch => "window_switch",
            Self::IdleTimeout => "idle_timeout",
            Self::FaceDetectFail => "face_detect_fail",
            Self::NetworkAnomaly => "network_anomaly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnomalySeverity {
    /// 风险权重，用于排序与统计
    pub fn weight(self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 3,
            Self::High => 7,
            Self::Critical => 10,
        }
    }

    /// 处理时限（小时）
    pub fn sla_hours(self) -> u32 {
        match self {
            Self::Low => 72,
            Self::Medium => 48,
            Self::High => 24,
            Self::Critical => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyStatus {
    Detected,
    Investigating,
    Resolved,
    Ignored,
}

impl AnomalyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnAnomaly {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub anomaly_type: AnomalyType,
    pub description: String,
    pub data: serde_json::Value,
    pub severity: AnomalySeverity,
    pub status: AnomalyStatus,
    pub auto_detected: bool,
    pub evidence: Vec<EvidenceEntry>,
    pub resolution: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
