pub const LEARN_SESSIONS: &str = "learn_sessions";
pub const BEHAVIOR_EVENTS: &str = "behavior_events";
pub const STUDY_RECORDS: &str = "study_records";
pub const ANOMALIES: &str = "anomalies";
pub const PROGRESS: &str = "progress";
pub const ARCHIVES: &str = "archives";

// Secondary index trees
pub const SESSIONS_BY_USER: &str = "sessions_by_user";
