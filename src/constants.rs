/// 时长不变式允许的浮点误差（秒）
pub const DURATION_EPSILON_SECS: f64 = 1e-6;

/// 进度历史日志保留条数，超出淘汰最旧记录
pub const PROGRESS_HISTORY_LIMIT: usize = 100;
