use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub log_retention_days: usize,
    pub sled_path: String,
    pub worker: WorkerConfig,
    pub engine: EngineEnvConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_auto_resolve: bool,
    pub enable_archive: bool,
}

/// 引擎阈值的环境变量入口，全部外部可配，无硬编码阈值
#[derive(Debug, Clone)]
pub struct EngineEnvConfig {
    pub idle_timeout_secs: f64,
    pub interaction_timeout_secs: f64,
    pub daily_ceiling_secs: f64,
    pub rapid_progress_ratio: f64,
    pub window_switch_count: u32,
    pub idle_gap_secs: f64,
    pub face_fail_count: u32,
    pub network_disconnect_count: u32,
    pub score_weight_focus: f64,
    pub score_weight_interaction: f64,
    pub score_weight_continuity: f64,
    pub score_weight_effective_ratio: f64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            log_retention_days: env_or_parse("LOG_RETENTION_DAYS", 30_usize),
            sled_path: env_or("SLED_PATH", "./data/studytime.sled"),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_auto_resolve: env_or_bool("ENABLE_AUTO_RESOLVE_WORKER", true),
                enable_archive: env_or_bool("ENABLE_ARCHIVE_WORKER", true),
            },
            engine: EngineEnvConfig {
                idle_timeout_secs: env_or_parse("IDLE_TIMEOUT_SECS", 300.0_f64),
                interaction_timeout_secs: env_or_parse("INTERACTION_TIMEOUT_SECS", 180.0_f64),
                daily_ceiling_secs: env_or_parse("DAILY_CEILING_SECS", 28_800.0_f64),
                rapid_progress_ratio: env_or_parse("RAPID_PROGRESS_RATIO", 3.0_f64),
                window_switch_count: env_or_parse("WINDOW_SWITCH_COUNT", 25_u32),
                idle_gap_secs: env_or_parse("IDLE_GAP_SECS", 700.0_f64),
                face_fail_count: env_or_parse("FACE_FAIL_COUNT", 4_u32),
                network_disconnect_count: env_or_parse("NETWORK_DISCONNECT_COUNT", 6_u32),
                score_weight_focus: env_or_parse("SCORE_WEIGHT_FOCUS", 0.30_f64),
                score_weight_interaction: env_or_parse("SCORE_WEIGHT_INTERACTION", 0.20_f64),
                score_weight_continuity: env_or_parse("SCORE_WEIGHT_CONTINUITY", 0.20_f64),
                score_weight_effective_ratio: env_or_parse("SCORE_WEIGHT_EFFECTIVE_RATIO", 0.30_f64),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
