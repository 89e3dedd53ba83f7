use serde::{Deserialize, Serialize};

/// 分段与有效性判定阈值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierConfig {
    /// 单次空闲超过该阈值判为 idle_timeout（秒）
    pub idle_timeout_secs: f64,
    /// 相邻交互事件间隔超过该阈值判为 interaction_timeout（秒）
    pub interaction_timeout_secs: f64,
    /// 失焦后重新聚焦短于该时长时，整个失焦窗口仍按失焦处理（秒）
    #[serde(default = "default_min_focus_regain_secs")]
    pub min_focus_regain_secs: f64,
}

fn default_min_focus_regain_secs() -> f64 {
    2.0
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300.0,
            interaction_timeout_secs: 180.0,
            min_focus_regain_secs: 2.0,
        }
    }
}

/// 各异常检测器的触发阈值。默认值与监管侧约定一致，均可外部覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorConfig {
    /// 同一用户并发活跃设备数达到该值即告警
    pub multi_device_count: u32,
    /// 进度/墙钟时间比超过该倍数即告警
    pub rapid_progress_ratio: f64,
    /// 会话内失焦事件数超过该值即告警
    pub window_switch_count: u32,
    /// 单次空闲间隔超过该秒数即告警
    pub idle_gap_secs: f64,
    /// 连续活体检测失败次数超过该值即告警
    pub face_fail_count: u32,
    /// 会话内断网次数超过该值即告警
    pub network_disconnect_count: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            multi_device_count: 2,
            rapid_progress_ratio: 3.0,
            window_switch_count: 25,
            idle_gap_secs: 700.0,
            face_fail_count: 4,
            network_disconnect_count: 6,
        }
    }
}

/// qualityScore 的加权项，允许监管调参，权重和应接近 1.0
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringWeights {
    pub focus: f64,
    pub interaction: f64,
    pub continuity: f64,
    pub effective_ratio: f64,
    /// interactionScore 归一化基准：每分钟有效时长的交互次数
    #[serde(default = "default_interactions_per_minute")]
    pub interactions_per_minute: f64,
}

fn default_interactions_per_minute() -> f64 {
    2.0
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            focus: 0.30,
            interaction: 0.20,
            continuity: 0.20,
            effective_ratio: 0.30,
            interactions_per_minute: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCapConfig {
    /// 每日计入学时上限（秒）
    pub ceiling_secs: f64,
}

impl Default for DailyCapConfig {
    fn default() -> Self {
        Self {
            ceiling_secs: 28_800.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub detectors: DetectorConfig,
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub daily_cap: DailyCapConfig,
}

impl EngineConfig {
    pub fn from_env(env_config: &crate::config::EngineEnvConfig) -> Self {
        let mut config = Self::default();
        config.classifier.idle_timeout_secs = env_config.idle_timeout_secs;
        config.classifier.interaction_timeout_secs = env_config.interaction_timeout_secs;
        config.daily_cap.ceiling_secs = env_config.daily_ceiling_secs;
        config.detectors.rapid_progress_ratio = env_config.rapid_progress_ratio;
        config.detectors.window_switch_count = env_config.window_switch_count;
        config.detectors.idle_gap_secs = env_config.idle_gap_secs;
        config.detectors.face_fail_count = env_config.face_fail_count;
        config.detectors.network_disconnect_count = env_config.network_disconnect_count;
        config.scoring.focus = env_config.score_weight_focus;
        config.scoring.interaction = env_config.score_weight_interaction;
        config.scoring.continuity = env_config.score_weight_continuity;
        config.scoring.effective_ratio = env_config.score_weight_effective_ratio;
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.classifier.idle_timeout_secs <= 0.0 {
            return Err("classifier.idle_timeout_secs must be > 0".to_string());
        }
        if self.classifier.interaction_timeout_secs <= 0.0 {
            return Err("classifier.interaction_timeout_secs must be > 0".to_string());
        }
        if self.classifier.min_focus_regain_secs < 0.0 {
            return Err("classifier.min_focus_regain_secs must be >= 0".to_string());
        }

        if self.detectors.multi_device_count < 2 {
            return Err("detectors.multi_device_count must be >= 2".to_string());
        }
        if self.detectors.rapid_progress_ratio <= 1.0 {
            return Err("detectors.rapid_progress_ratio must be > 1.0".to_string());
        }
        if self.detectors.window_switch_count == 0 {
            return Err("detectors.window_switch_count must be > 0".to_string());
        }
        if self.detectors.idle_gap_secs <= 0.0 {
            return Err("detectors.idle_gap_secs must be > 0".to_string());
        }
        if self.detectors.face_fail_count == 0 {
            return Err("detectors.face_fail_count must be > 0".to_string());
        }
        if self.detectors.network_disconnect_count == 0 {
            return Err("detectors.network_disconnect_count must be > 0".to_string());
        }

        if self.scoring.focus < 0.0
            || self.scoring.interaction < 0.0
            || self.scoring.continuity < 0.0
            || self.scoring.effective_ratio < 0.0
        {
            return Err("scoring weights must be >= 0".to_string());
        }
        let weight_sum = self.scoring.focus
            + self.scoring.interaction
            + self.scoring.continuity
            + self.scoring.effective_ratio;
        if weight_sum <= 0.0 {
            return Err("scoring weight sum must be > 0".to_string());
        }
        if (weight_sum - 1.0).abs() > 0.05 {
            return Err(format!(
                "scoring weights should sum to ~1.0 (got {weight_sum:.3})"
            ));
        }
        if self.scoring.interactions_per_minute <= 0.0 {
            return Err("scoring.interactions_per_minute must be > 0".to_string());
        }

        if self.daily_cap.ceiling_secs <= 0.0 {
            return Err("daily_cap.ceiling_secs must be > 0".to_string());
        }

        Ok(())
    }
}
