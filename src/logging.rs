use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    /// 按天滚动的日志文件保留份数
    pub retention_days: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
            retention_days: 30,
        }
    }
}

/// 初始化全局订阅器：stdout 层始终开启，按天滚动的 JSON 文件层
/// 由配置开关控制。重复调用无害（测试环境下常见）。
pub fn init_tracing(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let file_layer = config.enable_file_logs.then(|| {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("studytime-backend")
            .filename_suffix("log")
            .max_log_files(config.retention_days)
            .build(&config.log_dir)
            .expect("Failed to create rolling file appender");
        fmt::layer().with_writer(appender).with_ansi(false).json()
    });

    let result = Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init();

    // 全局 subscriber 已设置时 try_init 报错，属正常情况；
    // 首次初始化即失败说明配置有误，应立即终止。
    if let Err(e) = result {
        if !e.to_string().contains("already been set") {
            panic!("Failed to initialize tracing: {e}");
        }
    }
}
