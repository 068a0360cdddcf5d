//! 统一可观测性模块
//!
//! 提供 logging 与 metrics 的统一初始化。
//! 所有入口通过单一函数配置可观测性，确保一致的日志格式和指标命名。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

use crate::config::LoggingConfig;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识日志来源
    pub service_name: String,

    /// 日志级别（如 "info", "debug"）
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 是否启用 JSON 格式日志
    #[serde(default)]
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// 从应用配置中的日志段构建
    pub fn from_logging(service_name: &str, logging: &LoggingConfig) -> Self {
        Self {
            service_name: service_name.to_string(),
            log_level: logging.log_level.clone(),
            json_logs: logging.log_format.eq_ignore_ascii_case("json"),
        }
    }
}

/// 统一初始化可观测性
///
/// 初始化顺序：
/// 1. Tracing（日志）
/// 2. Metrics 描述信息（不启动 exporter，由宿主进程决定是否导出）
///
/// # Example
///
/// ```ignore
/// use promo_shared::observability::{init, ObservabilityConfig};
///
/// let config = ObservabilityConfig::from_logging("promo-replay", &app_config.logging);
/// init(&config)?;
/// ```
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    tracing::init(config)?;
    metrics::describe();

    info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Observability initialized"
    );

    Ok(())
}
