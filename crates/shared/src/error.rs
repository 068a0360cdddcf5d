//! 统一错误处理模块
//!
//! 配置加载和校验阶段的错误，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 共享错误类型
#[derive(Debug, Error)]
pub enum SharedError {
    // ==================== 配置错误 ====================
    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    #[error("无效的配置项: {key} - {message}")]
    InvalidConfig { key: String, message: String },
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, SharedError>;

impl SharedError {
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
        }
    }
}
