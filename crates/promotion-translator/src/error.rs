//! 转换引擎错误类型
//!
//! 按可恢复性划分：配置错误、无效事件和引擎鉴权失败会中止整个调用，
//! 其余错误只影响单条规则、单个效果或单个币种，记录后继续处理。

use thiserror::Error;

use crate::engine::EngineError;
use crate::money::MoneyError;

#[derive(Debug, Error)]
pub enum TranslationError {
    /// 启动配置无法解析（例如未知的身份策略）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 某币种既没有凭证也没有可用的回退币种
    #[error("Invalid currency code. 币种 {currency} 未配置促销引擎凭证")]
    CurrencyRouting { currency: String },

    #[error("映射规则无效: `{rule}` - {reason}")]
    MalformedMappingRule { rule: String, reason: String },

    #[error("属性无法解析: `{rule}`")]
    UnresolvableAttribute { rule: String },

    #[error("不支持的效果类型: {kind}")]
    UnsupportedEffectKind { kind: String },

    #[error("效果数据无效: {kind} - {reason}")]
    MalformedEffect { kind: String, reason: String },

    #[error("无效的 SKU 编码: {sku} - {reason}")]
    InvalidSkuEncoding { sku: String, reason: String },

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error("促销引擎调用失败 ({currency}): {source}")]
    Engine {
        currency: String,
        #[source]
        source: EngineError,
    },

    #[error("无效的事件: {0}")]
    InvalidEvent(String),
}

pub type Result<T> = std::result::Result<T, TranslationError>;

impl TranslationError {
    /// 是否需要中止整个调用并返回 FailedValidation
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::InvalidEvent(_) => true,
            Self::Engine { source, .. } => matches!(source, EngineError::Unauthorized(_)),
            _ => false,
        }
    }

    /// 返回给商业平台的错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::CurrencyRouting { .. } => "CurrencyRoutingError",
            Self::MalformedMappingRule { .. } => "MalformedMappingRule",
            Self::UnresolvableAttribute { .. } => "UnresolvableAttribute",
            Self::UnsupportedEffectKind { .. } => "UnsupportedEffectKind",
            Self::MalformedEffect { .. } => "MalformedEffect",
            Self::InvalidSkuEncoding { .. } => "InvalidSkuEncoding",
            Self::Money(MoneyError::CurrencyMismatch { .. }) => "CurrencyMismatch",
            Self::Money(MoneyError::Overflow { .. }) => "MoneyOverflow",
            Self::Engine { .. } => "PromotionEngineError",
            Self::InvalidEvent(_) => "InvalidInput",
        }
    }
}
