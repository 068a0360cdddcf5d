//! 促销引擎接口与币种路由
//!
//! 引擎的 HTTP 客户端由宿主进程提供，这里只定义接口。每次调用都绑定到按币种解析出的凭证。

use std::collections::BTreeMap;

use async_trait::async_trait;
use promo_shared::config::EngineConfig;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::{Result, TranslationError};
use crate::projection::{CustomerProfile, CustomerSession};

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("传输失败: {0}")]
    Transport(String),

    #[error("调用超时")]
    Timeout,

    #[error("鉴权失败: {0}")]
    Unauthorized(String),

    #[error("请求被拒绝: {0}")]
    Rejected(String),
}

impl EngineError {
    /// 仅瞬时故障可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }
}

/// 单个币种的引擎凭证
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCredentials {
    /// 凭证实际所属的币种（回退时与请求币种不同）
    pub currency: String,
    pub api_key: String,
    pub base_path: String,
}

/// 引擎响应
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineResponse {
    /// 原始效果序列，可能含 null
    #[serde(default)]
    pub effects: Vec<Value>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromotionEngine: Send + Sync {
    async fn update_session(
        &self,
        credentials: &EngineCredentials,
        session_id: &str,
        session: &CustomerSession,
    ) -> std::result::Result<EngineResponse, EngineError>;

    async fn update_profile(
        &self,
        credentials: &EngineCredentials,
        profile_id: &str,
        profile: &CustomerProfile,
    ) -> std::result::Result<EngineResponse, EngineError>;
}

/// 币种 -> 凭证路由
#[derive(Debug, Clone, Default)]
pub struct CurrencyRouter {
    credentials: BTreeMap<String, EngineCredentials>,
    fallback: Option<String>,
}

impl CurrencyRouter {
    pub fn from_config(config: &EngineConfig) -> Self {
        let credentials = config
            .credentials
            .iter()
            .map(|(currency, creds)| {
                (
                    currency.clone(),
                    EngineCredentials {
                        currency: currency.clone(),
                        api_key: creds.api_key.clone(),
                        base_path: creds.base_path.clone(),
                    },
                )
            })
            .collect();

        Self {
            credentials,
            fallback: config.fallback_currency.clone(),
        }
    }

    /// 直接凭证优先，其次回退币种的凭证
    pub fn resolve(&self, currency: &str) -> Result<&EngineCredentials> {
        let currency = currency.to_uppercase();
        self.credentials
            .get(&currency)
            .or_else(|| {
                self.fallback
                    .as_ref()
                    .and_then(|fallback| self.credentials.get(fallback))
            })
            .ok_or(TranslationError::CurrencyRouting { currency })
    }

    /// 所有配置了凭证的币种，按币种代码排序
    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.credentials.keys().map(String::as_str)
    }
}

/// 按币种回放录制的引擎响应，未录制的币种返回空效果
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordedEngine {
    #[serde(default)]
    pub session: BTreeMap<String, EngineResponse>,
    #[serde(default)]
    pub profile: BTreeMap<String, EngineResponse>,
}

#[async_trait]
impl PromotionEngine for RecordedEngine {
    async fn update_session(
        &self,
        credentials: &EngineCredentials,
        _session_id: &str,
        _session: &CustomerSession,
    ) -> std::result::Result<EngineResponse, EngineError> {
        Ok(self
            .session
            .get(&credentials.currency)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_profile(
        &self,
        credentials: &EngineCredentials,
        _profile_id: &str,
        _profile: &CustomerProfile,
    ) -> std::result::Result<EngineResponse, EngineError> {
        Ok(self
            .profile
            .get(&credentials.currency)
            .cloned()
            .unwrap_or_default())
    }
}
