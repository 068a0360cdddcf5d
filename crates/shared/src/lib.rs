//! 共享库
//!
//! 包含转换服务与各适配层共用的配置加载、错误类型、重试策略和可观测性初始化代码。

pub mod config;
pub mod error;
pub mod observability;
pub mod retry;
