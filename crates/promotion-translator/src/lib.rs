//! 促销转换引擎
//!
//! 位于商业平台的购物车/客户/订单生命周期与促销引擎之间：
//! - 通过属性映射 DSL 将商业平台数据投影为促销引擎的会话/档案属性
//! - 调用促销引擎
//! - 将引擎返回的效果（折扣、赠品、积分、推荐码、通知）转换为有序的更新动作

pub mod actions;
pub mod aggregator;
pub mod commerce;
pub mod effects;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod money;
pub mod processor;
pub mod projection;
pub mod settings;
pub mod sku;
pub mod translator;

pub use actions::UpdateAction;
pub use aggregator::{CustomFieldsAggregator, MetadataTarget};
pub use effects::Effect;
pub use engine::{
    CurrencyRouter, EngineCredentials, EngineError, EngineResponse, PromotionEngine, RecordedEngine,
};
pub use error::{Result, TranslationError};
pub use mapping::{AttributeEvaluator, Diagnostic, MappingParser, MappingRule, MappingRuleSet};
pub use money::{Money, MoneyError, Precision, RoundingMode};
pub use processor::{ErrorEntry, ExtensionProcessor, ExtensionResponse, ProcessOutcome};
pub use projection::{AttributeProjector, CustomerProfile, CustomerSession};
pub use settings::TranslatorSettings;
pub use sku::{IdentityPolicy, SkuIdentity, SkuResolver};
pub use translator::{CartTranslation, EffectTranslator};
