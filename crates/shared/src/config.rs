//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。
//! 这里只保存原始取值，字段语义（身份策略、舍入模式等）由转换层在启动时解析校验。

use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, SharedError};

/// 单个币种的促销引擎凭证
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EngineCredentialsConfig {
    pub api_key: String,
    pub base_path: String,
}

/// 促销引擎调用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 币种 -> 凭证；键不区分大小写，加载后统一转为大写
    pub credentials: BTreeMap<String, EngineCredentialsConfig>,
    /// 某币种未配置凭证时使用的回退币种
    pub fallback_currency: Option<String>,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            credentials: BTreeMap::new(),
            fallback_currency: None,
            max_retries: 2,
            initial_retry_delay_ms: 200,
            max_retry_delay_ms: 2_000,
        }
    }
}

/// 商业平台自定义类型 key
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataTypeConfig {
    pub line_item_type_key: String,
    pub cart_type_key: String,
    pub customer_type_key: String,
}

impl Default for MetadataTypeConfig {
    fn default() -> Self {
        Self {
            line_item_type_key: "talon_one_line_item_metadata".to_string(),
            cart_type_key: "talon_one_cart_metadata".to_string(),
            customer_type_key: "talon_one_customer_metadata".to_string(),
        }
    }
}

/// 促销转换配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    /// 身份策略：CTP_VARIANT_SKU / CTP_PRODUCT_ID / CTP_PRODUCT_ID_WITH_VARIANT_ID
    pub sku_type: String,
    /// 商品 ID 与变体 ID 之间的分隔符，必须是单个字符
    pub sku_separator: String,
    /// 舍入模式：ROUND_HALF_EVEN / ROUND_HALF_UP / ROUND_HALF_DOWN
    pub rounding_mode: String,
    /// 本地化字段的默认语言
    pub language: String,
    pub discount_tax_category_id: Option<String>,
    pub pay_with_points_attribute_name: Option<String>,
    pub cart_attribute_mapping: String,
    pub cart_item_attribute_mapping: String,
    pub customer_attribute_mapping: String,
    pub metadata: MetadataTypeConfig,
    pub engine: EngineConfig,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            sku_type: "CTP_VARIANT_SKU".to_string(),
            sku_separator: "@".to_string(),
            rounding_mode: "ROUND_HALF_EVEN".to_string(),
            language: "en".to_string(),
            discount_tax_category_id: None,
            pay_with_points_attribute_name: None,
            cart_attribute_mapping: String::new(),
            cart_item_attribute_mapping: String::new(),
            customer_attribute_mapping: String::new(),
            metadata: MetadataTypeConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub promotion: PromotionConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. .env 文件（若存在）
    /// 2. config/default.toml（默认配置）
    /// 3. config/{environment}.toml（环境特定配置）
    /// 4. config/{service_name}.toml（服务特定配置）
    /// 5. 环境变量（PROMO 前缀，双下划线分隔层级，如
    ///    PROMO_PROMOTION__SKU_TYPE -> promotion.sku_type）
    ///
    /// 加载后币种代码统一为大写，并校验促销引擎凭证。
    pub fn load(service_name: &str) -> Result<Self> {
        // .env 不存在是正常情况
        let _ = dotenvy::dotenv();

        let env = std::env::var("PROMO_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("PROMO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.promotion.engine.normalize_currencies();
        config.promotion.engine.validate()?;

        Ok(config)
    }
}

impl EngineConfig {
    /// 币种代码统一为大写（环境变量来源的键会被 config crate 转为小写）
    pub fn normalize_currencies(&mut self) {
        let credentials = std::mem::take(&mut self.credentials);
        self.credentials = credentials
            .into_iter()
            .map(|(currency, creds)| (currency.trim().to_uppercase(), creds))
            .collect();

        self.fallback_currency = self
            .fallback_currency
            .take()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty());
    }

    /// 凭证字段不能为空，回退币种必须配置了凭证
    pub fn validate(&self) -> Result<()> {
        for (currency, creds) in &self.credentials {
            if creds.api_key.trim().is_empty() {
                return Err(SharedError::invalid_config(
                    format!("promotion.engine.credentials.{}.api_key", currency),
                    "不能为空",
                ));
            }
            if creds.base_path.trim().is_empty() {
                return Err(SharedError::invalid_config(
                    format!("promotion.engine.credentials.{}.base_path", currency),
                    "不能为空",
                ));
            }
        }

        if let Some(fallback) = &self.fallback_currency {
            if !self.credentials.contains_key(fallback) {
                return Err(SharedError::invalid_config(
                    "promotion.engine.fallback_currency",
                    format!("回退币种 {} 未配置凭证", fallback),
                ));
            }
        }

        Ok(())
    }
}
