//! 转换配置
//!
//! 在进程启动时将原始配置解析为类型化设置，之后只读。

use promo_shared::config::PromotionConfig;
use promo_shared::observability::metrics;
use tracing::{info, warn};

use crate::error::{Result, TranslationError};
use crate::mapping::{AttributeEvaluator, Diagnostic, MappingParser, MappingRuleSet};
use crate::money::RoundingMode;
use crate::sku::{IdentityPolicy, SkuResolver};

/// 商业平台自定义类型 key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTypes {
    pub line_item: String,
    pub cart: String,
    pub customer: String,
}

/// 类型化的转换设置
#[derive(Debug, Clone)]
pub struct TranslatorSettings {
    pub resolver: SkuResolver,
    pub rounding: RoundingMode,
    pub evaluator: AttributeEvaluator,
    pub discount_tax_category_id: Option<String>,
    pub pay_with_points_attribute: Option<String>,
    pub cart_rules: MappingRuleSet,
    pub item_rules: MappingRuleSet,
    pub customer_rules: MappingRuleSet,
    pub metadata: MetadataTypes,
}

impl TranslatorSettings {
    /// 解析并校验配置
    ///
    /// 身份策略、舍入模式、分隔符或元数据类型无效时返回 `Configuration` 错误；
    /// 映射规则宽松编译，诊断随设置一起返回。
    pub fn from_config(config: &PromotionConfig) -> Result<(Self, Vec<Diagnostic>)> {
        let policy = config
            .sku_type
            .parse::<IdentityPolicy>()
            .map_err(TranslationError::Configuration)?;

        let rounding = config
            .rounding_mode
            .parse::<RoundingMode>()
            .map_err(TranslationError::Configuration)?;

        let mut chars = config.sku_separator.chars();
        let separator = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => {
                return Err(TranslationError::Configuration(format!(
                    "SKU 分隔符必须是单个字符: `{}`",
                    config.sku_separator
                )));
            }
        };

        let metadata = MetadataTypes {
            line_item: non_empty(
                "metadata.line_item_type_key",
                &config.metadata.line_item_type_key,
            )?,
            cart: non_empty("metadata.cart_type_key", &config.metadata.cart_type_key)?,
            customer: non_empty(
                "metadata.customer_type_key",
                &config.metadata.customer_type_key,
            )?,
        };

        let language = config.language.trim();
        if language.is_empty() {
            return Err(TranslationError::Configuration("language 不能为空".to_string()));
        }

        let parser = MappingParser::new();
        let mut diagnostics = Vec::new();
        let mut compile = |name: &str, input: &str| {
            let (rules, found) = parser.compile(input);
            if !found.is_empty() {
                warn!(mapping = name, dropped = found.len(), "部分映射规则被丢弃");
            }
            diagnostics.extend(found);
            rules
        };

        let cart_rules = compile("cart", &config.cart_attribute_mapping);
        let item_rules = compile("cart_item", &config.cart_item_attribute_mapping);
        let customer_rules = compile("customer", &config.customer_attribute_mapping);

        if !diagnostics.is_empty() {
            metrics::record_mapping_rules_dropped(diagnostics.len());
        }

        let settings = Self {
            resolver: SkuResolver::new(policy, separator),
            rounding,
            evaluator: AttributeEvaluator::new(language),
            discount_tax_category_id: optional(&config.discount_tax_category_id),
            pay_with_points_attribute: optional(&config.pay_with_points_attribute_name),
            cart_rules,
            item_rules,
            customer_rules,
            metadata,
        };

        info!(
            sku_type = %policy,
            rounding = %rounding,
            cart_rules = settings.cart_rules.len(),
            item_rules = settings.item_rules.len(),
            customer_rules = settings.customer_rules.len(),
            "转换配置已加载"
        );

        Ok((settings, diagnostics))
    }
}

fn non_empty(key: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TranslationError::Configuration(format!("{} 不能为空", key)));
    }
    Ok(value.to_string())
}

/// 空字符串视为未配置
fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
