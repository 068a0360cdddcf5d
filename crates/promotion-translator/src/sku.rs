//! SKU 身份解析
//!
//! 商业平台的行项目身份（商品 ID、变体 ID、SKU）与促销引擎的单一 SKU 字符串之间的双向转换。

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use crate::error::{Result, TranslationError};

/// 身份策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityPolicy {
    /// 直接使用变体 SKU
    VariantSku,
    /// 只使用商品 ID
    ProductId,
    /// 商品 ID 加分隔符加变体 ID
    ProductIdWithVariantId,
}

impl FromStr for IdentityPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        match normalized.strip_prefix("CTP_").unwrap_or(&normalized) {
            "VARIANT_SKU" => Ok(Self::VariantSku),
            "PRODUCT_ID" => Ok(Self::ProductId),
            "PRODUCT_ID_WITH_VARIANT_ID" => Ok(Self::ProductIdWithVariantId),
            _ => Err(format!("未知的 SKU 身份策略: {}", s)),
        }
    }
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VariantSku => "CTP_VARIANT_SKU",
            Self::ProductId => "CTP_PRODUCT_ID",
            Self::ProductIdWithVariantId => "CTP_PRODUCT_ID_WITH_VARIANT_ID",
        };
        f.write_str(name)
    }
}

/// 解析后的行项目身份，序列化后平铺进 addLineItem 动作
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum SkuIdentity {
    Sku {
        sku: String,
    },
    Product {
        #[serde(rename = "productId")]
        product_id: String,
    },
    Variant {
        #[serde(rename = "productId")]
        product_id: String,
        #[serde(rename = "variantId")]
        variant_id: u64,
    },
}

/// 行项目在商业平台上的身份字段
#[derive(Debug, Clone, Copy)]
pub struct LineItemRef<'a> {
    pub product_id: &'a str,
    pub variant_id: Option<u64>,
    pub sku: Option<&'a str>,
}

/// SKU 解析器
#[derive(Debug, Clone)]
pub struct SkuResolver {
    policy: IdentityPolicy,
    separator: char,
}

impl SkuResolver {
    pub fn new(policy: IdentityPolicy, separator: char) -> Self {
        Self { policy, separator }
    }

    pub fn policy(&self) -> IdentityPolicy {
        self.policy
    }

    /// 行项目 -> 引擎 SKU；VariantSku 策略下缺少 SKU 时返回 None
    pub fn encode(&self, item: LineItemRef<'_>) -> Option<String> {
        match self.policy {
            IdentityPolicy::VariantSku => item.sku.map(str::to_string),
            IdentityPolicy::ProductId => Some(item.product_id.to_string()),
            IdentityPolicy::ProductIdWithVariantId => Some(match item.variant_id {
                Some(variant_id) => format!("{}{}{}", item.product_id, self.separator, variant_id),
                None => item.product_id.to_string(),
            }),
        }
    }

    /// 引擎 SKU -> 行项目身份，后缀无法解析时返回错误
    pub fn try_decode(&self, sku: &str) -> Result<SkuIdentity> {
        match self.policy {
            IdentityPolicy::VariantSku => Ok(SkuIdentity::Sku {
                sku: sku.to_string(),
            }),
            IdentityPolicy::ProductId => Ok(SkuIdentity::Product {
                product_id: sku.to_string(),
            }),
            IdentityPolicy::ProductIdWithVariantId => match sku.rsplit_once(self.separator) {
                None => Ok(SkuIdentity::Product {
                    product_id: sku.to_string(),
                }),
                Some((product_id, suffix)) => {
                    let variant_id = suffix.parse::<u64>().map_err(|e| {
                        TranslationError::InvalidSkuEncoding {
                            sku: sku.to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                    Ok(SkuIdentity::Variant {
                        product_id: product_id.to_string(),
                        variant_id,
                    })
                }
            },
        }
    }

    /// 引擎 SKU -> 行项目身份；无效后缀降级为只用商品 ID
    pub fn decode(&self, sku: &str) -> SkuIdentity {
        self.try_decode(sku).unwrap_or_else(|e| {
            warn!(sku = %sku, error = %e, "SKU 变体后缀无效，降级为商品 ID");
            let product_id = sku
                .rsplit_once(self.separator)
                .map(|(product_id, _)| product_id)
                .unwrap_or(sku);
            SkuIdentity::Product {
                product_id: product_id.to_string(),
            }
        })
    }
}
