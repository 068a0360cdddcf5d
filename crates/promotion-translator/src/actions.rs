//! 商业平台更新动作
//!
//! 序列化格式与商业平台的 update action 契约一致：`action` 判别字段加驼峰字段名，
//! 可选字段缺失时不输出。

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::money::CentPrecisionMoney;
use crate::sku::SkuIdentity;

/// 自定义类型引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeKey {
    pub key: String,
}

impl TypeKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// 资源引用（按 ID）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifier {
    pub id: String,
    pub type_id: String,
}

/// 行项目上的自定义字段
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomFieldsDraft {
    #[serde(rename = "type")]
    pub type_key: TypeKey,
    pub fields: Map<String, Value>,
}

impl CustomFieldsDraft {
    pub fn new(type_key: &str) -> Self {
        Self {
            type_key: TypeKey::new(type_key),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum UpdateAction {
    AddCustomLineItem {
        /// 语言 -> 名称
        name: BTreeMap<String, String>,
        quantity: u64,
        money: CentPrecisionMoney,
        slug: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tax_category: Option<ResourceIdentifier>,
        #[serde(skip_serializing_if = "Option::is_none")]
        custom: Option<CustomFieldsDraft>,
    },
    RemoveCustomLineItem {
        custom_line_item_id: String,
    },
    AddLineItem {
        #[serde(flatten)]
        identity: SkuIdentity,
        quantity: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        custom: Option<CustomFieldsDraft>,
    },
    RemoveLineItem {
        line_item_id: String,
    },
    /// 不带 value 表示删除该字段
    SetCustomField {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    SetCustomType {
        #[serde(rename = "type")]
        type_key: TypeKey,
        fields: Map<String, Value>,
    },
}

impl UpdateAction {
    /// 动作判别名
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddCustomLineItem { .. } => "addCustomLineItem",
            Self::RemoveCustomLineItem { .. } => "removeCustomLineItem",
            Self::AddLineItem { .. } => "addLineItem",
            Self::RemoveLineItem { .. } => "removeLineItem",
            Self::SetCustomField { .. } => "setCustomField",
            Self::SetCustomType { .. } => "setCustomType",
        }
    }
}
