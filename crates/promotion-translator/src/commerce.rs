//! 商业平台资源视图
//!
//! 只反序列化转换所需的字段，其余字段忽略。

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::money::{Money, Precision};

/// API 扩展调用的输入事件
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInput {
    pub action: ExtensionAction,
    pub resource: ResourceEnvelope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ExtensionAction {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Cart,
    Customer,
    Order,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEnvelope {
    pub type_id: ResourceType,
    pub id: String,
    /// 资源本体，按 `type_id` 再解析
    #[serde(default)]
    pub obj: Value,
}

/// 带币种的金额（最小单位）
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedMoney {
    pub currency_code: String,
    pub cent_amount: i64,
}

impl TypedMoney {
    pub fn to_money(&self) -> Money {
        Money::of(
            Precision::Cent,
            self.currency_code.as_str(),
            Decimal::from(self.cent_amount),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomFields {
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductVariant {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl ProductVariant {
    /// 变体属性转为「属性名 -> 值」对象，供映射规则求值
    pub fn attribute_tree(&self) -> Value {
        let map: Map<String, Value> = self
            .attributes
            .iter()
            .map(|attr| (attr.name.clone(), attr.value.clone()))
            .collect();
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub value: TypedMoney,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub product_id: String,
    #[serde(default)]
    pub name: BTreeMap<String, String>,
    #[serde(default)]
    pub variant: ProductVariant,
    pub quantity: u64,
    pub price: Price,
    #[serde(default)]
    pub custom: Option<CustomFields>,
}

impl LineItem {
    /// 上一次调用添加的赠品
    pub fn is_promotion_free_item(&self) -> bool {
        self.custom
            .as_ref()
            .and_then(|c| c.fields.get(crate::translator::FREE_ITEM_FIELD))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn localized_name(&self, language: &str) -> String {
        self.name
            .get(language)
            .or_else(|| self.name.values().next())
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomLineItem {
    pub id: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub anonymous_id: Option<String>,
    pub total_price: TypedMoney,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub custom_line_items: Vec<CustomLineItem>,
    #[serde(default)]
    pub custom: Option<CustomFields>,
}

impl Cart {
    pub fn currency(&self) -> &str {
        &self.total_price.currency_code
    }

    pub fn custom_field(&self, name: &str) -> Option<&Value> {
        self.custom.as_ref().and_then(|c| c.fields.get(name))
    }

    /// 购物车自定义字段对象，供映射规则求值
    pub fn custom_tree(&self) -> Value {
        Value::Object(
            self.custom
                .as_ref()
                .map(|c| c.fields.clone())
                .unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub total_price: TypedMoney,
    #[serde(default)]
    pub cart: Option<Reference>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub anonymous_id: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

impl Order {
    /// 订单对应的会话 ID（即原购物车 ID）
    pub fn session_id(&self) -> Option<&str> {
        self.cart.as_ref().map(|c| c.id.as_str())
    }

    pub fn currency(&self) -> &str {
        &self.total_price.currency_code
    }
}
