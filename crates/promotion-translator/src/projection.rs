//! 属性投影
//!
//! 将商业平台的购物车、客户、订单投影为促销引擎的会话和档案数据。

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::aggregator::{PAY_WITH_POINTS_FIELD, REFERRAL_CODE_FIELD};
use crate::commerce::{Cart, LineItem, Order};
use crate::settings::TranslatorSettings;
use crate::sku::LineItemRef;
use crate::translator::COUPON_CODE_FIELD;

pub const SESSION_OPEN: &str = "open";
pub const SESSION_CLOSED: &str = "closed";

/// 会话中的购物车条目
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCartItem {
    pub name: String,
    pub sku: String,
    pub quantity: u64,
    /// 单价（主单位）
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

/// 促销引擎会话
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSession {
    pub profile_id: String,
    pub state: String,
    pub coupon_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
    pub cart_items: Vec<SessionCartItem>,
    pub attributes: Map<String, Value>,
}

/// 促销引擎客户档案
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerProfile {
    pub attributes: Map<String, Value>,
}

/// 属性投影器
pub struct AttributeProjector<'a> {
    settings: &'a TranslatorSettings,
}

impl<'a> AttributeProjector<'a> {
    pub fn new(settings: &'a TranslatorSettings) -> Self {
        Self { settings }
    }

    /// 购物车 -> 开放会话
    pub fn cart_session(&self, cart: &Cart) -> CustomerSession {
        let evaluator = &self.settings.evaluator;
        let mut attributes = evaluator.evaluate(&self.settings.cart_rules, &cart.custom_tree());

        if let Some(name) = &self.settings.pay_with_points_attribute {
            let flag = cart
                .custom_field(PAY_WITH_POINTS_FIELD)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            attributes.insert(name.clone(), Value::Bool(flag));
        }

        let coupon_codes = cart
            .custom_field(COUPON_CODE_FIELD)
            .and_then(Value::as_str)
            .filter(|code| !code.is_empty())
            .map(|code| vec![code.to_string()])
            .unwrap_or_default();

        let referral_code = cart
            .custom_field(REFERRAL_CODE_FIELD)
            .and_then(Value::as_str)
            .filter(|code| !code.is_empty())
            .map(str::to_string);

        CustomerSession {
            profile_id: profile_id(cart.customer_id.as_deref(), cart.anonymous_id.as_deref()),
            state: SESSION_OPEN.to_string(),
            coupon_codes,
            referral_code,
            cart_items: self.cart_items(&cart.line_items),
            attributes,
        }
    }

    /// 订单 -> 关闭的会话
    pub fn closed_session(&self, order: &Order) -> CustomerSession {
        CustomerSession {
            profile_id: profile_id(order.customer_id.as_deref(), order.anonymous_id.as_deref()),
            state: SESSION_CLOSED.to_string(),
            coupon_codes: Vec::new(),
            referral_code: None,
            cart_items: self.cart_items(&order.line_items),
            attributes: Map::new(),
        }
    }

    /// 原始客户资源 -> 档案
    pub fn customer_profile(&self, customer: &Value) -> CustomerProfile {
        CustomerProfile {
            attributes: self
                .settings
                .evaluator
                .evaluate(&self.settings.customer_rules, customer),
        }
    }

    /// 促销赠品不计入会话；无法编码身份的条目跳过
    fn cart_items(&self, line_items: &[LineItem]) -> Vec<SessionCartItem> {
        let language = self.settings.evaluator.language();

        line_items
            .iter()
            .filter(|item| !item.is_promotion_free_item())
            .filter_map(|item| {
                let identity = LineItemRef {
                    product_id: &item.product_id,
                    variant_id: item.variant.id,
                    sku: item.variant.sku.as_deref(),
                };
                let Some(sku) = self.settings.resolver.encode(identity) else {
                    warn!(
                        line_item_id = %item.id,
                        policy = %self.settings.resolver.policy(),
                        "行项目无法编码为 SKU，已从会话中省略"
                    );
                    return None;
                };

                Some(SessionCartItem {
                    name: item.localized_name(language),
                    sku,
                    quantity: item.quantity,
                    price: item.price.value.to_money().to_decimal(),
                    attributes: self
                        .settings
                        .evaluator
                        .evaluate(&self.settings.item_rules, &item.variant.attribute_tree()),
                })
            })
            .collect()
    }
}

fn profile_id(customer_id: Option<&str>, anonymous_id: Option<&str>) -> String {
    customer_id
        .or(anonymous_id)
        .unwrap_or_default()
        .to_string()
}
