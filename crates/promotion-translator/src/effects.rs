//! 促销引擎效果模型
//!
//! 引擎返回的效果序列可能有空洞（null）和未知类型，二者都只跳过当前效果。

use promo_shared::observability::metrics;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::error::{Result, TranslationError};

/// 引擎原始效果
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEffect {
    effect_type: String,
    #[serde(default)]
    props: Value,
    #[serde(default)]
    rule_name: Option<String>,
}

/// 整车折扣
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetDiscount {
    pub name: String,
    /// 主单位折扣金额
    pub value: Decimal,
}

/// 单个行项目折扣，`position` 为会话购物车条目下标
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetDiscountPerItem {
    pub name: String,
    pub value: Decimal,
    pub position: usize,
}

/// 赠品
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AddFreeItem {
    pub sku: String,
    pub name: String,
}

/// 通知消息，原样写入购物车元数据
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub notification_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointsOperation {
    Add,
    Deduct,
}

/// 积分变动
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyPoints {
    pub name: String,
    pub program_id: i64,
    pub value: Number,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_ledger_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_integration_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodeProps {
    value: String,
    #[serde(default)]
    rejection_reason: Option<String>,
}

/// 已识别的效果
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SetDiscount(SetDiscount),
    SetDiscountPerItem(SetDiscountPerItem),
    AddFreeItem(AddFreeItem),
    LoyaltyPoints {
        operation: PointsOperation,
        points: LoyaltyPoints,
    },
    ReferralCreated {
        code: String,
    },
    AcceptReferral {
        code: String,
    },
    RejectReferral {
        code: String,
        reason: Option<String>,
    },
    AcceptCoupon {
        code: String,
    },
    RejectCoupon {
        code: String,
        reason: Option<String>,
    },
    ShowNotification(Notification),
}

impl Effect {
    /// 引擎侧的效果类型名
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetDiscount(_) => "setDiscount",
            Self::SetDiscountPerItem(_) => "setDiscountPerItem",
            Self::AddFreeItem(_) => "addFreeItem",
            Self::LoyaltyPoints {
                operation: PointsOperation::Add,
                ..
            } => "addLoyaltyPoints",
            Self::LoyaltyPoints {
                operation: PointsOperation::Deduct,
                ..
            } => "deductLoyaltyPoints",
            Self::ReferralCreated { .. } => "referralCreated",
            Self::AcceptReferral { .. } => "acceptReferral",
            Self::RejectReferral { .. } => "rejectReferral",
            Self::AcceptCoupon { .. } => "acceptCoupon",
            Self::RejectCoupon { .. } => "rejectCoupon",
            Self::ShowNotification(_) => "showNotification",
        }
    }

    /// 解析单个效果，null 返回 `Ok(None)`
    pub fn parse(raw: &Value) -> Result<Option<Effect>> {
        if raw.is_null() {
            return Ok(None);
        }

        let raw: RawEffect =
            serde_json::from_value(raw.clone()).map_err(|e| TranslationError::MalformedEffect {
                kind: "unknown".to_string(),
                reason: e.to_string(),
            })?;

        let kind = raw.effect_type.as_str();
        let effect = match kind {
            "setDiscount" => Self::SetDiscount(props(kind, raw.props)?),
            "setDiscountPerItem" => Self::SetDiscountPerItem(props(kind, raw.props)?),
            "addFreeItem" => Self::AddFreeItem(props(kind, raw.props)?),
            "addLoyaltyPoints" => Self::LoyaltyPoints {
                operation: PointsOperation::Add,
                points: props(kind, raw.props)?,
            },
            "deductLoyaltyPoints" => Self::LoyaltyPoints {
                operation: PointsOperation::Deduct,
                points: props(kind, raw.props)?,
            },
            "referralCreated" => {
                let p: CodeProps = props(kind, raw.props)?;
                Self::ReferralCreated { code: p.value }
            }
            "acceptReferral" => {
                let p: CodeProps = props(kind, raw.props)?;
                Self::AcceptReferral { code: p.value }
            }
            "rejectReferral" => {
                let p: CodeProps = props(kind, raw.props)?;
                Self::RejectReferral {
                    code: p.value,
                    reason: p.rejection_reason,
                }
            }
            "acceptCoupon" => {
                let p: CodeProps = props(kind, raw.props)?;
                Self::AcceptCoupon { code: p.value }
            }
            "rejectCoupon" => {
                let p: CodeProps = props(kind, raw.props)?;
                Self::RejectCoupon {
                    code: p.value,
                    reason: p.rejection_reason,
                }
            }
            "showNotification" => Self::ShowNotification(props(kind, raw.props)?),
            other => {
                return Err(TranslationError::UnsupportedEffectKind {
                    kind: other.to_string(),
                });
            }
        };

        if let Some(rule_name) = raw.rule_name {
            debug!(effect_kind = effect.kind(), rule_name = %rule_name, "解析效果");
        }

        Ok(Some(effect))
    }
}

fn props<T: DeserializeOwned>(kind: &str, props: Value) -> Result<T> {
    serde_json::from_value(props).map_err(|e| TranslationError::MalformedEffect {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

/// 解析效果序列，跳过空洞、未知类型和无效数据，保持原有相对顺序
pub fn parse_effects(raw: &[Value]) -> Vec<Effect> {
    let mut effects = Vec::with_capacity(raw.len());

    for (index, entry) in raw.iter().enumerate() {
        match Effect::parse(entry) {
            Ok(Some(effect)) => effects.push(effect),
            Ok(None) => {
                debug!(index, "效果序列中的空洞，跳过");
            }
            Err(e) => {
                warn!(index, error = %e, code = e.code(), "效果无法识别，跳过");
                metrics::record_effect_skipped(e.code());
            }
        }
    }

    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_set_discount() {
        let effect = Effect::parse(&json!({
            "effectType": "setDiscount",
            "ruleName": "10% off",
            "props": { "name": "10% off", "value": 2.5 }
        }))
        .unwrap()
        .unwrap();

        assert_eq!(
            effect,
            Effect::SetDiscount(SetDiscount {
                name: "10% off".to_string(),
                value: dec!(2.5),
            })
        );
        assert_eq!(effect.kind(), "setDiscount");
    }

    #[test]
    fn test_parse_loyalty_points() {
        let effect = Effect::parse(&json!({
            "effectType": "deductLoyaltyPoints",
            "props": { "name": "Redeem", "programId": 7, "value": 50, "subLedgerId": "" }
        }))
        .unwrap()
        .unwrap();

        match effect {
            Effect::LoyaltyPoints { operation, points } => {
                assert_eq!(operation, PointsOperation::Deduct);
                assert_eq!(points.program_id, 7);
                assert_eq!(points.value, Number::from(50));
                assert_eq!(points.sub_ledger_id.as_deref(), Some(""));
            }
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_parse_reject_coupon_reason() {
        let effect = Effect::parse(&json!({
            "effectType": "rejectCoupon",
            "props": { "value": "SUMMER", "rejectionReason": "CouponExpired" }
        }))
        .unwrap()
        .unwrap();

        assert_eq!(
            effect,
            Effect::RejectCoupon {
                code: "SUMMER".to_string(),
                reason: Some("CouponExpired".to_string()),
            }
        );
    }

    #[test]
    fn test_unsupported_and_malformed() {
        let err = Effect::parse(&json!({ "effectType": "triggerWebhook", "props": {} }))
            .unwrap_err();
        assert!(matches!(err, TranslationError::UnsupportedEffectKind { .. }));

        let err = Effect::parse(&json!({ "effectType": "setDiscount", "props": { "name": 1 } }))
            .unwrap_err();
        assert!(matches!(err, TranslationError::MalformedEffect { .. }));

        let err = Effect::parse(&json!("setDiscount")).unwrap_err();
        assert!(matches!(err, TranslationError::MalformedEffect { .. }));
    }

    #[test]
    fn test_parse_effects_skips_holes_and_unknown_kinds() {
        let raw = vec![
            json!({ "effectType": "acceptCoupon", "props": { "value": "A" } }),
            Value::Null,
            json!({ "effectType": "triggerWebhook", "props": {} }),
            json!({ "effectType": "showNotification",
                    "props": { "notificationType": "info", "title": "T", "body": "B" } }),
            Value::Null,
            json!({ "effectType": "referralCreated", "props": { "value": "REF-1" } }),
        ];

        let kinds: Vec<&str> = parse_effects(&raw).iter().map(Effect::kind).collect();
        assert_eq!(kinds, vec!["acceptCoupon", "showNotification", "referralCreated"]);
    }

    #[test]
    fn test_notification_serialization() {
        let notification = Notification {
            notification_type: "info".to_string(),
            title: "Free shipping".to_string(),
            body: "Spend 10 more".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&notification).unwrap(),
            json!({ "notificationType": "info", "title": "Free shipping", "body": "Spend 10 more" })
        );
    }
}
