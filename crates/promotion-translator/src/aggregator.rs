//! 自定义字段聚合器
//!
//! 通知、推荐码、积分和积分抵扣标记不会各自产生动作，而是累积到每个实体
//! （购物车、客户）唯一的一个 setCustomType 动作中。该动作插入在第一个
//! 贡献效果所在的位置。setCustomType 会整体替换实体的自定义字段，因此排在它之前
//! 的 setCustomField 需要并入聚合动作，否则会被覆盖。

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::actions::{TypeKey, UpdateAction};
use crate::effects::{LoyaltyPoints, Notification, PointsOperation};

// ==================== 元数据字段名 ====================

pub const PAY_WITH_POINTS_FIELD: &str = "promotion_pay_with_points";
pub const REFERRAL_CODE_FIELD: &str = "promotion_referral_code";
pub const REFERRAL_CODES_FIELD: &str = "promotion_referral_codes";
pub const NOTIFICATIONS_FIELD: &str = "promotion_notifications";
pub const LOYALTY_POINTS_FIELD: &str = "promotion_loyalty_points";

/// 聚合目标实体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataTarget {
    Cart,
    Customer,
}

#[derive(Debug, Clone, Serialize)]
struct LoyaltyPointsEntry {
    #[serde(rename = "type")]
    operation: PointsOperation,
    #[serde(flatten)]
    points: LoyaltyPoints,
}

/// 单个实体的自定义字段累加器，在一次转换调用内独占
#[derive(Debug, Clone)]
pub struct CustomFieldsAggregator {
    target: MetadataTarget,
    type_key: String,
    fields: Map<String, Value>,
    notifications: Vec<Notification>,
    loyalty_points: Vec<LoyaltyPointsEntry>,
    referral_codes: Vec<String>,
    first_position: Option<usize>,
}

impl CustomFieldsAggregator {
    pub fn new(target: MetadataTarget, type_key: impl Into<String>) -> Self {
        Self {
            target,
            type_key: type_key.into(),
            fields: Map::new(),
            notifications: Vec::new(),
            loyalty_points: Vec::new(),
            referral_codes: Vec::new(),
            first_position: None,
        }
    }

    /// 记录贡献位置，只有第一次调用生效
    pub fn at(&mut self, position: usize) -> &mut Self {
        self.first_position.get_or_insert(position);
        self
    }

    pub fn pay_with_points(&mut self, flag: bool) -> &mut Self {
        self.fields
            .insert(PAY_WITH_POINTS_FIELD.to_string(), Value::Bool(flag));
        self
    }

    pub fn referral_code(&mut self, code: &str) -> &mut Self {
        self.fields.insert(
            REFERRAL_CODE_FIELD.to_string(),
            Value::String(code.to_string()),
        );
        self
    }

    pub fn remove_referral_code(&mut self) -> &mut Self {
        self.referral_code("")
    }

    pub fn add_notification(&mut self, notification: Notification) -> &mut Self {
        self.notifications.push(notification);
        self
    }

    pub fn add_loyalty_points(
        &mut self,
        operation: PointsOperation,
        points: LoyaltyPoints,
    ) -> &mut Self {
        self.loyalty_points
            .push(LoyaltyPointsEntry { operation, points });
        self
    }

    /// 新生成的推荐码（客户实体），重复的推荐码只保留一次
    pub fn add_referral(&mut self, code: &str) -> &mut Self {
        if !self.referral_codes.iter().any(|c| c == code) {
            self.referral_codes.push(code.to_string());
        }
        self
    }

    /// 是否累积了任何字段
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.notifications.is_empty()
            && self.loyalty_points.is_empty()
            && self.referral_codes.is_empty()
    }

    /// 生成最终动作及其插入位置；没有任何字段时不产生动作
    pub fn build(self) -> Option<(usize, UpdateAction)> {
        if self.is_empty() {
            return None;
        }

        let position = self.first_position.unwrap_or(0);
        debug!(
            target_entity = ?self.target,
            type_key = %self.type_key,
            position,
            "生成自定义字段聚合动作"
        );

        let mut fields = self.fields;

        if !self.notifications.is_empty() {
            fields.insert(
                NOTIFICATIONS_FIELD.to_string(),
                encode_list(&self.notifications),
            );
        }
        if !self.loyalty_points.is_empty() {
            fields.insert(
                LOYALTY_POINTS_FIELD.to_string(),
                encode_list(&self.loyalty_points),
            );
        }
        if !self.referral_codes.is_empty() {
            let codes = self.referral_codes.into_iter().map(Value::String).collect();
            fields.insert(REFERRAL_CODES_FIELD.to_string(), Value::Array(codes));
        }

        let action = UpdateAction::SetCustomType {
            type_key: TypeKey::new(self.type_key),
            fields,
        };

        Some((position, action))
    }
}

/// 列表字段以 JSON 字符串写入元数据
fn encode_list<T: Serialize>(items: &[T]) -> Value {
    match serde_json::to_string(items) {
        Ok(encoded) => Value::String(encoded),
        Err(e) => {
            warn!(error = %e, "元数据列表序列化失败");
            Value::String("[]".to_string())
        }
    }
}

/// 将插入位置之前的 setCustomField 并入聚合动作
///
/// 带值的字段写入聚合字段，不带值的删除同名字段，聚合器自己的字段保持不变；
/// 被并入的动作从序列中移除，返回的位置随之前移。
/// 插入位置之后的 setCustomField 在 setCustomType 之后执行，保持不变。
pub fn absorb_field_updates(
    actions: &mut Vec<UpdateAction>,
    built: (usize, UpdateAction),
) -> (usize, UpdateAction) {
    let (position, type_key, mut fields) = match built {
        (position, UpdateAction::SetCustomType { type_key, fields }) => (position, type_key, fields),
        other => return other,
    };

    // 聚合器自己写入的字段在之后生效，优先级更高
    let owned: HashSet<String> = fields.keys().cloned().collect();
    let position = position.min(actions.len());
    let mut absorbed = 0;
    let mut kept = Vec::with_capacity(actions.len());

    for (index, action) in actions.drain(..).enumerate() {
        match action {
            UpdateAction::SetCustomField { name, value } if index < position => {
                if owned.contains(&name) {
                    absorbed += 1;
                    continue;
                }
                match value {
                    Some(value) => {
                        fields.insert(name, value);
                    }
                    None => {
                        fields.remove(&name);
                    }
                }
                absorbed += 1;
            }
            other => kept.push(other),
        }
    }
    *actions = kept;

    if absorbed > 0 {
        debug!(absorbed, "setCustomField 已并入 setCustomType");
    }

    (
        position - absorbed,
        UpdateAction::SetCustomType { type_key, fields },
    )
}

/// 将聚合动作按位置插入动作序列
///
/// 位置以插入前的序列为准；多个动作位置相同时保持传入顺序。
pub fn insert_at_positions(actions: &mut Vec<UpdateAction>, mut built: Vec<(usize, UpdateAction)>) {
    built.sort_by_key(|(position, _)| *position);

    for (offset, (position, action)) in built.into_iter().enumerate() {
        let index = (position + offset).min(actions.len());
        actions.insert(index, action);
    }
}
