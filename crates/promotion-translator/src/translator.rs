//! 效果转换器
//!
//! 按顺序遍历引擎效果，为每个已识别的效果立即产出更新动作；
//! 跨效果的字段（通知、推荐码、积分、积分抵扣）交给聚合器，最后按首个贡献位置插入。

use std::collections::{BTreeMap, HashMap, HashSet};

use promo_shared::observability::metrics;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::actions::{CustomFieldsDraft, ResourceIdentifier, UpdateAction};
use crate::aggregator::{
    CustomFieldsAggregator, MetadataTarget, absorb_field_updates, insert_at_positions,
};
use crate::commerce::Cart;
use crate::effects::{AddFreeItem, Effect, SetDiscount, SetDiscountPerItem};
use crate::error::{Result, TranslationError};
use crate::money::{Money, Precision};
use crate::projection::CustomerSession;
use crate::settings::TranslatorSettings;
use crate::sku::SkuIdentity;

// ==================== 自定义字段名 ====================

pub const PROMOTION_NAME_FIELD: &str = "promotion_name";
pub const LINE_ITEM_SKU_FIELD: &str = "promotion_line_item_sku";
pub const FREE_ITEM_FIELD: &str = "promotion_free_item";
pub const COUPON_CODE_FIELD: &str = "promotion_coupon_code";

/// 促销自定义行项目的 slug 前缀
pub const PROMOTION_SLUG_PREFIX: &str = "promotion-";

/// slug 主体的最大长度，留出前缀、条目位置和去重后缀的空间
const MAX_SLUG_BODY_LEN: usize = 200;

/// 购物车事件的转换结果
#[derive(Debug)]
pub struct CartTranslation {
    /// 购物车更新动作，有序
    pub actions: Vec<UpdateAction>,
    /// 客户实体的聚合器，由调用方继续累积其他币种的推荐码后生成动作
    pub customer: CustomFieldsAggregator,
}

/// 效果转换器
pub struct EffectTranslator<'a> {
    settings: &'a TranslatorSettings,
}

impl<'a> EffectTranslator<'a> {
    pub fn new(settings: &'a TranslatorSettings) -> Self {
        Self { settings }
    }

    /// 新的客户聚合器
    pub fn customer_aggregator(&self) -> CustomFieldsAggregator {
        CustomFieldsAggregator::new(MetadataTarget::Customer, &self.settings.metadata.customer)
    }

    /// 将会话效果转换为购物车动作
    pub fn translate_cart(
        &self,
        cart: &Cart,
        session: &CustomerSession,
        effects: &[Effect],
    ) -> CartTranslation {
        let mut actions = self.removal_actions(cart);
        let mut cart_fields =
            CustomFieldsAggregator::new(MetadataTarget::Cart, &self.settings.metadata.cart);
        let mut customer = self.customer_aggregator();

        if self.settings.pay_with_points_attribute.is_some() {
            let flag = cart
                .custom_field(crate::aggregator::PAY_WITH_POINTS_FIELD)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            cart_fields.at(actions.len()).pay_with_points(flag);
        }

        // 赠品身份 -> 动作下标，用于合并数量
        let mut free_items: HashMap<SkuIdentity, usize> = HashMap::new();
        let mut slugs = SlugRegistry::default();
        let currency = cart.currency();

        for (index, effect) in effects.iter().enumerate() {
            let position = actions.len();
            let result = match effect {
                Effect::SetDiscount(discount) => self
                    .discount_action(discount, index, currency, &mut slugs)
                    .map(|action| actions.push(action)),
                Effect::SetDiscountPerItem(discount) => self
                    .per_item_discount_action(discount, index, currency, session, &mut slugs)
                    .map(|action| actions.push(action)),
                Effect::AddFreeItem(item) => {
                    self.add_free_item(item, &mut actions, &mut free_items);
                    Ok(())
                }
                Effect::AcceptCoupon { code } => {
                    actions.push(UpdateAction::SetCustomField {
                        name: COUPON_CODE_FIELD.to_string(),
                        value: Some(Value::String(code.clone())),
                    });
                    Ok(())
                }
                Effect::RejectCoupon { code, reason } => {
                    debug!(coupon = %code, reason = ?reason, "优惠券被拒绝");
                    actions.push(UpdateAction::SetCustomField {
                        name: COUPON_CODE_FIELD.to_string(),
                        value: None,
                    });
                    Ok(())
                }
                Effect::ShowNotification(notification) => {
                    cart_fields
                        .at(position)
                        .add_notification(notification.clone());
                    Ok(())
                }
                Effect::LoyaltyPoints { operation, points } => {
                    cart_fields
                        .at(position)
                        .add_loyalty_points(*operation, points.clone());
                    Ok(())
                }
                Effect::AcceptReferral { code } => {
                    cart_fields.at(position).referral_code(code);
                    Ok(())
                }
                Effect::RejectReferral { code, reason } => {
                    debug!(referral = %code, reason = ?reason, "推荐码被拒绝");
                    cart_fields.at(position).remove_referral_code();
                    Ok(())
                }
                Effect::ReferralCreated { code } => {
                    customer.at(0).add_referral(code);
                    Ok(())
                }
            };

            record(effect, result);
        }

        if let Some(built) = cart_fields.build() {
            let built = absorb_field_updates(&mut actions, built);
            insert_at_positions(&mut actions, vec![built]);
        }

        CartTranslation { actions, customer }
    }

    /// 非购物车币种的会话只贡献新生成的推荐码
    pub fn collect_referrals(&self, effects: &[Effect], customer: &mut CustomFieldsAggregator) {
        for effect in effects {
            if let Effect::ReferralCreated { code } = effect {
                customer.at(0).add_referral(code);
                metrics::record_effect_translated(effect.kind());
            }
        }
    }

    /// 将档案效果转换为客户动作，只处理推荐码和积分
    pub fn translate_profile(&self, effects: &[Effect]) -> Vec<UpdateAction> {
        let mut customer = self.customer_aggregator();

        for effect in effects {
            match effect {
                Effect::ReferralCreated { code } => {
                    customer.at(0).add_referral(code);
                }
                Effect::LoyaltyPoints { operation, points } => {
                    customer
                        .at(0)
                        .add_loyalty_points(*operation, points.clone());
                }
                other => {
                    debug!(effect_kind = other.kind(), "档案转换忽略该效果");
                    continue;
                }
            }
            metrics::record_effect_translated(effect.kind());
        }

        customer
            .build()
            .map(|(_, action)| vec![action])
            .unwrap_or_default()
    }

    /// 清理上一次调用留下的促销行项目
    fn removal_actions(&self, cart: &Cart) -> Vec<UpdateAction> {
        let custom_lines = cart
            .custom_line_items
            .iter()
            .filter(|item| item.slug.starts_with(PROMOTION_SLUG_PREFIX))
            .map(|item| UpdateAction::RemoveCustomLineItem {
                custom_line_item_id: item.id.clone(),
            });

        let free_items = cart
            .line_items
            .iter()
            .filter(|item| item.is_promotion_free_item())
            .map(|item| UpdateAction::RemoveLineItem {
                line_item_id: item.id.clone(),
            });

        custom_lines.chain(free_items).collect()
    }

    fn discount_action(
        &self,
        discount: &SetDiscount,
        index: usize,
        currency: &str,
        slugs: &mut SlugRegistry,
    ) -> Result<UpdateAction> {
        let slug = promotion_slug(&discount.name, index);
        let custom = CustomFieldsDraft::new(&self.settings.metadata.line_item)
            .with_field(PROMOTION_NAME_FIELD, discount.name.as_str());
        self.custom_line_item(&discount.name, discount.value, currency, slug, custom, slugs)
    }

    fn per_item_discount_action(
        &self,
        discount: &SetDiscountPerItem,
        index: usize,
        currency: &str,
        session: &CustomerSession,
        slugs: &mut SlugRegistry,
    ) -> Result<UpdateAction> {
        let item = session.cart_items.get(discount.position).ok_or_else(|| {
            TranslationError::MalformedEffect {
                kind: "setDiscountPerItem".to_string(),
                reason: format!(
                    "position {} 超出购物车条目数 {}",
                    discount.position,
                    session.cart_items.len()
                ),
            }
        })?;

        let slug = format!(
            "{}-{}",
            promotion_slug(&discount.name, index),
            discount.position
        );
        let custom = CustomFieldsDraft::new(&self.settings.metadata.line_item)
            .with_field(PROMOTION_NAME_FIELD, discount.name.as_str())
            .with_field(LINE_ITEM_SKU_FIELD, item.sku.as_str());
        self.custom_line_item(&discount.name, discount.value, currency, slug, custom, slugs)
    }

    fn custom_line_item(
        &self,
        name: &str,
        value: Decimal,
        currency: &str,
        slug: String,
        custom: CustomFieldsDraft,
        slugs: &mut SlugRegistry,
    ) -> Result<UpdateAction> {
        let money = Money::of(Precision::Decimal, currency, value)
            .rounded_with(self.settings.rounding)
            .negate()
            .to_cent_precision()?;
        let slug = slugs.claim(slug);

        Ok(UpdateAction::AddCustomLineItem {
            name: BTreeMap::from([(
                self.settings.evaluator.language().to_string(),
                name.to_string(),
            )]),
            quantity: 1,
            money,
            slug,
            tax_category: self
                .settings
                .discount_tax_category_id
                .as_ref()
                .map(|id| ResourceIdentifier {
                    id: id.clone(),
                    type_id: "tax-category".to_string(),
                }),
            custom: Some(custom),
        })
    }

    /// 相同身份的赠品合并为一个动作，数量累加
    fn add_free_item(
        &self,
        item: &AddFreeItem,
        actions: &mut Vec<UpdateAction>,
        free_items: &mut HashMap<SkuIdentity, usize>,
    ) {
        let identity = self.settings.resolver.decode(&item.sku);

        if let Some(&index) = free_items.get(&identity) {
            if let Some(UpdateAction::AddLineItem { quantity, .. }) = actions.get_mut(index) {
                *quantity += 1;
                return;
            }
        }

        free_items.insert(identity.clone(), actions.len());
        actions.push(UpdateAction::AddLineItem {
            identity,
            quantity: 1,
            custom: Some(
                CustomFieldsDraft::new(&self.settings.metadata.line_item)
                    .with_field(FREE_ITEM_FIELD, true)
                    .with_field(PROMOTION_NAME_FIELD, item.name.as_str()),
            ),
        });
    }
}

fn record(effect: &Effect, result: Result<()>) {
    match result {
        Ok(()) => metrics::record_effect_translated(effect.kind()),
        Err(e) => {
            warn!(effect_kind = effect.kind(), error = %e, "效果转换失败，跳过");
            metrics::record_effect_skipped(e.code());
        }
    }
}

/// 促销名 -> slug：小写 ASCII 字母数字，其余字符折叠为 `-`
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(MAX_SLUG_BODY_LEN);
    slug.trim_end_matches('-').to_string()
}

/// 带前缀的 slug；促销名没有可用字符时以效果下标代替
fn promotion_slug(name: &str, index: usize) -> String {
    let body = slugify(name);
    if body.is_empty() {
        format!("{}effect-{}", PROMOTION_SLUG_PREFIX, index)
    } else {
        format!("{}{}", PROMOTION_SLUG_PREFIX, body)
    }
}

/// 一次转换内已分配的 slug，重复时追加 `-2`、`-3`……
#[derive(Debug, Default)]
struct SlugRegistry {
    claimed: HashSet<String>,
}

impl SlugRegistry {
    fn claim(&mut self, slug: String) -> String {
        if self.claimed.insert(slug.clone()) {
            return slug;
        }

        let mut suffix = 2;
        loop {
            let candidate = format!("{}-{}", slug, suffix);
            if self.claimed.insert(candidate.clone()) {
                debug!(slug = %candidate, "slug 重复，追加后缀");
                return candidate;
            }
            suffix += 1;
        }
    }
}
