//! API 扩展事件处理
//!
//! 一次调用的完整流程：解析事件 -> 属性投影 -> 按币种调用促销引擎 -> 转换效果。
//! 多币种调用并发执行，结果按币种代码顺序合并，输出与网络时序无关。

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use promo_shared::config::PromotionConfig;
use promo_shared::observability::metrics;
use promo_shared::retry::{RetryPolicy, retry_with_policy};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::actions::UpdateAction;
use crate::commerce::{Cart, ExtensionAction, ExtensionInput, Order, ResourceType};
use crate::effects::{Effect, parse_effects};
use crate::engine::{CurrencyRouter, EngineError, PromotionEngine};
use crate::error::{Result, TranslationError};
use crate::projection::{AttributeProjector, CustomerProfile, CustomerSession};
use crate::settings::TranslatorSettings;
use crate::translator::EffectTranslator;

/// 返回给商业平台的错误条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub code: String,
    pub message: String,
}

impl From<&TranslationError> for ErrorEntry {
    fn from(err: &TranslationError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// API 扩展响应
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "responseType")]
pub enum ExtensionResponse {
    UpdateRequest { actions: Vec<UpdateAction> },
    FailedValidation { errors: Vec<ErrorEntry> },
}

/// 一次调用的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub response: ExtensionResponse,
    /// 购物车事件附带的客户更新，由适配层另行提交
    pub customer_actions: Vec<UpdateAction>,
    /// 已记录的可恢复错误
    pub errors: Vec<ErrorEntry>,
}

impl ProcessOutcome {
    fn failed(err: &TranslationError) -> Self {
        Self {
            response: ExtensionResponse::FailedValidation {
                errors: vec![ErrorEntry::from(err)],
            },
            customer_actions: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn actions(&self) -> &[UpdateAction] {
        match &self.response {
            ExtensionResponse::UpdateRequest { actions } => actions,
            ExtensionResponse::FailedValidation { .. } => &[],
        }
    }
}

/// 内部处理结果：主动作、客户动作
type Handled = (Vec<UpdateAction>, Vec<UpdateAction>);

/// API 扩展处理器
pub struct ExtensionProcessor {
    engine: Arc<dyn PromotionEngine>,
    settings: TranslatorSettings,
    router: CurrencyRouter,
    retry: RetryPolicy,
}

impl ExtensionProcessor {
    pub fn new(
        engine: Arc<dyn PromotionEngine>,
        settings: TranslatorSettings,
        router: CurrencyRouter,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            engine,
            settings,
            router,
            retry,
        }
    }

    /// 从原始配置构建，配置无效时返回 `Configuration` 错误
    pub fn from_config(engine: Arc<dyn PromotionEngine>, config: &PromotionConfig) -> Result<Self> {
        let (settings, _diagnostics) = TranslatorSettings::from_config(config)?;
        let router = CurrencyRouter::from_config(&config.engine);
        let retry = RetryPolicy::from(&config.engine);
        Ok(Self::new(engine, settings, router, retry))
    }

    pub fn settings(&self) -> &TranslatorSettings {
        &self.settings
    }

    /// 处理一次 API 扩展调用
    pub async fn handle(&self, input: &Value) -> ProcessOutcome {
        let input: ExtensionInput = match serde_json::from_value(input.clone()) {
            Ok(input) => input,
            Err(e) => {
                let err = TranslationError::InvalidEvent(e.to_string());
                error!(error = %err, "无法解析 API 扩展事件");
                return ProcessOutcome::failed(&err);
            }
        };

        let mut errors = Vec::new();
        match self.dispatch(&input, &mut errors).await {
            Ok((actions, customer_actions)) => {
                info!(
                    resource_type = ?input.resource.type_id,
                    resource_id = %input.resource.id,
                    actions = actions.len(),
                    customer_actions = customer_actions.len(),
                    recorded_errors = errors.len(),
                    "API 扩展调用处理完成"
                );
                ProcessOutcome {
                    response: ExtensionResponse::UpdateRequest { actions },
                    customer_actions,
                    errors: errors.iter().map(ErrorEntry::from).collect(),
                }
            }
            Err(err) => {
                error!(
                    resource_type = ?input.resource.type_id,
                    resource_id = %input.resource.id,
                    error = %err,
                    code = err.code(),
                    "API 扩展调用失败"
                );
                ProcessOutcome::failed(&err)
            }
        }
    }

    #[instrument(skip_all, fields(resource_type = ?input.resource.type_id, action = ?input.action))]
    async fn dispatch(
        &self,
        input: &ExtensionInput,
        errors: &mut Vec<TranslationError>,
    ) -> Result<Handled> {
        let resource = &input.resource;
        match resource.type_id {
            ResourceType::Cart => {
                let cart: Cart = parse_resource(&resource.obj)?;
                self.handle_cart(&cart, input.action, errors).await
            }
            ResourceType::Customer => {
                let actions = self
                    .handle_customer(&resource.id, &resource.obj, errors)
                    .await?;
                Ok((actions, Vec::new()))
            }
            ResourceType::Order => {
                let order: Order = parse_resource(&resource.obj)?;
                self.handle_order(&order, errors).await?;
                Ok((Vec::new(), Vec::new()))
            }
        }
    }

    async fn handle_cart(
        &self,
        cart: &Cart,
        action: ExtensionAction,
        errors: &mut Vec<TranslationError>,
    ) -> Result<Handled> {
        let projector = AttributeProjector::new(&self.settings);
        let translator = EffectTranslator::new(&self.settings);
        let session = projector.cart_session(cart);
        let cart_currency = cart.currency().to_uppercase();

        // 创建购物车时在所有币种下建立会话，以便生成各币种的推荐码
        let currencies: Vec<String> = match action {
            ExtensionAction::Create => self
                .router
                .currencies()
                .map(str::to_string)
                .chain(std::iter::once(cart_currency.clone()))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            ExtensionAction::Update => vec![cart_currency.clone()],
        };

        let calls = currencies
            .iter()
            .map(|currency| self.session_effects(currency, &cart.id, &session));
        let results = join_all(calls).await;

        let mut cart_effects = Vec::new();
        let mut other_effects = Vec::new();
        for (currency, result) in currencies.iter().zip(results) {
            let Some(effects) = settle(currency, result, errors)? else {
                continue;
            };
            if *currency == cart_currency {
                cart_effects = effects;
            } else {
                other_effects.push(effects);
            }
        }

        let mut translation = translator.translate_cart(cart, &session, &cart_effects);
        for effects in &other_effects {
            translator.collect_referrals(effects, &mut translation.customer);
        }

        let customer_actions = translation
            .customer
            .build()
            .map(|(_, action)| vec![action])
            .unwrap_or_default();

        Ok((translation.actions, customer_actions))
    }

    async fn handle_customer(
        &self,
        customer_id: &str,
        customer: &Value,
        errors: &mut Vec<TranslationError>,
    ) -> Result<Vec<UpdateAction>> {
        let projector = AttributeProjector::new(&self.settings);
        let translator = EffectTranslator::new(&self.settings);
        let profile = projector.customer_profile(customer);

        let currencies: Vec<String> = self.router.currencies().map(str::to_string).collect();
        let calls = currencies
            .iter()
            .map(|currency| self.profile_effects(currency, customer_id, &profile));
        let results = join_all(calls).await;

        let mut effects = Vec::new();
        for (currency, result) in currencies.iter().zip(results) {
            if let Some(found) = settle(currency, result, errors)? {
                effects.extend(found);
            }
        }

        Ok(translator.translate_profile(&effects))
    }

    /// 订单创建或更新时关闭对应的会话
    async fn handle_order(&self, order: &Order, errors: &mut Vec<TranslationError>) -> Result<()> {
        let projector = AttributeProjector::new(&self.settings);
        let session = projector.closed_session(order);
        let session_id = order.session_id().unwrap_or(&order.id);
        let currency = order.currency().to_uppercase();

        let result = self.session_effects(&currency, session_id, &session).await;
        settle(&currency, result, errors)?;
        Ok(())
    }

    async fn session_effects(
        &self,
        currency: &str,
        session_id: &str,
        session: &CustomerSession,
    ) -> Result<Vec<Effect>> {
        let credentials = self.router.resolve(currency)?;
        let response = retry_with_policy(
            &self.retry,
            "promotion_engine.update_session",
            EngineError::is_retryable,
            || self.engine.update_session(credentials, session_id, session),
        )
        .await;

        engine_effects(currency, response)
    }

    async fn profile_effects(
        &self,
        currency: &str,
        profile_id: &str,
        profile: &CustomerProfile,
    ) -> Result<Vec<Effect>> {
        let credentials = self.router.resolve(currency)?;
        let response = retry_with_policy(
            &self.retry,
            "promotion_engine.update_profile",
            EngineError::is_retryable,
            || self.engine.update_profile(credentials, profile_id, profile),
        )
        .await;

        engine_effects(currency, response)
    }
}

fn parse_resource<T: DeserializeOwned>(obj: &Value) -> Result<T> {
    serde_json::from_value(obj.clone()).map_err(|e| TranslationError::InvalidEvent(e.to_string()))
}

fn engine_effects(
    currency: &str,
    response: std::result::Result<crate::engine::EngineResponse, EngineError>,
) -> Result<Vec<Effect>> {
    match response {
        Ok(response) => {
            metrics::record_engine_call(currency, "ok");
            Ok(parse_effects(&response.effects))
        }
        Err(source) => {
            metrics::record_engine_call(currency, "error");
            Err(TranslationError::Engine {
                currency: currency.to_string(),
                source,
            })
        }
    }
}

/// 致命错误向上传播；可恢复错误记录后视为该币种没有效果
fn settle(
    currency: &str,
    result: Result<Vec<Effect>>,
    errors: &mut Vec<TranslationError>,
) -> Result<Option<Vec<Effect>>> {
    match result {
        Ok(effects) => Ok(Some(effects)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            error!(currency, error = %err, code = err.code(), "币种调用失败，按无效果处理");
            errors.push(err);
            Ok(None)
        }
    }
}
