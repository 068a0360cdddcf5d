//! 促销转换流程集成测试
//!
//! 通过公开 API 驱动完整的 API 扩展调用（使用录制的引擎响应，无需外部依赖）

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use promo_shared::config::{EngineCredentialsConfig, PromotionConfig};
use promotion_translator::{
    CustomerProfile, CustomerSession, EngineCredentials, EngineError, EngineResponse,
    ExtensionProcessor, ExtensionResponse, PromotionEngine, RecordedEngine,
};
use serde_json::{Value, json};

// ==================== 测试辅助 ====================

fn config(currencies: &[&str]) -> PromotionConfig {
    let mut config = PromotionConfig {
        cart_attribute_mapping: "channel:Channel".to_string(),
        cart_item_attribute_mapping: "color.label{de}:Color".to_string(),
        customer_attribute_mapping: "firstName:Name".to_string(),
        ..PromotionConfig::default()
    };
    config.engine.max_retries = 1;
    config.engine.initial_retry_delay_ms = 1;
    config.engine.max_retry_delay_ms = 1;
    for currency in currencies {
        config.engine.credentials.insert(
            currency.to_string(),
            EngineCredentialsConfig {
                api_key: format!("key-{}", currency),
                base_path: "https://engine.example".to_string(),
            },
        );
    }
    config
}

fn recorded(value: Value) -> Arc<RecordedEngine> {
    Arc::new(serde_json::from_value(value).unwrap())
}

fn cart_event(action: &str, currency: &str) -> Value {
    json!({
        "action": action,
        "resource": {
            "typeId": "cart",
            "id": "cart-1",
            "obj": {
                "id": "cart-1",
                "customerId": "cust-1",
                "totalPrice": { "currencyCode": currency, "centAmount": 3000 },
                "lineItems": [
                    {
                        "id": "li-1",
                        "productId": "p-1",
                        "name": { "en": "Shirt" },
                        "variant": {
                            "id": 1,
                            "sku": "SH-1",
                            "attributes": [
                                { "name": "color", "value": { "key": "red", "label": { "de": "Rot" } } }
                            ]
                        },
                        "quantity": 2,
                        "price": { "value": { "currencyCode": currency, "centAmount": 1500 } }
                    },
                    {
                        "id": "li-old-gift",
                        "productId": "p-9",
                        "variant": { "id": 1, "sku": "GIFT" },
                        "quantity": 1,
                        "price": { "value": { "currencyCode": currency, "centAmount": 0 } },
                        "custom": { "fields": { "promotion_free_item": true } }
                    }
                ],
                "customLineItems": [
                    { "id": "cli-old", "slug": "promotion-old-deal" }
                ],
                "custom": { "fields": { "channel": "web", "promotion_coupon_code": "SUMMER" } }
            }
        }
    })
}

fn action_names(actions: &[Value]) -> Vec<&str> {
    actions
        .iter()
        .map(|a| a["action"].as_str().unwrap())
        .collect()
}

/// 每次调用都失败的引擎，统计调用次数
struct FailingEngine {
    error: EngineError,
    calls: AtomicUsize,
}

impl FailingEngine {
    fn new(error: EngineError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PromotionEngine for FailingEngine {
    async fn update_session(
        &self,
        _credentials: &EngineCredentials,
        _session_id: &str,
        _session: &CustomerSession,
    ) -> Result<EngineResponse, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    async fn update_profile(
        &self,
        _credentials: &EngineCredentials,
        _profile_id: &str,
        _profile: &CustomerProfile,
    ) -> Result<EngineResponse, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

// ==================== 购物车流程 ====================

#[tokio::test]
async fn test_cart_update_translates_effects_in_order() {
    let engine = recorded(json!({
        "session": {
            "EUR": {
                "effects": [
                    { "effectType": "setDiscount", "props": { "name": "10% off", "value": "3.005" } },
                    null,
                    { "effectType": "showNotification", "props": { "notificationType": "info", "title": "Hi", "body": "Welcome" } },
                    { "effectType": "addFreeItem", "props": { "sku": "GIFT", "name": "Gift" } },
                    { "effectType": "addFreeItem", "props": { "sku": "GIFT", "name": "Gift" } },
                    { "effectType": "mysteryEffect", "props": {} },
                    { "effectType": "acceptCoupon", "props": { "value": "SUMMER" } }
                ]
            }
        }
    }));
    let processor = ExtensionProcessor::from_config(engine, &config(&["EUR"])).unwrap();

    let outcome = processor.handle(&cart_event("Update", "EUR")).await;
    let json = serde_json::to_value(&outcome).unwrap();
    let actions = json["response"]["actions"].as_array().unwrap();

    assert_eq!(json["response"]["responseType"], "UpdateRequest");
    assert_eq!(
        action_names(actions),
        vec![
            "removeCustomLineItem",
            "removeLineItem",
            "addCustomLineItem",
            "setCustomType",
            "addLineItem",
            "setCustomField",
        ]
    );

    // 3.005 按默认的 HALF_EVEN 舍入为 3.00
    let discount = &actions[2];
    assert_eq!(discount["slug"], "promotion-10-off");
    assert_eq!(discount["money"]["centAmount"], -300);
    assert_eq!(discount["money"]["currencyCode"], "EUR");

    let notifications: Value = serde_json::from_str(
        actions[3]["fields"]["promotion_notifications"]
            .as_str()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(notifications[0]["title"], "Hi");

    // 同一赠品合并
    assert_eq!(actions[4]["sku"], "GIFT");
    assert_eq!(actions[4]["quantity"], 2);
    assert_eq!(actions[5]["value"], "SUMMER");

    assert!(outcome.customer_actions.is_empty());
    assert!(outcome.errors.is_empty());
}

#[tokio::test]
async fn test_cart_create_collects_referrals_across_currencies() {
    let engine = recorded(json!({
        "session": {
            "EUR": { "effects": [{ "effectType": "referralCreated", "props": { "value": "REF-EUR" } }] },
            "USD": { "effects": [
                { "effectType": "referralCreated", "props": { "value": "REF-USD" } },
                { "effectType": "setDiscount", "props": { "name": "ignored", "value": 5 } }
            ] }
        }
    }));
    let processor = ExtensionProcessor::from_config(engine, &config(&["EUR", "USD"])).unwrap();

    let outcome = processor.handle(&cart_event("Create", "EUR")).await;

    // 其他币种的折扣不会作用于购物车
    let cart_actions = serde_json::to_value(outcome.actions()).unwrap();
    assert!(
        !action_names(cart_actions.as_array().unwrap()).contains(&"addCustomLineItem")
    );

    let customer = serde_json::to_value(&outcome.customer_actions).unwrap();
    assert_eq!(
        customer,
        json!([{
            "action": "setCustomType",
            "type": { "key": "talon_one_customer_metadata" },
            "fields": { "promotion_referral_codes": ["REF-EUR", "REF-USD"] }
        }])
    );
}

#[tokio::test]
async fn test_cart_update_only_calls_cart_currency() {
    let engine = recorded(json!({
        "session": {
            "USD": { "effects": [{ "effectType": "referralCreated", "props": { "value": "REF-USD" } }] }
        }
    }));
    let processor = ExtensionProcessor::from_config(engine, &config(&["EUR", "USD"])).unwrap();

    let outcome = processor.handle(&cart_event("Update", "EUR")).await;
    assert!(outcome.customer_actions.is_empty());
}

#[tokio::test]
async fn test_unconfigured_currency_is_recorded() {
    let processor =
        ExtensionProcessor::from_config(recorded(json!({})), &config(&["EUR"])).unwrap();

    let outcome = processor.handle(&cart_event("Update", "GBP")).await;

    assert!(matches!(outcome.response, ExtensionResponse::UpdateRequest { .. }));
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].code, "CurrencyRoutingError");
    // 清理动作仍然产出
    assert_eq!(outcome.actions().len(), 2);
}

#[tokio::test]
async fn test_fallback_currency_routes_to_configured_engine() {
    let engine = recorded(json!({
        "session": {
            "EUR": { "effects": [{ "effectType": "acceptCoupon", "props": { "value": "SUMMER" } }] }
        }
    }));
    let mut config = config(&["EUR"]);
    config.engine.fallback_currency = Some("EUR".to_string());
    let processor = ExtensionProcessor::from_config(engine, &config).unwrap();

    let outcome = processor.handle(&cart_event("Update", "GBP")).await;
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.actions().last().unwrap().name(), "setCustomField");
}

// ==================== 引擎故障 ====================

#[tokio::test]
async fn test_transient_engine_failure_is_retried_then_recorded() {
    let engine = Arc::new(FailingEngine::new(EngineError::Timeout));
    let processor = ExtensionProcessor::from_config(engine.clone(), &config(&["EUR"])).unwrap();

    let outcome = processor.handle(&cart_event("Update", "EUR")).await;

    // 首次调用 + 1 次重试
    assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].code, "PromotionEngineError");
    assert!(matches!(outcome.response, ExtensionResponse::UpdateRequest { .. }));
}

#[tokio::test]
async fn test_unauthorized_engine_fails_validation() {
    let engine = Arc::new(FailingEngine::new(EngineError::Unauthorized(
        "invalid key".to_string(),
    )));
    let processor = ExtensionProcessor::from_config(engine.clone(), &config(&["EUR"])).unwrap();

    let outcome = processor.handle(&cart_event("Update", "EUR")).await;

    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    let json = serde_json::to_value(&outcome.response).unwrap();
    assert_eq!(json["responseType"], "FailedValidation");
    assert_eq!(json["errors"][0]["code"], "PromotionEngineError");
}

// ==================== 客户与订单 ====================

#[tokio::test]
async fn test_customer_profile_update() {
    let engine = recorded(json!({
        "profile": {
            "EUR": { "effects": [
                { "effectType": "addLoyaltyPoints", "props": { "name": "Welcome", "programId": 7, "value": 100 } },
                { "effectType": "setDiscount", "props": { "name": "cart only", "value": 1 } }
            ] },
            "USD": { "effects": [{ "effectType": "referralCreated", "props": { "value": "REF-USD" } }] }
        }
    }));
    let processor = ExtensionProcessor::from_config(engine, &config(&["EUR", "USD"])).unwrap();

    let outcome = processor
        .handle(&json!({
            "action": "Update",
            "resource": { "typeId": "customer", "id": "cust-1", "obj": { "id": "cust-1", "firstName": "Ada" } }
        }))
        .await;

    let actions = serde_json::to_value(outcome.actions()).unwrap();
    assert_eq!(actions.as_array().unwrap().len(), 1);
    let fields = &actions[0]["fields"];
    assert_eq!(fields["promotion_referral_codes"], json!(["REF-USD"]));

    let points: Value =
        serde_json::from_str(fields["promotion_loyalty_points"].as_str().unwrap()).unwrap();
    assert_eq!(points[0]["type"], "add");
    assert_eq!(points[0]["programId"], 7);
}

#[tokio::test]
async fn test_order_closes_session_without_actions() {
    let processor =
        ExtensionProcessor::from_config(recorded(json!({})), &config(&["EUR"])).unwrap();

    let outcome = processor
        .handle(&json!({
            "action": "Create",
            "resource": {
                "typeId": "order",
                "id": "order-1",
                "obj": {
                    "id": "order-1",
                    "totalPrice": { "currencyCode": "EUR", "centAmount": 1000 },
                    "cart": { "typeId": "cart", "id": "cart-1" }
                }
            }
        }))
        .await;

    assert!(outcome.actions().is_empty());
    assert!(outcome.errors.is_empty());
}

// ==================== 输入校验 ====================

#[tokio::test]
async fn test_malformed_event_fails_validation() {
    let processor =
        ExtensionProcessor::from_config(recorded(json!({})), &config(&["EUR"])).unwrap();

    let outcome = processor
        .handle(&json!({ "action": "Delete", "resource": {} }))
        .await;

    let json = serde_json::to_value(&outcome.response).unwrap();
    assert_eq!(json["responseType"], "FailedValidation");
    assert_eq!(json["errors"][0]["code"], "InvalidInput");
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let mut config = config(&["EUR"]);
    config.sku_separator = "::".to_string();

    let err = ExtensionProcessor::from_config(recorded(json!({})), &config)
        .err()
        .unwrap();
    assert!(err.is_fatal());
    assert_eq!(err.code(), "ConfigurationError");
}
