//! 业务指标模块
//!
//! 基于 metrics crate 的门面记录转换指标。未安装 recorder 时所有调用都是空操作，
//! 宿主进程可以自行安装 Prometheus 等 exporter。

/// 注册指标描述信息
pub fn describe() {
    metrics::describe_counter!(
        "promotion_effects_translated_total",
        "Total number of engine effects turned into update actions"
    );
    metrics::describe_counter!(
        "promotion_effects_skipped_total",
        "Total number of engine effects skipped during translation"
    );
    metrics::describe_counter!(
        "promotion_mapping_rules_dropped_total",
        "Total number of attribute mapping rules dropped at compile time"
    );
    metrics::describe_counter!(
        "promotion_engine_calls_total",
        "Total number of promotions engine calls"
    );
}

/// 记录一个成功转换的效果
#[inline]
pub fn record_effect_translated(kind: &str) {
    metrics::counter!(
        "promotion_effects_translated_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// 记录一个被跳过的效果
#[inline]
pub fn record_effect_skipped(reason: &str) {
    metrics::counter!(
        "promotion_effects_skipped_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录被丢弃的映射规则数量
#[inline]
pub fn record_mapping_rules_dropped(count: usize) {
    metrics::counter!("promotion_mapping_rules_dropped_total").increment(count as u64);
}

/// 记录一次促销引擎调用
#[inline]
pub fn record_engine_call(currency: &str, outcome: &str) {
    metrics::counter!(
        "promotion_engine_calls_total",
        "currency" => currency.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        describe();
        record_effect_translated("setDiscount");
        record_effect_skipped("unsupported");
        record_mapping_rules_dropped(2);
        record_engine_call("EUR", "ok");
    }
}
