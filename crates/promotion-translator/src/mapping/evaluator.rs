//! 映射规则求值器
//!
//! 按顺序对源数据树求值每条规则，产出扁平的「目标属性 -> 值」映射。
//! 无法解析或无法转换的规则对该源对象不产生输出，后写入的规则覆盖先写入的。

use serde_json::{Map, Number, Value};
use tracing::debug;

use super::models::{MappingRule, MappingRuleSet, PathSegment, ValueKind};
use crate::error::{Result, TranslationError};

/// 属性求值器
#[derive(Debug, Clone)]
pub struct AttributeEvaluator {
    /// 本地化字段未指定语言时使用的语言
    language: String,
}

impl AttributeEvaluator {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// 对规则集求值
    pub fn evaluate(&self, rules: &MappingRuleSet, source: &Value) -> Map<String, Value> {
        let mut attributes = Map::new();

        for rule in rules.iter() {
            match self.evaluate_rule(rule, source) {
                Ok(value) => {
                    attributes.insert(rule.target_attribute.clone(), value);
                }
                Err(e) => {
                    debug!(rule = %rule, error = %e, "映射规则未产生属性");
                }
            }
        }

        attributes
    }

    /// 对单条规则求值
    pub fn evaluate_rule(&self, rule: &MappingRule, source: &Value) -> Result<Value> {
        let unresolvable = || TranslationError::UnresolvableAttribute {
            rule: rule.to_string(),
        };

        let raw = resolve_path(&rule.source_path, source).ok_or_else(unresolvable)?;
        self.coerce(raw, rule.value_kind).ok_or_else(unresolvable)
    }

    fn coerce(&self, raw: &Value, kind: ValueKind) -> Option<Value> {
        if !kind.is_plural() {
            return self.coerce_scalar(raw, kind);
        }

        let element_kind = kind.element();
        let items: Vec<Value> = match raw {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| self.coerce_scalar(item, element_kind))
                .collect(),
            scalar => self.coerce_scalar(scalar, element_kind).into_iter().collect(),
        };

        if items.is_empty() {
            return None;
        }
        Some(Value::Array(items))
    }

    fn coerce_scalar(&self, raw: &Value, kind: ValueKind) -> Option<Value> {
        match kind.element() {
            ValueKind::Number => coerce_number(raw),
            ValueKind::Boolean => coerce_boolean(raw),
            _ => self.coerce_string(raw),
        }
    }

    fn coerce_string(&self, raw: &Value) -> Option<Value> {
        match raw {
            Value::String(s) => Some(Value::String(s.clone())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            Value::Object(map) if is_localized_map(map) => map
                .get(&self.language)
                .and_then(Value::as_str)
                .map(|s| Value::String(s.to_string())),
            _ => None,
        }
    }
}

/// 按路径段依次下钻，null 视为缺失
pub fn resolve_path<'a>(path: &[PathSegment], source: &'a Value) -> Option<&'a Value> {
    let mut current = source;

    for segment in path {
        current = match segment {
            PathSegment::Field(name) => current.as_object()?.get(name)?,
            PathSegment::Index(index) => current.as_array()?.get(*index)?,
            PathSegment::Locales(locales) => {
                let map = current.as_object()?;
                locales
                    .iter()
                    .find_map(|locale| map.get(locale).filter(|v| !v.is_null()))?
            }
        };

        if current.is_null() {
            return None;
        }
    }

    Some(current)
}

fn coerce_number(raw: &Value) -> Option<Value> {
    match raw {
        Value::Number(n) => Some(Value::Number(n.clone())),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(int) = s.parse::<i64>() {
                return Some(Value::from(int));
            }
            s.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }
        _ => None,
    }
}

fn coerce_boolean(raw: &Value) -> Option<Value> {
    match raw {
        Value::Bool(b) => Some(Value::Bool(*b)),
        Value::String(s) if s == "true" => Some(Value::Bool(true)),
        Value::String(s) if s == "false" => Some(Value::Bool(false)),
        _ => None,
    }
}

/// 判断对象是否为「语言 -> 文本」的本地化字段
fn is_localized_map(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && map
            .iter()
            .all(|(key, value)| looks_like_locale(key) && value.is_string())
}

/// `en`、`de-DE`、`zh-Hans-CN` 这类语言标签
fn looks_like_locale(key: &str) -> bool {
    let mut parts = key.split('-');
    let primary_ok = parts.next().is_some_and(|p| {
        (2..=3).contains(&p.len()) && p.chars().all(|c| c.is_ascii_lowercase())
    });

    primary_ok
        && parts.all(|p| (2..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingParser;
    use serde_json::json;

    fn evaluate(rules: &str, source: Value) -> Map<String, Value> {
        let (rules, diagnostics) = MappingParser::new().compile(rules);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        AttributeEvaluator::new("en").evaluate(&rules, &source)
    }

    fn variant_attributes() -> Value {
        json!({
            "color": {
                "key": "red",
                "label": { "de": "Rot", "en": "Red" }
            },
            "sizes": ["S", "M", "L"],
            "weight": "1.25",
            "stock": 12,
            "organic": "true",
            "fragile": "yes",
            "labels": [
                { "de": "Neu", "en": "New" },
                { "de": "Angebot" }
            ],
            "codes": ["10", "abc", 30]
        })
    }

    #[test]
    fn test_locale_preference_list() {
        let attributes = evaluate("color.label{fr,de,en}:Color", variant_attributes());
        assert_eq!(attributes["Color"], json!("Rot"));
    }

    #[test]
    fn test_direct_locale_token() {
        let attributes = evaluate("color.label.de:Color", variant_attributes());
        assert_eq!(attributes["Color"], json!("Rot"));
    }

    #[test]
    fn test_localized_map_falls_back_to_language() {
        let attributes = evaluate("color.label:Color", variant_attributes());
        assert_eq!(attributes["Color"], json!("Red"));
    }

    #[test]
    fn test_index_selection() {
        let attributes = evaluate("sizes.x1:Size; sizes.5:Missing", variant_attributes());
        assert_eq!(attributes["Size"], json!("M"));
        assert!(!attributes.contains_key("Missing"));
    }

    #[test]
    fn test_number_coercion() {
        let attributes = evaluate(
            "weight:Weight{number}; stock:Stock{number}; color.key:Bad{number}",
            variant_attributes(),
        );
        assert_eq!(attributes["Weight"], json!(1.25));
        assert_eq!(attributes["Stock"], json!(12));
        assert!(!attributes.contains_key("Bad"));
    }

    #[test]
    fn test_plural_numbers_drop_non_numeric() {
        let attributes = evaluate("codes:Codes{numbers}", variant_attributes());
        assert_eq!(attributes["Codes"], json!([10, 30]));
    }

    #[test]
    fn test_plural_wraps_scalar() {
        let attributes = evaluate(
            "color.key:Colors{strings}; stock:Stocks{numbers}",
            variant_attributes(),
        );
        assert_eq!(attributes["Colors"], json!(["red"]));
        assert_eq!(attributes["Stocks"], json!([12]));
    }

    #[test]
    fn test_plural_localized_elements() {
        let attributes = evaluate("labels:Labels{strings}", variant_attributes());
        assert_eq!(attributes["Labels"], json!(["New"]));
    }

    #[test]
    fn test_boolean_accepts_only_canonical_values() {
        let attributes = evaluate(
            "organic:Organic{boolean}; fragile:Fragile{boolean}",
            variant_attributes(),
        );
        assert_eq!(attributes["Organic"], json!(true));
        assert!(!attributes.contains_key("Fragile"));
    }

    #[test]
    fn test_last_write_wins_with_locale_override() {
        let attributes = evaluate(
            "color.label:Color; color.label{de}:Color",
            variant_attributes(),
        );
        assert_eq!(attributes["Color"], json!("Rot"));

        let attributes = evaluate(
            "color.label{de}:Color; color.label:Color",
            variant_attributes(),
        );
        assert_eq!(attributes["Color"], json!("Red"));
    }

    #[test]
    fn test_failed_later_rule_keeps_earlier_value() {
        let attributes = evaluate(
            "color.key:Color; color.missing:Color",
            variant_attributes(),
        );
        assert_eq!(attributes["Color"], json!("red"));
    }

    #[test]
    fn test_missing_path_is_unresolvable() {
        let (rules, _) = MappingParser::new().compile("nothing.here:Nothing");
        let evaluator = AttributeEvaluator::new("en");
        let err = evaluator
            .evaluate_rule(&rules.rules()[0], &variant_attributes())
            .unwrap_err();
        assert!(matches!(err, TranslationError::UnresolvableAttribute { .. }));
    }

    #[test]
    fn test_date_passthrough() {
        let attributes = evaluate(
            "release:Release{date}; opens:Opens{time}",
            json!({ "release": "2024-05-01", "opens": "08:30" }),
        );
        assert_eq!(attributes["Release"], json!("2024-05-01"));
        assert_eq!(attributes["Opens"], json!("08:30"));
    }

    #[test]
    fn test_looks_like_locale() {
        assert!(looks_like_locale("en"));
        assert!(looks_like_locale("de-DE"));
        assert!(looks_like_locale("zh-Hans-CN"));
        assert!(!looks_like_locale("label"));
        assert!(!looks_like_locale("EN"));
    }
}
