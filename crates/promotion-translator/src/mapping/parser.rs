//! 映射规则解析器
//!
//! 语法：`source.path{locale,...}.x0:Target{kind}`，多条规则以 `;` 分隔。
//! 解析是宽松的：无效规则被丢弃并产生诊断，不影响其余规则。

use regex::Regex;
use tracing::warn;

use super::models::{Diagnostic, MappingRule, MappingRuleSet, PathSegment, ValueKind};
use crate::error::{Result, TranslationError};

/// 映射规则解析器
pub struct MappingParser {
    target_regex: Regex,
    segment_regex: Regex,
    index_regex: Regex,
}

impl Default for MappingParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingParser {
    pub fn new() -> Self {
        Self {
            target_regex: Regex::new(r"^([A-Za-z0-9_\-]+)\s*(?:\{\s*(\w+)\s*\})?$").unwrap(),
            segment_regex: Regex::new(r"^([^{}\s]+)(?:\{([^{}]*)\})?$").unwrap(),
            index_regex: Regex::new(r"^x?(\d{1,4})$").unwrap(),
        }
    }

    /// 编译整条映射配置，返回规则集和被丢弃规则的诊断
    pub fn compile(&self, input: &str) -> (MappingRuleSet, Vec<Diagnostic>) {
        let mut rules = Vec::new();
        let mut diagnostics = Vec::new();

        for (rule_index, raw) in input.split(';').enumerate() {
            let text = raw.trim();
            if text.is_empty() {
                continue;
            }

            match self.parse_rule(text) {
                Ok(rule) => rules.push(rule),
                Err(err) => {
                    warn!(rule_index, error = %err, code = err.code(), "映射规则无效，已丢弃");
                    let message = match err {
                        TranslationError::MalformedMappingRule { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    diagnostics.push(Diagnostic {
                        rule_index,
                        rule_text: text.to_string(),
                        message,
                    });
                }
            }
        }

        (MappingRuleSet::new(rules), diagnostics)
    }

    /// 解析单条规则，失败时返回 `MalformedMappingRule`
    pub fn parse_rule(&self, text: &str) -> Result<MappingRule> {
        self.parse_parts(text)
            .map_err(|reason| TranslationError::MalformedMappingRule {
                rule: text.to_string(),
                reason,
            })
    }

    fn parse_parts(&self, text: &str) -> std::result::Result<MappingRule, String> {
        let (source, target) = text
            .split_once(':')
            .ok_or_else(|| "缺少 `:` 分隔的目标属性".to_string())?;

        let (target_attribute, value_kind) = self.parse_target(target.trim())?;
        let source_path = self.parse_source(source.trim())?;

        Ok(MappingRule {
            source_path,
            target_attribute,
            value_kind,
        })
    }

    fn parse_target(&self, target: &str) -> std::result::Result<(String, ValueKind), String> {
        let captures = self
            .target_regex
            .captures(target)
            .ok_or_else(|| format!("目标属性格式无效: `{}`", target))?;

        let name = captures[1].to_string();
        let kind = match captures.get(2) {
            Some(kind) => kind.as_str().parse::<ValueKind>()?,
            None => ValueKind::default(),
        };

        Ok((name, kind))
    }

    fn parse_source(&self, source: &str) -> std::result::Result<Vec<PathSegment>, String> {
        if source.is_empty() {
            return Err("源路径不能为空".to_string());
        }

        let mut segments = Vec::new();
        for part in source.split('.') {
            let part = part.trim();
            let captures = self
                .segment_regex
                .captures(part)
                .ok_or_else(|| format!("路径段格式无效: `{}`", part))?;

            let name = &captures[1];
            let locales = captures.get(2).map(|m| m.as_str());

            if let Some(index) = self.index_regex.captures(name) {
                if segments.is_empty() {
                    return Err(format!("路径不能以下标开头: `{}`", part));
                }
                if locales.is_some() {
                    return Err(format!("下标段不能带语言列表: `{}`", part));
                }
                let index = index[1]
                    .parse::<usize>()
                    .map_err(|e| format!("下标无效: `{}` - {}", part, e))?;
                segments.push(PathSegment::Index(index));
                continue;
            }

            segments.push(PathSegment::Field(name.to_string()));

            if let Some(list) = locales {
                let locales: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                if locales.is_empty() {
                    return Err(format!("语言列表不能为空: `{}`", part));
                }
                segments.push(PathSegment::Locales(locales));
            }
        }

        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> PathSegment {
        PathSegment::Field(name.to_string())
    }

    #[test]
    fn test_parse_simple_rule_defaults_to_string() {
        let parser = MappingParser::new();
        let rule = parser.parse_rule("name:Name").unwrap();
        assert_eq!(rule.source_path, vec![field("name")]);
        assert_eq!(rule.target_attribute, "Name");
        assert_eq!(rule.value_kind, ValueKind::String);
    }

    #[test]
    fn test_parse_locale_list_and_index() {
        let parser = MappingParser::new();
        let rule = parser
            .parse_rule("color.label{de, en}.x3 : Color {strings}")
            .unwrap();
        assert_eq!(
            rule.source_path,
            vec![
                field("color"),
                field("label"),
                PathSegment::Locales(vec!["de".to_string(), "en".to_string()]),
                PathSegment::Index(3),
            ]
        );
        assert_eq!(rule.value_kind, ValueKind::Strings);
    }

    #[test]
    fn test_bare_numbers_are_indexes() {
        let parser = MappingParser::new();
        let rule = parser.parse_rule("sizes.0:Size{number}").unwrap();
        assert_eq!(rule.source_path, vec![field("sizes"), PathSegment::Index(0)]);
    }

    #[test]
    fn test_ambiguous_index_then_locale_token() {
        // 路径段严格按从左到右解释：x3 为下标，末尾的 x 为普通字段
        let parser = MappingParser::new();
        let rule = parser.parse_rule("color.label.x3.x:Color").unwrap();
        assert_eq!(
            rule.source_path,
            vec![
                field("color"),
                field("label"),
                PathSegment::Index(3),
                field("x"),
            ]
        );
    }

    #[test]
    fn test_compile_skips_malformed_rules_with_diagnostics() {
        let parser = MappingParser::new();
        let input = "name:Name; broken ; 0.first:First; tags{}:Tags; size:Size{integer};; color:Color";
        let (rules, diagnostics) = parser.compile(input);

        let targets: Vec<&str> = rules.iter().map(|r| r.target_attribute.as_str()).collect();
        assert_eq!(targets, vec!["Name", "Color"]);

        let indexes: Vec<usize> = diagnostics.iter().map(|d| d.rule_index).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4]);
        assert_eq!(diagnostics[0].rule_text, "broken");
    }

    #[test]
    fn test_index_with_locales_is_rejected() {
        let parser = MappingParser::new();
        assert!(parser.parse_rule("color.x1{de}:Color").is_err());
    }

    #[test]
    fn test_invalid_rule_is_malformed_mapping_rule() {
        let parser = MappingParser::new();
        let err = parser.parse_rule("broken").unwrap_err();

        assert_eq!(err.code(), "MalformedMappingRule");
        assert!(!err.is_fatal());
        let TranslationError::MalformedMappingRule { rule, reason } = &err else {
            panic!("unexpected {:?}", err);
        };
        assert_eq!(rule, "broken");

        let (_, diagnostics) = parser.compile("broken");
        assert_eq!(&diagnostics[0].message, reason);
    }

    #[test]
    fn test_compile_is_idempotent() {
        let parser = MappingParser::new();
        let input = "color.label{de,en}:Color; price.x0:Price{number}";
        assert_eq!(parser.compile(input), parser.compile(input));
    }

    #[test]
    fn test_empty_input() {
        let parser = MappingParser::new();
        let (rules, diagnostics) = parser.compile("  ");
        assert!(rules.is_empty());
        assert!(diagnostics.is_empty());
    }
}
