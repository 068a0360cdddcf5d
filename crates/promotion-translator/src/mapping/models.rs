//! 属性映射数据模型

use std::fmt;
use std::str::FromStr;

/// 目标属性的值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueKind {
    #[default]
    String,
    Strings,
    Number,
    Numbers,
    Boolean,
    Date,
    Dates,
    Time,
    Location,
    Locations,
}

impl ValueKind {
    /// 复数类型产出数组
    pub fn is_plural(&self) -> bool {
        matches!(
            self,
            Self::Strings | Self::Numbers | Self::Dates | Self::Locations
        )
    }

    /// 对应的单值类型
    pub fn element(&self) -> ValueKind {
        match self {
            Self::Strings => Self::String,
            Self::Numbers => Self::Number,
            Self::Dates => Self::Date,
            Self::Locations => Self::Location,
            other => *other,
        }
    }

    /// 以字符串表示的类型，本地化字段可回退到默认语言
    pub fn is_string_like(&self) -> bool {
        !matches!(self.element(), Self::Number | Self::Boolean)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Strings => "strings",
            Self::Number => "number",
            Self::Numbers => "numbers",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Dates => "dates",
            Self::Time => "time",
            Self::Location => "location",
            Self::Locations => "locations",
        }
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "string" => Self::String,
            "strings" => Self::Strings,
            "number" => Self::Number,
            "numbers" => Self::Numbers,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "dates" => Self::Dates,
            "time" => Self::Time,
            "location" => Self::Location,
            "locations" => Self::Locations,
            other => return Err(format!("未知的值类型: {}", other)),
        };
        Ok(kind)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 源路径中的一段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// 对象字段（也用于直接选择单个语言，如 `name.de`）
    Field(String),
    /// 数组下标
    Index(usize),
    /// 语言偏好列表，取第一个存在的语言
    Locales(Vec<String>),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(index) => write!(f, "x{}", index),
            Self::Locales(locales) => write!(f, "{{{}}}", locales.join(",")),
        }
    }
}

/// 编译后的映射规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    /// 非空，第一段总是 `Field`
    pub source_path: Vec<PathSegment>,
    pub target_attribute: String,
    pub value_kind: ValueKind,
}

impl fmt::Display for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.source_path {
            match segment {
                PathSegment::Locales(_) => {}
                _ if first => {}
                _ => f.write_str(".")?,
            }
            write!(f, "{}", segment)?;
            first = false;
        }
        write!(f, ":{}{{{}}}", self.target_attribute, self.value_kind)
    }
}

/// 有序规则集，顺序即求值顺序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingRuleSet {
    rules: Vec<MappingRule>,
}

impl MappingRuleSet {
    pub fn new(rules: Vec<MappingRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.iter()
    }
}

/// 编译期诊断：被丢弃的规则及原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 规则在配置字符串中的序号（从 0 开始，空规则也计数）
    pub rule_index: usize,
    pub rule_text: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "规则 #{} `{}`: {}",
            self.rule_index, self.rule_text, self.message
        )
    }
}
