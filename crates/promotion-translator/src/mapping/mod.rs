//! 属性映射 DSL
//!
//! 将商业平台的嵌套属性投影为促销引擎的扁平类型化属性：
//! - `parser`：把配置字符串编译为有序规则集，附带诊断
//! - `evaluator`：对源数据树求值规则集

pub mod evaluator;
pub mod models;
pub mod parser;

pub use evaluator::AttributeEvaluator;
pub use models::{Diagnostic, MappingRule, MappingRuleSet, PathSegment, ValueKind};
pub use parser::MappingParser;
