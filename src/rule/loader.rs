//! 规则文档加载器
//! 负责把调用方提供的 JSON 解析为显式的 RulesInput 判别联合

use std::path::Path;
use log::debug;
use serde_json::Value;

use super::model::{Phase, RuleDocument, RuleItem, RulesInput};
use crate::error::{RstResult, TranslitError};

/// 输入形态判别结果
enum InputShape {
    Document,
    Phases,
    Rules,
}

/// 规则加载器
pub struct RuleLoader;

impl RuleLoader {
    /// 从 JSON 字符串加载规则输入
    pub fn from_json_str(json: &str) -> RstResult<RulesInput> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(value)
    }

    /// 从已解析的 JSON 值加载规则输入
    /// 形态识别仅发生在 JSON 边界（文档格式本身即三种形态）：
    /// - 含 phases 字段的对象 -> 完整文档
    /// - 首元素含 rules 字段的数组 -> 阶段列表
    /// - 首元素含 from 字段的数组 -> 规则列表
    pub fn from_json_value(value: Value) -> RstResult<RulesInput> {
        // 先识别形态，再做一次性类型化反序列化
        let shape = Self::detect_shape(&value)?;
        match shape {
            InputShape::Document => {
                let doc: RuleDocument = serde_json::from_value(value)?;
                Ok(RulesInput::Document(doc))
            }
            InputShape::Phases => {
                let phases: Vec<Phase> = serde_json::from_value(value)?;
                Ok(RulesInput::Phases(phases))
            }
            InputShape::Rules => {
                let rules: Vec<RuleItem> = serde_json::from_value(value)?;
                Ok(RulesInput::Rules(rules))
            }
        }
    }

    /// 识别 JSON 值的输入形态
    fn detect_shape(value: &Value) -> RstResult<InputShape> {
        match value {
            Value::Object(obj) if obj.contains_key("phases") => Ok(InputShape::Document),
            Value::Array(arr) => {
                let first = arr.first().ok_or_else(|| {
                    TranslitError::RuleParseError("规则输入为空数组".to_string())
                })?;
                match first {
                    Value::Object(obj) if obj.contains_key("rules") => Ok(InputShape::Phases),
                    Value::Object(obj) if obj.contains_key("from") => Ok(InputShape::Rules),
                    _ => Err(TranslitError::RuleParseError(
                        "数组首元素既无 rules 也无 from 字段，无法识别输入形态".to_string(),
                    )),
                }
            }
            _ => Err(TranslitError::RuleParseError(
                "规则输入须为含 phases 的对象、阶段数组或规则数组".to_string(),
            )),
        }
    }

    /// 从本地文件加载规则输入
    pub fn from_file<P: AsRef<Path>>(path: P) -> RstResult<RulesInput> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let input = Self::from_json_str(&content)?;
        debug!("规则文件加载成功：{}", path.display());
        Ok(input)
    }
}
