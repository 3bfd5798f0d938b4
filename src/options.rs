//! 调用方选项与 when/skip 守卫求值
//! 规则文档中的 when/skip 守卫在执行期对照调用方选项求值，编译期不参与

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// 选项值：布尔或字符串
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Text(String),
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Text(v)
    }
}

/// 选项名 -> 选项值映射（when/skip 守卫与调用方选项共用）
pub type OptionMap = HashMap<String, OptionValue>;

/// when/skip 守卫求值
/// - when：列出的每个选项名都必须在调用方选项中取到相同值，否则不通过
/// - skip：任一列出的选项名在调用方选项中取到相同值，即不通过
pub fn guards_allow(
    when: Option<&OptionMap>,
    skip: Option<&OptionMap>,
    options: &OptionMap,
) -> bool {
    if let Some(when) = when {
        for (name, expected) in when {
            if options.get(name) != Some(expected) {
                return false;
            }
        }
    }
    if let Some(skip) = skip {
        for (name, forbidden) in skip {
            if options.get(name) == Some(forbidden) {
                return false;
            }
        }
    }
    true
}
