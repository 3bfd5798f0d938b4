//! 规则数据模型定义
//! 仅存储规则文档数据，无任何业务逻辑，支持序列化/反序列化

use std::collections::HashMap;
use std::fmt;
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RstResult, TranslitError};
use crate::options::OptionMap;

/// 转写规则文档（顶层输入）
/// 不变量：至少包含一个阶段（归一化时校验）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 文档级模板变量（变量名 -> 替换文本）
    #[serde(rename = "tplVar", default, skip_serializing_if = "HashMap::is_empty")]
    pub tpl_var: HashMap<String, String>,
    pub phases: Vec<Phase>,
}

/// 阶段：顺序应用的一组规则，附带阶段级模板定义与守卫
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Phase {
    pub rules: Vec<RuleItem>,
    /// 阶段级模板变量（覆盖文档级同名变量）
    #[serde(rename = "tplVar", default, skip_serializing_if = "HashMap::is_empty")]
    pub tpl_var: HashMap<String, String>,
    /// 阶段级模板序列定义
    #[serde(rename = "tplSeq", default, skip_serializing_if = "HashMap::is_empty")]
    pub tpl_seq: HashMap<String, Vec<TplSeqSpan>>,
    /// 命名后处理规则组（供 postRulesRef 复用）
    #[serde(rename = "postRulesDef", default, skip_serializing_if = "HashMap::is_empty")]
    pub post_rules_def: HashMap<String, Vec<SubRuleItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<OptionMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<OptionMap>,
}

/// 单条转写规则
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleItem {
    /// 匹配模式文本（锚定在剩余输入起始处）
    pub from: String,
    /// 替换文本（缺省表示"匹配但原样保留"）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// 后顾约束：对照已产出文本尾部
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    /// 前瞻约束：对照匹配之后的未消费输入
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    /// true 要求已有产出文本，false 要求尚无产出文本
    #[serde(rename = "hasLeft", default, skip_serializing_if = "Option::is_none")]
    pub has_left: Option<bool>,
    /// 尝试匹配所需的最小剩余输入长度（字符数）
    #[serde(rename = "minLength", default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<OptionMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<OptionMap>,
    /// 快速预检：剩余输入指定字符偏移处须等于指定字符
    #[serde(rename = "quickTest", default, skip_serializing_if = "Option::is_none")]
    pub quick_test: Option<Vec<QuickTest>>,
    /// 内联后处理规则
    #[serde(rename = "postRules", default, skip_serializing_if = "Option::is_none")]
    pub post_rules: Option<Vec<SubRuleItem>>,
    /// 引用阶段级 postRulesDef 中的命名规则组
    #[serde(rename = "postRulesRef", default, skip_serializing_if = "Option::is_none")]
    pub post_rules_ref: Option<String>,
    /// 互斥组名 -> 起始偏移（套用到对应组内的后处理规则）
    #[serde(rename = "postRulesStart", default, skip_serializing_if = "Option::is_none")]
    pub post_rules_start: Option<HashMap<String, usize>>,
    #[serde(rename = "postRulesStrategy", default, skip_serializing_if = "Option::is_none")]
    pub post_rules_strategy: Option<PostRulesStrategy>,
}

/// 后处理子规则
/// 与 RuleItem 共享模式/守卫字段，额外携带 start 与 orGroup；
/// 执行期不会递归进入子规则的后处理，因此不建模嵌套 postRules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubRuleItem {
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<OptionMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<OptionMap>,
    /// 在替换文本中的固定起始偏移（字符数，默认0）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    /// 互斥组标签：组内任一规则命中后，本轮其余成员跳过
    #[serde(rename = "orGroup", default, skip_serializing_if = "Option::is_none")]
    pub or_group: Option<String>,
}

/// 后处理执行策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PostRulesStrategy {
    /// 按声明顺序单轮应用（默认）
    #[default]
    #[serde(rename = "inOrder")]
    InOrder,
    /// 反复整轮应用，直到一整轮无新命中
    #[serde(rename = "whileMatch")]
    WhileMatch,
}

/// 快速预检项：JSON 形如 ["a", 0]
/// 含义：剩余输入第 offset 个字符（0起）须等于该字符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickTest(pub char, pub usize);

impl QuickTest {
    /// 对剩余输入执行预检
    #[inline]
    pub fn passes(&self, remaining: &str) -> bool {
        remaining.chars().nth(self.1) == Some(self.0)
    }
}

/// 模板序列区间：JSON 数组形式 ["a"] / ["a","x"] / ["a","x",26]
/// 单区间展开 count 条规则，from/to 起始字符逐码点同步递增；
/// 区间合法性（单字符、count>1 时必须有 to_start）在编译期校验
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TplSeqSpan {
    pub from_start: String,
    pub to_start: Option<String>,
    pub count: Option<usize>,
}

impl Serialize for TplSeqSpan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = match (&self.to_start, &self.count) {
            (_, Some(_)) => 3,
            (Some(_), None) => 2,
            (None, None) => 1,
        };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.from_start)?;
        if len >= 2 {
            // count 存在而 to_start 缺省时，按编译期默认值补齐为 from_start
            let to_start = self.to_start.as_deref().unwrap_or(&self.from_start);
            seq.serialize_element(to_start)?;
        }
        if len >= 3 {
            seq.serialize_element(&self.count)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for TplSeqSpan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpanVisitor;

        impl<'de> Visitor<'de> for SpanVisitor {
            type Value = TplSeqSpan;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a [fromStart, toStart?, count?] array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let from_start: String = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let to_start: Option<String> = seq.next_element()?;
                let count: Option<usize> = seq.next_element()?;
                Ok(TplSeqSpan {
                    from_start,
                    to_start,
                    count,
                })
            }
        }

        deserializer.deserialize_seq(SpanVisitor)
    }
}

/// 规则输入的显式判别联合（API边界）
/// 三种输入形态在此处一次性归一化，不做结构嗅探
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RulesInput {
    /// 完整规则文档
    Document(RuleDocument),
    /// 裸阶段列表
    Phases(Vec<Phase>),
    /// 裸规则列表（归一化为单阶段文档）
    Rules(Vec<RuleItem>),
}

impl RulesInput {
    /// 归一化为规范的单文档形式
    /// 空的阶段/规则列表视为解析错误
    pub fn into_document(self) -> RstResult<RuleDocument> {
        match self {
            RulesInput::Document(doc) => {
                if doc.phases.is_empty() {
                    return Err(TranslitError::RuleParseError(
                        "规则文档不含任何阶段".to_string(),
                    ));
                }
                Ok(doc)
            }
            RulesInput::Phases(phases) => {
                if phases.is_empty() {
                    return Err(TranslitError::RuleParseError(
                        "阶段列表为空".to_string(),
                    ));
                }
                Ok(RuleDocument {
                    phases,
                    ..Default::default()
                })
            }
            RulesInput::Rules(rules) => {
                if rules.is_empty() {
                    return Err(TranslitError::RuleParseError(
                        "规则列表为空".to_string(),
                    ));
                }
                Ok(RuleDocument {
                    phases: vec![Phase {
                        rules,
                        ..Default::default()
                    }],
                    ..Default::default()
                })
            }
        }
    }
}

impl From<RuleDocument> for RulesInput {
    fn from(doc: RuleDocument) -> Self {
        RulesInput::Document(doc)
    }
}

impl From<Vec<Phase>> for RulesInput {
    fn from(phases: Vec<Phase>) -> Self {
        RulesInput::Phases(phases)
    }
}

impl From<Vec<RuleItem>> for RulesInput {
    fn from(rules: Vec<RuleItem>) -> Self {
        RulesInput::Rules(rules)
    }
}
