//! 规则模块：数据模型 + 加载器
pub mod loader;
pub mod model;

pub use loader::RuleLoader;
pub use model::{
    Phase, PostRulesStrategy, QuickTest, RuleDocument, RuleItem, RulesInput, SubRuleItem,
    TplSeqSpan,
};
