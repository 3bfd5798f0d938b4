//! 编译模块：模板展开 + 规则编译
pub mod compiler;
pub mod pattern;
pub(crate) mod tpl;

pub use compiler::RuleCompiler;
pub use pattern::{
    CompiledPhase, CompiledPostRules, CompiledRule, CompiledRuleSet, CompiledSubRule, SeqMarker,
};
