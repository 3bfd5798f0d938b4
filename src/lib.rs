//! rstranslit - 规则驱动的文本转写引擎
//! 规则文档（阶段 -> 规则 -> 后处理子规则）编译为正则匹配器后，
//! 对输入文本逐阶段执行从左到右的贪心改写

// 导出全局错误类型
pub use self::error::{RstResult, TranslitError};

// 导出选项模块核心接口
pub use self::options::{guards_allow, OptionMap, OptionValue};

// 导出规则模块核心接口
pub use self::rule::{
    Phase, PostRulesStrategy, QuickTest, RuleDocument, RuleItem, RuleLoader, RulesInput,
    SubRuleItem, TplSeqSpan,
};

// 导出编译模块核心接口
pub use self::compiler::{
    CompiledPhase, CompiledPostRules, CompiledRule, CompiledRuleSet, CompiledSubRule,
    RuleCompiler, SeqMarker,
};

// 导出引擎模块核心接口（含一次性转写入口）
pub use self::engine::{translit, TraceItem, Transliterator, TranslitResult};

// 声明所有子模块
pub mod compiler;
pub mod engine;
pub mod error;
pub mod options;
pub mod rule;
pub mod utils;
