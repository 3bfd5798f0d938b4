//! 转写引擎：阶段执行、规则匹配、后处理与公共入口

pub mod executor;
pub(crate) mod matcher;
pub(crate) mod post_rules;
pub mod result;

pub use executor::Transliterator;
pub use result::{TraceItem, TranslitResult};

use std::time::Instant;

use crate::compiler::RuleCompiler;
use crate::error::RstResult;
use crate::options::OptionMap;
use crate::rule::model::RulesInput;

/// 一次性转写入口
///
/// # 参数
/// - `source`: 待转写文本；空或全空白时直接短路返回，不触发编译
/// - `rules`: 规则输入（完整文档 / 阶段列表 / 规则列表）
/// - `options`: 调用方选项，供全部 when/skip 守卫在执行期对照
/// - `trace`: 开启后结果携带逐命中跟踪
///
/// # 错误
/// 编译期错误（文档形态、模板循环、序列定义、正则语法）原样向上传播；
/// 编译通过后匹配本身没有失败路径，未命中位置一律原样透传
pub fn translit<R: Into<RulesInput>>(
    source: &str,
    rules: R,
    options: Option<&OptionMap>,
    trace: bool,
) -> RstResult<TranslitResult> {
    let started = Instant::now();

    if source.trim().is_empty() {
        return Ok(TranslitResult {
            output_text: source.to_string(),
            replaced: false,
            duration: started.elapsed(),
            traces: trace.then(Vec::new),
        });
    }

    let compiled = RuleCompiler::compile(rules)?;
    let default_options = OptionMap::new();
    Ok(executor::run_phases(
        source,
        &compiled,
        options.unwrap_or(&default_options),
        trace,
        started,
    ))
}
