//! 阶段执行器：按声明顺序应用各阶段，聚合改写标记、耗时与跟踪

use std::time::Instant;
use log::debug;

use crate::compiler::pattern::CompiledRuleSet;
use crate::compiler::RuleCompiler;
use crate::engine::matcher::apply_rule_items;
use crate::engine::result::TranslitResult;
use crate::error::RstResult;
use crate::options::{guards_allow, OptionMap};
use crate::rule::model::RulesInput;

/// 按序执行全部阶段
/// - 阶段守卫不满足则整阶段跳过
/// - replaced 标记在首次文本变化时置位，此后保持
/// - 某阶段产出空文本时立即终止后续阶段
pub(crate) fn run_phases(
    text: &str,
    compiled: &CompiledRuleSet,
    options: &OptionMap,
    trace: bool,
    started: Instant,
) -> TranslitResult {
    let mut traces = trace.then(Vec::new);
    let mut current = text.to_string();
    let mut replaced = false;

    for (phase_index, phase) in compiled.phases.iter().enumerate() {
        if !guards_allow(phase.when.as_ref(), phase.skip.as_ref(), options) {
            debug!("阶段{}守卫不满足，跳过", phase_index);
            continue;
        }

        let next = apply_rule_items(&current, phase, options, traces.as_mut());
        if !replaced && next != current {
            replaced = true;
        }
        current = next;

        if current.is_empty() {
            debug!("阶段{}产出空文本，终止后续阶段", phase_index);
            break;
        }
    }

    TranslitResult {
        output_text: current,
        replaced,
        duration: started.elapsed(),
        traces,
    }
}

/// 可复用转写器：规则文档编译一次，对多个输入反复应用
/// 编译结果构造后不再变更，可安全跨线程共享
#[derive(Debug, Clone)]
pub struct Transliterator {
    compiled: CompiledRuleSet,
}

impl Transliterator {
    /// 编译规则输入，构造转写器
    pub fn new<R: Into<RulesInput>>(rules: R) -> RstResult<Self> {
        Ok(Self {
            compiled: RuleCompiler::compile(rules)?,
        })
    }

    /// 对单个输入执行转写
    /// 空白输入直接短路返回，不进入阶段执行
    pub fn apply(
        &self,
        text: &str,
        options: Option<&OptionMap>,
        trace: bool,
    ) -> TranslitResult {
        let started = Instant::now();

        if text.trim().is_empty() {
            return TranslitResult {
                output_text: text.to_string(),
                replaced: false,
                duration: started.elapsed(),
                traces: trace.then(Vec::new),
            };
        }

        let default_options = OptionMap::new();
        run_phases(
            text,
            &self.compiled,
            options.unwrap_or(&default_options),
            trace,
            started,
        )
    }
}

// 单元测试
#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionValue;
    use crate::rule::model::RuleDocument;

    fn doc(json: &str) -> RuleDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_phases_run_in_order() {
        // 测试场景：后一阶段消费前一阶段的产出
        let tr = Transliterator::new(doc(
            r#"{"phases": [
                {"rules": [{"from": "a", "to": "b"}]},
                {"rules": [{"from": "bb", "to": "c"}]}
            ]}"#,
        ))
        .unwrap();
        let result = tr.apply("ab", None, false);
        // 阶段1：ab -> bb；阶段2：bb -> c
        assert_eq!(result.output_text, "c");
        assert!(result.replaced);
    }

    #[test]
    fn test_replaced_flag_latches() {
        // 测试场景：无规则命中时 replaced 保持 false
        let tr = Transliterator::new(doc(
            r#"{"phases": [{"rules": [{"from": "z", "to": "q"}]}]}"#,
        ))
        .unwrap();
        let result = tr.apply("abc", None, false);
        assert_eq!(result.output_text, "abc");
        assert!(!result.replaced);
    }

    #[test]
    fn test_phase_guards_skip_phase() {
        // 测试场景：when 不满足整阶段跳过；skip 命中整阶段跳过
        let tr = Transliterator::new(doc(
            r#"{"phases": [
                {"rules": [{"from": "a", "to": "1"}], "when": {"mode": "x"}},
                {"rules": [{"from": "a", "to": "2"}], "skip": {"fast": true}}
            ]}"#,
        ))
        .unwrap();

        // 无选项：阶段1的when不满足；阶段2无skip命中，执行
        let result = tr.apply("a", None, false);
        assert_eq!(result.output_text, "2");

        // mode=x 且 fast=true：阶段1执行，阶段2跳过
        let opts: OptionMap = [
            ("mode".to_string(), OptionValue::from("x")),
            ("fast".to_string(), OptionValue::from(true)),
        ]
        .into_iter()
        .collect();
        let result = tr.apply("a", Some(&opts), false);
        assert_eq!(result.output_text, "1");
    }

    #[test]
    fn test_empty_output_short_circuits_phases() {
        // 测试场景：某阶段产出空文本后，后续阶段不再执行
        let tr = Transliterator::new(doc(
            r#"{"phases": [
                {"rules": [{"from": "a+", "to": ""}]},
                {"rules": [{"from": "x", "to": "y"}]}
            ]}"#,
        ))
        .unwrap();
        let result = tr.apply("aaa", None, false);
        assert_eq!(result.output_text, "");
        assert!(result.replaced);
    }

    #[test]
    fn test_transliterator_reusable_across_inputs() {
        // 测试场景：同一编译结果对多个输入复用
        let tr = Transliterator::new(doc(
            r#"{"phases": [{"rules": [{"from": "a", "to": "b"}]}]}"#,
        ))
        .unwrap();
        assert_eq!(tr.apply("banana", None, false).output_text, "bbnbnb");
        assert_eq!(tr.apply("cat", None, false).output_text, "cbt");
        assert_eq!(tr.apply("zzz", None, false).output_text, "zzz");
    }

    #[test]
    fn test_whitespace_input_short_circuits() {
        // 测试场景：空白输入原样返回且 replaced=false
        let tr = Transliterator::new(doc(
            r#"{"phases": [{"rules": [{"from": " ", "to": "_"}]}]}"#,
        ))
        .unwrap();
        let result = tr.apply("   ", None, false);
        assert_eq!(result.output_text, "   ");
        assert!(!result.replaced);
    }
}
