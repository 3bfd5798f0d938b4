//! 规则编译器核心
//! 归一化输入 -> 解析模板变量 -> 展开模板序列 -> 编译正则匹配器
//! 每个规则文档编译一次，产出供引擎直接消费的 CompiledRuleSet

use std::collections::HashMap;
use std::time::Instant;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use regex_syntax::hir::HirKind;

use super::pattern::{
    CompiledPhase, CompiledPostRules, CompiledRule, CompiledRuleSet, CompiledSubRule, SeqMarker,
};
use super::tpl::{self, ResolvedTplVars};
use crate::error::{RstResult, TranslitError};
use crate::rule::model::{Phase, QuickTest, RuleItem, RulesInput, SubRuleItem, TplSeqSpan};

/// 分组引用归一化：\1 形式改写为 ${1} 形式
static BACKSLASH_GROUP_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(\d+)").unwrap());

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 编译规则输入
    pub fn compile<R: Into<RulesInput>>(input: R) -> RstResult<CompiledRuleSet> {
        let start = Instant::now();

        // 1. 归一化为规范文档形式
        let doc = input.into().into_document()?;

        // 2. 解析文档级模板变量（文档级循环引用在此提前暴露）
        let global_vars = tpl::resolve_tpl_vars(&doc.tpl_var)?;

        // 3. 逐阶段编译
        let mut stats = CompileStats::default();
        let mut phases = Vec::with_capacity(doc.phases.len());
        for phase in &doc.phases {
            phases.push(Self::compile_phase(
                phase,
                &doc.tpl_var,
                &global_vars,
                &mut stats,
            )?);
        }
        stats.phases = phases.len();

        debug!(
            "规则编译完成：阶段{}个、规则{}条（序列展开{}条）、后处理规则{}条，耗时{:?}",
            stats.phases,
            stats.rules,
            stats.seq_expanded,
            stats.post_rules,
            start.elapsed()
        );

        Ok(CompiledRuleSet { phases })
    }

    /// 编译单个阶段
    fn compile_phase(
        phase: &Phase,
        global_raw: &HashMap<String, String>,
        global_resolved: &ResolvedTplVars,
        stats: &mut CompileStats,
    ) -> RstResult<CompiledPhase> {
        // 阶段级变量合并：原始表合并后整体重解析，保证阶段级覆盖在链式引用中同样生效
        let local_resolved;
        let vars: &ResolvedTplVars = if phase.tpl_var.is_empty() {
            global_resolved
        } else {
            local_resolved = tpl::resolve_tpl_vars(&tpl::merge_tpl_vars(global_raw, &phase.tpl_var))?;
            &local_resolved
        };

        let mut rules = Vec::new();
        for item in &phase.rules {
            Self::compile_rule_item(item, phase, vars, &mut rules, stats)?;
        }
        stats.rules += rules.len();

        Ok(CompiledPhase {
            rules,
            when: phase.when.clone(),
            skip: phase.skip.clone(),
        })
    }

    /// 编译单条规则（序列项展开为连续的具体规则组）
    fn compile_rule_item(
        item: &RuleItem,
        phase: &Phase,
        vars: &ResolvedTplVars,
        out: &mut Vec<CompiledRule>,
        stats: &mut CompileStats,
    ) -> RstResult<()> {
        // 1. 模板变量替换
        let from = tpl::substitute(&item.from, vars);
        let to = tpl::substitute_opt(&item.to, vars);
        let left = tpl::substitute_opt(&item.left, vars);
        let right = tpl::substitute_opt(&item.right, vars);

        // 2. 后处理规则组解析（内联或命名引用，深拷贝避免跨规则共享）
        let post_rules = Self::resolve_post_rules(item, phase, vars, stats)?;

        // 3. 序列展开或单项编译
        match Self::find_seq(&from, phase) {
            Some((name, spans)) => {
                let to_text = to
                    .as_ref()
                    .ok_or_else(|| TranslitError::TplSeqMissingTo(name.to_string()))?;
                if !to_text.contains(name) {
                    return Err(TranslitError::TplSeqNotInTo(name.to_string()));
                }

                let pairs = tpl::expand_seq_pairs(name, spans)?;
                let total = pairs.len();
                let group_tests = item.quick_test.clone().unwrap_or_default();
                let base = out.len();

                for (index, (from_ch, to_ch)) in pairs.into_iter().enumerate() {
                    let concrete_from = from.replace(name, &from_ch.to_string());
                    let concrete_to = to_text.replace(name, &to_ch.to_string());
                    let mut rule = Self::compile_single(
                        item,
                        concrete_from,
                        Some(concrete_to),
                        left.clone(),
                        right.clone(),
                        post_rules.clone(),
                        Vec::new(),
                    )?;
                    rule.seq = Some(SeqMarker {
                        name: name.to_string(),
                        first: index == 0,
                        total,
                        index,
                        group_tests: if index == 0 {
                            group_tests.clone()
                        } else {
                            Vec::new()
                        },
                    });
                    out.push(rule);
                }
                stats.seq_expanded += total;

                // 展开组必须连续且序号递增，匹配器的整组跳过依赖该构造不变量
                debug_assert!(out[base..].iter().enumerate().all(|(i, r)| {
                    r.seq
                        .as_ref()
                        .map_or(false, |s| s.index == i && s.total == total && s.name == name)
                }));
            }
            None => {
                let quick_tests = item.quick_test.clone().unwrap_or_default();
                out.push(Self::compile_single(
                    item, from, to, left, right, post_rules, quick_tests,
                )?);
            }
        }
        Ok(())
    }

    /// 编译单条具体规则（模板均已展开）
    fn compile_single(
        item: &RuleItem,
        from: String,
        to: Option<String>,
        left: Option<String>,
        right: Option<String>,
        post_rules: Option<CompiledPostRules>,
        mut quick_tests: Vec<QuickTest>,
    ) -> RstResult<CompiledRule> {
        let matcher = Regex::new(&format!("^(?:{})", from))?;
        let left = match left {
            Some(l) => Some(Regex::new(&format!("(?:{})$", l))?),
            None => None,
        };
        let right = match right {
            Some(r) => Some(Regex::new(&format!("^(?:{})", r))?),
            None => None,
        };

        // 未声明预检且模式恰为单个字面字符时，自动合成单字符预检
        if quick_tests.is_empty() {
            if let Some(ch) = Self::literal_single_char(&from) {
                quick_tests.push(QuickTest(ch, 0));
            }
        }

        Ok(CompiledRule {
            from_src: from,
            to: to.map(|t| Self::normalize_group_refs(&t)),
            matcher,
            left,
            right,
            has_left: item.has_left,
            min_length: item.min_length,
            when: item.when.clone(),
            skip: item.skip.clone(),
            quick_tests,
            seq: None,
            post_rules,
        })
    }

    /// 解析规则的后处理规则组
    fn resolve_post_rules(
        item: &RuleItem,
        phase: &Phase,
        vars: &ResolvedTplVars,
        stats: &mut CompileStats,
    ) -> RstResult<Option<CompiledPostRules>> {
        // 内联优先，其次命名引用的深拷贝
        let mut raw: Vec<SubRuleItem> = if let Some(inline) = &item.post_rules {
            inline.clone()
        } else if let Some(name) = &item.post_rules_ref {
            phase.post_rules_def.get(name).cloned().ok_or_else(|| {
                TranslitError::RuleParseError(format!(
                    "postRulesRef 引用的命名规则组不存在：{}",
                    name
                ))
            })?
        } else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }

        // 按互斥组套用声明的起始偏移
        if let Some(starts) = &item.post_rules_start {
            for sub in raw.iter_mut() {
                if let Some(group) = &sub.or_group {
                    if let Some(start) = starts.get(group) {
                        sub.start = Some(*start);
                    }
                }
            }
        }

        let mut rules = Vec::new();
        for sub in &raw {
            Self::compile_sub_rule(sub, phase, vars, &mut rules)?;
        }
        stats.post_rules += rules.len();

        Ok(Some(CompiledPostRules {
            strategy: item.post_rules_strategy.unwrap_or_default(),
            rules,
        }))
    }

    /// 编译后处理子规则（与顶层规则同样做变量替换与序列展开，模式不锚定）
    fn compile_sub_rule(
        sub: &SubRuleItem,
        phase: &Phase,
        vars: &ResolvedTplVars,
        out: &mut Vec<CompiledSubRule>,
    ) -> RstResult<()> {
        let from = tpl::substitute(&sub.from, vars);
        let to = tpl::substitute_opt(&sub.to, vars);

        match Self::find_seq(&from, phase) {
            Some((name, spans)) => {
                let to_text = to
                    .as_ref()
                    .ok_or_else(|| TranslitError::TplSeqMissingTo(name.to_string()))?;
                if !to_text.contains(name) {
                    return Err(TranslitError::TplSeqNotInTo(name.to_string()));
                }

                let pairs = tpl::expand_seq_pairs(name, spans)?;
                let total = pairs.len();
                for (index, (from_ch, to_ch)) in pairs.into_iter().enumerate() {
                    let concrete_from = from.replace(name, &from_ch.to_string());
                    let concrete_to = to_text.replace(name, &to_ch.to_string());
                    out.push(CompiledSubRule {
                        matcher: Regex::new(&concrete_from)?,
                        from_src: concrete_from,
                        to: Some(Self::normalize_group_refs(&concrete_to)),
                        when: sub.when.clone(),
                        skip: sub.skip.clone(),
                        start: sub.start,
                        or_group: sub.or_group.clone(),
                        seq: Some(SeqMarker {
                            name: name.to_string(),
                            first: index == 0,
                            total,
                            index,
                            group_tests: Vec::new(),
                        }),
                    });
                }
            }
            None => {
                out.push(CompiledSubRule {
                    matcher: Regex::new(&from)?,
                    from_src: from,
                    to: to.map(|t| Self::normalize_group_refs(&t)),
                    when: sub.when.clone(),
                    skip: sub.skip.clone(),
                    start: sub.start,
                    or_group: sub.or_group.clone(),
                    seq: None,
                });
            }
        }
        Ok(())
    }

    /// 在已替换的模式文本中查找模板序列名
    /// 名称排序后取首个命中，保证结果确定（单条规则至多使用一个序列）
    fn find_seq<'a>(from: &str, phase: &'a Phase) -> Option<(&'a str, &'a [TplSeqSpan])> {
        if phase.tpl_seq.is_empty() {
            return None;
        }
        let mut names: Vec<&String> = phase.tpl_seq.keys().collect();
        names.sort_unstable();
        names
            .into_iter()
            .find(|name| from.contains(name.as_str()))
            .map(|name| (name.as_str(), phase.tpl_seq[name].as_slice()))
    }

    /// 归一化替换模板中的分组引用：\1 -> ${1}（$1 形式原样保留）
    fn normalize_group_refs(to: &str) -> String {
        BACKSLASH_GROUP_REF.replace_all(to, "$${$1}").to_string()
    }

    /// 判断模式是否恰为单个字面字符（快速预检合成用）
    fn literal_single_char(pattern: &str) -> Option<char> {
        let hir = regex_syntax::Parser::new().parse(pattern).ok()?;
        match hir.kind() {
            HirKind::Literal(lit) => {
                let text = std::str::from_utf8(&lit.0).ok()?;
                let mut chars = text.chars();
                let c = chars.next()?;
                chars.next().is_none().then_some(c)
            }
            _ => None,
        }
    }
}

/// 编译统计信息
#[derive(Debug, Clone, Default)]
struct CompileStats {
    phases: usize,
    rules: usize,
    seq_expanded: usize,
    post_rules: usize,
}

// 单元测试
#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::model::{PostRulesStrategy, RuleDocument};

    fn doc_from_json(json: &str) -> RuleDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_compile_bare_rule_list() {
        // 测试场景：裸规则列表归一化为单阶段并锚定编译
        let compiled = RuleCompiler::compile(vec![RuleItem {
            from: "ab".to_string(),
            to: Some("x".to_string()),
            ..Default::default()
        }])
        .unwrap();
        assert_eq!(compiled.phases.len(), 1);
        assert_eq!(compiled.phases[0].rules[0].matcher.as_str(), "^(?:ab)");
    }

    #[test]
    fn test_tpl_var_substitution_in_patterns() {
        // 测试场景：#A# -> xyz 替换进 from，编译为匹配字面 xyz
        let doc = doc_from_json(
            r##"{
                "tplVar": {"#A#": "xyz"},
                "phases": [{"rules": [{"from": "#A#", "to": "q"}]}]
            }"##,
        );
        let compiled = RuleCompiler::compile(doc).unwrap();
        let rule = &compiled.phases[0].rules[0];
        assert_eq!(rule.from_src, "xyz");
        assert!(rule.matcher.is_match("xyz-tail"));
        assert!(!rule.matcher.is_match("a-xyz"));
    }

    #[test]
    fn test_circular_tpl_var_fails() {
        // 测试场景：互引用变量编译期报循环错误
        let doc = doc_from_json(
            r##"{
                "tplVar": {"#A#": "#B#", "#B#": "#A#"},
                "phases": [{"rules": [{"from": "#A#"}]}]
            }"##,
        );
        assert!(matches!(
            RuleCompiler::compile(doc).unwrap_err(),
            TranslitError::CircularTplVar(_)
        ));
    }

    #[test]
    fn test_phase_local_tpl_var_overrides() {
        // 测试场景：阶段级变量覆盖文档级同名变量
        let doc = doc_from_json(
            r##"{
                "tplVar": {"#A#": "doc"},
                "phases": [
                    {"rules": [{"from": "#A#"}], "tplVar": {"#A#": "phase"}},
                    {"rules": [{"from": "#A#"}]}
                ]
            }"##,
        );
        let compiled = RuleCompiler::compile(doc).unwrap();
        assert_eq!(compiled.phases[0].rules[0].from_src, "phase");
        assert_eq!(compiled.phases[1].rules[0].from_src, "doc");
    }

    #[test]
    fn test_seq_expansion_digits() {
        // 测试场景：#N# 序列展开为 0..9 十条具体规则
        let doc = doc_from_json(
            r##"{
                "phases": [{
                    "rules": [{"from": "#N#", "to": "digit-#N#"}],
                    "tplSeq": {"#N#": [["0", "0", 10]]}
                }]
            }"##,
        );
        let compiled = RuleCompiler::compile(doc).unwrap();
        let rules = &compiled.phases[0].rules;
        assert_eq!(rules.len(), 10);
        assert_eq!(rules[0].from_src, "0");
        assert_eq!(rules[0].to.as_deref(), Some("digit-0"));
        assert_eq!(rules[9].from_src, "9");
        assert_eq!(rules[9].to.as_deref(), Some("digit-9"));

        // 展开标记：首项、总数、序号
        let seq0 = rules[0].seq.as_ref().unwrap();
        assert!(seq0.first);
        assert_eq!(seq0.total, 10);
        let seq9 = rules[9].seq.as_ref().unwrap();
        assert!(!seq9.first);
        assert_eq!(seq9.index, 9);

        // 单字符模式自动合成项级预检
        assert_eq!(rules[3].quick_tests, vec![QuickTest('3', 0)]);
    }

    #[test]
    fn test_seq_requires_to_containing_name() {
        // 测试场景：序列项缺 to / to 不含序列名均报错
        let missing_to = doc_from_json(
            r##"{
                "phases": [{
                    "rules": [{"from": "#N#"}],
                    "tplSeq": {"#N#": [["0", "0", 3]]}
                }]
            }"##,
        );
        assert!(matches!(
            RuleCompiler::compile(missing_to).unwrap_err(),
            TranslitError::TplSeqMissingTo(name) if name == "#N#"
        ));

        let not_in_to = doc_from_json(
            r##"{
                "phases": [{
                    "rules": [{"from": "#N#", "to": "fixed"}],
                    "tplSeq": {"#N#": [["0", "0", 3]]}
                }]
            }"##,
        );
        assert!(matches!(
            RuleCompiler::compile(not_in_to).unwrap_err(),
            TranslitError::TplSeqNotInTo(name) if name == "#N#"
        ));
    }

    #[test]
    fn test_quick_test_synthesis_single_literal_only() {
        // 测试场景：仅单字面字符模式合成预检，多字符/元字符模式不合成
        let compiled = RuleCompiler::compile(vec![
            RuleItem {
                from: "a".to_string(),
                ..Default::default()
            },
            RuleItem {
                from: "ab".to_string(),
                ..Default::default()
            },
            RuleItem {
                from: "[xy]".to_string(),
                ..Default::default()
            },
        ])
        .unwrap();
        let rules = &compiled.phases[0].rules;
        assert_eq!(rules[0].quick_tests, vec![QuickTest('a', 0)]);
        assert!(rules[1].quick_tests.is_empty());
        assert!(rules[2].quick_tests.is_empty());
    }

    #[test]
    fn test_authored_quick_tests_kept() {
        // 测试场景：声明的预检原样保留，不再合成
        let compiled = RuleCompiler::compile(vec![RuleItem {
            from: "a".to_string(),
            quick_test: Some(vec![QuickTest('a', 0), QuickTest('b', 1)]),
            ..Default::default()
        }])
        .unwrap();
        assert_eq!(
            compiled.phases[0].rules[0].quick_tests,
            vec![QuickTest('a', 0), QuickTest('b', 1)]
        );
    }

    #[test]
    fn test_group_ref_normalization() {
        // 测试场景：\1 归一化为 ${1}，$1 原样保留
        let compiled = RuleCompiler::compile(vec![
            RuleItem {
                from: "(a)(b)".to_string(),
                to: Some("\\2\\1".to_string()),
                ..Default::default()
            },
            RuleItem {
                from: "(c)".to_string(),
                to: Some("$1!".to_string()),
                ..Default::default()
            },
        ])
        .unwrap();
        let rules = &compiled.phases[0].rules;
        assert_eq!(rules[0].to.as_deref(), Some("${2}${1}"));
        assert_eq!(rules[1].to.as_deref(), Some("$1!"));
    }

    #[test]
    fn test_post_rules_ref_resolution() {
        // 测试场景：postRulesRef 解析命名规则组；postRulesStart 按互斥组套用偏移
        let doc = doc_from_json(
            r#"{
                "phases": [{
                    "rules": [{
                        "from": "a",
                        "to": "bcd",
                        "postRulesRef": "cleanup",
                        "postRulesStart": {"g1": 2}
                    }],
                    "postRulesDef": {
                        "cleanup": [
                            {"from": "b", "to": "B", "orGroup": "g1"},
                            {"from": "c", "to": "C"}
                        ]
                    }
                }]
            }"#,
        );
        let compiled = RuleCompiler::compile(doc).unwrap();
        let post = compiled.phases[0].rules[0].post_rules.as_ref().unwrap();
        assert_eq!(post.strategy, PostRulesStrategy::InOrder);
        assert_eq!(post.rules.len(), 2);
        assert_eq!(post.rules[0].start, Some(2));
        assert_eq!(post.rules[0].or_group.as_deref(), Some("g1"));
        assert_eq!(post.rules[1].start, None);
        // 子规则模式不锚定
        assert_eq!(post.rules[1].matcher.as_str(), "c");
    }

    #[test]
    fn test_unknown_post_rules_ref_fails() {
        // 测试场景：引用不存在的命名规则组报解析错误
        let doc = doc_from_json(
            r#"{
                "phases": [{
                    "rules": [{"from": "a", "to": "b", "postRulesRef": "nope"}]
                }]
            }"#,
        );
        assert!(matches!(
            RuleCompiler::compile(doc).unwrap_err(),
            TranslitError::RuleParseError(_)
        ));
    }

    #[test]
    fn test_sub_rule_seq_expansion() {
        // 测试场景：后处理子规则同样做序列展开
        let doc = doc_from_json(
            r##"{
                "phases": [{
                    "rules": [{
                        "from": "x",
                        "to": "012",
                        "postRules": [{"from": "#N#", "to": "<#N#>"}]
                    }],
                    "tplSeq": {"#N#": [["0", "0", 3]]}
                }]
            }"##,
        );
        let compiled = RuleCompiler::compile(doc).unwrap();
        let post = compiled.phases[0].rules[0].post_rules.as_ref().unwrap();
        assert_eq!(post.rules.len(), 3);
        assert_eq!(post.rules[1].from_src, "1");
        assert_eq!(post.rules[1].to.as_deref(), Some("<1>"));
    }

    #[test]
    fn test_invalid_regex_propagates() {
        // 测试场景：非法模式透传正则编译错误
        let err = RuleCompiler::compile(vec![RuleItem {
            from: "(unclosed".to_string(),
            ..Default::default()
        }])
        .unwrap_err();
        assert!(matches!(err, TranslitError::RegexCompileError(_)));
    }
}
