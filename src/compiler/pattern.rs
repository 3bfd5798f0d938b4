//! 编译后规则模型
//! 模板展开完毕、模式编译为正则后的运行态结构，仅供引擎消费，不参与序列化

use regex::Regex;

use crate::options::OptionMap;
use crate::rule::model::{PostRulesStrategy, QuickTest};

/// 编译后的规则集（与原始文档阶段一一对应，守卫不通过的阶段在执行期跳过）
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    pub phases: Vec<CompiledPhase>,
}

/// 编译后的阶段
#[derive(Debug, Clone)]
pub struct CompiledPhase {
    pub rules: Vec<CompiledRule>,
    pub when: Option<OptionMap>,
    pub skip: Option<OptionMap>,
}

/// 序列展开标记
/// 展开组在规则列表中连续排列（编译器按构造顺序保证并断言）
#[derive(Debug, Clone)]
pub struct SeqMarker {
    /// 来源模板序列名
    pub name: String,
    /// 是否为展开组首项
    pub first: bool,
    /// 展开组总项数
    pub total: usize,
    /// 本项在组内的序号（0起）
    pub index: usize,
    /// 组级快速预检（仅首项携带，失败跳过整组）
    pub group_tests: Vec<QuickTest>,
}

/// 编译后的单条规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// 模板展开后的模式文本（跟踪记录用）
    pub from_src: String,
    /// 替换模板（分组引用已归一化为 ${n} 形式）
    pub to: Option<String>,
    /// 主匹配器：^(?:from)，锚定剩余输入起始
    pub matcher: Regex,
    /// 后顾匹配器：(?:left)$，锚定已产出文本末尾
    pub left: Option<Regex>,
    /// 前瞻匹配器：^(?:right)，锚定匹配之后的剩余输入
    pub right: Option<Regex>,
    pub has_left: Option<bool>,
    pub min_length: Option<usize>,
    pub when: Option<OptionMap>,
    pub skip: Option<OptionMap>,
    /// 项级快速预检（失败仅跳过本项）
    pub quick_tests: Vec<QuickTest>,
    pub seq: Option<SeqMarker>,
    pub post_rules: Option<CompiledPostRules>,
}

impl CompiledRule {
    /// 本项所属展开组的长度（非序列项视为长度1的组）
    #[inline]
    pub fn group_len(&self) -> usize {
        self.seq.as_ref().map_or(1, |s| s.total)
    }

    /// 本项是否为组首（非序列项即自身为组首）
    #[inline]
    pub fn is_group_start(&self) -> bool {
        self.seq.as_ref().map_or(true, |s| s.first)
    }

    /// 组级快速预检
    #[inline]
    pub fn group_tests_pass(&self, remaining: &str) -> bool {
        match &self.seq {
            Some(seq) => seq.group_tests.iter().all(|qt| qt.passes(remaining)),
            None => true,
        }
    }

    /// 项级快速预检
    #[inline]
    pub fn quick_tests_pass(&self, remaining: &str) -> bool {
        self.quick_tests.iter().all(|qt| qt.passes(remaining))
    }
}

/// 编译后的后处理规则组
#[derive(Debug, Clone)]
pub struct CompiledPostRules {
    pub strategy: PostRulesStrategy,
    pub rules: Vec<CompiledSubRule>,
}

/// 编译后的后处理子规则
#[derive(Debug, Clone)]
pub struct CompiledSubRule {
    pub from_src: String,
    pub to: Option<String>,
    /// 非锚定匹配器（默认策略在 start 后缀内匹配，whileMatch 全文匹配）
    pub matcher: Regex,
    pub when: Option<OptionMap>,
    pub skip: Option<OptionMap>,
    pub start: Option<usize>,
    pub or_group: Option<String>,
    pub seq: Option<SeqMarker>,
}

// 单元测试
#[cfg(test)]
mod tests {
    use super::*;

    fn rule(matcher: &str) -> CompiledRule {
        CompiledRule {
            from_src: matcher.to_string(),
            to: None,
            matcher: Regex::new(matcher).unwrap(),
            left: None,
            right: None,
            has_left: None,
            min_length: None,
            when: None,
            skip: None,
            quick_tests: Vec::new(),
            seq: None,
            post_rules: None,
        }
    }

    #[test]
    fn test_non_seq_rule_is_own_group() {
        // 测试场景：非序列项视为长度1的组首
        let r = rule("^a");
        assert!(r.is_group_start());
        assert_eq!(r.group_len(), 1);
        assert!(r.group_tests_pass("anything"));
    }

    #[test]
    fn test_quick_tests_gate_rule() {
        // 测试场景：项级预检失败即拦截
        let mut r = rule("^ab");
        r.quick_tests = vec![QuickTest('a', 0), QuickTest('b', 1)];
        assert!(r.quick_tests_pass("abc"));
        assert!(!r.quick_tests_pass("acb"));
        assert!(!r.quick_tests_pass(""));
    }

    #[test]
    fn test_group_tests_on_seq_head() {
        // 测试场景：组级预检仅依附于序列标记
        let mut r = rule("^x");
        r.seq = Some(SeqMarker {
            name: "#S#".to_string(),
            first: true,
            total: 3,
            index: 0,
            group_tests: vec![QuickTest('x', 1)],
        });
        assert_eq!(r.group_len(), 3);
        assert!(r.group_tests_pass("axb"));
        assert!(!r.group_tests_pass("abx"));
    }
}
