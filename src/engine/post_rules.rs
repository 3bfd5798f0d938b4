//! 后处理（子规则）引擎
//! 对顶层规则刚产出的替换文本执行二次改写：
//! - 默认策略按声明顺序单轮应用，后续子规则看到累计结果
//! - whileMatch 策略反复整轮应用，直到一整轮无新命中

use log::warn;
use rustc_hash::FxHashSet;

use crate::compiler::pattern::{CompiledPostRules, CompiledSubRule};
use crate::engine::result::{TraceItem, TRACE_INPUT_CLIP};
use crate::options::{guards_allow, OptionMap};
use crate::rule::model::PostRulesStrategy;
use crate::utils::clip;

/// whileMatch 轮次上限（正常规则组远低于此值，仅防御病态输入）
const WHILE_MATCH_MAX_PASSES: usize = 1000;

/// 对替换文本应用后处理规则组，返回改写后的文本
/// 无子规则命中时返回原文本；命中的子规则向父级跟踪记录追加嵌套条目
pub(crate) fn apply_sub_rule_items(
    text: &str,
    post: &CompiledPostRules,
    options: &OptionMap,
    trace: Option<&mut Vec<TraceItem>>,
) -> String {
    match post.strategy {
        PostRulesStrategy::InOrder => apply_in_order(text, &post.rules, options, trace),
        PostRulesStrategy::WhileMatch => apply_while_match(text, &post.rules, options, trace),
    }
}

/// 默认策略：按声明顺序单轮应用
fn apply_in_order(
    text: &str,
    rules: &[CompiledSubRule],
    options: &OptionMap,
    mut trace: Option<&mut Vec<TraceItem>>,
) -> String {
    let mut cur = text.to_string();
    let mut fired_groups: FxHashSet<String> = FxHashSet::default();

    for sub in rules {
        if cur.is_empty() {
            break;
        }
        // 互斥组：组内已有命中则跳过（序列展开的兄弟项共享组名，一并跳过）
        if let Some(group) = &sub.or_group {
            if fired_groups.contains(group.as_str()) {
                continue;
            }
        }
        if !guards_allow(sub.when.as_ref(), sub.skip.as_ref(), options) {
            continue;
        }

        // 起始偏移解析进当前文本；越界即跳过本项
        let start = sub.start.unwrap_or(0);
        let Some(byte_start) = char_offset_to_byte(&cur, start) else {
            continue;
        };
        let suffix = &cur[byte_start..];

        let Some(m) = sub.matcher.find(suffix) else {
            continue;
        };
        if m.as_str().is_empty() {
            continue;
        }
        let matched = m.as_str().to_string();
        let replaced_preview = expand_first_match(sub, suffix, &matched);

        // 命中：在后缀内全局替换，后续子规则看到累计结果
        let new_suffix = match &sub.to {
            Some(to) => sub.matcher.replace_all(suffix, to.as_str()).into_owned(),
            None => suffix.to_string(),
        };

        if let Some(list) = trace.as_mut() {
            list.push(TraceItem {
                from: sub.from_src.clone(),
                to: sub.to.clone(),
                input: clip(suffix, TRACE_INPUT_CLIP),
                matched,
                replaced: replaced_preview,
                post: Vec::new(),
            });
        }

        let mut next = cur[..byte_start].to_string();
        next.push_str(&new_suffix);
        cur = next;

        if let Some(group) = &sub.or_group {
            fired_groups.insert(group.clone());
        }
    }
    cur
}

/// whileMatch 策略：反复整轮应用，直到一整轮无新命中
/// 同一子规则不得重复产出相同的 (规则序号, 命中子串) 结果，
/// 该去重历史显式建状态传递，保证重写自身产物的规则组也能收敛
fn apply_while_match(
    text: &str,
    rules: &[CompiledSubRule],
    options: &OptionMap,
    mut trace: Option<&mut Vec<TraceItem>>,
) -> String {
    let mut cur = text.to_string();
    let mut fired_groups: FxHashSet<String> = FxHashSet::default();
    let mut history: FxHashSet<(usize, String)> = FxHashSet::default();
    let mut passes = 0;

    loop {
        if cur.is_empty() {
            break;
        }
        let mut any_fired = false;

        for (index, sub) in rules.iter().enumerate() {
            if cur.is_empty() {
                break;
            }
            if let Some(group) = &sub.or_group {
                if fired_groups.contains(group.as_str()) {
                    continue;
                }
            }
            if !guards_allow(sub.when.as_ref(), sub.skip.as_ref(), options) {
                continue;
            }

            // 非锚定全文匹配
            let Some(m) = sub.matcher.find(&cur) else {
                continue;
            };
            if m.as_str().is_empty() {
                continue;
            }
            let key = (index, m.as_str().to_string());
            if history.contains(&key) {
                continue;
            }
            let matched = key.1.clone();
            let replaced_preview = expand_first_match(sub, &cur, &matched);

            if let Some(to) = &sub.to {
                cur = sub.matcher.replace_all(&cur, to.as_str()).into_owned();
            }

            if let Some(list) = trace.as_mut() {
                list.push(TraceItem {
                    from: sub.from_src.clone(),
                    to: sub.to.clone(),
                    input: clip(&matched, TRACE_INPUT_CLIP),
                    matched,
                    replaced: replaced_preview,
                    post: Vec::new(),
                });
            }

            history.insert(key);
            if let Some(group) = &sub.or_group {
                fired_groups.insert(group.clone());
            }
            any_fired = true;
        }

        if !any_fired {
            break;
        }
        passes += 1;
        if passes >= WHILE_MATCH_MAX_PASSES {
            warn!(
                "whileMatch 后处理达到轮次上限 {}，提前终止；请检查规则组是否持续产出新命中",
                WHILE_MATCH_MAX_PASSES
            );
            break;
        }
    }
    cur
}

/// 计算首个命中的展开替换文本（跟踪记录用）
fn expand_first_match(sub: &CompiledSubRule, haystack: &str, matched: &str) -> String {
    match &sub.to {
        Some(to) => {
            let mut expanded = String::new();
            if let Some(caps) = sub.matcher.captures(haystack) {
                caps.expand(to, &mut expanded);
            }
            expanded
        }
        None => matched.to_string(),
    }
}

/// 字符偏移转字节偏移；偏移达到或超过文本末尾返回 None
fn char_offset_to_byte(s: &str, offset: usize) -> Option<usize> {
    s.char_indices().nth(offset).map(|(i, _)| i)
}
