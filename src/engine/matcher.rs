//! 规则项匹配器
//! 对单个阶段执行一次从左到右的扫描：每个位置按声明顺序尝试规则，
//! 首条命中即应用；无命中则逐字符原样透传，保证每轮至少消费一个字符

use log::debug;

use crate::compiler::pattern::CompiledPhase;
use crate::engine::post_rules::apply_sub_rule_items;
use crate::engine::result::{TraceItem, TRACE_INPUT_CLIP};
use crate::options::{guards_allow, OptionMap};
use crate::utils::{clip, preview_compact};

/// 对输入文本应用一个阶段的规则，返回改写后的文本
pub(crate) fn apply_rule_items(
    text: &str,
    phase: &CompiledPhase,
    options: &OptionMap,
    mut trace: Option<&mut Vec<TraceItem>>,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cur = text;
    // 剩余字符数增量维护，minLength 守卫免于反复计数
    let mut remaining = text.chars().count();

    while !cur.is_empty() {
        let mut matched_here = false;
        let mut index = 0;

        while index < phase.rules.len() {
            let rule = &phase.rules[index];

            // (a) when/skip 守卫仅在展开组组首求值，失败跳过整组
            if rule.is_group_start() {
                if !guards_allow(rule.when.as_ref(), rule.skip.as_ref(), options) {
                    index += rule.group_len();
                    continue;
                }
                // (d) 组级快速预检，失败跳过整组
                if !rule.group_tests_pass(cur) {
                    index += rule.group_len();
                    continue;
                }
            }

            // (b) hasLeft：要求/禁止已有产出文本
            if let Some(required) = rule.has_left {
                let has_output = !out.is_empty();
                if required != has_output {
                    index += 1;
                    continue;
                }
            }

            // (c) 最小剩余长度
            if let Some(min) = rule.min_length {
                if remaining < min {
                    index += 1;
                    continue;
                }
            }

            // (e) 项级快速预检，失败仅跳过本项
            if !rule.quick_tests_pass(cur) {
                index += 1;
                continue;
            }

            // (f) 后顾：对照已产出文本末尾；无产出时后顾必不通过
            if let Some(left) = &rule.left {
                if out.is_empty() || !left.is_match(&out) {
                    index += 1;
                    continue;
                }
            }

            // (g) 主匹配，锚定剩余输入起始；零长命中视为未命中
            let Some(caps) = rule.matcher.captures(cur) else {
                index += 1;
                continue;
            };
            let Some(m) = caps.get(0) else {
                index += 1;
                continue;
            };
            if m.as_str().is_empty() {
                index += 1;
                continue;
            }
            let matched = m.as_str();
            let match_end = m.end();

            // (h) 前瞻：对照匹配之后的剩余输入；剩余为空时前瞻必不通过
            let rest = &cur[match_end..];
            if let Some(right) = &rule.right {
                if rest.is_empty() || !right.is_match(rest) {
                    index += 1;
                    continue;
                }
            }

            // (i) 命中：计算替换文本、执行后处理、记录跟踪、推进游标
            let mut replaced = match &rule.to {
                Some(to) => {
                    let mut expanded = String::new();
                    caps.expand(to, &mut expanded);
                    expanded
                }
                None => matched.to_string(),
            };

            let mut entry = if trace.is_some() {
                Some(TraceItem {
                    from: rule.from_src.clone(),
                    to: rule.to.clone(),
                    input: clip(cur, TRACE_INPUT_CLIP),
                    matched: matched.to_string(),
                    replaced: String::new(),
                    post: Vec::new(),
                })
            } else {
                None
            };

            if let Some(post) = &rule.post_rules {
                if !replaced.is_empty() {
                    let post_trace = entry.as_mut().map(|e| &mut e.post);
                    replaced = apply_sub_rule_items(&replaced, post, options, post_trace);
                }
            }

            debug!(
                "规则命中：from={} matched={} replaced={}",
                rule.from_src,
                preview_compact(matched, 16),
                preview_compact(&replaced, 16)
            );

            out.push_str(&replaced);
            if let Some(mut e) = entry {
                e.replaced = replaced;
                if let Some(list) = trace.as_mut() {
                    list.push(e);
                }
            }

            remaining -= matched.chars().count();
            cur = &cur[match_end..];
            matched_here = true;
            break;
        }

        // 本位置无任何规则命中：原样透传一个字符
        if !matched_here {
            if let Some(ch) = cur.chars().next() {
                out.push(ch);
                cur = &cur[ch.len_utf8()..];
                remaining -= 1;
            }
        }
    }

    out
}
