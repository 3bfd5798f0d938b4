//! 模板变量解析与模板序列展开
//! 变量解析按名称逆字典序处理（长名/特定名优先），带循环引用检测

use std::collections::HashMap;

use crate::error::{RstResult, TranslitError};
use crate::rule::model::TplSeqSpan;

/// 解析后的模板变量表：按名称逆字典序排列的 (名称, 展开文本) 列表
/// 替换阶段按此顺序遍历，保证长名优先且结果确定
pub(crate) type ResolvedTplVars = Vec<(String, String)>;

/// 解析模板变量表
/// 对每个变量迭代替换其值中出现的其他变量名，记录已访问名；
/// 解析完成前重访同名即判定循环引用
pub(crate) fn resolve_tpl_vars(vars: &HashMap<String, String>) -> RstResult<ResolvedTplVars> {
    let mut names: Vec<&String> = vars.keys().collect();
    names.sort_unstable();
    names.reverse();

    let mut resolved = Vec::with_capacity(names.len());
    for name in &names {
        let mut value = vars[*name].clone();
        let mut visited: Vec<&str> = vec![name.as_str()];
        loop {
            let mut replaced_any = false;
            for other in &names {
                if value.contains(other.as_str()) {
                    if visited.contains(&other.as_str()) {
                        return Err(TranslitError::CircularTplVar((*other).clone()));
                    }
                    value = value.replace(other.as_str(), &vars[*other]);
                    visited.push(other.as_str());
                    replaced_any = true;
                }
            }
            if !replaced_any {
                break;
            }
        }
        resolved.push(((*name).clone(), value));
    }
    Ok(resolved)
}

/// 合并阶段级变量到文档级变量之上（阶段级同名覆盖）
pub(crate) fn merge_tpl_vars(
    global: &HashMap<String, String>,
    local: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = global.clone();
    for (name, value) in local {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// 将已解析变量替换进规则文本
pub(crate) fn substitute(text: &str, resolved: &ResolvedTplVars) -> String {
    let mut out = text.to_string();
    for (name, value) in resolved {
        if out.contains(name.as_str()) {
            out = out.replace(name.as_str(), value);
        }
    }
    out
}

/// Option 版本的变量替换
pub(crate) fn substitute_opt(text: &Option<String>, resolved: &ResolvedTplVars) -> Option<String> {
    text.as_ref().map(|t| substitute(t, resolved))
}

/// 展开模板序列定义为具体的 (from字符, to字符) 对
/// 每个区间贡献 count 对，from/to 起始码点逐项同步递增
pub(crate) fn expand_seq_pairs(name: &str, spans: &[TplSeqSpan]) -> RstResult<Vec<(char, char)>> {
    let mut pairs = Vec::new();
    for span in spans {
        let from_start = single_char(&span.from_start).ok_or_else(|| {
            TranslitError::TplSeqInvalid(
                name.to_string(),
                format!("fromStart 必须为单个字符，实际为 {:?}", span.from_start),
            )
        })?;
        let count = span.count.unwrap_or(1);
        if count == 0 {
            return Err(TranslitError::TplSeqInvalid(
                name.to_string(),
                "count 不能为 0".to_string(),
            ));
        }
        let to_start = match &span.to_start {
            Some(s) => single_char(s).ok_or_else(|| {
                TranslitError::TplSeqInvalid(
                    name.to_string(),
                    format!("toStart 必须为单个字符，实际为 {:?}", s),
                )
            })?,
            None => {
                if count > 1 {
                    return Err(TranslitError::TplSeqInvalid(
                        name.to_string(),
                        "count 大于 1 时必须提供 toStart".to_string(),
                    ));
                }
                from_start
            }
        };

        for i in 0..count {
            let from_ch = step_char(from_start, i).ok_or_else(|| step_error(name, from_start, i))?;
            let to_ch = step_char(to_start, i).ok_or_else(|| step_error(name, to_start, i))?;
            pairs.push((from_ch, to_ch));
        }
    }
    Ok(pairs)
}

/// 判断字符串是否恰为单个字符
fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

/// 基准字符码点加偏移（越过 Unicode 标量值范围返回 None）
fn step_char(base: char, offset: usize) -> Option<char> {
    let cp = (base as u32).checked_add(u32::try_from(offset).ok()?)?;
    char::from_u32(cp)
}

fn step_error(name: &str, base: char, offset: usize) -> TranslitError {
    TranslitError::TplSeqInvalid(
        name.to_string(),
        format!("起始字符 {:?} 偏移 {} 后越出 Unicode 标量值范围", base, offset),
    )
}
