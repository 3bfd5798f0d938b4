//! 转写结果与执行跟踪记录

use std::time::Duration;
use serde::Serialize;

/// 跟踪记录中 input 字段的最大保留字符数
pub(crate) const TRACE_INPUT_CLIP: usize = 48;

/// 单次转写结果
#[derive(Debug, Clone, Serialize)]
pub struct TranslitResult {
    /// 最终输出文本
    #[serde(rename = "outputText")]
    pub output_text: String,
    /// 是否有任一规则实际改写过文本
    pub replaced: bool,
    /// 本次调用的墙钟耗时
    pub duration: Duration,
    /// 执行跟踪（调用方开启 trace 时填充）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces: Option<Vec<TraceItem>>,
}

/// 单条跟踪记录：顶层规则每次命中产出一条，后处理命中嵌套其下
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceItem {
    /// 命中规则的模式文本（模板展开后）
    pub from: String,
    /// 命中规则的替换模板
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// 命中时参与匹配的输入片段（截断保留）
    pub input: String,
    /// 实际匹配到的子串
    pub matched: String,
    /// 实际写入输出的子串（经后处理）
    pub replaced: String,
    /// 嵌套的后处理跟踪
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<TraceItem>,
}

// 单元测试
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serializes_camel_case() {
        // 测试场景：结果序列化使用 outputText 字段名，空 traces 不输出
        let result = TranslitResult {
            output_text: "out".to_string(),
            replaced: true,
            duration: Duration::from_millis(3),
            traces: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"outputText\":\"out\""));
        assert!(!json.contains("traces"));
    }

    #[test]
    fn test_trace_item_skips_empty_post() {
        // 测试场景：无嵌套后处理时 post 字段不序列化
        let item = TraceItem {
            from: "a".to_string(),
            matched: "a".to_string(),
            replaced: "b".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("\"post\""));
    }
}
