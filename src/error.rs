//! 全局错误类型定义

use thiserror::Error;
use regex::Error as RegexError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;

#[derive(Error, Debug)]
pub enum TranslitError {
    // 规则相关错误
    #[error("规则解析失败：{0}")]
    RuleParseError(String),

    // 模板相关错误
    #[error("模板变量循环引用：{0}")]
    CircularTplVar(String),
    #[error("模板序列 {0} 所在规则缺少 to 字段")]
    TplSeqMissingTo(String),
    #[error("模板序列 {0} 未出现在 to 字段中")]
    TplSeqNotInTo(String),
    #[error("模板序列 {0} 定义非法：{1}")]
    TplSeqInvalid(String, String),

    // 编译相关错误
    #[error("正则编译失败：{0}")]
    RegexCompileError(#[from] RegexError),

    // 序列化/反序列化错误
    #[error("JSON解析失败：{0}")]
    JsonError(#[from] SerdeJsonError),

    // 基础错误
    #[error("IO操作失败：{0}")]
    IoError(#[from] IoError),
}

// 全局Result类型
pub type RstResult<T> = Result<T, TranslitError>;
