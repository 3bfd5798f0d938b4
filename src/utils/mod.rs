//! 工具模块
pub mod preview;

pub use preview::{clip, preview_compact};
