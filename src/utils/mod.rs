//! # 工具函数模块
//!
//! 提供美化输出与进度条。
//!
//! ## 依赖关系
//! - 被 `batch/` 与命令行的 `commands/` 使用
//! - 子模块: output, progress

pub mod output;
pub mod progress;
