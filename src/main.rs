//! # hamdock - 稀疏哈密顿量交换格式工具
//!
//! 规范块稀疏数据集的命令行前端。
//!
//! ## 子命令
//! - `convert` - DFT 原生输出转换为规范容器
//! - `validate` - 一致性校验
//! - `symmetrize` - 厄米/空间群对称化
//! - `compare` - 误差评估与厄米残差
//! - `diagonalize` - KPM / Lanczos / 稠密谱计算
//! - `export` - CSC 三元组导出
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   └── commands/   (命令执行逻辑)
//!         └── hamdock 库 (parsers, store, validate, symmetrize,
//!                         compare, spectral, batch, utils)
//! ```
//! 每个错误分类对应唯一的退出码，见 `DockError::exit_code`。

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use hamdock::utils::output;
use std::error::Error;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = commands::run(cli.command) {
        output::print_error(&format!("{}", e));
        let mut source = e.source();
        while let Some(cause) = source {
            output::print_error(&format!("  caused by: {}", cause));
            source = cause.source();
        }
        std::process::exit(e.exit_code());
    }
}

/// 日志输出到 stderr，级别由 -v 次数决定
fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
