//! # 命令执行模块
//!
//! 实现各子命令：解析好的参数映射为库的选项结构，调用库函数并渲染报告。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/` 与 `hamdock` 库
//! - 子模块: convert, validate, symmetrize, compare, diagonalize, export

pub mod compare;
pub mod convert;
pub mod diagonalize;
pub mod export;
pub mod symmetrize;
pub mod validate;

use crate::cli::Commands;
use hamdock::error::{DockError, Result};
use hamdock::utils::progress;
use hamdock::{store, CanonicalDataset};

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Convert(args) => convert::execute(args),
        Commands::Validate(args) => validate::execute(args),
        Commands::Symmetrize(args) => symmetrize::execute(args),
        Commands::Compare(args) => compare::execute(args),
        Commands::Diagonalize(args) => diagonalize::execute(args),
        Commands::Export(args) => export::execute(args),
    }
}

/// 读取容器，期间显示 spinner
fn load_dataset(path: &Path) -> Result<CanonicalDataset> {
    if !path.is_file() {
        return Err(DockError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let spinner = progress::create_spinner(&format!("Loading {}", path.display()));
    let result = store::load(path);
    spinner.finish_and_clear();
    result
}

/// 写出前检查目标文件
fn check_output(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        return Err(DockError::InvalidArgument(format!(
            "'{}' already exists (use --overwrite)",
            path.display()
        )));
    }
    Ok(())
}

/// 以缩进 JSON 写出结果
fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<()> {
    let write_err = |e: std::io::Error| DockError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    };
    let file = File::create(path).map_err(write_err)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value).map_err(|e| write_err(e.into()))
}
