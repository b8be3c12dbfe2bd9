//! # convert 命令实现
//!
//! 把 DFT 原生输出目录批量转换为规范容器。
//!
//! ## 功能
//! - 按标志文件收集原生输出目录
//! - best-effort 并行转换，单个目录失败不影响其他目录
//! - 可选地对每个结果做一致性校验
//!
//! ## 依赖关系
//! - 使用 `cli/convert.rs` 定义的参数
//! - 使用 `hamdock::parsers`, `hamdock::batch`, `hamdock::store`

use crate::cli::convert::ConvertArgs;
use hamdock::batch::{BatchSummary, DatasetCollector, ExecutionContext, FailurePolicy, ItemOutcome};
use hamdock::error::{DockError, Result};
use hamdock::parsers::{self, AdapterRegistry};
use hamdock::utils::output;
use hamdock::validate::{self, Tolerances};
use hamdock::store;

use std::fs;
use std::path::{Path, PathBuf};

/// 执行 convert 命令
pub fn execute(args: ConvertArgs) -> Result<()> {
    output::print_header(&format!("Converting {} Output", args.code));

    let registry = AdapterRegistry::with_builtin();
    let adapter = registry.get(args.code)?;
    let marker = args.marker.as_deref().unwrap_or(adapter.marker());

    let dirs = DatasetCollector::new(args.input.clone(), marker)?
        .recursive(args.recursive)
        .collect()?;
    if dirs.is_empty() {
        output::print_warning(&format!(
            "No directories containing '{}' found under {}",
            marker,
            args.input.display()
        ));
        return Ok(());
    }
    output::print_info(&format!("Found {} native output directories", dirs.len()));

    fs::create_dir_all(&args.output).map_err(|e| DockError::FileWriteError {
        path: args.output.display().to_string(),
        source: e,
    })?;

    let mut pending: Vec<(PathBuf, PathBuf)> = Vec::new();
    for dir in dirs {
        let target = args.output.join(container_name(&args.input, &dir));
        if target.exists() && !args.overwrite {
            output::print_skip(&format!("{} (exists)", target.display()));
            continue;
        }
        pending.push((dir, target));
    }
    if pending.is_empty() {
        output::print_done("Nothing to convert");
        return Ok(());
    }

    let ctx = ExecutionContext::new(args.jobs)
        .with_policy(FailurePolicy::BestEffort)
        .with_progress(true);
    let inputs: Vec<PathBuf> = pending.iter().map(|(dir, _)| dir.clone()).collect();
    let outcomes = parsers::convert_many(&registry, args.code, &inputs, &ctx)?;
    let summary = BatchSummary::from_outcomes(&outcomes);

    let tolerances = Tolerances::default();
    let mut first_error = None;
    for ((dir, target), outcome) in pending.iter().zip(outcomes) {
        match outcome {
            ItemOutcome::Done(dataset) => {
                store::save(&dataset, target)?;
                output::print_conversion(&dir.display().to_string(), &target.display().to_string());

                if args.validate {
                    let report = validate::validate(&dataset, &tolerances);
                    for finding in report.errors() {
                        output::print_finding(finding);
                    }
                    if report.warning_count() > 0 {
                        output::print_warning(&format!(
                            "{} warning(s); run 'hamdock validate {}' for details",
                            report.warning_count(),
                            target.display()
                        ));
                    }
                }
            }
            ItemOutcome::Failed(e) => {
                output::print_warning(&format!("Failed to convert {}: {}", dir.display(), e));
                first_error.get_or_insert(e);
            }
            ItemOutcome::Cancelled => {
                output::print_skip(&format!("{} (cancelled)", dir.display()));
            }
        }
    }

    output::print_separator();
    output::print_done(&format!(
        "Converted {}/{} directories into '{}' ({} failed)",
        summary.success,
        summary.total(),
        args.output.display(),
        summary.failed
    ));

    // 全部失败时以第一个错误退出，保留其退出码
    match first_error {
        Some(e) if summary.success == 0 => Err(e),
        _ => Ok(()),
    }
}

/// 输出容器名：相对输入根目录的路径，分隔符替换为 '_'
fn container_name(root: &Path, dir: &Path) -> String {
    let relative = dir.strip_prefix(root).ok().filter(|r| !r.as_os_str().is_empty());
    let stem = match relative {
        Some(r) => r
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("_"),
        None => dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset".to_string()),
    };
    format!("{}.json", stem)
}
