//! # symmetrize 命令实现
//!
//! 对称化容器并写出新的容器，报告对称化前后的厄米残差。
//!
//! ## 依赖关系
//! - 使用 `cli/symmetrize.rs` 定义的参数
//! - 使用 `hamdock::symmetrize`, `hamdock::compare`

use super::{check_output, load_dataset};
use crate::cli::symmetrize::SymmetrizeArgs;
use hamdock::batch::ExecutionContext;
use hamdock::compare::self_consistency;
use hamdock::error::{DockError, Result};
use hamdock::symmetrize::{self, SymmetrizeOptions, SymmetryOperation};
use hamdock::utils::output;
use hamdock::{store, CanonicalDataset};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// 执行 symmetrize 命令
pub fn execute(args: SymmetrizeArgs) -> Result<()> {
    output::print_header("Symmetrizing Dataset");
    check_output(&args.output, args.overwrite)?;

    let dataset = load_dataset(&args.input)?;
    let operations = args
        .operations
        .as_deref()
        .map(load_operations)
        .transpose()?;
    if let Some(ops) = &operations {
        output::print_info(&format!("Averaging over {} symmetry operations", ops.len()));
    }

    let options = SymmetrizeOptions {
        operations,
        position_tolerance: args.position_tol,
        channels: (!args.channels.is_empty()).then(|| args.channels.clone()),
    };
    let ctx = ExecutionContext::new(args.jobs);

    let before = residuals(&dataset)?;
    let outcome = symmetrize::symmetrize_with(&dataset, &options, &ctx)?;
    let after = residuals(&outcome.dataset)?;

    if !outcome.missing_partners.is_empty() {
        output::print_warning(&format!(
            "{} Hermitian partner block(s) were missing and filled from their counterparts",
            outcome.missing_partners.len()
        ));
        for key in outcome.missing_partners.iter().take(5) {
            output::print_field("filled", &key.to_string());
        }
    }

    for ((channel, r0), (_, r1)) in before.iter().zip(&after) {
        output::print_field(
            &format!("{} residual", channel),
            &format!("{:.3e} -> {:.3e}", r0, r1),
        );
    }

    store::save(&outcome.dataset, &args.output)?;
    output::print_done(&format!(
        "Symmetrized dataset written to '{}'",
        args.output.display()
    ));
    Ok(())
}

/// 各通道的最大厄米残差
fn residuals(dataset: &CanonicalDataset) -> Result<Vec<(String, f64)>> {
    dataset
        .channels()
        .map(|channel| {
            self_consistency(dataset, channel).map(|r| (channel.to_string(), r.max_residual))
        })
        .collect()
}

/// 读取 JSON 对称操作表
fn load_operations(path: &Path) -> Result<Vec<SymmetryOperation>> {
    let file = File::open(path).map_err(|e| DockError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        DockError::InvalidArgument(format!(
            "invalid operation table '{}': {}",
            path.display(),
            e
        ))
    })
}
