//! # export 命令实现
//!
//! 把一个通道导出为 CSC 三元组 CSV。
//!
//! ## 依赖关系
//! - 使用 `cli/export.rs` 定义的参数
//! - 使用 `hamdock::store::export`

use super::load_dataset;
use crate::cli::export::ExportArgs;
use hamdock::error::Result;
use hamdock::store::export::{to_csc, to_csc_k, write_csc_triplets};
use hamdock::utils::output;

/// 执行 export 命令
pub fn execute(args: ExportArgs) -> Result<()> {
    output::print_header("Exporting CSC Matrix");

    let dataset = load_dataset(&args.input)?;
    let (csc, what) = match args.kpoint {
        Some(k) => (
            to_csc_k(&dataset, args.channel, k)?,
            format!("H(k) at k = ({}, {}, {})", k[0], k[1], k[2]),
        ),
        None => {
            let r = args.translation.unwrap_or([0, 0, 0]);
            (
                to_csc(&dataset, args.channel, r)?,
                format!("H(R) at R = [{}, {}, {}]", r[0], r[1], r[2]),
            )
        }
    };

    output::print_field("channel", &args.channel.to_string());
    output::print_field("slice", &what);
    output::print_field("shape", &format!("{} x {}", csc.nrows, csc.ncols));
    output::print_field("non-zeros", &csc.nnz().to_string());

    write_csc_triplets(&csc, &args.output)?;
    output::print_done(&format!("Triplets written to '{}'", args.output.display()));
    Ok(())
}
