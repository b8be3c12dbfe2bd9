//! # validate 命令实现
//!
//! 校验规范容器并渲染发现项。
//!
//! ## 依赖关系
//! - 使用 `cli/validate.rs` 定义的参数
//! - 使用 `hamdock::validate`

use super::load_dataset;
use crate::cli::validate::ValidateArgs;
use hamdock::error::{DockError, Result};
use hamdock::utils::output;
use hamdock::validate::{self, Finding, Tolerances};

use std::path::Path;
use tabled::{Table, Tabled};

/// 发现项统计表行
#[derive(Debug, Clone, Tabled)]
struct CodeRow {
    #[tabled(rename = "Code")]
    code: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Count")]
    count: usize,
}

/// 执行 validate 命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    output::print_header("Validating Dataset");

    let dataset = load_dataset(&args.input)?;
    output::print_field("structure", &dataset.structure().formula());
    output::print_field("orbitals", &dataset.dimension().to_string());
    output::print_field(
        "channels",
        &dataset
            .channels()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    );

    let tolerances = Tolerances {
        hermiticity: args.hermiticity_tol,
        overlap_diagonal_min: args.overlap_min,
        distance: args.distance_tol,
    };
    let report = validate::validate(&dataset, &tolerances);

    if report.is_clean() {
        output::print_done("No findings");
        return Ok(());
    }

    println!();
    for finding in report.findings.iter().take(args.top_n) {
        output::print_finding(finding);
    }
    if report.findings.len() > args.top_n {
        output::print_info(&format!(
            "... {} more finding(s) not shown",
            report.findings.len() - args.top_n
        ));
    }

    // 按代码与严重度汇总
    let mut rows: Vec<CodeRow> = Vec::new();
    for finding in &report.findings {
        let (code, severity) = (finding.code.to_string(), finding.severity.to_string());
        match rows
            .iter_mut()
            .find(|r| r.code == code && r.severity == severity)
        {
            Some(row) => row.count += 1,
            None => rows.push(CodeRow {
                code,
                severity,
                count: 1,
            }),
        }
    }
    println!("\n{}", Table::new(&rows));

    if let Some(path) = &args.output_csv {
        save_findings_csv(&report.findings, path)?;
        output::print_success(&format!("Findings saved to '{}'", path.display()));
    }

    let summary = format!(
        "{} error(s), {} warning(s)",
        report.error_count(),
        report.warning_count()
    );
    if args.strict && report.has_errors() {
        return validate::validate_strict(&dataset, &tolerances).map(|_| ());
    }
    if report.has_errors() {
        output::print_warning(&summary);
    } else {
        output::print_done(&summary);
    }
    Ok(())
}

/// 保存发现项到 CSV
fn save_findings_csv(findings: &[Finding], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record(["severity", "code", "channel", "location", "message"])?;
    for f in findings {
        wtr.write_record([
            f.severity.to_string(),
            f.code.to_string(),
            f.channel.map(|c| c.to_string()).unwrap_or_default(),
            f.location.to_string(),
            f.message.clone(),
        ])?;
    }

    wtr.flush().map_err(|e| DockError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;
    Ok(())
}
