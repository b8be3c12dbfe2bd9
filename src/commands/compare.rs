//! # compare 命令实现
//!
//! 误差评估：总体统计、按元素对和按轨道对的分解；
//! 只给一个数据集时报告其厄米残差。
//!
//! ## 依赖关系
//! - 使用 `cli/compare.rs` 定义的参数
//! - 使用 `hamdock::compare`

use super::{load_dataset, write_json};
use crate::cli::compare::CompareArgs;
use hamdock::batch::ExecutionContext;
use hamdock::compare::{self, CompareOptions, ErrorReport, OrbitalPairError};
use hamdock::error::{DockError, Result};
use hamdock::utils::output;

use std::path::Path;
use tabled::{Table, Tabled};

/// 指标表行
#[derive(Debug, Clone, Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// 分解表行
#[derive(Debug, Clone, Tabled)]
struct BreakdownRow {
    #[tabled(rename = "Pair")]
    pair: String,
    #[tabled(rename = "Count")]
    count: usize,
    #[tabled(rename = "MAE")]
    mae: String,
    #[tabled(rename = "Max |Δ|")]
    max_abs: String,
    #[tabled(rename = "Mean rel")]
    mean_rel: String,
}

/// 执行 compare 命令
pub fn execute(args: CompareArgs) -> Result<()> {
    let predicted = load_dataset(&args.predicted)?;

    let Some(reference_path) = &args.reference else {
        output::print_header("Hermiticity Self-Consistency");
        let report = compare::self_consistency(&predicted, args.channel)?;
        output::print_field("channel", &report.channel.to_string());
        output::print_field("max residual", &format!("{:.6e}", report.max_residual));
        output::print_field("mean residual", &format!("{:.6e}", report.mean_residual));
        output::print_field("pairs", &report.pairs.to_string());
        output::print_field("unpaired blocks", &report.unpaired.to_string());
        if let Some(key) = report.worst_key {
            output::print_field("worst block", &key.to_string());
        }
        if let Some(path) = &args.output_json {
            write_json(&report, path)?;
        }
        return Ok(());
    };

    output::print_header("Error Evaluation");
    let reference = load_dataset(reference_path)?;
    let options = CompareOptions {
        channel: args.channel,
        relative_floor: args.relative_floor,
    };
    let ctx = ExecutionContext::new(args.jobs);
    let report = compare::compare_with(&predicted, &reference, &options, &ctx)?;

    print_summary(&report);

    if !report.per_species_pair.is_empty() {
        output::print_header("Per Element Pair");
        let rows: Vec<BreakdownRow> = report
            .per_species_pair
            .iter()
            .map(|p| breakdown_row(format!("{}-{}", p.species_i, p.species_j), &p.stats))
            .collect();
        println!("{}", Table::new(&rows));
    }

    let mut worst: Vec<&OrbitalPairError> = report.per_orbital_pair.iter().collect();
    worst.sort_by(|a, b| {
        b.stats
            .mean_abs
            .partial_cmp(&a.stats.mean_abs)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if !worst.is_empty() && args.top_n > 0 {
        output::print_header(&format!(
            "Top {} Orbital Pairs by MAE",
            args.top_n.min(worst.len())
        ));
        let rows: Vec<BreakdownRow> = worst
            .iter()
            .take(args.top_n)
            .map(|p| {
                breakdown_row(
                    format!(
                        "{}[{}]-{}[{}]",
                        p.species_i, p.label_i, p.species_j, p.label_j
                    ),
                    &p.stats,
                )
            })
            .collect();
        println!("{}", Table::new(&rows));
    }

    if let Some(path) = &args.output_csv {
        save_orbital_csv(&report.per_orbital_pair, path)?;
        output::print_success(&format!("Orbital breakdown saved to '{}'", path.display()));
    }
    if let Some(path) = &args.output_json {
        write_json(&report, path)?;
        output::print_success(&format!("Report saved to '{}'", path.display()));
    }
    Ok(())
}

fn print_summary(report: &ErrorReport) {
    let location = report
        .max_location
        .map(|l| format!("{} [{}, {}]", l.key, l.row, l.col))
        .unwrap_or_else(|| "-".to_string());
    let rows = vec![
        MetricRow {
            metric: "channel",
            value: report.channel.to_string(),
        },
        MetricRow {
            metric: "elements",
            value: report.element_count.to_string(),
        },
        MetricRow {
            metric: "MAE",
            value: format!("{:.6e}", report.mean_abs),
        },
        MetricRow {
            metric: "RMSE",
            value: format!("{:.6e}", report.rmse),
        },
        MetricRow {
            metric: "max |Δ|",
            value: format!("{:.6e}", report.max_abs),
        },
        MetricRow {
            metric: "max at",
            value: location,
        },
        MetricRow {
            metric: "mean relative",
            value: format!("{:.4e}", report.mean_rel),
        },
        MetricRow {
            metric: "max relative",
            value: format!("{:.4e}", report.max_rel),
        },
        MetricRow {
            metric: "blocks only in B",
            value: report.missing_in_a.to_string(),
        },
        MetricRow {
            metric: "blocks only in A",
            value: report.missing_in_b.to_string(),
        },
    ];
    println!("{}", Table::new(&rows));
}

fn breakdown_row(pair: String, stats: &compare::ErrorStats) -> BreakdownRow {
    BreakdownRow {
        pair,
        count: stats.count,
        mae: format!("{:.4e}", stats.mean_abs),
        max_abs: format!("{:.4e}", stats.max_abs),
        mean_rel: format!("{:.4e}", stats.mean_rel),
    }
}

/// 保存轨道对分解到 CSV
fn save_orbital_csv(pairs: &[OrbitalPairError], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "species_i",
        "species_j",
        "orbital_i",
        "orbital_j",
        "count",
        "mae",
        "max_abs",
        "rmse",
        "mean_rel",
        "max_rel",
    ])?;
    for p in pairs {
        wtr.write_record([
            p.species_i.clone(),
            p.species_j.clone(),
            p.label_i.clone(),
            p.label_j.clone(),
            p.stats.count.to_string(),
            format!("{:.10e}", p.stats.mean_abs),
            format!("{:.10e}", p.stats.max_abs),
            format!("{:.10e}", p.stats.rmse),
            format!("{:.10e}", p.stats.mean_rel),
            format!("{:.10e}", p.stats.max_rel),
        ])?;
    }

    wtr.flush().map_err(|e| DockError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;
    Ok(())
}
