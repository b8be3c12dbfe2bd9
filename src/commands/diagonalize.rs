//! # diagonalize 命令实现
//!
//! 在一组 k 点上并行计算谱，并渲染本征值表或态密度摘要；
//! 完整结果（含可选本征向量）可写出为 JSON。
//!
//! ## 依赖关系
//! - 使用 `cli/diagonalize.rs` 定义的参数
//! - 使用 `hamdock::spectral`

use super::{load_dataset, write_json};
use crate::cli::diagonalize::{DiagonalizeArgs, KernelChoice, TargetChoice};
use hamdock::batch::ExecutionContext;
use hamdock::error::{DockError, Result};
use hamdock::spectral::{
    self, KpmKernel, LanczosTarget, SpectralOptions, SpectralResult, Spectrum, TraceEstimator,
};
use hamdock::utils::output;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tabled::{Table, Tabled};

/// 本征值表行
#[derive(Debug, Clone, Tabled)]
struct EigenRow {
    #[tabled(rename = "k")]
    k: String,
    #[tabled(rename = "n")]
    n: usize,
    #[tabled(rename = "E")]
    energy: String,
    #[tabled(rename = "Residual")]
    residual: String,
}

/// 执行 diagonalize 命令
pub fn execute(args: DiagonalizeArgs) -> Result<()> {
    output::print_header(&format!("Spectrum ({})", args.method));

    let dataset = load_dataset(&args.input)?;
    let options = build_options(&args)?;
    output::print_field("orbitals", &dataset.dimension().to_string());
    output::print_field("k-points", &args.k_points.len().to_string());

    let ctx = ExecutionContext::new(args.jobs).with_progress(args.k_points.len() > 1);
    let results = spectral::compute_spectra(&dataset, &args.k_points, args.method, &options, &ctx)?;

    let mut rows = Vec::new();
    for result in &results {
        let k = format_k(&result.k_point);
        match &result.spectrum {
            Spectrum::Eigenvalues(e) => {
                for (n, energy) in e.eigenvalues.iter().enumerate() {
                    rows.push(EigenRow {
                        k: k.clone(),
                        n,
                        energy: format!("{:.8}", energy),
                        residual: e
                            .residuals
                            .get(n)
                            .map(|r| format!("{:.2e}", r))
                            .unwrap_or_else(|| "-".to_string()),
                    });
                }
            }
            Spectrum::Density(d) => {
                output::print_separator();
                output::print_field("k", &k);
                output::print_field("path", if result.real_path { "real" } else { "complex" });
                output::print_field("bounds", &format!("[{:.6}, {:.6}]", d.e_min, d.e_max));
                output::print_field("states", &d.states.to_string());
                if let Some(ef) = dataset.metadata().fermi_energy {
                    output::print_field("states below E_F", &format!("{:.4}", d.integrated_dos(ef)));
                }
                if let Some((e_peak, peak)) = d
                    .energies
                    .iter()
                    .zip(&d.dos)
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                {
                    output::print_field("DOS peak", &format!("{:.4} at {:.6}", peak, e_peak));
                }
            }
        }
    }
    if !rows.is_empty() {
        println!("{}", Table::new(&rows));
    }

    if let Some(path) = &args.output_csv {
        save_spectra_csv(&results, path)?;
        output::print_success(&format!("Spectra saved to '{}'", path.display()));
    }
    if let Some(path) = &args.output_json {
        write_json(&results, path)?;
        output::print_success(&format!("Results saved to '{}'", path.display()));
    } else if options.eigenvectors {
        output::print_warning("eigenvectors are only written with --output-json");
    }
    output::print_done(&format!("Computed {} k-point(s)", results.len()));
    Ok(())
}

/// 配置文件为基础，命令行参数覆盖
fn build_options(args: &DiagonalizeArgs) -> Result<SpectralOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let file = File::open(path).map_err(|e| DockError::FileReadError {
                path: path.display().to_string(),
                source: e,
            })?;
            serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                DockError::InvalidArgument(format!("invalid config '{}': {}", path.display(), e))
            })?
        }
        None => SpectralOptions::default(),
    };

    options.channel = args.channel;
    if args.no_overlap {
        options.use_overlap = false;
    }
    if args.complex {
        options.real_fallback = false;
    }
    if args.eigenvectors {
        options.eigenvectors = true;
    }

    if let Some(moments) = args.moments {
        options.kpm.moments = moments;
    }
    if let Some(points) = args.points {
        options.kpm.points = points;
    }
    if let Some(kernel) = args.kernel {
        options.kpm.kernel = match kernel {
            KernelChoice::Jackson => KpmKernel::Jackson,
            KernelChoice::Lorentz => KpmKernel::Lorentz {
                lambda: args.lorentz_lambda,
            },
        };
    }
    let seed = args.seed;
    match args.random_vectors {
        Some(0) => options.kpm.trace = TraceEstimator::Exact,
        Some(vectors) => {
            options.kpm.trace = TraceEstimator::Stochastic {
                vectors,
                seed: seed.unwrap_or(42),
            }
        }
        None => {
            if let (Some(s), TraceEstimator::Stochastic { seed, .. }) =
                (seed, &mut options.kpm.trace)
            {
                *seed = s;
            }
        }
    }

    if let Some(n) = args.num_eigenvalues {
        options.lanczos.num_eigenvalues = n;
    }
    if let Some(n) = args.max_iterations {
        options.lanczos.max_iterations = n;
    }
    if let Some(tol) = args.tolerance {
        options.lanczos.tolerance = tol;
    }
    if let Some(s) = seed {
        options.lanczos.seed = s;
    }
    if let Some(target) = args.target {
        options.lanczos.target = match target {
            TargetChoice::Lowest => LanczosTarget::Lowest,
            TargetChoice::Highest => LanczosTarget::Highest,
            TargetChoice::Nearest => LanczosTarget::Nearest(args.energy.ok_or_else(|| {
                DockError::InvalidArgument("--target nearest requires --energy".to_string())
            })?),
        };
    }
    Ok(options)
}

fn format_k(k: &[f64; 3]) -> String {
    format!("({:.4}, {:.4}, {:.4})", k[0], k[1], k[2])
}

/// 保存本征值或态密度到 CSV
fn save_spectra_csv(results: &[SpectralResult], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    let eigen = results
        .first()
        .map_or(true, |r| matches!(r.spectrum, Spectrum::Eigenvalues(_)));
    if eigen {
        wtr.write_record(["k_index", "kx", "ky", "kz", "n", "energy", "residual"])?;
    } else {
        wtr.write_record(["k_index", "kx", "ky", "kz", "energy", "dos"])?;
    }

    for (index, result) in results.iter().enumerate() {
        let k = result.k_point;
        let prefix = [
            index.to_string(),
            k[0].to_string(),
            k[1].to_string(),
            k[2].to_string(),
        ];
        match &result.spectrum {
            Spectrum::Eigenvalues(e) => {
                for (n, energy) in e.eigenvalues.iter().enumerate() {
                    let mut record = prefix.to_vec();
                    record.push(n.to_string());
                    record.push(format!("{:.12}", energy));
                    record.push(e.residuals.get(n).map(|r| format!("{:.3e}", r)).unwrap_or_default());
                    wtr.write_record(&record)?;
                }
            }
            Spectrum::Density(d) => {
                for (energy, dos) in d.energies.iter().zip(&d.dos) {
                    let mut record = prefix.to_vec();
                    record.push(format!("{:.10}", energy));
                    record.push(format!("{:.10e}", dos));
                    wtr.write_record(&record)?;
                }
            }
        }
    }

    wtr.flush().map_err(|e| DockError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;
    Ok(())
}
