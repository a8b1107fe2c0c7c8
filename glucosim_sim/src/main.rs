//! glucosim CLI
//!
//! Runs a batch controller-comparison experiment over a patient cohort.

use clap::Parser;
use glucosim_sim::{Experiment, ExperimentConfig, ExperimentReport, SimError};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Batch glucose-control simulation experiments
#[derive(Parser, Debug)]
#[command(name = "glucosim")]
#[command(about = "Compare insulin controllers across a simulated patient cohort", long_about = None)]
struct Args {
    /// JSON experiment configuration (defaults are used for missing fields)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Master seed for scenario randomization
    #[arg(short, long)]
    seed: Option<u64>,

    /// Patient group (All, Adolescents, Adults, Children)
    #[arg(short = 'C', long)]
    cohort: Option<String>,

    /// Simulated days
    #[arg(short, long)]
    days: Option<u32>,

    /// Run jobs one at a time
    #[arg(long)]
    serial: bool,

    /// Maximum number of concurrently running jobs
    #[arg(short, long)]
    workers: Option<usize>,

    /// Root folder for result folders
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON summary on stdout for scripting
    #[arg(long)]
    json: bool,
}

impl Args {
    fn into_config(self) -> Result<ExperimentConfig, SimError> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_json_file(path)?,
            None => ExperimentConfig::default(),
        };
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(cohort) = self.cohort {
            config = config.with_cohort(cohort);
        }
        if let Some(days) = self.days {
            config = config.with_days(days);
        }
        if self.serial {
            config = config.with_parallel(false);
        }
        if let Some(workers) = self.workers {
            config = config.with_max_workers(workers);
        }
        if let Some(output) = self.output {
            config = config.with_output_root(output);
        }
        Ok(config)
    }

    /// Builds the configuration and rejects it before any setup work.
    fn load_config(self) -> Result<ExperimentConfig, SimError> {
        let config = self.into_config()?;
        config.validate()?;
        Ok(config)
    }
}

fn json_summary(report: &ExperimentReport) -> serde_json::Value {
    serde_json::json!({
        "run_id": report.run_id,
        "seed": report.seed,
        "cohort": report.cohort.name,
        "patients": report.cohort.patients,
        "output_dir": report.output_dir,
        "total": report.total_jobs(),
        "failed": report.failures().len(),
        "arms": report.arms.iter().map(|arm| &arm.summary).collect::<Vec<_>>(),
    })
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let json = args.json;

    // Initialize logging; RUST_LOG overrides --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(2);
        }
    };

    if !json {
        info!("glucosim v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let report = match Experiment::new(config).run().await {
        Ok(report) => report,
        Err(e) => {
            error!("✗ Experiment failed: {}", e);
            std::process::exit(1);
        }
    };

    let failures = report.failures();
    if json {
        match serde_json::to_string_pretty(&json_summary(&report)) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Could not encode summary: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for arm in &report.arms {
            let stats = arm.summary.overall.as_ref();
            info!(
                "{} {}: {}/{} jobs, mean BG {:.1} mg/dL, {:.1}% in range",
                if arm.summary.failures.is_empty() { "✓" } else { "✗" },
                arm.label,
                arm.summary.jobs.len(),
                arm.results.len(),
                stats.map_or(f64::NAN, |s| s.mean_bg),
                stats.map_or(f64::NAN, |s| s.pct_in_range),
            );
        }
        if failures.is_empty() {
            info!("✅ All {} jobs completed (run {})", report.total_jobs(), report.run_id);
        } else {
            error!("❌ {}/{} jobs failed!", failures.len(), report.total_jobs());
            for (key, reason) in &failures {
                error!("  - {}: {}", key, reason);
            }
        }
        if let Some(dir) = &report.output_dir {
            info!("Results written to {}", dir.display());
        }
    }

    if !failures.is_empty() {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("glucosim").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_overrides_applied() {
        let config = parse(&["--seed", "7", "-C", "Adults", "--days", "2", "--serial", "-w", "3"])
            .load_config()
            .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.cohort, "Adults");
        assert_eq!(config.days, 2);
        assert!(!config.parallel);
        assert_eq!(config.max_workers, Some(3));
    }

    #[test]
    fn test_invalid_overrides_rejected_before_run() {
        assert!(matches!(
            parse(&["--days", "0"]).load_config(),
            Err(SimError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse(&["--cohort", "Elderly"]).load_config(),
            Err(SimError::InvalidArgument(_))
        ));
    }
}
