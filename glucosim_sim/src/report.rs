//! Summary statistics of an arm's results, exported as JSON.

use crate::aggregate::{ResultKey, ResultSet};
use crate::error::SimError;
use glucosim_core::TimeSeries;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// Hypoglycemia threshold (mg/dL)
pub const HYPO_THRESHOLD: f64 = 70.0;

/// Hyperglycemia threshold (mg/dL)
pub const HYPER_THRESHOLD: f64 = 180.0;

/// File name of the summary inside an arm folder
pub const SUMMARY_FILE: &str = "summary.json";

/// Glycemic outcome statistics of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlycemicStats {
    pub mean_bg: f64,
    pub min_bg: f64,
    pub max_bg: f64,
    /// Percent of samples below 70 mg/dL
    pub pct_below_70: f64,
    /// Percent of samples in 70–180 mg/dL
    pub pct_in_range: f64,
    /// Percent of samples above 180 mg/dL
    pub pct_above_180: f64,
    pub mean_lbgi: f64,
    pub mean_hbgi: f64,
    pub mean_risk: f64,
}

impl GlycemicStats {
    /// Computes statistics; None for an empty series.
    pub fn from_series(series: &TimeSeries) -> Option<Self> {
        let records = series.records();
        if records.is_empty() {
            return None;
        }
        let n = records.len() as f64;
        let mut min_bg = f64::INFINITY;
        let mut max_bg = f64::NEG_INFINITY;
        let (mut sum_bg, mut sum_lbgi, mut sum_hbgi, mut sum_risk) = (0.0, 0.0, 0.0, 0.0);
        let (mut below, mut above) = (0usize, 0usize);

        for r in records {
            min_bg = min_bg.min(r.bg);
            max_bg = max_bg.max(r.bg);
            sum_bg += r.bg;
            sum_lbgi += r.lbgi;
            sum_hbgi += r.hbgi;
            sum_risk += r.risk;
            if r.bg < HYPO_THRESHOLD {
                below += 1;
            } else if r.bg > HYPER_THRESHOLD {
                above += 1;
            }
        }
        let in_range = records.len() - below - above;

        Some(Self {
            mean_bg: sum_bg / n,
            min_bg,
            max_bg,
            pct_below_70: 100.0 * below as f64 / n,
            pct_in_range: 100.0 * in_range as f64 / n,
            pct_above_180: 100.0 * above as f64 / n,
            mean_lbgi: sum_lbgi / n,
            mean_hbgi: sum_hbgi / n,
            mean_risk: sum_risk / n,
        })
    }
}

/// Summary of one successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub patient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    pub samples: usize,
    /// Absent when the series is empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<GlycemicStats>,
}

/// A failed job and its reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub patient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    pub reason: String,
}

/// Summary of one arm (or of a combined result set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmSummary {
    /// Run identifier
    pub run_id: Uuid,
    /// Master seed of the run
    pub seed: u64,
    /// Arm label
    pub label: String,
    /// Successful jobs in result order
    pub jobs: Vec<JobSummary>,
    /// Failed jobs in result order
    pub failures: Vec<FailureSummary>,
    /// Statistics pooled over every successful sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall: Option<GlycemicStats>,
}

impl ArmSummary {
    /// Summarizes a result set.
    pub fn from_results(run_id: Uuid, seed: u64, label: impl Into<String>, results: &ResultSet) -> Self {
        let jobs = results
            .successes()
            .map(|(key, series)| JobSummary {
                patient: key.patient.to_string(),
                controller: key.controller.clone(),
                samples: series.len(),
                stats: GlycemicStats::from_series(series),
            })
            .collect();

        let failures = results
            .failures()
            .map(|(key, err)| FailureSummary {
                patient: key.patient.to_string(),
                controller: key.controller.clone(),
                reason: err.to_string(),
            })
            .collect();

        let pooled: TimeSeries = results
            .successes()
            .flat_map(|(_, series)| series.records().iter().cloned())
            .collect();

        Self {
            run_id,
            seed,
            label: label.into(),
            jobs,
            failures,
            overall: GlycemicStats::from_series(&pooled),
        }
    }

    /// Looks up a job summary by key.
    pub fn job(&self, key: &ResultKey) -> Option<&JobSummary> {
        self.jobs
            .iter()
            .find(|j| j.patient == key.patient.as_str() && j.controller == key.controller)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &Path) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

/// Produces a report from a result set into an output folder.
pub trait ReportGenerator: Send + Sync {
    /// Generates the report for `results` inside `dir`.
    fn generate(&self, results: &ResultSet, dir: &Path) -> Result<ArmSummary, SimError>;
}

/// Writes `summary.json` with per-job statistics and failures.
#[derive(Debug, Clone)]
pub struct SummaryReport {
    run_id: Uuid,
    seed: u64,
    label: String,
}

impl SummaryReport {
    pub fn new(run_id: Uuid, seed: u64, label: impl Into<String>) -> Self {
        Self {
            run_id,
            seed,
            label: label.into(),
        }
    }
}

impl ReportGenerator for SummaryReport {
    fn generate(&self, results: &ResultSet, dir: &Path) -> Result<ArmSummary, SimError> {
        let summary = ArmSummary::from_results(self.run_id, self.seed, self.label.clone(), results);
        summary.write_to_file(&dir.join(SUMMARY_FILE))?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use chrono::NaiveDate;
    use glucosim_core::{risk_index, SimRecord};

    fn series(values: &[f64]) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &bg)| {
                let risk = risk_index(bg);
                SimRecord {
                    time: start,
                    minutes: 3.0 * i as f64,
                    bg,
                    cgm: bg,
                    cho: 0.0,
                    insulin: 0.0,
                    lbgi: risk.lbgi,
                    hbgi: risk.hbgi,
                    risk: risk.total(),
                }
            })
            .collect()
    }

    #[test]
    fn test_stats_bands() {
        let stats = GlycemicStats::from_series(&series(&[60.0, 100.0, 150.0, 200.0])).unwrap();
        assert_eq!(stats.mean_bg, 127.5);
        assert_eq!(stats.min_bg, 60.0);
        assert_eq!(stats.max_bg, 200.0);
        assert_eq!(stats.pct_below_70, 25.0);
        assert_eq!(stats.pct_in_range, 50.0);
        assert_eq!(stats.pct_above_180, 25.0);
        assert!(stats.mean_lbgi > 0.0);
        assert!(stats.mean_hbgi > 0.0);
    }

    #[test]
    fn test_boundaries_count_as_in_range() {
        let stats = GlycemicStats::from_series(&series(&[70.0, 180.0])).unwrap();
        assert_eq!(stats.pct_in_range, 100.0);
    }

    #[test]
    fn test_empty_series_has_no_stats() {
        assert!(GlycemicStats::from_series(&TimeSeries::new()).is_none());
    }

    #[test]
    fn test_summary_lists_failures() {
        let mut results = ResultSet::new();
        results
            .insert(ResultKey::patient("adult#001".into()), Ok(series(&[120.0, 130.0])))
            .unwrap();
        results
            .insert(ResultKey::patient("adult#002".into()), Err(JobError::Cancelled))
            .unwrap();

        let summary = ArmSummary::from_results(Uuid::nil(), 7, "BB", &results);
        assert_eq!(summary.jobs.len(), 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].patient, "adult#002");
        assert_eq!(summary.failures[0].reason, "cancelled before start");
        assert_eq!(summary.overall.as_ref().unwrap().mean_bg, 125.0);
        assert!(summary.job(&ResultKey::patient("adult#001".into())).is_some());
    }

    #[test]
    fn test_generate_writes_json() {
        let dir = std::env::temp_dir().join(format!("glucosim-report-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut results = ResultSet::new();
        results
            .insert(ResultKey::patient("child#001".into()), Ok(series(&[90.0])))
            .unwrap();

        let run_id = Uuid::new_v4();
        let summary = SummaryReport::new(run_id, 1, "PID").generate(&results, &dir).unwrap();

        let text = std::fs::read_to_string(dir.join(SUMMARY_FILE)).unwrap();
        let parsed: ArmSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.run_id, run_id);
        assert_eq!(parsed.label, "PID");
        assert_eq!(parsed.jobs.len(), summary.jobs.len());
        assert_eq!(parsed.jobs[0].patient, "child#001");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
