//! Result folders and the human-readable run log.

use crate::config::ScenarioPolicy;
use crate::error::SimError;
use crate::scenario::MealPattern;
use chrono::{DateTime, Local};
use glucosim_env::{PatientId, Scenario};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// File name of the run log inside an arm folder
pub const RUN_LOG_FILE: &str = "scen.txt";

/// Timestamp format of result folders
const FOLDER_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Folder name for a run started at `now`.
pub fn folder_name(now: DateTime<Local>) -> String {
    now.format(FOLDER_FORMAT).to_string()
}

/// `<root>/<YYYY-mm-dd_HH-MM-SS>/` for a run started at `now`. Not created here.
pub fn result_folder(root: &Path, now: DateTime<Local>) -> PathBuf {
    root.join(folder_name(now))
}

/// Formats events as `[(7.1, 49.3), (12.05, 61.2)]`.
pub fn format_events(scenario: &Scenario) -> String {
    let items: Vec<String> = scenario
        .events()
        .iter()
        .map(|e| format!("({}, {})", e.time_offset_hours, e.meal_grams))
        .collect();
    format!("[{}]", items.join(", "))
}

/// Everything needed to reproduce or audit one arm of a run.
#[derive(Debug, Clone)]
pub struct RunLogger {
    pub run_id: Uuid,
    pub seed: u64,
    pub cohort: String,
    pub patients: Vec<PatientId>,
    pub sensor: String,
    pub sensor_seed: u64,
    pub pump: String,
    pub base_pattern: MealPattern,
    pub policy: ScenarioPolicy,
    /// Realized scenarios with what they apply to ("all", an arm or a patient)
    pub scenarios: Vec<(String, Scenario)>,
    /// Labels of every arm in the run
    pub controllers: Vec<String>,
}

impl RunLogger {
    /// Renders the log as `label: ` / value line pairs.
    pub fn render(&self) -> String {
        let patients: Vec<&str> = self.patients.iter().map(|p| p.as_str()).collect();
        let mut lines = vec![
            "run id: ".to_string(),
            self.run_id.to_string(),
            "seed: ".to_string(),
            self.seed.to_string(),
            "cohort: ".to_string(),
            self.cohort.clone(),
            "patient name: ".to_string(),
            format!("{:?}", patients),
            "sensor: ".to_string(),
            format!("{} (seed {})", self.sensor, self.sensor_seed),
            "pump: ".to_string(),
            self.pump.clone(),
            "base scen: ".to_string(),
            self.base_pattern.to_string(),
            "scenario policy: ".to_string(),
            self.policy.to_string(),
        ];

        match self.scenarios.as_slice() {
            [(_, only)] => {
                lines.push("scen: ".to_string());
                lines.push(format_events(only));
            }
            many => {
                for (target, scenario) in many {
                    lines.push(format!("scen ({}): ", target));
                    lines.push(format_events(scenario));
                }
            }
        }

        lines.push("controllers: ".to_string());
        lines.push(format!("{:?}", self.controllers));
        lines.join("\n")
    }

    /// Writes the log to `<dir>/scen.txt`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, SimError> {
        let path = dir.join(RUN_LOG_FILE);
        fs::write(&path, self.render())?;
        debug!(path = %path.display(), "Wrote run log");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use glucosim_env::ScenarioEvent;

    fn scenario(events: Vec<ScenarioEvent>) -> Scenario {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Scenario::new(start, events)
    }

    fn logger(scenarios: Vec<(String, Scenario)>) -> RunLogger {
        RunLogger {
            run_id: Uuid::nil(),
            seed: 42,
            cohort: "Adolescents".to_string(),
            patients: vec![PatientId::new("adolescent#001"), PatientId::new("adolescent#002")],
            sensor: "Dexcom".to_string(),
            sensor_seed: 1,
            pump: "Insulet".to_string(),
            base_pattern: MealPattern::standard_day(),
            policy: ScenarioPolicy::Shared,
            scenarios,
            controllers: vec!["BBController".to_string(), "PID".to_string()],
        }
    }

    #[test]
    fn test_folder_name_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(folder_name(now), "2024-03-09_14-05-07");
    }

    #[test]
    fn test_format_events() {
        let s = scenario(vec![ScenarioEvent::new(7.12, 49.5), ScenarioEvent::new(12.0, 60.0)]);
        assert_eq!(format_events(&s), "[(7.12, 49.5), (12, 60)]");
    }

    #[test]
    fn test_render_shared() {
        let text = logger(vec![("all".to_string(), scenario(vec![ScenarioEvent::new(7.0, 50.0)]))]).render();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines.contains(&"patient name: "));
        assert!(lines.contains(&r#"["adolescent#001", "adolescent#002"]"#));
        assert!(lines.contains(&"[(7, 50), (12, 60), (18.5, 80), (23, 15)]"));
        assert!(lines.contains(&"scen: "));
        assert!(lines.contains(&"[(7, 50)]"));
        assert_eq!(lines.last(), Some(&r#"["BBController", "PID"]"#));
    }

    #[test]
    fn test_render_per_patient() {
        let text = logger(vec![
            ("adolescent#001".to_string(), scenario(vec![ScenarioEvent::new(7.0, 50.0)])),
            ("adolescent#002".to_string(), scenario(vec![ScenarioEvent::new(7.5, 45.0)])),
        ])
        .render();
        assert!(text.contains("scen (adolescent#001): \n[(7, 50)]"));
        assert!(text.contains("scen (adolescent#002): \n[(7.5, 45)]"));
    }

    #[test]
    fn test_write_and_folder() {
        let root = std::env::temp_dir().join(format!("glucosim-runlog-{}", Uuid::new_v4()));
        let folder = result_folder(&root, Local::now());
        assert!(folder.starts_with(&root));
        std::fs::create_dir_all(&folder).unwrap();

        let path = logger(vec![("all".to_string(), scenario(vec![]))]).write(&folder).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().starts_with("run id: \n"));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
