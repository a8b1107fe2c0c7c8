//! Reference patient registry.
//!
//! The registry is a CSV table keyed by patient name. Besides `Name` it may
//! carry an explicit `Group` column and the minimal-model parameters used by
//! [`MinimalModelPatient`](crate::patient::MinimalModelPatient). A table with
//! only a `Name` column is accepted for cohort selection; its patients then
//! cannot be simulated.

use crate::patient::MinimalModelParams;
use glucosim_env::{EnvError, PatientId};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// The registry bundled with the crate: 10 adolescents, 10 adults, 10 children.
const DEFAULT_REGISTRY: &str = include_str!("../data/patient_registry.csv");

/// Age group of a registry patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatientGroup {
    Adolescent,
    Adult,
    Child,
}

impl PatientGroup {
    /// Infers the group from a conventional name prefix (`adult#001`).
    pub fn from_name(name: &str) -> Option<Self> {
        let prefix = name.split('#').next()?.to_lowercase();
        match prefix.as_str() {
            "adolescent" => Some(PatientGroup::Adolescent),
            "adult" => Some(PatientGroup::Adult),
            "child" => Some(PatientGroup::Child),
            _ => None,
        }
    }

    /// Lowercase name used in registry files.
    pub fn name(&self) -> &'static str {
        match self {
            PatientGroup::Adolescent => "adolescent",
            PatientGroup::Adult => "adult",
            PatientGroup::Child => "child",
        }
    }
}

impl std::fmt::Display for PatientGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw CSV row; parameter columns are optional as a block.
#[derive(Debug, Deserialize)]
struct RegistryRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Group", default)]
    group: Option<PatientGroup>,
    #[serde(rename = "BW", default)]
    body_weight: Option<f64>,
    #[serde(rename = "Gb", default)]
    gb: Option<f64>,
    #[serde(rename = "Ib", default)]
    ib: Option<f64>,
    #[serde(default)]
    p1: Option<f64>,
    #[serde(default)]
    p2: Option<f64>,
    #[serde(default)]
    p3: Option<f64>,
    #[serde(default)]
    n: Option<f64>,
    #[serde(rename = "Vg", default)]
    vg: Option<f64>,
    #[serde(rename = "Vi", default)]
    vi: Option<f64>,
    #[serde(default)]
    ka: Option<f64>,
    #[serde(default)]
    kabs: Option<f64>,
    #[serde(default)]
    f: Option<f64>,
    #[serde(rename = "CR", default)]
    carb_ratio: Option<f64>,
    #[serde(rename = "CF", default)]
    correction_factor: Option<f64>,
    #[serde(default)]
    basal: Option<f64>,
}

impl RegistryRow {
    fn params(&self) -> Result<Option<MinimalModelParams>, EnvError> {
        let fields = [
            self.body_weight,
            self.gb,
            self.ib,
            self.p1,
            self.p2,
            self.p3,
            self.n,
            self.vg,
            self.vi,
            self.ka,
            self.kabs,
            self.f,
            self.carb_ratio,
            self.correction_factor,
            self.basal,
        ];
        let present = fields.iter().filter(|v| v.is_some()).count();
        if present == 0 {
            return Ok(None);
        }
        if present != fields.len() {
            return Err(EnvError::registry(format!(
                "patient {} has incomplete model parameters ({} of {} columns)",
                self.name,
                present,
                fields.len()
            )));
        }
        let v: Vec<f64> = fields.iter().flatten().copied().collect();
        Ok(Some(MinimalModelParams {
            body_weight_kg: v[0],
            gb: v[1],
            ib: v[2],
            p1: v[3],
            p2: v[4],
            p3: v[5],
            n: v[6],
            vg: v[7],
            vi: v[8],
            ka: v[9],
            kabs: v[10],
            f: v[11],
            carb_ratio: v[12],
            correction_factor: v[13],
            basal_u_per_hour: v[14],
        }))
    }
}

/// One registry entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientRecord {
    /// Registry name
    pub id: PatientId,

    /// Explicit (or name-inferred) age group
    pub group: PatientGroup,

    /// Model parameters, if the registry carries them
    pub params: Option<MinimalModelParams>,
}

/// Ordered patient registry. Order is file order.
#[derive(Debug, Clone)]
pub struct PatientRegistry {
    records: Vec<PatientRecord>,
}

impl PatientRegistry {
    /// Loads the bundled registry.
    pub fn load_default() -> Result<Self, EnvError> {
        Self::from_reader(DEFAULT_REGISTRY.as_bytes())
    }

    /// Loads a registry from a CSV file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| EnvError::registry(format!("cannot open {}: {}", path.display(), e)))?;
        Self::from_reader(file)
    }

    /// Loads a registry from any CSV source with a header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, EnvError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| EnvError::registry(e.to_string()))?;
        if !headers.iter().any(|h| h == "Name") {
            return Err(EnvError::registry("missing Name column"));
        }

        let mut records = Vec::new();
        for row in csv_reader.deserialize::<RegistryRow>() {
            let row = row.map_err(|e| EnvError::registry(e.to_string()))?;
            let group = match row.group.or_else(|| PatientGroup::from_name(&row.name)) {
                Some(group) => group,
                None => {
                    return Err(EnvError::registry(format!(
                        "patient {} has no Group and its name has no known group prefix",
                        row.name
                    )))
                }
            };
            let params = row.params()?;
            if records.iter().any(|r: &PatientRecord| r.id.as_str() == row.name) {
                return Err(EnvError::registry(format!("duplicate patient {}", row.name)));
            }
            records.push(PatientRecord {
                id: PatientId::new(row.name),
                group,
                params,
            });
        }

        Ok(Self { records })
    }

    /// All records in file order.
    pub fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    /// All patient names in file order.
    pub fn names(&self) -> Vec<PatientId> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// Names of one group, in file order.
    pub fn names_in(&self, group: PatientGroup) -> Vec<PatientId> {
        self.records
            .iter()
            .filter(|r| r.group == group)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Looks up a record by name.
    pub fn get(&self, id: &PatientId) -> Option<&PatientRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// Number of patients.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the registry has no patients.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
