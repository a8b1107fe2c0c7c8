//! Cohort selection from the patient registry.

use crate::error::SimError;
use glucosim_core::{PatientGroup, PatientRegistry};
use glucosim_env::PatientId;
use serde::{Deserialize, Serialize};

/// Named population groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CohortGroup {
    All,
    Adolescents,
    Adults,
    Children,
}

impl CohortGroup {
    /// Returns all groups.
    pub fn all() -> Vec<CohortGroup> {
        vec![
            CohortGroup::All,
            CohortGroup::Adolescents,
            CohortGroup::Adults,
            CohortGroup::Children,
        ]
    }

    /// Returns the group name.
    pub fn name(&self) -> &'static str {
        match self {
            CohortGroup::All => "All",
            CohortGroup::Adolescents => "Adolescents",
            CohortGroup::Adults => "Adults",
            CohortGroup::Children => "Children",
        }
    }

    /// Registry group this cohort is restricted to; None for `All`.
    fn patient_group(&self) -> Option<PatientGroup> {
        match self {
            CohortGroup::All => None,
            CohortGroup::Adolescents => Some(PatientGroup::Adolescent),
            CohortGroup::Adults => Some(PatientGroup::Adult),
            CohortGroup::Children => Some(PatientGroup::Child),
        }
    }
}

impl std::fmt::Display for CohortGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for CohortGroup {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(CohortGroup::All),
            "adolescents" | "adolescent" => Ok(CohortGroup::Adolescents),
            "adults" | "adult" => Ok(CohortGroup::Adults),
            "children" | "child" => Ok(CohortGroup::Children),
            _ => Err(SimError::invalid(format!(
                "unknown cohort group '{}' (expected All, Adolescents, Adults or Children)",
                s
            ))),
        }
    }
}

/// An ordered, named group of patients. Order is registry order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    /// Display name (group name or "custom")
    pub name: String,
    /// Patients in registry order
    pub patients: Vec<PatientId>,
}

impl Cohort {
    /// Number of patients.
    pub fn len(&self) -> usize {
        self.patients.len()
    }

    /// Returns true if the cohort has no patients.
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

/// Resolves cohorts against a registry.
#[derive(Debug, Clone)]
pub struct CohortSelector {
    registry: PatientRegistry,
}

impl CohortSelector {
    /// Creates a selector over a loaded registry.
    pub fn new(registry: PatientRegistry) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &PatientRegistry {
        &self.registry
    }

    /// Returns every patient of `group` in registry order.
    ///
    /// # Errors
    /// * `InvalidArgument` if the group has no patients in this registry
    pub fn select(&self, group: CohortGroup) -> Result<Cohort, SimError> {
        let patients = match group.patient_group() {
            None => self.registry.names(),
            Some(g) => self.registry.names_in(g),
        };
        if patients.is_empty() {
            return Err(SimError::invalid(format!("cohort {} is empty in this registry", group)));
        }
        Ok(Cohort {
            name: group.name().to_string(),
            patients,
        })
    }

    /// Parses a group name and selects it.
    pub fn select_named(&self, group: &str) -> Result<Cohort, SimError> {
        self.select(group.parse()?)
    }

    /// Builds a custom cohort from explicit names, keeping the given order.
    ///
    /// # Errors
    /// * `InvalidArgument` for an empty list, a duplicate or a name not in the registry
    pub fn select_names(&self, names: &[String]) -> Result<Cohort, SimError> {
        if names.is_empty() {
            return Err(SimError::invalid("explicit patient list is empty"));
        }
        let mut patients: Vec<PatientId> = Vec::with_capacity(names.len());
        for name in names {
            let id = PatientId::new(name.as_str());
            if self.registry.get(&id).is_none() {
                return Err(SimError::invalid(format!("patient {} is not in the registry", name)));
            }
            if patients.contains(&id) {
                return Err(SimError::invalid(format!("patient {} listed twice", name)));
            }
            patients.push(id);
        }
        Ok(Cohort {
            name: "custom".to_string(),
            patients,
        })
    }
}
