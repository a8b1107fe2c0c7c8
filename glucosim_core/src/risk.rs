//! Kovatchev blood glucose risk index.

/// Low/high risk components of one glucose value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RiskIndex {
    /// Low blood glucose index
    pub lbgi: f64,
    /// High blood glucose index
    pub hbgi: f64,
}

impl RiskIndex {
    /// Total risk (`lbgi + hbgi`).
    pub fn total(&self) -> f64 {
        self.lbgi + self.hbgi
    }
}

/// Computes the risk of a single glucose value (mg/dL).
///
/// The symmetrizing transform is zero at ~112.5 mg/dL, so values below it
/// contribute only to LBGI and values above it only to HBGI.
pub fn risk_index(glucose: f64) -> RiskIndex {
    let bg = glucose.max(1.0);
    let f = 1.509 * (bg.ln().powf(1.084) - 5.381);
    let risk = 10.0 * f * f;
    if f < 0.0 {
        RiskIndex { lbgi: risk, hbgi: 0.0 }
    } else {
        RiskIndex { lbgi: 0.0, hbgi: risk }
    }
}
