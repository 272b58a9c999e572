use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Match policy
// ---------------------------------------------------------------------------

/// Tunables for the reconciliation run. The defaults are the values the MKCP
/// exports have always been reconciled with; deployments may override them
/// through the `[reconcile]` settings table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    /// Fuzzy threshold as a fraction of the stored name's length.
    pub distance_factor: f64,
    /// Lower bound on the fuzzy threshold.
    pub min_distance: usize,
    /// Upper bound on the fuzzy threshold.
    pub max_distance: usize,
    /// Price level whose rate carries the package factor (case-insensitive).
    pub price_level: String,
    /// Group assigned to stored items with no resolved group.
    pub virtual_group: String,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            distance_factor: 0.10,
            min_distance: 2,
            max_distance: 3,
            price_level: "Kona".into(),
            virtual_group: "Togo Cycles".into(),
        }
    }
}

impl MatchPolicy {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let policy: MatchPolicy = toml::from_str(input).map_err(|e| ReconError::PolicyParse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if !(0.0..=1.0).contains(&self.distance_factor) {
            return Err(ReconError::PolicyValidation(format!(
                "distance_factor must be between 0 and 1, got {}",
                self.distance_factor
            )));
        }
        if self.min_distance > self.max_distance {
            return Err(ReconError::PolicyValidation(format!(
                "min_distance ({}) exceeds max_distance ({})",
                self.min_distance, self.max_distance
            )));
        }
        if self.price_level.trim().is_empty() {
            return Err(ReconError::PolicyValidation("price_level must not be empty".into()));
        }
        if self.virtual_group.trim().is_empty() {
            return Err(ReconError::PolicyValidation("virtual_group must not be empty".into()));
        }
        Ok(())
    }

    /// Largest edit distance accepted for a stored name of `len` characters.
    pub fn threshold(&self, len: usize) -> usize {
        let scaled = (len as f64 * self.distance_factor) as usize;
        scaled.max(self.min_distance).min(self.max_distance)
    }
}
