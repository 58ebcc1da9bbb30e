//! Observation registry: which trainer states get sampled, per phase
//!
//! The forwarder only reads trainer states that have been observed. Keys are
//! partitioned by training phase, and a default set is seeded so a
//! zero-configuration run still produces a minimal dashboard.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TableroError};

/// Training phase under which a state is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// End of each training iteration
    Training,
    /// End of each validation run
    Validating,
}

impl Phase {
    /// Phase name as used in derived state keys (`training_<key>` etc.)
    #[must_use]
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Phase::Training => "training",
            Phase::Validating => "validation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Training => write!(f, "training"),
            Phase::Validating => write!(f, "validating"),
        }
    }
}

impl FromStr for Phase {
    type Err = TableroError;

    /// Accepts the canonical names plus the `train`/`validation` aliases
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" | "training" => Ok(Phase::Training),
            "validation" | "validating" => Ok(Phase::Validating),
            other => Err(TableroError::InvalidPhase(other.to_string())),
        }
    }
}

/// Set of trainer-state keys to sample, partitioned by phase
///
/// `BTreeSet` keeps iteration order deterministic, which keeps writer output
/// stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRegistry {
    training: BTreeSet<String>,
    validating: BTreeSet<String>,
}

impl Default for ObservationRegistry {
    /// Registry seeded with the default observed states
    fn default() -> Self {
        let training = [
            "training_loss",
            "training_error",
            "training_prediction",
            "training_inputs",
            "training_target",
            "learning_rate",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let validating = ["validation_error_averaged", "validation_loss_averaged"]
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            training,
            validating,
        }
    }
}

impl ObservationRegistry {
    /// Create a registry with the default observed states
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with no observed states
    #[must_use]
    pub fn empty() -> Self {
        Self {
            training: BTreeSet::new(),
            validating: BTreeSet::new(),
        }
    }

    fn keys_mut(&mut self, phase: Phase) -> &mut BTreeSet<String> {
        match phase {
            Phase::Training => &mut self.training,
            Phase::Validating => &mut self.validating,
        }
    }

    /// Keys observed under the given phase, in sorted order
    #[must_use]
    pub fn keys(&self, phase: Phase) -> &BTreeSet<String> {
        match phase {
            Phase::Training => &self.training,
            Phase::Validating => &self.validating,
        }
    }

    /// Check whether a key is observed under the given phase
    #[must_use]
    pub fn contains(&self, key: &str, phase: Phase) -> bool {
        self.keys(phase).contains(key)
    }

    /// Observe a trainer state under a phase
    ///
    /// Observing an already-observed key is a no-op (set semantics).
    /// Empty keys are rejected.
    pub fn observe(&mut self, key: &str, phase: Phase) -> Result<&mut Self> {
        if key.is_empty() {
            return Err(TableroError::InvalidKey(
                "state key must be non-empty".to_string(),
            ));
        }
        self.keys_mut(phase).insert(key.to_string());
        Ok(self)
    }

    /// Stop observing a trainer state
    ///
    /// Fails if the key is not currently observed; a missing key signals a
    /// configuration bug, not a condition to paper over.
    pub fn unobserve(&mut self, key: &str, phase: Phase) -> Result<&mut Self> {
        if !self.keys_mut(phase).remove(key) {
            return Err(TableroError::KeyNotObserved {
                key: key.to_string(),
                phase,
            });
        }
        Ok(self)
    }

    /// Observe several trainer states under a phase
    pub fn observe_many<I, S>(&mut self, keys: I, phase: Phase) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.observe(key.as_ref(), phase)?;
        }
        Ok(self)
    }

    /// Stop observing several trainer states
    pub fn unobserve_many<I, S>(&mut self, keys: I, phase: Phase) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.unobserve(key.as_ref(), phase)?;
        }
        Ok(self)
    }

    /// Observe `training_<key>` while training and `validation_<key>` while
    /// validating
    ///
    /// The phase/key-prefix naming convention links the two registries.
    pub fn observe_training_and_validation_state(&mut self, key: &str) -> Result<&mut Self> {
        for phase in [Phase::Training, Phase::Validating] {
            let derived = format!("{}_{}", phase.key_prefix(), key);
            self.observe(&derived, phase)?;
        }
        Ok(self)
    }

    /// Batch form of [`observe_training_and_validation_state`]
    ///
    /// [`observe_training_and_validation_state`]:
    /// ObservationRegistry::observe_training_and_validation_state
    pub fn observe_training_and_validation_states<I, S>(&mut self, keys: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.observe_training_and_validation_state(key.as_ref())?;
        }
        Ok(self)
    }
}
