//! Frequency policies and the per-step gate state machine
//!
//! A [`Frequency`] answers "how often" in iterations or epochs. A
//! [`FrequencyGate`] owns one policy plus the last-fired bookkeeping and is
//! ticked exactly once per training step; the boolean it returns is reused
//! for the rest of that step. Ticking is the only operation that advances
//! gate state, so there is no way to accidentally double-evaluate the policy
//! the way a side-effecting property getter can.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TableroError};

/// Unit a frequency counts in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrequencyUnit {
    /// Training iterations
    Iterations,
    /// Training epochs
    Epochs,
}

impl fmt::Display for FrequencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencyUnit::Iterations => write!(f, "iterations"),
            FrequencyUnit::Epochs => write!(f, "epochs"),
        }
    }
}

/// How often an emission should occur
///
/// # Example
///
/// ```
/// use tablero::frequency::{Frequency, FrequencyUnit};
///
/// let every_ten: Frequency = "every 10 iterations".parse().unwrap();
/// assert_eq!(every_ten, Frequency::new(10, FrequencyUnit::Iterations).unwrap());
///
/// let each_epoch: Frequency = "1 epoch".parse().unwrap();
/// assert_eq!(each_epoch.unit(), FrequencyUnit::Epochs);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frequency {
    every: u64,
    unit: FrequencyUnit,
}

impl Frequency {
    /// Create a frequency firing every `every` units
    ///
    /// `every` must be at least 1.
    pub fn new(every: u64, unit: FrequencyUnit) -> Result<Self> {
        if every == 0 {
            return Err(TableroError::InvalidFrequency(
                "frequency count must be at least 1".to_string(),
            ));
        }
        Ok(Self { every, unit })
    }

    /// Fire once every training iteration
    #[must_use]
    pub fn every_iteration() -> Self {
        Self {
            every: 1,
            unit: FrequencyUnit::Iterations,
        }
    }

    /// The count component
    #[must_use]
    pub fn every(&self) -> u64 {
        self.every
    }

    /// The unit component
    #[must_use]
    pub fn unit(&self) -> FrequencyUnit {
        self.unit
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "every {} {}", self.every, self.unit)
    }
}

impl FromStr for Frequency {
    type Err = TableroError;

    /// Parse short-form descriptors like `"10 iterations"`, `"every 10
    /// iterations"`, or `"1 epoch"`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TableroError::InvalidFrequency(s.to_string());
        let mut words = s.split_whitespace().peekable();
        if words.peek() == Some(&"every") {
            words.next();
        }
        let count: u64 = words
            .next()
            .and_then(|w| w.parse().ok())
            .ok_or_else(invalid)?;
        let unit = match words.next() {
            Some("iteration" | "iterations") => FrequencyUnit::Iterations,
            Some("epoch" | "epochs") => FrequencyUnit::Epochs,
            _ => return Err(invalid()),
        };
        if words.next().is_some() {
            return Err(invalid());
        }
        Frequency::new(count, unit).map_err(|_| invalid())
    }
}

impl From<(u64, FrequencyUnit)> for Frequency {
    /// Build from a `(count, unit)` pair; a zero count is clamped to 1
    fn from((every, unit): (u64, FrequencyUnit)) -> Self {
        Self {
            every: every.max(1),
            unit,
        }
    }
}

/// Persistent per-step gate over a [`Frequency`]
///
/// [`tick`](FrequencyGate::tick) must be called exactly once per training
/// step; the returned boolean is the gate's answer for that whole step.
/// An unset frequency defaults to firing every iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyGate {
    frequency: Option<Frequency>,
    last_fired: Option<u64>,
}

impl FrequencyGate {
    /// Gate with the default policy (fire every iteration)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The configured policy, or the every-iteration default
    #[must_use]
    pub fn frequency(&self) -> Frequency {
        self.frequency.unwrap_or_else(Frequency::every_iteration)
    }

    /// Replace the policy, resetting the last-fired bookkeeping
    pub fn set_frequency(&mut self, frequency: Frequency) {
        self.frequency = Some(frequency);
        self.last_fired = None;
    }

    /// Advance the gate by one training step
    ///
    /// Returns whether the gated emission should fire this step. The first
    /// tick always fires; afterwards the gate fires once the governing
    /// counter has advanced by at least the policy's count since the last
    /// firing.
    pub fn tick(&mut self, iteration_count: u64, epoch_count: u64) -> bool {
        let frequency = self.frequency();
        let counter = match frequency.unit() {
            FrequencyUnit::Iterations => iteration_count,
            FrequencyUnit::Epochs => epoch_count,
        };
        let fire = match self.last_fired {
            None => true,
            Some(last) => counter.saturating_sub(last) >= frequency.every(),
        };
        if fire {
            self.last_fired = Some(counter);
        }
        fire
    }

    /// Forget the last-fired bookkeeping, as if freshly constructed
    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Over n sequential iterations a gate with period p fires
        /// ceil(n / p) times
        #[test]
        fn gate_cadence_matches_period(
            period in 1u64..20,
            steps in 1u64..200,
        ) {
            let mut gate = FrequencyGate::new();
            gate.set_frequency(
                Frequency::new(period, FrequencyUnit::Iterations).unwrap(),
            );
            let fired = (0..steps).filter(|&i| gate.tick(i, 0)).count() as u64;
            prop_assert_eq!(fired, steps.div_ceil(period));
        }

        /// Display and FromStr round-trip
        #[test]
        fn frequency_display_parses_back(
            every in 1u64..1000,
            epochs in proptest::bool::ANY,
        ) {
            let unit = if epochs {
                FrequencyUnit::Epochs
            } else {
                FrequencyUnit::Iterations
            };
            let f = Frequency::new(every, unit).unwrap();
            let back: Frequency = f.to_string().parse().unwrap();
            prop_assert_eq!(f, back);
        }
    }
}
