//! Index-selection tokens for batch/channel/z-slice extraction

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TableroError};

/// Which indices along one batch axis should be emitted
///
/// `Mid` (the single central index) is only meaningful on the z axis of a
/// volume; resolving it on any other axis fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSelection {
    /// Every index along the axis
    All,
    /// The single central index, `len / 2` (z axis only)
    Mid,
    /// A single index
    One(usize),
    /// An explicit list of indices
    Many(Vec<usize>),
}

impl IndexSelection {
    /// Resolve to the concrete index list for an axis of length `len`
    ///
    /// `axis` names the axis in errors; `allow_mid` is set only for the
    /// z axis. Out-of-range indices are allowed through; they simply match
    /// nothing during extraction.
    pub fn resolve(&self, axis: &'static str, len: usize, allow_mid: bool) -> Result<Vec<usize>> {
        match self {
            IndexSelection::All => Ok((0..len).collect()),
            IndexSelection::Mid if allow_mid => Ok(vec![len / 2]),
            IndexSelection::Mid => Err(TableroError::UnsupportedSelection {
                axis,
                token: "mid".to_string(),
            }),
            IndexSelection::One(i) => Ok(vec![*i]),
            IndexSelection::Many(indices) => Ok(indices.clone()),
        }
    }
}

impl Default for IndexSelection {
    fn default() -> Self {
        IndexSelection::All
    }
}

impl FromStr for IndexSelection {
    type Err = TableroError;

    /// Accepts `"all"`, `"mid"`, or a single index like `"3"`
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(IndexSelection::All),
            "mid" => Ok(IndexSelection::Mid),
            other => other.parse::<usize>().map(IndexSelection::One).map_err(|_| {
                TableroError::UnsupportedSelection {
                    axis: "any",
                    token: other.to_string(),
                }
            }),
        }
    }
}

impl From<usize> for IndexSelection {
    fn from(i: usize) -> Self {
        IndexSelection::One(i)
    }
}

impl From<Vec<usize>> for IndexSelection {
    fn from(indices: Vec<usize>) -> Self {
        IndexSelection::Many(indices)
    }
}
