//! Error types for the metric forwarder

/// Errors from forwarder configuration and logging operations
#[derive(Debug, thiserror::Error)]
pub enum TableroError {
    /// Phase token was not one of the accepted aliases
    #[error("invalid phase '{0}', expected one of: train, training, validation, validating")]
    InvalidPhase(String),

    /// Observation key failed validation
    #[error("invalid observation key: {0}")]
    InvalidKey(String),

    /// Attempted to unobserve a key that was never observed
    #[error("key '{key}' is not observed during {phase}")]
    KeyNotObserved {
        key: String,
        phase: crate::registry::Phase,
    },

    /// Frequency descriptor could not be parsed
    #[error("invalid frequency descriptor '{0}', expected e.g. '10 iterations' or '1 epoch'")]
    InvalidFrequency(String),

    /// Batch tensor is neither an image batch (N,C,H,W) nor a volume batch (N,C,Z,H,W)
    #[error("batch shape {0:?} is neither an image nor a volume batch")]
    AmbiguousBatchShape(Vec<usize>),

    /// Index-selection token is not valid on this axis
    #[error("selection '{token}' is not supported on the {axis} axis")]
    UnsupportedSelection { axis: &'static str, token: String },

    /// Image has a rank or format the axis reordering cannot handle
    #[error("cannot reorder image of shape {0:?} for the writer")]
    UnsupportedImageShape(Vec<usize>),

    /// Image format token was not CHW or HWC
    #[error("image format must be 'CHW' or 'HWC', got '{0}'")]
    InvalidImageFormat(String),

    /// Histogram logging is explicitly deferred functionality
    #[error("histogram logging is not implemented")]
    HistogramUnimplemented,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for forwarder operations
pub type Result<T> = std::result::Result<T, TableroError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Phase;

    #[test]
    fn test_error_display() {
        let err = TableroError::InvalidPhase("testing".to_string());
        assert!(err.to_string().contains("testing"));

        let err = TableroError::KeyNotObserved {
            key: "loss".to_string(),
            phase: Phase::Training,
        };
        assert!(err.to_string().contains("loss"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = TableroError::from(io);
        assert!(matches!(err, TableroError::Io(_)));
    }
}
