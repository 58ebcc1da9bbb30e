//! Sampled trainer-state values and their classification
//!
//! Values arrive from the trainer as a tagged union ([`StateValue`]) and are
//! classified once, at the ingestion boundary, into an explicit
//! [`TensorKind`]. Dispatch then matches on the kind instead of re-probing
//! shapes, which keeps the emission paths mutually exclusive by construction.

use ndarray::{ArrayD, Axis};

/// A value read from the trainer's state map
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    /// A plain number (loss, error rate, learning rate)
    Scalar(f64),
    /// A floating-point tensor of arbitrary rank
    FloatTensor(ArrayD<f32>),
    /// An integer tensor, e.g. a per-pixel class-index map
    IntTensor(ArrayD<i64>),
    /// A list of values, logged elementwise
    List(Vec<StateValue>),
}

/// What a single (non-list) state value is, for choosing an emission path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorKind {
    /// 0-d tensor or plain number
    Scalar,
    /// 1-d tensor
    Vector,
    /// (N, H, W) — class map without a channel axis
    LabelImage,
    /// (N, Z, H, W) integer tensor — volumetric class map
    LabelVolume,
    /// (N, C, H, W) float tensor
    Image,
    /// (N, C, Z, H, W) tensor
    Volume,
    /// Tensor-shaped but not something we can emit
    Unsupported,
}

impl StateValue {
    /// Classify this value into an emission kind
    ///
    /// Lists are the caller's concern (they recurse before classification),
    /// so a list classifies as `Unsupported` here.
    #[must_use]
    pub fn kind(&self) -> TensorKind {
        let ndim = match self {
            StateValue::Scalar(_) => return TensorKind::Scalar,
            StateValue::List(_) => return TensorKind::Unsupported,
            StateValue::FloatTensor(t) => t.ndim(),
            StateValue::IntTensor(t) => t.ndim(),
        };
        let is_int = matches!(self, StateValue::IntTensor(_));
        match ndim {
            0 => TensorKind::Scalar,
            1 => TensorKind::Vector,
            // Rank 3 cannot carry a channel axis, so it is a label map
            // regardless of dtype.
            3 => TensorKind::LabelImage,
            4 if is_int => TensorKind::LabelVolume,
            4 => TensorKind::Image,
            5 => TensorKind::Volume,
            _ => TensorKind::Unsupported,
        }
    }

    /// The value as a single number, if it is scalar-kinded
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            StateValue::Scalar(v) => Some(*v),
            StateValue::FloatTensor(t) if t.ndim() == 0 => {
                t.first().map(|v| f64::from(*v))
            }
            StateValue::IntTensor(t) if t.ndim() == 0 => t.first().map(|v| *v as f64),
            _ => None,
        }
    }

    /// The value as a float tensor, converting integer tensors elementwise
    #[must_use]
    pub fn to_float_tensor(&self) -> Option<ArrayD<f32>> {
        match self {
            StateValue::FloatTensor(t) => Some(t.clone()),
            StateValue::IntTensor(t) => Some(t.mapv(|v| v as f32)),
            _ => None,
        }
    }

    /// The value as a float tensor with a singleton channel axis inserted
    /// after the batch axis, turning a label map into an image/volume batch
    #[must_use]
    pub fn to_channeled_float_tensor(&self) -> Option<ArrayD<f32>> {
        self.to_float_tensor().map(|t| t.insert_axis(Axis(1)))
    }

    /// The shape, for diagnostics; empty for scalars and lists
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        match self {
            StateValue::FloatTensor(t) => t.shape().to_vec(),
            StateValue::IntTensor(t) => t.shape().to_vec(),
            _ => Vec::new(),
        }
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        StateValue::Scalar(v)
    }
}

impl From<f32> for StateValue {
    fn from(v: f32) -> Self {
        StateValue::Scalar(f64::from(v))
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        StateValue::Scalar(v as f64)
    }
}

impl From<ArrayD<f32>> for StateValue {
    fn from(t: ArrayD<f32>) -> Self {
        StateValue::FloatTensor(t)
    }
}

impl From<ArrayD<i64>> for StateValue {
    fn from(t: ArrayD<i64>) -> Self {
        StateValue::IntTensor(t)
    }
}

impl From<Vec<StateValue>> for StateValue {
    fn from(vs: Vec<StateValue>) -> Self {
        StateValue::List(vs)
    }
}
