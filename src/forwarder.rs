//! The metric forwarder: a training-loop callback that samples observed
//! trainer states and forwards scalars and image batches to a summary writer
//!
//! The forwarder is constructed once per training run. The host calls
//! [`end_of_training_iteration`](MetricForwarder::end_of_training_iteration)
//! after every training iteration and
//! [`end_of_validation_run`](MetricForwarder::end_of_validation_run) after
//! every validation pass, handing in its [`TrainerView`]. Everything else —
//! what to sample, how often, which slices of a batch to emit — is
//! configuration.
//!
//! # Example
//!
//! ```
//! use tablero::{InMemoryWriter, MetricForwarder, Phase, StateValue, TrainerView};
//!
//! struct Trainer {
//!     iteration: u64,
//!     loss: f64,
//! }
//!
//! impl TrainerView for Trainer {
//!     fn iteration_count(&self) -> u64 {
//!         self.iteration
//!     }
//!     fn epoch_count(&self) -> u64 {
//!         0
//!     }
//!     fn get_state(&self, key: &str) -> Option<StateValue> {
//!         (key == "training_loss").then(|| StateValue::Scalar(self.loss))
//!     }
//! }
//!
//! # fn main() -> tablero::Result<()> {
//! let mut forwarder: MetricForwarder<InMemoryWriter> = MetricForwarder::new();
//! let trainer = Trainer { iteration: 5, loss: 0.42 };
//! forwarder.end_of_training_iteration(&trainer)?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TableroError};
use crate::extract::{extract_images_from_batch, ExtractConfig, ExtractedImage};
use crate::frequency::{Frequency, FrequencyGate};
use crate::registry::{ObservationRegistry, Phase};
use crate::select::IndexSelection;
use crate::value::{StateValue, TensorKind};
use crate::writer::{normalize_image, order_image_axes, ImageFormat, SummaryWriter};

/// Narrow read-only interface onto the host trainer
///
/// Absence of a state never raises; the forwarder simply skips that key.
pub trait TrainerView {
    /// Current training iteration count
    fn iteration_count(&self) -> u64;

    /// Current epoch count
    fn epoch_count(&self) -> u64;

    /// Named training-state value, or `None` if the state does not exist yet
    fn get_state(&self, key: &str) -> Option<StateValue>;
}

/// Which emission paths a `log_object` call may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogAllowances {
    pub scalars: bool,
    pub images: bool,
    pub histograms: bool,
}

impl LogAllowances {
    /// Everything allowed
    #[must_use]
    pub fn all() -> Self {
        Self {
            scalars: true,
            images: true,
            histograms: true,
        }
    }
}

impl Default for LogAllowances {
    fn default() -> Self {
        Self::all()
    }
}

/// Training-loop observer forwarding metrics to a [`SummaryWriter`]
///
/// The writer handle is created lazily on first use and excluded from serde
/// snapshots, so a restored forwarder reopens it transparently.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MetricForwarder<W: SummaryWriter> {
    log_directory: Option<PathBuf>,
    registry: ObservationRegistry,
    scalar_gate: FrequencyGate,
    image_gate: FrequencyGate,
    histogram_gate: FrequencyGate,
    extract: ExtractConfig,
    writer_image_format: ImageFormat,
    #[serde(skip)]
    writer: Option<W>,
}

impl<W: SummaryWriter> Default for MetricForwarder<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: SummaryWriter> MetricForwarder<W> {
    /// Pixel-axis layout the writer requires
    pub const WRITER_IMAGE_FORMAT: ImageFormat = ImageFormat::Chw;

    /// Forwarder with the default registry, every-iteration gates, and
    /// default extraction config (all instances, all channels, mid z slice)
    #[must_use]
    pub fn new() -> Self {
        Self {
            log_directory: None,
            registry: ObservationRegistry::new(),
            scalar_gate: FrequencyGate::new(),
            image_gate: FrequencyGate::new(),
            histogram_gate: FrequencyGate::new(),
            extract: ExtractConfig::default(),
            writer_image_format: Self::WRITER_IMAGE_FORMAT,
            writer: None,
        }
    }

    /// Set the directory the writer logs under
    #[must_use]
    pub fn with_log_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.log_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set how often scalars are emitted
    #[must_use]
    pub fn with_log_scalars_every(mut self, frequency: Frequency) -> Self {
        self.scalar_gate.set_frequency(frequency);
        self
    }

    /// Set how often image batches are emitted
    ///
    /// Leaving this at the every-iteration default can generate very large
    /// logs and slow training down.
    #[must_use]
    pub fn with_log_images_every(mut self, frequency: Frequency) -> Self {
        self.image_gate.set_frequency(frequency);
        self
    }

    /// Set how often histograms would be emitted
    #[must_use]
    pub fn with_log_histograms_every(mut self, frequency: Frequency) -> Self {
        self.histogram_gate.set_frequency(frequency);
        self
    }

    /// Set which batch indices image extraction emits
    #[must_use]
    pub fn with_image_batch_indices(mut self, selection: IndexSelection) -> Self {
        self.extract.batch_indices = selection;
        self
    }

    /// Set which channel indices image extraction emits
    #[must_use]
    pub fn with_image_channel_indices(mut self, selection: IndexSelection) -> Self {
        self.extract.channel_indices = selection;
        self
    }

    /// Set which z slices volume extraction emits
    #[must_use]
    pub fn with_volume_z_indices(mut self, selection: IndexSelection) -> Self {
        self.extract.z_indices = selection;
        self
    }

    /// Replace the scalar-gate policy
    pub fn set_log_scalars_every(&mut self, frequency: Frequency) {
        self.scalar_gate.set_frequency(frequency);
    }

    /// Replace the image-gate policy
    pub fn set_log_images_every(&mut self, frequency: Frequency) {
        self.image_gate.set_frequency(frequency);
    }

    /// Replace the histogram-gate policy
    pub fn set_log_histograms_every(&mut self, frequency: Frequency) {
        self.histogram_gate.set_frequency(frequency);
    }

    /// The observation registry
    #[must_use]
    pub fn registry(&self) -> &ObservationRegistry {
        &self.registry
    }

    /// Mutable access to the observation registry
    pub fn registry_mut(&mut self) -> &mut ObservationRegistry {
        &mut self.registry
    }

    /// Observe a trainer state under a phase
    pub fn observe(&mut self, key: &str, phase: Phase) -> Result<&mut Self> {
        self.registry.observe(key, phase)?;
        Ok(self)
    }

    /// Stop observing a trainer state; fails if it was never observed
    pub fn unobserve(&mut self, key: &str, phase: Phase) -> Result<&mut Self> {
        self.registry.unobserve(key, phase)?;
        Ok(self)
    }

    /// Observe `training_<key>` and `validation_<key>` under their phases
    pub fn observe_training_and_validation_state(&mut self, key: &str) -> Result<&mut Self> {
        self.registry.observe_training_and_validation_state(key)?;
        Ok(self)
    }

    /// The live writer, opened lazily on first use
    pub fn writer(&mut self) -> Result<&mut W> {
        if self.writer.is_none() {
            self.writer = Some(W::open(self.log_directory.as_deref())?);
        }
        Ok(self.writer.as_mut().expect("writer opened above"))
    }

    /// Serialize configuration and registries to JSON
    ///
    /// The writer handle is excluded; a forwarder restored with
    /// [`from_snapshot`](MetricForwarder::from_snapshot) rebuilds it lazily.
    pub fn to_snapshot(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restore a forwarder from a JSON snapshot
    pub fn from_snapshot(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Forward a single named scalar at a step index
    pub fn log_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        self.writer()?.add_scalar(tag, value, step)
    }

    /// Condition and forward a list of extracted images
    ///
    /// A tagged image's own tag wins; raw arrays get `tag/<index>`. Axes are
    /// reordered from `format` to the writer's layout, then pixel
    /// intensities are min-max normalized into [0, 1].
    pub fn log_images(
        &mut self,
        tag: &str,
        images: Vec<ExtractedImage>,
        step: u64,
        format: ImageFormat,
    ) -> Result<()> {
        let target = self.writer_image_format;
        for (image_num, image) in images.into_iter().enumerate() {
            let (emission_tag, array) = match image {
                ExtractedImage::Tagged(tagged) => {
                    (tagged.tag().to_string(), tagged.array().clone())
                }
                ExtractedImage::Raw(array) => (format!("{tag}/{image_num}"), array),
            };
            let ordered = order_image_axes(array.into_dyn(), format, target)?;
            let normalized = normalize_image(&ordered);
            self.writer()?.add_image(&emission_tag, &normalized, step)?;
        }
        Ok(())
    }

    /// Extract and forward an image or volume batch
    pub fn log_image_or_volume_batch(
        &mut self,
        tag: &str,
        batch: &StateValue,
        step: u64,
    ) -> Result<()> {
        let images = extract_images_from_batch(batch, &self.extract, Some(tag))?;
        self.log_images(tag, images, step, Self::WRITER_IMAGE_FORMAT)
    }

    /// Forward a vector of values as a histogram
    ///
    /// Deferred functionality; always fails rather than silently dropping.
    pub fn log_histogram(&mut self, _tag: &str, _values: &[f32], _step: u64) -> Result<()> {
        Err(TableroError::HistogramUnimplemented)
    }

    /// Classify a sampled value and forward it along the allowed paths
    ///
    /// Lists recurse elementwise with `<tag>_<index>`. Tensor-shaped values
    /// that fit no emission path warn and continue; they must not abort the
    /// training loop.
    pub fn log_object(
        &mut self,
        tag: &str,
        value: &StateValue,
        allow: LogAllowances,
        step: u64,
    ) -> Result<()> {
        if let StateValue::List(elements) = value {
            for (element_num, element) in elements.iter().enumerate() {
                self.log_object(&format!("{tag}_{element_num}"), element, allow, step)?;
            }
            return Ok(());
        }

        match value.kind() {
            TensorKind::Scalar if allow.scalars => {
                if let Some(scalar) = value.as_scalar() {
                    self.log_scalar(tag, scalar, step)?;
                }
            }
            TensorKind::LabelImage | TensorKind::LabelVolume if allow.images => {
                if let Some(batch) = value.to_channeled_float_tensor() {
                    self.log_image_or_volume_batch(
                        tag,
                        &StateValue::FloatTensor(batch),
                        step,
                    )?;
                }
            }
            TensorKind::Image | TensorKind::Volume if allow.images => {
                self.log_image_or_volume_batch(tag, value, step)?;
            }
            TensorKind::Vector if allow.histograms => {
                let values: Vec<f32> = value
                    .to_float_tensor()
                    .map(|t| t.iter().copied().collect())
                    .unwrap_or_default();
                self.log_histogram(tag, &values, step)?;
            }
            TensorKind::Unsupported => {
                if !value.shape().is_empty() {
                    eprintln!(
                        "Warning: unsupported attempt to log tensor '{}' of shape {:?}",
                        tag,
                        value.shape()
                    );
                }
            }
            // Kind recognized but its path is gated off this step
            _ => {}
        }
        Ok(())
    }

    /// End-of-training-iteration entry point
    ///
    /// Ticks all three gates exactly once for this step, then logs every
    /// observed training state the trainer currently exposes. Missing states
    /// are skipped silently; they may legitimately not exist early in
    /// training.
    pub fn end_of_training_iteration(&mut self, trainer: &dyn TrainerView) -> Result<()> {
        let iteration = trainer.iteration_count();
        let epoch = trainer.epoch_count();
        let allow = LogAllowances {
            scalars: self.scalar_gate.tick(iteration, epoch),
            images: self.image_gate.tick(iteration, epoch),
            histograms: self.histogram_gate.tick(iteration, epoch),
        };
        if !allow.scalars && !allow.images && !allow.histograms {
            return Ok(());
        }
        let keys: Vec<String> = self.registry.keys(Phase::Training).iter().cloned().collect();
        for key in keys {
            let Some(state) = trainer.get_state(&key) else {
                continue;
            };
            self.log_object(&key, &state, allow, iteration)?;
        }
        Ok(())
    }

    /// End-of-validation-run entry point
    ///
    /// Validation states are logged unconditionally; validation runs are
    /// rare enough that gating them is not worth the skipped data points.
    pub fn end_of_validation_run(&mut self, trainer: &dyn TrainerView) -> Result<()> {
        let iteration = trainer.iteration_count();
        let keys: Vec<String> = self
            .registry
            .keys(Phase::Validating)
            .iter()
            .cloned()
            .collect();
        for key in keys {
            let Some(state) = trainer.get_state(&key) else {
                continue;
            };
            self.log_object(&key, &state, LogAllowances::all(), iteration)?;
        }
        Ok(())
    }
}
