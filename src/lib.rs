//! tablero — training-loop observer
//!
//! A callback that periodically forwards scalar metrics and image/volume
//! batches from a training process to a summary-writer backend. It samples
//! named trainer states at the end of training iterations and validation
//! runs, classifies each value (scalar, label map, image, volume, vector),
//! slices batches per configuration, and hands conditioned images to the
//! writer.
//!
//! # Architecture
//!
//! - **[`ObservationRegistry`]**: which state keys get sampled, per phase
//! - **[`FrequencyGate`]**: per-step gating for scalars, images, histograms
//! - **[`StateValue`] / [`TensorKind`]**: classification at the ingestion
//!   boundary
//! - **[`extract_images_from_batch`]**: batch/channel/z-slice extraction
//!   into tagged 2-d images
//! - **[`SummaryWriter`]**: the external-writer interface, with JSON-lines
//!   and in-memory backends
//! - **[`MetricForwarder`]**: the callback that ties these together
//!
//! # Example
//!
//! ```
//! use tablero::{
//!     Frequency, InMemoryWriter, MetricForwarder, Phase, StateValue, TrainerView,
//! };
//!
//! struct Trainer;
//!
//! impl TrainerView for Trainer {
//!     fn iteration_count(&self) -> u64 {
//!         12
//!     }
//!     fn epoch_count(&self) -> u64 {
//!         1
//!     }
//!     fn get_state(&self, key: &str) -> Option<StateValue> {
//!         (key == "training_loss").then(|| StateValue::Scalar(0.07))
//!     }
//! }
//!
//! # fn main() -> tablero::Result<()> {
//! let mut forwarder: MetricForwarder<InMemoryWriter> = MetricForwarder::new()
//!     .with_log_scalars_every("every 10 iterations".parse::<Frequency>()?);
//! forwarder.observe("training_accuracy", Phase::Training)?;
//! forwarder.end_of_training_iteration(&Trainer)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod extract;
pub mod forwarder;
pub mod frequency;
pub mod registry;
pub mod select;
pub mod value;
pub mod writer;

pub use error::{Result, TableroError};
pub use extract::{extract_images_from_batch, ExtractConfig, ExtractedImage, TaggedImage};
pub use forwarder::{LogAllowances, MetricForwarder, TrainerView};
pub use frequency::{Frequency, FrequencyGate, FrequencyUnit};
pub use registry::{ObservationRegistry, Phase};
pub use select::IndexSelection;
pub use writer::{
    normalize_image, order_image_axes, ImageEvent, ImageFormat, InMemoryWriter, JsonlWriter,
    ScalarEvent, SummaryWriter,
};
pub use value::{StateValue, TensorKind};
