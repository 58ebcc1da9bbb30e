//! Summary-writer backends and the pixel conditioning they require
//!
//! The external writer consumes scalars and channel-first images with pixel
//! intensities in [0, 1]. [`order_image_axes`] and [`normalize_image`] do the
//! conditioning; [`SummaryWriter`] is the narrow backend interface, with a
//! JSON-lines file backend and an in-memory backend for tests.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ndarray::{Array3, ArrayD, Ix3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TableroError};

/// Pixel-axis layout of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    /// Channel, height, width
    Chw,
    /// Height, width, channel
    Hwc,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Chw => write!(f, "CHW"),
            ImageFormat::Hwc => write!(f, "HWC"),
        }
    }
}

impl FromStr for ImageFormat {
    type Err = TableroError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CHW" => Ok(ImageFormat::Chw),
            "HWC" => Ok(ImageFormat::Hwc),
            other => Err(TableroError::InvalidImageFormat(other.to_string())),
        }
    }
}

/// Reorder an image's axes from `source` layout to `target` layout
///
/// A 2-d image gains a singleton channel axis where the target format
/// expects it; a 3-d image has its channel axis moved when source and target
/// disagree. Any other rank fails.
pub fn order_image_axes(
    image: ArrayD<f32>,
    source: ImageFormat,
    target: ImageFormat,
) -> Result<Array3<f32>> {
    let reordered = match image.ndim() {
        2 => match target {
            ImageFormat::Chw => image.insert_axis(ndarray::Axis(0)),
            ImageFormat::Hwc => image.insert_axis(ndarray::Axis(2)),
        },
        3 => match (source, target) {
            (ImageFormat::Chw, ImageFormat::Hwc) => image.permuted_axes(vec![1, 2, 0]),
            (ImageFormat::Hwc, ImageFormat::Chw) => image.permuted_axes(vec![2, 0, 1]),
            _ => image,
        },
        _ => return Err(TableroError::UnsupportedImageShape(image.shape().to_vec())),
    };
    reordered
        .as_standard_layout()
        .to_owned()
        .into_dimensionality::<Ix3>()
        .map_err(|_| TableroError::UnsupportedImageShape(Vec::new()))
}

/// Min-max normalize pixel intensities into [0, 1]
///
/// Subtracts the minimum, then divides by the resulting maximum unless that
/// maximum is zero or negative, which guards the all-constant image.
#[must_use]
pub fn normalize_image(image: &Array3<f32>) -> Array3<f32> {
    let min = image.iter().copied().fold(f32::INFINITY, f32::min);
    if !min.is_finite() {
        return image.clone();
    }
    let shifted = image.mapv(|v| v - min);
    let max = shifted.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max > 0.0 {
        shifted.mapv(|v| v / max)
    } else {
        shifted
    }
}

/// A scalar forwarded to the writer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub value: f64,
    pub step: u64,
}

/// An image forwarded to the writer, pixels flattened row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEvent {
    pub tag: String,
    pub step: u64,
    pub shape: Vec<usize>,
    pub pixels: Vec<f32>,
}

impl ImageEvent {
    fn from_image(tag: &str, image: &Array3<f32>, step: u64) -> Self {
        Self {
            tag: tag.to_string(),
            step,
            shape: image.shape().to_vec(),
            pixels: image.iter().copied().collect(),
        }
    }
}

/// External visualization writer interface
///
/// Images arrive normalized into [0, 1] in the writer's fixed channel-first
/// layout. Implementations persist or record the events; the forwarder never
/// looks at them again.
pub trait SummaryWriter {
    /// Open a writer rooted at `log_directory` (backend-dependent default
    /// when `None`)
    fn open(log_directory: Option<&Path>) -> Result<Self>
    where
        Self: Sized;

    /// Forward a named scalar at a step index
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()>;

    /// Forward a conditioned image at a step index
    fn add_image(&mut self, tag: &str, image: &Array3<f32>, step: u64) -> Result<()>;
}

/// JSON-lines file backend
///
/// Appends one JSON record per event: scalars to `scalars.jsonl`, images to
/// `images.jsonl`, both under the log directory.
#[derive(Debug)]
pub struct JsonlWriter {
    dir: PathBuf,
}

impl JsonlWriter {
    const DEFAULT_DIR: &'static str = "tablero_logs";

    /// The directory events are written under
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append<T: Serialize>(&self, file_name: &str, event: &T) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file_name))?;
        let json = serde_json::to_string(event)?;
        writeln!(file, "{json}")?;
        Ok(())
    }
}

impl SummaryWriter for JsonlWriter {
    fn open(log_directory: Option<&Path>) -> Result<Self> {
        let dir = log_directory
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DIR));
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        self.append(
            "scalars.jsonl",
            &ScalarEvent {
                tag: tag.to_string(),
                value,
                step,
            },
        )
    }

    fn add_image(&mut self, tag: &str, image: &Array3<f32>, step: u64) -> Result<()> {
        self.append("images.jsonl", &ImageEvent::from_image(tag, image, step))
    }
}

/// In-memory backend recording events for inspection
///
/// No persistence; the backend of choice in tests.
#[derive(Debug, Default)]
pub struct InMemoryWriter {
    scalars: Vec<ScalarEvent>,
    images: Vec<ImageEvent>,
}

impl InMemoryWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scalar events recorded so far, in emission order
    #[must_use]
    pub fn scalars(&self) -> &[ScalarEvent] {
        &self.scalars
    }

    /// Image events recorded so far, in emission order
    #[must_use]
    pub fn images(&self) -> &[ImageEvent] {
        &self.images
    }
}

impl SummaryWriter for InMemoryWriter {
    fn open(_log_directory: Option<&Path>) -> Result<Self> {
        Ok(Self::new())
    }

    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        self.scalars.push(ScalarEvent {
            tag: tag.to_string(),
            value,
            step,
        });
        Ok(())
    }

    fn add_image(&mut self, tag: &str, image: &Array3<f32>, step: u64) -> Result<()> {
        self.images.push(ImageEvent::from_image(tag, image, step));
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use ndarray::Array3;
    use proptest::prelude::*;

    proptest! {
        /// CHW -> HWC -> CHW is the identity
        #[test]
        fn axis_round_trip(
            c in 1usize..4,
            h in 1usize..6,
            w in 1usize..6,
            seed in 0u32..1000,
        ) {
            let original = Array3::from_shape_fn((c, h, w), |(ci, hi, wi)| {
                ((ci * 31 + hi * 7 + wi) as f32) + seed as f32
            });
            let hwc = order_image_axes(
                original.clone().into_dyn(),
                ImageFormat::Chw,
                ImageFormat::Hwc,
            ).unwrap();
            let back = order_image_axes(
                hwc.into_dyn(),
                ImageFormat::Hwc,
                ImageFormat::Chw,
            ).unwrap();
            prop_assert_eq!(back, original);
        }

        /// Normalized output always sits in [0, 1] and never divides by zero
        #[test]
        fn normalization_bounded(
            values in proptest::collection::vec(-1000.0f32..1000.0, 8),
        ) {
            let image = Array3::from_shape_vec((2, 2, 2), values).unwrap();
            let normalized = normalize_image(&image);
            prop_assert!(normalized.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }
}
