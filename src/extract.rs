//! Slicing batched image/volume tensors into tagged 2-d images
//!
//! A batch is either (N, C, H, W) or (N, C, Z, H, W). Extraction enumerates
//! every selected (instance, channel[, slice]) combination and emits one 2-d
//! image per combination, tagged hierarchically when a base tag was
//! requested.

use ndarray::{ArrayD, Array2, Axis, Ix2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TableroError};
use crate::select::IndexSelection;
use crate::value::StateValue;

/// A 2-d pixel array paired with its hierarchical display name
///
/// Tag segments are joined with `/`: base tag, then optional `batch_<k>`,
/// `instance_<i>`, `channel_<c>`, and `slice_<z>` parts.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedImage {
    array: Array2<f32>,
    tag: String,
}

impl TaggedImage {
    /// Create a tagged image
    pub fn new(array: Array2<f32>, tag: impl Into<String>) -> Self {
        Self {
            array,
            tag: tag.into(),
        }
    }

    /// The pixel array
    #[must_use]
    pub fn array(&self) -> &Array2<f32> {
        &self.array
    }

    /// The hierarchical tag
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// One image produced by extraction
///
/// Raw arrays come out when no base tag was requested; the writer adapter
/// then tags them positionally.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedImage {
    /// Image carrying its own hierarchical tag
    Tagged(TaggedImage),
    /// Untagged pixel array
    Raw(Array2<f32>),
}

impl ExtractedImage {
    /// The pixel array, either way
    #[must_use]
    pub fn array(&self) -> &Array2<f32> {
        match self {
            ExtractedImage::Tagged(tagged) => tagged.array(),
            ExtractedImage::Raw(array) => array,
        }
    }
}

/// Which batch/channel/z-slice indices extraction emits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Instance indices along the batch axis
    pub batch_indices: IndexSelection,
    /// Channel indices
    pub channel_indices: IndexSelection,
    /// z-slice indices (volumes only)
    pub z_indices: IndexSelection,
}

impl Default for ExtractConfig {
    /// All instances, all channels, the central z slice
    fn default() -> Self {
        Self {
            batch_indices: IndexSelection::All,
            channel_indices: IndexSelection::All,
            z_indices: IndexSelection::Mid,
        }
    }
}

fn build_tag(
    base_tag: &str,
    prefix: Option<&str>,
    instance: usize,
    channel: usize,
    slice: Option<usize>,
) -> String {
    let mut tag = base_tag.to_string();
    if let Some(prefix) = prefix {
        tag = format!("{tag}/{prefix}");
    }
    tag = format!("{tag}/instance_{instance}/channel_{channel}");
    if let Some(slice) = slice {
        tag = format!("{tag}/slice_{slice}");
    }
    tag
}

fn emit(
    image: Array2<f32>,
    base_tag: Option<&str>,
    prefix: Option<&str>,
    instance: usize,
    channel: usize,
    slice: Option<usize>,
) -> ExtractedImage {
    match base_tag {
        Some(base) => ExtractedImage::Tagged(TaggedImage::new(
            image,
            build_tag(base, prefix, instance, channel, slice),
        )),
        None => ExtractedImage::Raw(image),
    }
}

/// Extract 2-d images from an image or volume batch
///
/// The batch must be a rank-4 (N, C, H, W) or rank-5 (N, C, Z, H, W) tensor,
/// or a list of such batches. For a list, each sub-batch's tags gain a
/// `batch_<k>` prefix and the results are concatenated.
pub fn extract_images_from_batch(
    batch: &StateValue,
    config: &ExtractConfig,
    base_tag: Option<&str>,
) -> Result<Vec<ExtractedImage>> {
    extract_with_prefix(batch, config, base_tag, None)
}

fn extract_with_prefix(
    batch: &StateValue,
    config: &ExtractConfig,
    base_tag: Option<&str>,
    prefix: Option<&str>,
) -> Result<Vec<ExtractedImage>> {
    if let StateValue::List(batches) = batch {
        let mut images = Vec::new();
        for (batch_num, sub_batch) in batches.iter().enumerate() {
            let sub_prefix = match prefix {
                Some(outer) => format!("{outer}/batch_{batch_num}"),
                None => format!("batch_{batch_num}"),
            };
            images.extend(extract_with_prefix(
                sub_batch,
                config,
                base_tag,
                Some(&sub_prefix),
            )?);
        }
        return Ok(images);
    }

    let tensor = batch
        .to_float_tensor()
        .ok_or_else(|| TableroError::AmbiguousBatchShape(batch.shape()))?;
    match tensor.ndim() {
        4 => extract_image_batch(&tensor, config, base_tag, prefix),
        5 => extract_volume_batch(&tensor, config, base_tag, prefix),
        _ => Err(TableroError::AmbiguousBatchShape(tensor.shape().to_vec())),
    }
}

fn plane(tensor: &ArrayD<f32>, indices: &[usize]) -> Result<Array2<f32>> {
    let mut view = tensor.view();
    for &i in indices {
        view = view.index_axis_move(Axis(0), i);
    }
    view.to_owned()
        .into_dimensionality::<Ix2>()
        .map_err(|_| TableroError::AmbiguousBatchShape(tensor.shape().to_vec()))
}

fn extract_image_batch(
    tensor: &ArrayD<f32>,
    config: &ExtractConfig,
    base_tag: Option<&str>,
    prefix: Option<&str>,
) -> Result<Vec<ExtractedImage>> {
    let (n, c) = (tensor.shape()[0], tensor.shape()[1]);
    let batch_indices = config.batch_indices.resolve("batch", n, false)?;
    let channel_indices = config.channel_indices.resolve("channel", c, false)?;
    let mut images = Vec::new();
    for instance in 0..n {
        for channel in 0..c {
            if batch_indices.contains(&instance) && channel_indices.contains(&channel) {
                images.push(emit(
                    plane(tensor, &[instance, channel])?,
                    base_tag,
                    prefix,
                    instance,
                    channel,
                    None,
                ));
            }
        }
    }
    Ok(images)
}

fn extract_volume_batch(
    tensor: &ArrayD<f32>,
    config: &ExtractConfig,
    base_tag: Option<&str>,
    prefix: Option<&str>,
) -> Result<Vec<ExtractedImage>> {
    let (n, c, z) = (tensor.shape()[0], tensor.shape()[1], tensor.shape()[2]);
    let batch_indices = config.batch_indices.resolve("batch", n, false)?;
    let channel_indices = config.channel_indices.resolve("channel", c, false)?;
    let z_indices = config.z_indices.resolve("z", z, true)?;
    let mut images = Vec::new();
    for instance in 0..n {
        for channel in 0..c {
            for slice in 0..z {
                if batch_indices.contains(&instance)
                    && channel_indices.contains(&channel)
                    && z_indices.contains(&slice)
                {
                    images.push(emit(
                        plane(tensor, &[instance, channel, slice])?,
                        base_tag,
                        prefix,
                        instance,
                        channel,
                        Some(slice),
                    ));
                }
            }
        }
    }
    Ok(images)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use ndarray::ArrayD;
    use proptest::prelude::*;

    proptest! {
        /// With everything selected, an (N,C,H,W) batch yields exactly N*C
        /// images of shape (H, W)
        #[test]
        fn all_all_extraction_count(
            n in 1usize..4,
            c in 1usize..4,
            h in 1usize..6,
            w in 1usize..6,
        ) {
            let batch = StateValue::FloatTensor(ArrayD::zeros(vec![n, c, h, w]));
            let images = extract_images_from_batch(
                &batch,
                &ExtractConfig::default(),
                Some("t"),
            ).unwrap();
            prop_assert_eq!(images.len(), n * c);
            for image in &images {
                prop_assert_eq!(image.array().dim(), (h, w));
            }
        }

        /// Mid-slice volume extraction always picks z / 2
        #[test]
        fn volume_mid_slice_index(
            n in 1usize..3,
            c in 1usize..3,
            z in 1usize..8,
        ) {
            let batch = StateValue::FloatTensor(ArrayD::zeros(vec![n, c, z, 2, 2]));
            let images = extract_images_from_batch(
                &batch,
                &ExtractConfig::default(),
                Some("v"),
            ).unwrap();
            prop_assert_eq!(images.len(), n * c);
            let expected = format!("/slice_{}", z / 2);
            for image in &images {
                match image {
                    ExtractedImage::Tagged(t) => prop_assert!(t.tag().ends_with(&expected)),
                    ExtractedImage::Raw(_) => prop_assert!(false, "expected tagged"),
                }
            }
        }
    }
}
