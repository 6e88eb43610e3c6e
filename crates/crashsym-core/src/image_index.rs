//! # Image Index
//!
//! Maps instruction addresses to the loaded image containing them.
//!
//! The index is built once per event from `debug_meta.images`. Records that
//! fail [`is_valid_image`](crate::types::is_valid_image) are skipped; the
//! remaining images keep their input order, which is also the order they are
//! submitted to the symbolication service in.

use crashsym_protocol::RawImage;
use tracing::trace;

use crate::types::{Address, DebugImage};

/// Address lookup over the valid images of one event
#[derive(Debug, Clone, Default)]
pub struct ImageIndex
{
    images: Vec<DebugImage>,
    /// Position of each image in the report's image list.
    positions: Vec<usize>,
    /// Indices into `images`, sorted by start address.
    by_start: Vec<usize>,
}

impl ImageIndex
{
    /// Build the index, skipping invalid image records.
    pub fn new(raw_images: &[RawImage]) -> Self
    {
        let mut images = Vec::new();
        let mut positions = Vec::new();
        for (position, raw) in raw_images.iter().enumerate() {
            match DebugImage::from_raw(images.len(), raw) {
                Some(image) => {
                    images.push(image);
                    positions.push(position);
                }
                None => trace!(position, "skipping invalid debug image"),
            }
        }

        let mut by_start: Vec<usize> = (0..images.len()).collect();
        by_start.sort_by_key(|&index| images[index].start());

        Self {
            images,
            positions,
            by_start,
        }
    }

    /// The image whose range contains `address`.
    ///
    /// Overlapping ranges only come from broken reports. When they occur the
    /// image with the lowest start address wins, ties going to the earlier
    /// record.
    pub fn find_image(&self, address: Address) -> Option<&DebugImage>
    {
        let upper = self
            .by_start
            .partition_point(|&index| self.images[index].start() <= address);
        self.by_start[..upper]
            .iter()
            .map(|&index| &self.images[index])
            .find(|image| image.contains(address))
    }

    /// Valid images in input order.
    pub fn images(&self) -> &[DebugImage]
    {
        &self.images
    }

    pub fn get(&self, index: usize) -> Option<&DebugImage>
    {
        self.images.get(index)
    }

    /// Position of a valid image in the report's `debug_meta.images`.
    pub fn report_position(&self, index: usize) -> Option<usize>
    {
        self.positions.get(index).copied()
    }

    pub fn len(&self) -> usize
    {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.images.is_empty()
    }
}
