//! Tunables of an [`Image`](crate::image::Image). Every field has a default, so any subset may be
//! given when deserializing.

use crate::dirty::CoalescePolicy;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompositeSettings {
    /// Dirty rects merge when it wastes at most this fraction of their area.
    pub dirty_waste_ratio: f32,
    /// Dirty regions with more rects collapse into their bounding box.
    pub max_dirty_rects: usize,
    /// Side length of the chunks a refresh is split into.
    pub chunk_size: u32,
    /// Largest area, in pixels, a single compositor pass may cover.
    pub max_pass_pixels: u64,
    /// Number of undoable commands to keep.
    pub undo_limit: usize,
}
impl Default for CompositeSettings {
    fn default() -> Self {
        Self {
            dirty_waste_ratio: 0.25,
            max_dirty_rects: 32,
            chunk_size: 256,
            max_pass_pixels: 8192 * 8192,
            undo_limit: 64,
        }
    }
}
impl CompositeSettings {
    #[must_use]
    pub fn coalesce_policy(&self) -> CoalescePolicy {
        CoalescePolicy {
            waste_ratio: self.dirty_waste_ratio,
            max_rects: self.max_dirty_rects.max(1),
        }
    }
}
