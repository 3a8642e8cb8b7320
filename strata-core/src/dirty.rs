//! # Dirty regions
//!
//! Tracks, per node, which pixels of its projection are stale. Regions are small lists of
//! rectangles, merged eagerly when merging wastes little area. Merging only ever grows a region,
//! a stale pixel is never forgotten until a pass clears it.

use smallvec::SmallVec;

use crate::graph::NodeID;
use crate::util::Rect;

/// When to merge rectangles of a region.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CoalescePolicy {
    /// Two rects merge if their union is at most `(1 + waste_ratio)` times their summed areas.
    pub waste_ratio: f32,
    /// Above this many rects, the region collapses to its bounding box.
    pub max_rects: usize,
}
impl Default for CoalescePolicy {
    fn default() -> Self {
        Self {
            waste_ratio: 0.25,
            max_rects: 32,
        }
    }
}
impl CoalescePolicy {
    fn should_merge(&self, a: &Rect, b: &Rect) -> bool {
        let union = a.union(b).area() as f64;
        union <= (a.area() + b.area()) as f64 * (1.0 + f64::from(self.waste_ratio.max(0.0)))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtyRegion {
    rects: SmallVec<[Rect; 4]>,
}
impl DirtyRegion {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
    #[must_use]
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }
    /// Bounding box of the whole region.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.rects.iter().fold(Rect::EMPTY, |acc, r| acc.union(r))
    }
    #[must_use]
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.rects.iter().any(|r| r.contains_point(x, y))
    }
    #[must_use]
    pub fn intersects(&self, rect: &Rect) -> bool {
        self.rects.iter().any(|r| r.intersects(rect))
    }
    /// The part of the region within `rect`.
    #[must_use]
    pub fn clipped(&self, rect: &Rect) -> Self {
        Self {
            rects: self
                .rects
                .iter()
                .map(|r| r.intersection(rect))
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }
    /// Union `rect` into the region.
    pub fn add(&mut self, rect: Rect, policy: &CoalescePolicy) {
        if rect.is_empty() || self.rects.iter().any(|r| r.contains(&rect)) {
            return;
        }
        let mut pending = rect;
        self.rects.retain(|r| !pending.contains(r));
        while let Some(idx) = self
            .rects
            .iter()
            .position(|r| policy.should_merge(&pending, r))
        {
            pending = pending.union(&self.rects.swap_remove(idx));
            self.rects.retain(|r| !pending.contains(r));
        }
        self.rects.push(pending);
        if self.rects.len() > policy.max_rects {
            let bounds = self.bounds();
            self.rects.clear();
            self.rects.push(bounds);
        }
    }
    /// Union every rect of `other` into the region.
    pub fn extend(&mut self, other: &Self, policy: &CoalescePolicy) {
        for rect in &other.rects {
            self.add(*rect, policy);
        }
    }
    /// Remove `hole` from the region, splitting rects as needed.
    ///
    /// Past `max_rects` pieces, the region becomes its bounding box minus the hole, so it stays
    /// within four rects while still covering everything that was stale outside the hole.
    pub fn subtract(&mut self, hole: &Rect, policy: &CoalescePolicy) {
        if !self.intersects(hole) {
            return;
        }
        let pieces: SmallVec<[Rect; 4]> = self.rects.iter().flat_map(|r| r.subtract(hole)).collect();
        self.rects = if pieces.len() > policy.max_rects {
            self.bounds().subtract(hole)
        } else {
            pieces
        };
    }
}

/// Dirty regions of every node of an image.
pub struct DirtyRegionTracker {
    policy: CoalescePolicy,
    regions: parking_lot::Mutex<hashbrown::HashMap<NodeID, DirtyRegion>>,
}
impl DirtyRegionTracker {
    #[must_use]
    pub fn new(policy: CoalescePolicy) -> Self {
        Self {
            policy,
            regions: parking_lot::Mutex::default(),
        }
    }
    #[must_use]
    pub fn policy(&self) -> &CoalescePolicy {
        &self.policy
    }
    /// Mark `rect` stale on every node of `lineage`, a node followed by its ancestors.
    pub fn mark_dirty(&self, lineage: &[NodeID], rect: Rect) {
        if rect.is_empty() {
            return;
        }
        let mut regions = self.regions.lock();
        for node in lineage {
            regions.entry(*node).or_default().add(rect, &self.policy);
        }
    }
    /// Put a region back, after a failed pass.
    pub fn restore(&self, node: NodeID, region: &DirtyRegion) {
        if region.is_empty() {
            return;
        }
        self.regions
            .lock()
            .entry(node)
            .or_default()
            .extend(region, &self.policy);
    }
    /// Return and clear the node's dirty region.
    #[must_use]
    pub fn take_dirty_region(&self, node: NodeID) -> DirtyRegion {
        self.regions.lock().remove(&node).unwrap_or_default()
    }
    /// A copy of the node's dirty region.
    #[must_use]
    pub fn region(&self, node: NodeID) -> DirtyRegion {
        self.regions.lock().get(&node).cloned().unwrap_or_default()
    }
    #[must_use]
    pub fn intersects(&self, node: NodeID, rect: &Rect) -> bool {
        self.regions
            .lock()
            .get(&node)
            .is_some_and(|region| region.intersects(rect))
    }
    /// Mark `rect` as freshly composed for `node`.
    pub fn clear_rect(&self, node: NodeID, rect: &Rect) {
        let mut regions = self.regions.lock();
        if let Some(region) = regions.get_mut(&node) {
            region.subtract(rect, &self.policy);
            if region.is_empty() {
                regions.remove(&node);
            }
        }
    }
    /// Drop all state for a node leaving the image.
    pub fn forget(&self, node: NodeID) {
        self.regions.lock().remove(&node);
    }
    /// Is any node dirty?
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.regions.lock().is_empty()
    }
}
