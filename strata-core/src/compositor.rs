//! # Compositor
//!
//! Flattens a branch of the [`LayerGraph`] into pixels for one rectangle. Children that are clean
//! within the rectangle are read back from their projection cache, dirty ones are recomposed first.
//!
//! Per node:
//! * Paint layer: its device.
//! * Group layer: every visible child layer composited bottom to top onto transparency.
//! * Then every visible mask child, in order. Transparency and selection masks scale alpha by
//!   their coverage, effect masks blend in their filtered result by coverage, protection masks
//!   only matter when painting.
//!
//! The result is written to the node's projection and the rectangle is cleared from its dirty region.

use parking_lot::RwLock;

use crate::colorspace::{builtin, math, Registry};
use crate::device::{DeviceError, PaintDevice, PixelBuffer};
use crate::dirty::DirtyRegionTracker;
use crate::filter::EffectFilter;
use crate::graph::{
    EffectMask, GraphError, GroupLayer, LayerGraph, Mask, Node, NodeID, NodeKind, NodeVisitor,
    PaintLayer,
};
use crate::util::Rect;

/// Recoverable problems, the pass finished but some content was left out.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositeWarning {
    #[error("{node} left transparent, no conversion from {from} to {to}")]
    ColorSpaceMismatch {
        node: NodeID,
        from: String,
        to: String,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum CompositeError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("{0} is a mask and has no projection")]
    NotALayer(NodeID),
    #[error("pass over {rect} covers {pixels} pixels, over the budget of {budget}")]
    OverBudget { rect: Rect, pixels: u64, budget: u64 },
    #[error("failed to compute {rect}: {source}")]
    RegionComputeFailure { rect: Rect, source: DeviceError },
}
impl CompositeError {
    /// Did the pass fail for lack of resources, rather than a bad request?
    #[must_use]
    pub fn is_region_compute_failure(&self) -> bool {
        matches!(self, Self::OverBudget { .. } | Self::RegionComputeFailure { .. })
    }
}
fn region_failure(rect: Rect) -> impl FnOnce(DeviceError) -> CompositeError {
    move |source| CompositeError::RegionComputeFailure { rect, source }
}

pub struct Compositor<'a> {
    graph: &'a LayerGraph,
    tracker: &'a DirtyRegionTracker,
    registry: &'a Registry,
    max_pass_pixels: u64,
    warnings: Vec<CompositeWarning>,
}
impl<'a> Compositor<'a> {
    #[must_use]
    pub fn new(
        graph: &'a LayerGraph,
        tracker: &'a DirtyRegionTracker,
        registry: &'a Registry,
        max_pass_pixels: u64,
    ) -> Self {
        Self {
            graph,
            tracker,
            registry,
            max_pass_pixels,
            warnings: Vec::new(),
        }
    }
    /// Warnings collected by every pass so far.
    #[must_use]
    pub fn warnings(&self) -> &[CompositeWarning] {
        &self.warnings
    }
    #[must_use]
    pub fn into_warnings(self) -> Vec<CompositeWarning> {
        self.warnings
    }
    /// Recompute the projection of a layer within `rect`, returning it.
    ///
    /// On error, dirty marks of anything not yet recomposed are untouched and their
    /// projections hold their previous content.
    pub fn recompose(&mut self, id: NodeID, rect: Rect) -> Result<PixelBuffer, CompositeError> {
        if rect.area() > self.max_pass_pixels {
            return Err(CompositeError::OverBudget {
                rect,
                pixels: rect.area(),
                budget: self.max_pass_pixels,
            });
        }
        let graph = self.graph;
        let node = graph.get(id).ok_or(GraphError::NodeNotFound(id))?;
        log::trace!("recompose {id} over {rect}");
        let mut buffer = match node.kind() {
            NodeKind::GroupLayer(group) => self.compose_children(node, group, rect)?,
            NodeKind::PaintLayer(layer) => layer
                .device
                .read()
                .read_rect(rect)
                .map_err(region_failure(rect))?,
            _ => return Err(CompositeError::NotALayer(id)),
        };
        let masks = self.active_masks(id)?;
        if !masks.is_empty() {
            let mut applier = MaskApplier {
                buffer: &mut buffer,
                registry: self.registry,
                warnings: &mut self.warnings,
            };
            for mask in &masks {
                mask.accept(&mut applier)?;
            }
        }
        let uses_projection = matches!(node.kind(), NodeKind::GroupLayer(_)) || !masks.is_empty();
        if uses_projection {
            if let Some(projection) = node.kind().projection() {
                projection
                    .write()
                    .write_rect(&buffer)
                    .map_err(region_failure(rect))?;
            }
        }
        self.tracker.clear_rect(id, &rect);
        Ok(buffer)
    }
    /// Visible mask children of a node, in order.
    fn active_masks(&self, id: NodeID) -> Result<smallvec::SmallVec<[&'a Node; 4]>, GraphError> {
        let graph: &'a LayerGraph = self.graph;
        Ok(graph
            .masks(id)?
            .filter(|mask| mask.properties().visible)
            .collect())
    }
    fn compose_children(
        &mut self,
        node: &Node,
        group: &GroupLayer,
        rect: Rect,
    ) -> Result<PixelBuffer, CompositeError> {
        let graph = self.graph;
        let space = group.projection.read().color_space().clone();
        let mut buffer = PixelBuffer::new(rect, space.clone()).map_err(region_failure(rect))?;
        for child in graph.layers(node.id())? {
            let properties = child.properties();
            if !properties.visible {
                continue;
            }
            let mut source = self.projection_of(child, rect)?;
            if source.color_space() != &space {
                source = match source.convert(&space, self.registry) {
                    Ok(converted) => converted,
                    Err(DeviceError::Conversion(err)) => {
                        log::warn!("skipping {}: {err}", child.id());
                        self.warnings.push(CompositeWarning::ColorSpaceMismatch {
                            node: child.id(),
                            from: source.color_space().id().to_owned(),
                            to: space.id().to_owned(),
                        });
                        continue;
                    }
                    Err(other) => return Err(region_failure(rect)(other)),
                };
            }
            space.composite_op(properties.mode).composite(
                source.data(),
                buffer.data_mut(),
                properties.opacity,
                None,
            );
        }
        Ok(buffer)
    }
    /// The up-to-date projection of a layer within `rect`.
    fn projection_of(&mut self, node: &Node, rect: Rect) -> Result<PixelBuffer, CompositeError> {
        if self.tracker.intersects(node.id(), &rect) {
            return self.recompose(node.id(), rect);
        }
        let cached: &RwLock<PaintDevice> = match node.kind() {
            NodeKind::PaintLayer(layer) if self.active_masks(node.id())?.is_empty() => &layer.device,
            kind => kind
                .projection()
                .ok_or(CompositeError::NotALayer(node.id()))?,
        };
        let cached = cached.read().read_rect(rect).map_err(region_failure(rect))?;
        Ok(cached)
    }
}

/// Applies one mask to a layer's pixels.
struct MaskApplier<'c> {
    buffer: &'c mut PixelBuffer,
    registry: &'c Registry,
    warnings: &'c mut Vec<CompositeWarning>,
}
impl MaskApplier<'_> {
    /// The mask's coverage over the buffer, one byte per pixel.
    fn coverage(&self, device: &RwLock<PaintDevice>) -> Result<Vec<u8>, CompositeError> {
        let rect = self.buffer.rect();
        let coverage = device.read().read_rect(rect).map_err(region_failure(rect))?;
        let space = coverage.color_space();
        if space.pixel_size() == 1 {
            return Ok(coverage.into_raw());
        }
        let alpha = space.alpha_index();
        Ok(coverage
            .data()
            .chunks_exact(space.pixel_size())
            .map(|pixel| pixel[alpha])
            .collect())
    }
    fn multiply_alpha(&mut self, device: &RwLock<PaintDevice>) -> Result<(), CompositeError> {
        let coverage = self.coverage(device)?;
        let alpha = self.buffer.color_space().alpha_index();
        let size = self.buffer.pixel_size();
        for (pixel, &value) in self.buffer.data_mut().chunks_exact_mut(size).zip(&coverage) {
            pixel[alpha] = math::mul(pixel[alpha], value);
        }
        Ok(())
    }
    fn filter(
        &mut self,
        node: &Node,
        filter: EffectFilter,
        device: &RwLock<PaintDevice>,
    ) -> Result<(), CompositeError> {
        let rect = self.buffer.rect();
        let coverage = self.coverage(device)?;
        let space = self.buffer.color_space().clone();
        let native = space.id() == builtin::RGBA8;
        // Filters run on RGBA8, other spaces round trip through it.
        let mut rgba = if native {
            self.buffer.clone()
        } else {
            let rgba_space = self
                .registry
                .get(builtin::RGBA8)
                .unwrap_or_else(|| std::sync::Arc::new(builtin::rgba8()));
            match self.buffer.convert(&rgba_space, self.registry) {
                Ok(rgba) => rgba,
                Err(DeviceError::Conversion(err)) => {
                    log::warn!("skipping effect {}: {err}", node.id());
                    self.warnings.push(CompositeWarning::ColorSpaceMismatch {
                        node: node.id(),
                        from: space.id().to_owned(),
                        to: builtin::RGBA8.to_owned(),
                    });
                    return Ok(());
                }
                Err(other) => return Err(region_failure(rect)(other)),
            }
        };
        let mut filtered = rgba.clone();
        filter.apply(bytemuck::cast_slice_mut(filtered.data_mut()));
        let pixels: &mut [[u8; 4]] = bytemuck::cast_slice_mut(rgba.data_mut());
        let filtered: &[[u8; 4]] = bytemuck::cast_slice(filtered.data());
        for ((pixel, filtered), &strength) in pixels.iter_mut().zip(filtered).zip(&coverage) {
            for channel in 0..3 {
                pixel[channel] = math::lerp(pixel[channel], filtered[channel], strength);
            }
        }
        *self.buffer = if native {
            rgba
        } else {
            rgba.convert(&space, self.registry)
                .map_err(region_failure(rect))?
        };
        Ok(())
    }
}
impl NodeVisitor for MaskApplier<'_> {
    type Output = Result<(), CompositeError>;
    fn paint_layer(&mut self, _: &Node, _: &PaintLayer) -> Self::Output {
        Ok(())
    }
    fn group_layer(&mut self, _: &Node, _: &GroupLayer) -> Self::Output {
        Ok(())
    }
    fn effect_mask(&mut self, node: &Node, mask: &EffectMask) -> Self::Output {
        self.filter(node, mask.filter, &mask.device)
    }
    fn transparency_mask(&mut self, _: &Node, mask: &Mask) -> Self::Output {
        self.multiply_alpha(&mask.device)
    }
    fn selection_mask(&mut self, _: &Node, mask: &Mask) -> Self::Output {
        self.multiply_alpha(&mask.device)
    }
    fn protection_mask(&mut self, _: &Node, _: &Mask) -> Self::Output {
        Ok(())
    }
}
