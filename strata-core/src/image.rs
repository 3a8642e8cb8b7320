//! # Image
//!
//! Owns a layer graph, its dirty regions and its undo history. Every mutation goes through here so
//! that the right rectangles are marked stale, and [`Image::refresh`] brings the root projection
//! back up to date before telling subscribers which rectangles changed.
//!
//! Mutations and passes are serialized: a pass holds the graph for reading, so mutations wait for
//! it to finish.

use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use smallvec::SmallVec;

use crate::blend::Blend;
use crate::colorspace::{self, math, ColorSpace, Registry};
use crate::commands::{history::History, Command, CommandConsumer, CommandError};
use crate::compositor::{CompositeError, CompositeWarning, Compositor};
use crate::device::{DeviceError, PixelBuffer};
use crate::dirty::{DirtyRegion, DirtyRegionTracker};
use crate::graph::{
    GraphError, HierarchyError, LayerGraph, Node, NodeID, NodeKind, NodeProperties, Subtree,
};
use crate::paint::{self, PaintGuard};
use crate::settings::CompositeSettings;
use crate::util::Rect;

pub struct Subscription;
pub type SubscriptionID = crate::id::UniqueID<Subscription>;

/// Sent to subscribers after a pass changed the root projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionUpdated {
    pub rects: Vec<Rect>,
}
impl RegionUpdated {
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.rects.iter().fold(Rect::EMPTY, |acc, r| acc.union(r))
    }
}

type Observer = Box<dyn Fn(&RegionUpdated) + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Composite(#[from] CompositeError),
    #[error("{0} is locked")]
    Locked(NodeID),
    #[error("{0} has nothing to paint on")]
    NotPaintable(NodeID),
}

struct ImageInner {
    graph: LayerGraph,
    history: History,
}

// Node lineage a rect is marked dirty on, captured while the node is still in place.
type Damage = SmallVec<[(SmallVec<[NodeID; 8]>, Rect); 2]>;

pub struct Image {
    bounds: Rect,
    color_space: Arc<ColorSpace>,
    root: NodeID,
    registry: &'static Registry,
    settings: CompositeSettings,
    inner: RwLock<ImageInner>,
    tracker: DirtyRegionTracker,
    pass: Mutex<()>,
    observers: Mutex<Vec<(SubscriptionID, Observer)>>,
}
impl Image {
    /// An empty image of the given size with default settings.
    #[must_use]
    pub fn new(width: u32, height: u32, color_space: Arc<ColorSpace>) -> Self {
        Self::with_settings(width, height, color_space, CompositeSettings::default())
    }
    #[must_use]
    pub fn with_settings(
        width: u32,
        height: u32,
        color_space: Arc<ColorSpace>,
        settings: CompositeSettings,
    ) -> Self {
        let graph = LayerGraph::new(color_space.clone());
        let root = graph.root();
        Self {
            bounds: Rect::new(0, 0, width, height),
            color_space,
            root,
            registry: colorspace::global(),
            tracker: DirtyRegionTracker::new(settings.coalesce_policy()),
            inner: RwLock::new(ImageInner {
                graph,
                history: History::new(settings.undo_limit),
            }),
            settings,
            pass: Mutex::new(()),
            observers: Mutex::new(Vec::new()),
        }
    }
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.bounds
    }
    #[must_use]
    pub fn color_space(&self) -> &Arc<ColorSpace> {
        &self.color_space
    }
    #[must_use]
    pub fn settings(&self) -> &CompositeSettings {
        &self.settings
    }
    /// The root group. Never changes over the life of the image.
    #[must_use]
    pub fn root_node(&self) -> NodeID {
        self.root
    }
    /// Read access to the layer graph. Holding this blocks mutation.
    pub fn graph(&self) -> MappedRwLockReadGuard<'_, LayerGraph> {
        RwLockReadGuard::map(self.inner.read(), |inner| &inner.graph)
    }
    /// Is the root projection up to date?
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.tracker.is_clean()
    }
    /// The part of the root projection awaiting a refresh.
    #[must_use]
    pub fn dirty_region(&self) -> DirtyRegion {
        self.tracker.region(self.root)
    }

    /// Mark `rect` of a node's content stale. Usually not needed, every mutation through the
    /// image marks what it changes.
    pub fn mark_dirty(&self, node: NodeID, rect: Rect) -> Result<(), ImageError> {
        // Exclusive, so no pass is running while the mark lands.
        let inner = self.inner.write();
        if !inner.graph.contains(node) {
            return Err(GraphError::NodeNotFound(node).into());
        }
        self.mark(&inner.graph.lineage(node), rect);
        Ok(())
    }
    fn mark(&self, lineage: &[NodeID], rect: Rect) {
        let rect = rect.intersection(&self.bounds);
        if !rect.is_empty() {
            self.tracker.mark_dirty(lineage, rect);
        }
    }

    /// Insert a node, or a detached subtree, as the `index`th child of `parent`.
    pub fn add_node(
        &self,
        parent: NodeID,
        subtree: impl Into<Subtree>,
        index: usize,
    ) -> Result<NodeID, ImageError> {
        let subtree = subtree.into();
        let id = subtree.id();
        self.execute(Command::NodeAdded {
            parent,
            index,
            subtree,
        })?;
        Ok(id)
    }
    /// Copy a layer, with its masks and children, and place the copy just above it.
    /// Returns the id of the copy. The root can't be duplicated.
    pub fn duplicate_node(&self, id: NodeID) -> Result<NodeID, ImageError> {
        let (parent, index, subtree) = {
            let graph = self.graph();
            let Some((parent, index)) = graph.index_of(id) else {
                return Err(if graph.contains(id) {
                    GraphError::from(HierarchyError::Root).into()
                } else {
                    GraphError::NodeNotFound(id).into()
                });
            };
            (parent, index, graph.duplicate(id)?)
        };
        let copy = subtree.id();
        self.execute(Command::NodeAdded {
            parent,
            index: index + 1,
            subtree,
        })?;
        Ok(copy)
    }
    /// Remove a node and everything below it. The root can't be removed.
    pub fn remove_node(&self, id: NodeID) -> Result<(), ImageError> {
        let parent = self.parent_of(id)?;
        self.execute(Command::NodeRemoved { parent, target: id })
    }
    fn parent_of(&self, id: NodeID) -> Result<NodeID, GraphError> {
        let graph = self.graph();
        if !graph.contains(id) {
            return Err(GraphError::NodeNotFound(id));
        }
        graph.parent(id).ok_or(HierarchyError::Root.into())
    }
    /// Move a node under `parent` at `index`.
    pub fn move_node(&self, id: NodeID, parent: NodeID, index: usize) -> Result<(), ImageError> {
        self.execute(Command::NodeMoved {
            target: id,
            parent,
            index,
        })
    }
    /// Move a node within its siblings.
    pub fn reorder(&self, id: NodeID, index: usize) -> Result<(), ImageError> {
        let parent = self.parent_of(id)?;
        self.move_node(id, parent, index)
    }
    pub fn set_properties(&self, id: NodeID, properties: NodeProperties) -> Result<(), ImageError> {
        let unchanged = self
            .graph()
            .get(id)
            .ok_or(GraphError::NodeNotFound(id))?
            .properties()
            == &properties;
        if unchanged {
            return Ok(());
        }
        self.execute(Command::PropertiesChanged {
            target: id,
            properties,
        })
    }
    /// Composite `source` onto a paint layer. Returns the changed rect.
    ///
    /// Locked layers reject painting, alpha-locked layers keep their alpha and pixels covered by
    /// the layer's visible protection masks are left as they were.
    pub fn paint(&self, layer: NodeID, source: &PixelBuffer, blend: Blend) -> Result<Rect, ImageError> {
        let mut inner = self.inner.write();
        let ImageInner { graph, history } = &mut *inner;
        let node = graph.get(layer).ok_or(GraphError::NodeNotFound(layer))?;
        let properties = node.properties();
        if properties.locked {
            return Err(ImageError::Locked(layer));
        }
        let NodeKind::PaintLayer(paint_layer) = node.kind() else {
            return Err(ImageError::NotPaintable(layer));
        };
        let protection = protection_coverage(graph, layer, source.rect())?;
        let guard = PaintGuard {
            alpha_locked: properties.alpha_locked,
            protection: protection.as_deref(),
        };
        let (before, rect) = {
            let mut device = paint_layer.device.write();
            let before = device.snapshot();
            let rect = paint::paint(&mut device, source, blend, guard, self.registry)?;
            (before, rect)
        };
        graph.invalidate_extent(layer);
        self.mark(&graph.lineage(layer), rect);
        history.record(Command::DeviceContent {
            target: layer,
            content: before,
        });
        Ok(rect)
    }
    /// Set every pixel of `rect` on a node's device, layer or mask alike.
    pub fn fill(&self, id: NodeID, rect: Rect, pixel: &[u8]) -> Result<(), ImageError> {
        let mut inner = self.inner.write();
        let ImageInner { graph, history } = &mut *inner;
        let node = graph.get(id).ok_or(GraphError::NodeNotFound(id))?;
        if node.properties().locked {
            return Err(ImageError::Locked(id));
        }
        let device = node.kind().device().ok_or(ImageError::NotPaintable(id))?;
        let before = {
            let mut device = device.write();
            let before = device.snapshot();
            device.fill(rect, pixel)?;
            before
        };
        graph.invalidate_extent(id);
        if let Some(origin) = content_origin(graph, id) {
            self.mark(&graph.lineage(origin), rect);
        }
        history.record(Command::DeviceContent {
            target: id,
            content: before,
        });
        Ok(())
    }

    /// Revert the latest change. `Ok(false)` if there is nothing to undo.
    pub fn undo(&self) -> Result<bool, ImageError> {
        let mut inner = self.inner.write();
        let ImageInner { graph, history } = &mut *inner;
        Ok(history.undo_with(|command| self.apply(graph, command))?)
    }
    /// Reapply the latest undone change. `Ok(false)` if there is nothing to redo.
    pub fn redo(&self) -> Result<bool, ImageError> {
        let mut inner = self.inner.write();
        let ImageInner { graph, history } = &mut *inner;
        Ok(history.redo_with(|command| self.apply(graph, command))?)
    }
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.inner.read().history.can_undo()
    }
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.inner.read().history.can_redo()
    }
    fn execute(&self, command: Command) -> Result<(), ImageError> {
        let mut inner = self.inner.write();
        let ImageInner { graph, history } = &mut *inner;
        let inverse = self.apply(graph, command)?;
        history.record(inverse);
        Ok(())
    }
    /// Apply a command, marking what it changes before and after.
    fn apply(&self, graph: &mut LayerGraph, command: Command) -> Result<Command, CommandError> {
        let mut damage = Damage::new();
        collect_damage(graph, &command, &mut damage);
        let inverse = graph.apply(command)?;
        collect_damage(graph, &inverse, &mut damage);
        collect_insertions(graph, &inverse, &mut damage);
        for (lineage, rect) in &damage {
            self.mark(lineage, *rect);
        }
        self.forget_detached(&inverse);
        Ok(inverse)
    }
    fn forget_detached(&self, inverse: &Command) {
        match inverse {
            Command::NodeAdded { subtree, .. } => {
                for id in subtree.ids() {
                    self.tracker.forget(id);
                }
            }
            Command::Scope(commands) => commands.iter().for_each(|c| self.forget_detached(c)),
            _ => (),
        }
    }

    /// Recompose every dirty part of the root projection, then notify subscribers.
    ///
    /// On failure the unfinished part stays dirty, and the projection keeps its previous
    /// content there. Parts finished before the failure are still reported to subscribers.
    pub fn refresh(&self) -> Result<Vec<CompositeWarning>, ImageError> {
        let pass = self.pass.lock();
        let mut updated = DirtyRegion::new();
        let result = {
            let inner = self.inner.read();
            let region = self.tracker.take_dirty_region(self.root);
            let mut remaining = region.clone();
            let mut compositor = Compositor::new(
                &inner.graph,
                &self.tracker,
                self.registry,
                self.settings.max_pass_pixels,
            );
            let mut failure = None;
            'chunks: for rect in region.rects() {
                for chunk in rect.chunks(self.settings.chunk_size) {
                    if let Err(err) = compositor.recompose(self.root, chunk) {
                        log::error!("pass aborted at {chunk}: {err}");
                        self.tracker.restore(self.root, &remaining);
                        failure = Some(err);
                        break 'chunks;
                    }
                    remaining.subtract(&chunk, self.tracker.policy());
                    updated.add(chunk, self.tracker.policy());
                }
            }
            match failure {
                Some(err) => Err(err.into()),
                None => Ok(compositor.into_warnings()),
            }
        };
        drop(pass);
        if !updated.is_empty() {
            log::trace!("refreshed {}", updated.bounds());
            self.notify(&RegionUpdated {
                rects: updated.rects().to_vec(),
            });
        }
        result
    }
    /// The root projection within `rect`, refreshing first if any of it is stale.
    pub fn request_projection(&self, rect: Rect) -> Result<PixelBuffer, ImageError> {
        if self.tracker.intersects(self.root, &rect) {
            let warnings = self.refresh()?;
            for warning in warnings {
                log::warn!("{warning}");
            }
        }
        let graph = self.graph();
        let root = graph
            .get(self.root)
            .ok_or(GraphError::NodeNotFound(self.root))?;
        let projection = root
            .kind()
            .projection()
            .ok_or(CompositeError::NotALayer(self.root))?;
        let buffer = projection.read().read_rect(rect)?;
        Ok(buffer)
    }

    /// Call `observer` after every pass that changed pixels. Observers run on the refreshing
    /// thread and must not subscribe or unsubscribe from within the callback.
    pub fn subscribe(
        &self,
        observer: impl Fn(&RegionUpdated) + Send + Sync + 'static,
    ) -> SubscriptionID {
        let id = SubscriptionID::default();
        self.observers.lock().push((id, Box::new(observer)));
        id
    }
    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionID) -> bool {
        let mut observers = self.observers.lock();
        let len = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != len
    }
    fn notify(&self, update: &RegionUpdated) {
        for (_, observer) in self.observers.lock().iter() {
            observer(update);
        }
    }
}

/// The layer whose projection changes when a node's content does: masks affect their layer.
fn content_origin(graph: &LayerGraph, id: NodeID) -> Option<NodeID> {
    let node = graph.get(id)?;
    if node.is_mask() {
        graph.parent(id)
    } else {
        Some(id)
    }
}
/// Lineage and rect a node affects when it appears, vanishes or changes blending.
fn placement_damage(graph: &LayerGraph, id: NodeID) -> Option<(SmallVec<[NodeID; 8]>, Rect)> {
    let node = graph.get(id)?;
    if node.is_mask() {
        let layer = graph.parent(id)?;
        return Some((graph.lineage(layer), graph.extent(layer).ok()?));
    }
    let parent = graph.parent(id)?;
    Some((graph.lineage(parent), graph.extent(id).ok()?))
}
/// Rects a command would change, for nodes present in the graph right now.
fn collect_damage(graph: &LayerGraph, command: &Command, damage: &mut Damage) {
    match command {
        Command::DeviceContent { target, content } => {
            let Some(origin) = content_origin(graph, *target) else {
                return;
            };
            if let Ok(extent) = graph.extent(origin) {
                damage.push((graph.lineage(origin), extent.union(&content.device().extent())));
            }
        }
        Command::PropertiesChanged { target, .. }
        | Command::NodeRemoved { target, .. }
        | Command::NodeMoved { target, .. } => damage.extend(placement_damage(graph, *target)),
        // Not in the graph yet, accounted for by its inverse.
        Command::NodeAdded { .. } => (),
        Command::Scope(commands) => {
            for command in commands.iter() {
                collect_damage(graph, command, damage);
            }
        }
    }
}
/// Projections of nodes that just joined the graph. Their caches are empty or outdated, and any
/// marks they had were dropped when they left.
fn collect_insertions(graph: &LayerGraph, inverse: &Command, damage: &mut Damage) {
    match inverse {
        Command::NodeRemoved { target, .. } => mark_subtree(graph, *target, damage),
        Command::Scope(commands) => {
            for command in commands.iter() {
                collect_insertions(graph, command, damage);
            }
        }
        _ => (),
    }
}
fn mark_subtree(graph: &LayerGraph, id: NodeID, damage: &mut Damage) {
    let Some(node) = graph.get(id) else {
        return;
    };
    if node.is_layer() {
        if let Ok(extent) = graph.extent(id) {
            damage.push((graph.lineage(id), extent));
        }
    }
    let children: SmallVec<[NodeID; 8]> = match graph.children(id) {
        Ok(children) => children.map(Node::id).collect(),
        Err(_) => return,
    };
    for child in children {
        mark_subtree(graph, child, damage);
    }
}
/// Combined coverage of a layer's visible protection masks over `rect`, if it has any.
fn protection_coverage(
    graph: &LayerGraph,
    layer: NodeID,
    rect: Rect,
) -> Result<Option<Vec<u8>>, ImageError> {
    let mut coverage: Option<Vec<u8>> = None;
    for mask in graph.masks(layer)? {
        let NodeKind::ProtectionMask(protection) = mask.kind() else {
            continue;
        };
        if !mask.properties().visible {
            continue;
        }
        // Mask devices are single channel.
        let values = protection.device.read().read_rect(rect)?.into_raw();
        coverage = Some(match coverage.take() {
            None => values,
            Some(mut combined) => {
                for (combined, value) in combined.iter_mut().zip(&values) {
                    *combined = math::screen(*combined, *value);
                }
                combined
            }
        });
    }
    Ok(coverage)
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{Image, ImageError, RegionUpdated};
    use crate::blend::{Blend, BlendMode};
    use crate::colorspace::builtin;
    use crate::device::PixelBuffer;
    use crate::graph::{Node, NodeID, NodeProperties, Subtree};
    use crate::settings::CompositeSettings;
    use crate::util::Rect;

    fn image() -> Image {
        Image::new(8, 8, Arc::new(builtin::rgba8()))
    }
    fn layer(image: &Image, name: &str, color: [u8; 4], opacity: u8) -> NodeID {
        let node = Node::paint_layer(name, image.color_space().clone()).with_properties(
            NodeProperties {
                opacity,
                ..NodeProperties::named(name)
            },
        );
        let id = image.add_node(image.root_node(), node, usize::MAX).unwrap();
        image.fill(id, image.bounds(), &color).unwrap();
        id
    }
    fn pixel(image: &Image, x: i32, y: i32) -> Vec<u8> {
        let buffer = image.request_projection(Rect::new(x, y, 1, 1)).unwrap();
        buffer.data().to_vec()
    }

    #[test]
    fn red_under_half_blue() {
        let image = image();
        layer(&image, "red", [255, 0, 0, 255], 255);
        layer(&image, "blue", [0, 0, 255, 255], 128);
        assert!(!image.is_clean());
        assert_eq!(pixel(&image, 3, 3), [127, 0, 128, 255]);
        assert!(image.is_clean());
    }
    #[test]
    fn clean_refresh_changes_nothing() {
        let image = image();
        layer(&image, "red", [255, 0, 0, 255], 200);
        image.refresh().unwrap();
        let before = image.request_projection(image.bounds()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        image.subscribe(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        assert!(image.refresh().unwrap().is_empty());
        let after = image.request_projection(image.bounds()).unwrap();
        assert_eq!(before.data(), after.data());
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }
    #[test]
    fn marks_are_clipped_and_cleared() {
        let image = image();
        let id = layer(&image, "a", [1, 2, 3, 255], 255);
        image.refresh().unwrap();
        image.mark_dirty(id, Rect::new(6, 6, 10, 10)).unwrap();
        assert_eq!(image.dirty_region().rects(), &[Rect::new(6, 6, 2, 2)]);
        image.refresh().unwrap();
        assert!(image.is_clean());
        assert!(image.mark_dirty(NodeID::default(), image.bounds()).is_err());
    }
    #[test]
    fn subscribers_see_updated_rects() {
        let image = image();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::<RegionUpdated>::new()));
        let sink = seen.clone();
        let subscription = image.subscribe(move |update| sink.lock().push(update.clone()));
        let id = layer(&image, "a", [9, 9, 9, 255], 255);
        image.refresh().unwrap();
        assert_eq!(seen.lock().last().map(RegionUpdated::bounds), Some(image.bounds()));

        let mut properties = image.graph().get(id).unwrap().properties().clone();
        properties.visible = false;
        image.set_properties(id, properties).unwrap();
        image.refresh().unwrap();
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(pixel(&image, 0, 0), [0, 0, 0, 0]);

        assert!(image.unsubscribe(subscription));
        assert!(!image.unsubscribe(subscription));
        image.mark_dirty(id, image.bounds()).unwrap();
        image.refresh().unwrap();
        assert_eq!(seen.lock().len(), 2);
    }
    #[test]
    fn undo_redo_remarks() {
        let image = image();
        let red = layer(&image, "red", [255, 0, 0, 255], 255);
        let source = PixelBuffer::filled(
            Rect::new(0, 0, 2, 2),
            image.color_space().clone(),
            &[0, 255, 0, 255],
        )
        .unwrap();
        image
            .paint(red, &source, Blend::new(BlendMode::Normal, 255))
            .unwrap();
        assert_eq!(pixel(&image, 1, 1), [0, 255, 0, 255]);
        assert!(image.undo().unwrap());
        assert_eq!(pixel(&image, 1, 1), [255, 0, 0, 255]);
        assert!(image.redo().unwrap());
        assert_eq!(pixel(&image, 1, 1), [0, 255, 0, 255]);

        image.remove_node(red).unwrap();
        assert_eq!(pixel(&image, 1, 1), [0, 0, 0, 0]);
        image.undo().unwrap();
        assert_eq!(pixel(&image, 1, 1), [0, 255, 0, 255]);
        assert!(image.graph().contains(red));
    }
    #[test]
    fn locks_and_protection() {
        let image = image();
        let id = layer(&image, "a", [255, 0, 0, 255], 255);
        let protection = image
            .add_node(id, Node::protection_mask("keep", 0), 0)
            .unwrap();
        image.fill(protection, Rect::new(0, 0, 1, 1), &[255]).unwrap();
        let white = PixelBuffer::filled(
            Rect::new(0, 0, 2, 1),
            image.color_space().clone(),
            &[255, 255, 255, 255],
        )
        .unwrap();
        image
            .paint(id, &white, Blend::new(BlendMode::Normal, 255))
            .unwrap();
        assert_eq!(pixel(&image, 0, 0), [255, 0, 0, 255]);
        assert_eq!(pixel(&image, 1, 0), [255, 255, 255, 255]);

        let mut properties = image.graph().get(id).unwrap().properties().clone();
        properties.locked = true;
        image.set_properties(id, properties).unwrap();
        let err = image
            .paint(id, &white, Blend::new(BlendMode::Normal, 255))
            .unwrap_err();
        assert!(matches!(err, ImageError::Locked(locked) if locked == id));
        let err = image
            .paint(protection, &white, Blend::new(BlendMode::Normal, 255))
            .unwrap_err();
        assert!(matches!(err, ImageError::NotPaintable(_)));
    }
    #[test]
    fn failed_pass_keeps_marks() {
        let settings = CompositeSettings {
            max_pass_pixels: 4,
            ..CompositeSettings::default()
        };
        let image = Image::with_settings(8, 8, Arc::new(builtin::rgba8()), settings);
        layer(&image, "a", [1, 1, 1, 255], 255);
        let err = image.refresh().unwrap_err();
        assert!(matches!(err, ImageError::Composite(ref e) if e.is_region_compute_failure()));
        assert!(!image.dirty_region().is_empty());
    }
    #[test]
    fn prefilled_branch_is_composed() {
        let image = image();
        let space = image.color_space().clone();
        let layer = Node::paint_layer("inside", space.clone());
        layer
            .kind()
            .device()
            .unwrap()
            .write()
            .fill(Rect::new(0, 0, 8, 8), &[10, 20, 30, 255])
            .unwrap();
        let branch = Subtree::from(Node::group_layer("group", space)).with_child(layer);
        image.add_node(image.root_node(), branch, 0).unwrap();
        assert_eq!(pixel(&image, 4, 4), [10, 20, 30, 255]);
    }
    #[test]
    fn restored_group_is_recomposed() {
        let image = image();
        let space = image.color_space().clone();
        let group = image
            .add_node(image.root_node(), Node::group_layer("group", space.clone()), 0)
            .unwrap();
        let inner = image
            .add_node(group, Node::paint_layer("inner", space), 0)
            .unwrap();
        image.fill(inner, image.bounds(), &[255, 0, 0, 255]).unwrap();
        assert_eq!(pixel(&image, 0, 0), [255, 0, 0, 255]);
        // Changed but never refreshed before the group leaves.
        image.fill(inner, image.bounds(), &[0, 255, 0, 255]).unwrap();
        image.remove_node(group).unwrap();
        assert!(image.undo().unwrap());
        assert_eq!(pixel(&image, 0, 0), [0, 255, 0, 255]);
    }
    #[test]
    fn duplicate_sits_above_original() {
        let image = image();
        let original = layer(&image, "red", [255, 0, 0, 255], 255);
        layer(&image, "top", [0, 0, 0, 0], 255);
        image.refresh().unwrap();
        let copy = image.duplicate_node(original).unwrap();
        assert_eq!(image.graph().index_of(copy), Some((image.root_node(), 1)));
        assert_eq!(image.graph().get(copy).unwrap().name(), "red");

        image.fill(copy, Rect::new(0, 0, 1, 1), &[0, 0, 255, 255]).unwrap();
        assert_eq!(pixel(&image, 0, 0), [0, 0, 255, 255]);
        assert_eq!(pixel(&image, 1, 0), [255, 0, 0, 255]);
        let graph = image.graph();
        let device = graph.get(original).unwrap().kind().device().unwrap();
        assert_eq!(device.read().pixel(0, 0).as_slice(), &[255, 0, 0, 255]);
        drop(graph);

        assert!(image.undo().unwrap());
        assert!(image.undo().unwrap());
        assert!(!image.graph().contains(copy));
        assert!(image.duplicate_node(image.root_node()).is_err());
    }
    #[test]
    fn cycles_rejected_unchanged() {
        let image = image();
        let space = image.color_space().clone();
        let outer = image
            .add_node(image.root_node(), Node::group_layer("outer", space.clone()), 0)
            .unwrap();
        let inner = image
            .add_node(outer, Node::group_layer("inner", space), 0)
            .unwrap();
        assert!(image.move_node(outer, inner, 0).is_err());
        assert_eq!(image.graph().parent(inner), Some(outer));
        assert_eq!(image.graph().parent(outer), Some(image.root_node()));
        assert!(image.remove_node(image.root_node()).is_err());
    }
}
