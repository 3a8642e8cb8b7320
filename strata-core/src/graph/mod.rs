//! # Graph
//!
//! The layers of an image form a tree rooted at a group layer. Layers may carry masks, which are
//! stored as their mask-kind children. Children are ordered bottom to top: index 0 is painted first.
//!
//! Structure lives in an `id_tree` arena holding only [`NodeID`]s, node data lives beside it keyed
//! by id, so a removed branch can be handed back to the caller as an owned [`Subtree`].

mod node;
mod stable_id;
mod visitor;

pub use node::{
    EffectMask, GroupLayer, Mask, Node, NodeKind, NodeProperties, NodeType, PaintLayer, Subtree,
};
pub use stable_id::NodeID;
pub use visitor::NodeVisitor;

use std::sync::Arc;

use crate::colorspace::ColorSpace;
use crate::util::Rect;
use stable_id::StableIDMap;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("can't place a node under itself or its own children")]
    WouldCycle,
    #[error("{child:?} is not allowed under {parent:?}")]
    Disallowed { parent: NodeType, child: NodeType },
    #[error("the root can't be moved")]
    Root,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} not found")]
    NodeNotFound(NodeID),
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(#[from] HierarchyError),
}

pub struct LayerGraph {
    tree: id_tree::Tree<NodeID>,
    ids: StableIDMap,
    nodes: hashbrown::HashMap<NodeID, Node>,
    root: NodeID,
}
impl LayerGraph {
    /// A graph holding only a root group, compositing in `color_space`.
    #[must_use]
    pub fn new(color_space: Arc<ColorSpace>) -> Self {
        let root = Node::group_layer("root", color_space);
        let root_id = root.id();
        let tree = id_tree::TreeBuilder::new()
            .with_root(id_tree::Node::new(root_id))
            .build();
        let mut ids = StableIDMap::default();
        if let Some(tree_root) = tree.root_node_id() {
            ids.insert_pair(root_id, tree_root.clone());
        }
        let mut nodes = hashbrown::HashMap::new();
        nodes.insert(root_id, root);
        Self {
            tree,
            ids,
            nodes,
            root: root_id,
        }
    }
    #[must_use]
    pub fn root(&self) -> NodeID {
        self.root
    }
    /// Number of nodes, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.nodes.len(), self.ids.len());
        self.nodes.len()
    }
    /// Always false, the root can't be removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
    #[must_use]
    pub fn contains(&self, id: NodeID) -> bool {
        self.nodes.contains_key(&id)
    }
    #[must_use]
    pub fn get(&self, id: NodeID) -> Option<&Node> {
        self.nodes.get(&id)
    }
    fn node(&self, id: NodeID) -> Result<&Node, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }
    fn tree_id(&self, id: NodeID) -> Result<&id_tree::NodeId, GraphError> {
        self.ids.tree_id(id).ok_or(GraphError::NodeNotFound(id))
    }
    /// The parent of a node. `None` for the root or unknown nodes.
    #[must_use]
    pub fn parent(&self, id: NodeID) -> Option<NodeID> {
        let tree_id = self.ids.tree_id(id)?;
        let parent = self.tree.get(tree_id).ok()?.parent()?;
        self.tree.get(parent).ok().map(|parent| *parent.data())
    }
    /// Parent and position of a node within its siblings.
    #[must_use]
    pub fn index_of(&self, id: NodeID) -> Option<(NodeID, usize)> {
        let tree_id = self.ids.tree_id(id)?;
        let parent_tree_id = self.tree.get(tree_id).ok()?.parent()?;
        let idx = self
            .tree
            .children_ids(parent_tree_id)
            .ok()?
            .position(|child| child == tree_id)?;
        Some((*self.tree.get(parent_tree_id).ok()?.data(), idx))
    }
    /// Direct children, bottom first.
    pub fn children(&self, id: NodeID) -> Result<impl Iterator<Item = &Node> + '_, GraphError> {
        let children = self
            .tree
            .children_ids(self.tree_id(id)?)
            .map_err(|_| GraphError::NodeNotFound(id))?;
        Ok(children
            .filter_map(|child| self.tree.get(child).ok())
            .filter_map(|child| self.nodes.get(child.data())))
    }
    /// Children which are layers, bottom first.
    pub fn layers(&self, id: NodeID) -> Result<impl Iterator<Item = &Node> + '_, GraphError> {
        Ok(self.children(id)?.filter(|child| child.is_layer()))
    }
    /// Children which are masks, in application order.
    pub fn masks(&self, id: NodeID) -> Result<impl Iterator<Item = &Node> + '_, GraphError> {
        Ok(self.children(id)?.filter(|child| child.is_mask()))
    }
    /// Every ancestor from the parent up to the root.
    pub fn ancestors(&self, id: NodeID) -> impl Iterator<Item = NodeID> + '_ {
        self.ids
            .tree_id(id)
            .and_then(|tree_id| self.tree.ancestor_ids(tree_id).ok())
            .into_iter()
            .flatten()
            .filter_map(|ancestor| self.tree.get(ancestor).ok().map(|node| *node.data()))
    }
    /// The node followed by its ancestors. Empty if the node is unknown.
    #[must_use]
    pub fn lineage(&self, id: NodeID) -> smallvec::SmallVec<[NodeID; 8]> {
        if !self.contains(id) {
            return smallvec::SmallVec::new();
        }
        std::iter::once(id).chain(self.ancestors(id)).collect()
    }
    /// Every node, parents before children, siblings bottom first.
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.tree
            .root_node_id()
            .and_then(|root| self.tree.traverse_pre_order_ids(root).ok())
            .into_iter()
            .flatten()
            .filter_map(|tree_id| self.tree.get(&tree_id).ok().map(|node| *node.data()))
            .filter_map(|id| self.nodes.get(&id))
    }
    /// Dispatch a visitor on the node's concrete kind.
    pub fn accept<V: NodeVisitor + ?Sized>(
        &self,
        id: NodeID,
        visitor: &mut V,
    ) -> Result<V::Output, GraphError> {
        Ok(self.node(id)?.accept(visitor))
    }
    /// Check every parent-child pair of a detached subtree.
    fn validate(parent: NodeType, subtree: &Subtree) -> Result<(), HierarchyError> {
        let child = subtree.node.node_type();
        if !parent.can_contain(child) {
            return Err(HierarchyError::Disallowed { parent, child });
        }
        subtree
            .children
            .iter()
            .try_for_each(|grandchild| Self::validate(child, grandchild))
    }
    /// Insert a node or detached subtree as the `index`th child of `parent`. Too large an index
    /// places it on top. On error, the graph is unchanged.
    pub fn add_child(
        &mut self,
        parent: NodeID,
        subtree: impl Into<Subtree>,
        index: usize,
    ) -> Result<NodeID, GraphError> {
        let subtree = subtree.into();
        Self::validate(self.node(parent)?.node_type(), &subtree)?;
        let parent_tree_id = self.tree_id(parent)?.clone();
        let id = subtree.id();
        let tree_id = self.insert_subtree(&parent_tree_id, subtree)?;
        self.place(&tree_id, index);
        self.invalidate_extent(parent);
        log::trace!("added {id} under {parent}");
        Ok(id)
    }
    fn insert_subtree(
        &mut self,
        parent: &id_tree::NodeId,
        subtree: Subtree,
    ) -> Result<id_tree::NodeId, GraphError> {
        let Subtree { node, children } = subtree;
        let id = node.id();
        node.set_cached_extent(None);
        let tree_id = self
            .tree
            .insert(
                id_tree::Node::new(id),
                id_tree::InsertBehavior::UnderNode(parent),
            )
            .map_err(|_| GraphError::NodeNotFound(id))?;
        self.ids.insert_pair(id, tree_id.clone());
        self.nodes.insert(id, node);
        for child in children {
            self.insert_subtree(&tree_id, child)?;
        }
        Ok(tree_id)
    }
    /// Move a node to `index` within its siblings, clamped.
    fn place(&mut self, tree_id: &id_tree::NodeId, index: usize) {
        let siblings = self
            .tree
            .get(tree_id)
            .ok()
            .and_then(id_tree::Node::parent)
            .and_then(|parent| self.tree.get(parent).ok())
            .map_or(0, |parent| parent.children().len());
        // Only fails for unknown ids, which were checked by every caller.
        let _ = self
            .tree
            .make_nth_sibling(tree_id, index.min(siblings.saturating_sub(1)));
    }
    /// A detached copy of a node and all of its descendants, each with a fresh id.
    pub fn duplicate(&self, id: NodeID) -> Result<Subtree, GraphError> {
        let children = self
            .children(id)?
            .map(|child| self.duplicate(child.id()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Subtree {
            node: self.node(id)?.duplicate(),
            children,
        })
    }
    /// Detach `child` from `parent`, returning it and all of its descendants.
    pub fn remove_child(&mut self, parent: NodeID, child: NodeID) -> Result<Subtree, GraphError> {
        self.node(parent)?;
        if self.parent(child) != Some(parent) {
            return Err(GraphError::NodeNotFound(child));
        }
        let tree_id = self.tree_id(child)?.clone();
        let subtree = self.take_subtree(&tree_id)?;
        self.tree
            .remove_node(tree_id, id_tree::RemoveBehavior::DropChildren)
            .map_err(|_| GraphError::NodeNotFound(child))?;
        self.invalidate_extent(parent);
        log::trace!("removed {child} from {parent}");
        Ok(subtree)
    }
    fn take_subtree(&mut self, tree_id: &id_tree::NodeId) -> Result<Subtree, GraphError> {
        let tree_node = self
            .tree
            .get(tree_id)
            .map_err(|_| GraphError::NodeNotFound(self.root))?;
        let id = *tree_node.data();
        let child_tree_ids = tree_node.children().clone();
        let children = child_tree_ids
            .iter()
            .map(|child| self.take_subtree(child))
            .collect::<Result<Vec<_>, _>>()?;
        self.ids.erase(id);
        let node = self.nodes.remove(&id).ok_or(GraphError::NodeNotFound(id))?;
        Ok(Subtree { node, children })
    }
    /// Move a node, with its descendants, under a new parent. Returns the previous parent and index.
    /// On error, the graph is unchanged.
    pub fn reparent(
        &mut self,
        id: NodeID,
        new_parent: NodeID,
        index: usize,
    ) -> Result<(NodeID, usize), GraphError> {
        let child = self.node(id)?.node_type();
        let parent = self.node(new_parent)?.node_type();
        let Some(old_location) = self.index_of(id) else {
            return Err(HierarchyError::Root.into());
        };
        if self.lineage(new_parent).contains(&id) {
            return Err(HierarchyError::WouldCycle.into());
        }
        if !parent.can_contain(child) {
            return Err(HierarchyError::Disallowed { parent, child }.into());
        }
        let tree_id = self.tree_id(id)?.clone();
        let parent_tree_id = self.tree_id(new_parent)?.clone();
        // Old ancestors lose the extent, new ones gain it.
        self.invalidate_extent(id);
        self.tree
            .move_node(&tree_id, id_tree::MoveBehavior::ToParent(&parent_tree_id))
            .map_err(|_| GraphError::NodeNotFound(id))?;
        self.place(&tree_id, index);
        self.invalidate_extent(id);
        Ok(old_location)
    }
    /// Change a node's position among its siblings. Returns the previous index.
    pub fn reorder(&mut self, id: NodeID, index: usize) -> Result<usize, GraphError> {
        let (parent, old_index) = self.index_of(id).ok_or(GraphError::NodeNotFound(id))?;
        let tree_id = self.tree_id(id)?.clone();
        self.place(&tree_id, index);
        self.invalidate_extent(parent);
        Ok(old_index)
    }
    /// Replace a node's properties, returning the old ones.
    pub fn set_properties(
        &mut self,
        id: NodeID,
        properties: NodeProperties,
    ) -> Result<NodeProperties, GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        Ok(std::mem::replace(node.properties_mut(), properties))
    }
    /// Forget the cached extent of a node and all of its ancestors.
    /// Must be called after writing to any device of the node.
    pub fn invalidate_extent(&self, id: NodeID) {
        for ancestor in self.lineage(id) {
            if let Some(node) = self.nodes.get(&ancestor) {
                node.set_cached_extent(None);
            }
        }
    }
    /// Loose bounds: own device extent united with every child's extent. Cached.
    pub fn extent(&self, id: NodeID) -> Result<Rect, GraphError> {
        let node = self.node(id)?;
        if let Some(extent) = node.cached_extent() {
            return Ok(extent);
        }
        let mut extent = node
            .kind()
            .device()
            .map_or(Rect::EMPTY, |device| device.read().extent());
        let children: smallvec::SmallVec<[NodeID; 8]> =
            self.children(id)?.map(Node::id).collect();
        for child in children {
            extent = extent.union(&self.extent(child)?);
        }
        node.set_cached_extent(Some(extent));
        Ok(extent)
    }
    /// Tight bounds of the pixels a node holds. For layers, the union of their own content
    /// and their child layers', masks are not counted.
    pub fn exact_bounds(&self, id: NodeID) -> Result<Rect, GraphError> {
        let node = self.node(id)?;
        let mut bounds = node
            .kind()
            .device()
            .map_or(Rect::EMPTY, |device| device.read().exact_bounds());
        if node.is_layer() {
            for child in self.layers(id)? {
                bounds = bounds.union(&self.exact_bounds(child.id())?);
            }
        }
        Ok(bounds)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::colorspace::builtin;
    use crate::filter::EffectFilter;

    fn rgba() -> Arc<ColorSpace> {
        Arc::new(builtin::rgba8())
    }
    fn child_names(graph: &LayerGraph, id: NodeID) -> Vec<String> {
        graph
            .children(id)
            .unwrap()
            .map(|node| node.name().to_owned())
            .collect()
    }

    #[test]
    fn add_in_order() {
        let mut graph = LayerGraph::new(rgba());
        let root = graph.root();
        graph.add_child(root, Node::paint_layer("a", rgba()), 0).unwrap();
        graph.add_child(root, Node::paint_layer("c", rgba()), 5).unwrap();
        let b = graph.add_child(root, Node::paint_layer("b", rgba()), 1).unwrap();
        assert_eq!(child_names(&graph, root), ["a", "b", "c"]);
        assert_eq!(graph.index_of(b), Some((root, 1)));
        assert_eq!(graph.parent(b), Some(root));
        assert_eq!(graph.parent(root), None);
        assert_eq!(graph.len(), 4);
    }
    #[test]
    fn duplicate_copies_branch() {
        let mut graph = LayerGraph::new(rgba());
        let root = graph.root();
        let group = graph.add_child(root, Node::group_layer("g", rgba()), 0).unwrap();
        let layer = graph.add_child(group, Node::paint_layer("p", rgba()), 0).unwrap();
        graph
            .add_child(layer, Node::effect_mask("fx", EffectFilter::Invert), 0)
            .unwrap();
        let copy = graph.duplicate(group).unwrap();
        let ids = copy.ids();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| !graph.contains(*id)));
        let copy = graph.add_child(root, copy, 1).unwrap();
        assert_eq!(child_names(&graph, root), ["g", "g"]);
        assert_eq!(graph.len(), 7);
        let inner = graph.children(copy).unwrap().next().unwrap().id();
        assert_eq!(child_names(&graph, inner), ["fx"]);
        assert!(graph.duplicate(NodeID::default()).is_err());
    }
    #[test]
    fn disallowed_children() {
        let mut graph = LayerGraph::new(rgba());
        let root = graph.root();
        let layer = graph.add_child(root, Node::paint_layer("a", rgba()), 0).unwrap();
        let mask = graph
            .add_child(layer, Node::transparency_mask("m", 255), 0)
            .unwrap();
        assert_eq!(
            graph.add_child(layer, Node::group_layer("g", rgba()), 0),
            Err(GraphError::InvalidHierarchy(HierarchyError::Disallowed {
                parent: NodeType::PaintLayer,
                child: NodeType::GroupLayer
            }))
        );
        assert!(matches!(
            graph.add_child(mask, Node::selection_mask("s", 255), 0),
            Err(GraphError::InvalidHierarchy(_))
        ));
        // A valid root with an invalid descendant is rejected as a whole.
        let bad = Subtree::from(Node::group_layer("g", rgba()))
            .with_child(Subtree::from(Node::paint_layer("p", rgba())).with_child(Node::group_layer("x", rgba())));
        assert!(graph.add_child(root, bad, 0).is_err());
        assert_eq!(graph.len(), 3);
    }
    #[test]
    fn move_under_descendant_rejected() {
        let mut graph = LayerGraph::new(rgba());
        let root = graph.root();
        let outer = graph.add_child(root, Node::group_layer("outer", rgba()), 0).unwrap();
        let inner = graph.add_child(outer, Node::group_layer("inner", rgba()), 0).unwrap();
        assert_eq!(
            graph.reparent(outer, inner, 0),
            Err(GraphError::InvalidHierarchy(HierarchyError::WouldCycle))
        );
        assert_eq!(
            graph.reparent(outer, outer, 0),
            Err(GraphError::InvalidHierarchy(HierarchyError::WouldCycle))
        );
        assert_eq!(
            graph.reparent(root, outer, 0),
            Err(GraphError::InvalidHierarchy(HierarchyError::Root))
        );
        // Unchanged.
        assert_eq!(graph.parent(inner), Some(outer));
        assert_eq!(graph.parent(outer), Some(root));
        assert_eq!(graph.lineage(inner).as_slice(), &[inner, outer, root]);
    }
    #[test]
    fn reparent_and_reorder() {
        let mut graph = LayerGraph::new(rgba());
        let root = graph.root();
        let group = graph.add_child(root, Node::group_layer("g", rgba()), 0).unwrap();
        let a = graph.add_child(root, Node::paint_layer("a", rgba()), 1).unwrap();
        graph.add_child(group, Node::paint_layer("b", rgba()), 0).unwrap();
        assert_eq!(graph.reparent(a, group, 0), Ok((root, 1)));
        assert_eq!(child_names(&graph, group), ["a", "b"]);
        assert_eq!(graph.reorder(a, 10), Ok(0));
        assert_eq!(child_names(&graph, group), ["b", "a"]);
    }
    #[test]
    fn remove_returns_subtree() {
        let mut graph = LayerGraph::new(rgba());
        let root = graph.root();
        let group = graph.add_child(root, Node::group_layer("g", rgba()), 0).unwrap();
        let layer = graph.add_child(group, Node::paint_layer("a", rgba()), 0).unwrap();
        let mask = graph
            .add_child(layer, Node::effect_mask("fx", EffectFilter::Invert), 0)
            .unwrap();
        assert_eq!(
            graph.remove_child(root, layer).err(),
            Some(GraphError::NodeNotFound(layer))
        );
        let subtree = graph.remove_child(root, group).unwrap();
        assert_eq!(subtree.ids(), [group, layer, mask]);
        assert_eq!(graph.len(), 1);
        assert!(!graph.contains(mask));
        // Ids survive the round trip.
        graph.add_child(root, subtree, 0).unwrap();
        assert_eq!(graph.parent(mask), Some(layer));
        assert_eq!(graph.iter().map(Node::id).collect::<Vec<_>>(), [root, group, layer, mask]);
    }
    #[test]
    fn extent_cache_invalidation() {
        let mut graph = LayerGraph::new(rgba());
        let root = graph.root();
        let layer = graph.add_child(root, Node::paint_layer("a", rgba()), 0).unwrap();
        assert!(graph.extent(root).unwrap().is_empty());
        let NodeKind::PaintLayer(paint) = graph.get(layer).unwrap().kind() else {
            unreachable!()
        };
        paint
            .device
            .write()
            .fill(Rect::new(3, 3, 2, 2), &[1, 2, 3, 255])
            .unwrap();
        // Stale until invalidated.
        assert!(graph.extent(root).unwrap().is_empty());
        graph.invalidate_extent(layer);
        assert_eq!(graph.extent(root).unwrap(), Rect::new(0, 0, 64, 64));
        assert_eq!(graph.exact_bounds(root).unwrap(), Rect::new(3, 3, 2, 2));
    }
    #[test]
    fn properties_round_trip() {
        let mut graph = LayerGraph::new(rgba());
        let root = graph.root();
        let layer = graph.add_child(root, Node::paint_layer("a", rgba()), 0).unwrap();
        let mut props = graph.get(layer).unwrap().properties().clone();
        props.opacity = 10;
        props.visible = false;
        let old = graph.set_properties(layer, props.clone()).unwrap();
        assert_eq!(old.opacity, 255);
        assert_eq!(graph.get(layer).unwrap().properties(), &props);
        assert_eq!(
            graph.masks(layer).unwrap().count() + graph.layers(root).unwrap().count(),
            1
        );
    }
}
