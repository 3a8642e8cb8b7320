//! Glue between [`NodeID`]s and `id_tree::NodeId`s. Tree ids shift as nodes are removed and
//! re-inserted, node ids never do.

/// Namespace marker for node ids.
pub struct Node;
pub type NodeID = crate::id::UniqueID<Node>;

#[derive(Default)]
pub(super) struct StableIDMap {
    to_tree: hashbrown::HashMap<NodeID, id_tree::NodeId>,
}
impl StableIDMap {
    pub fn tree_id(&self, id: NodeID) -> Option<&id_tree::NodeId> {
        self.to_tree.get(&id)
    }
    pub fn insert_pair(&mut self, id: NodeID, tree: id_tree::NodeId) {
        self.to_tree.insert(id, tree);
    }
    pub fn erase(&mut self, id: NodeID) {
        let _ = self.to_tree.remove(&id);
    }
    pub fn len(&self) -> usize {
        self.to_tree.len()
    }
}
