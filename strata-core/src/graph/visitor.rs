use super::node::{EffectMask, GroupLayer, Mask, Node, NodeKind, PaintLayer};

/// Dispatch on the concrete kind of a [`Node`]. See [`Node::accept`].
pub trait NodeVisitor {
    type Output;
    fn paint_layer(&mut self, node: &Node, layer: &PaintLayer) -> Self::Output;
    fn group_layer(&mut self, node: &Node, group: &GroupLayer) -> Self::Output;
    fn effect_mask(&mut self, node: &Node, mask: &EffectMask) -> Self::Output;
    fn transparency_mask(&mut self, node: &Node, mask: &Mask) -> Self::Output;
    fn selection_mask(&mut self, node: &Node, mask: &Mask) -> Self::Output;
    fn protection_mask(&mut self, node: &Node, mask: &Mask) -> Self::Output;
}

impl Node {
    pub fn accept<V: NodeVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match self.kind() {
            NodeKind::PaintLayer(layer) => visitor.paint_layer(self, layer),
            NodeKind::GroupLayer(group) => visitor.group_layer(self, group),
            NodeKind::EffectMask(mask) => visitor.effect_mask(self, mask),
            NodeKind::TransparencyMask(mask) => visitor.transparency_mask(self, mask),
            NodeKind::SelectionMask(mask) => visitor.selection_mask(self, mask),
            NodeKind::ProtectionMask(mask) => visitor.protection_mask(self, mask),
        }
    }
}
