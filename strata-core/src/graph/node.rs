use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::NodeID;
use crate::blend::{Blend, BlendMode};
use crate::colorspace::{builtin, ColorSpace};
use crate::device::PaintDevice;
use crate::filter::EffectFilter;
use crate::util::Rect;

/// The kind of a node, without its data.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr, strum::EnumIter, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum NodeType {
    PaintLayer,
    GroupLayer,
    EffectMask,
    TransparencyMask,
    SelectionMask,
    ProtectionMask,
}
impl NodeType {
    #[must_use]
    pub fn is_layer(self) -> bool {
        matches!(self, Self::PaintLayer | Self::GroupLayer)
    }
    #[must_use]
    pub fn is_mask(self) -> bool {
        !self.is_layer()
    }
    /// May a node of kind `child` be placed under a node of kind `self`?
    #[must_use]
    pub fn can_contain(self, child: Self) -> bool {
        match self {
            Self::GroupLayer => true,
            Self::PaintLayer => child.is_mask(),
            Self::EffectMask | Self::TransparencyMask | Self::SelectionMask | Self::ProtectionMask => {
                false
            }
        }
    }
}

/// User-editable attributes shared by every node.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NodeProperties {
    pub name: String,
    /// 0 is fully transparent, 255 is opaque. Ignored on masks.
    pub opacity: u8,
    pub visible: bool,
    /// Locked nodes reject painting.
    pub locked: bool,
    /// Painting may not change the alpha channel.
    pub alpha_locked: bool,
    pub mode: BlendMode,
}
impl Default for NodeProperties {
    fn default() -> Self {
        Self {
            name: String::new(),
            opacity: u8::MAX,
            visible: true,
            locked: false,
            alpha_locked: false,
            mode: BlendMode::Normal,
        }
    }
}
impl NodeProperties {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    #[must_use]
    pub fn blend(&self) -> Blend {
        Blend::new(self.mode, self.opacity)
    }
}

pub struct PaintLayer {
    pub device: RwLock<PaintDevice>,
    /// Device with masks applied. Only meaningful while the layer has active masks.
    pub projection: RwLock<PaintDevice>,
}
pub struct GroupLayer {
    pub projection: RwLock<PaintDevice>,
}
pub struct EffectMask {
    pub filter: EffectFilter,
    /// Per-pixel strength of the filter.
    pub device: RwLock<PaintDevice>,
}
/// Transparency, selection and protection masks: single channel coverage.
pub struct Mask {
    pub device: RwLock<PaintDevice>,
}
impl Mask {
    /// A mask with uniform `coverage` everywhere.
    #[must_use]
    pub fn new(coverage: u8) -> Self {
        Self {
            device: RwLock::new(PaintDevice::uniform(
                Arc::new(builtin::a8()),
                smallvec::smallvec![coverage],
            )),
        }
    }
}

pub enum NodeKind {
    PaintLayer(PaintLayer),
    GroupLayer(GroupLayer),
    EffectMask(EffectMask),
    TransparencyMask(Mask),
    SelectionMask(Mask),
    ProtectionMask(Mask),
}
impl NodeKind {
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::PaintLayer(_) => NodeType::PaintLayer,
            Self::GroupLayer(_) => NodeType::GroupLayer,
            Self::EffectMask(_) => NodeType::EffectMask,
            Self::TransparencyMask(_) => NodeType::TransparencyMask,
            Self::SelectionMask(_) => NodeType::SelectionMask,
            Self::ProtectionMask(_) => NodeType::ProtectionMask,
        }
    }
    /// The device holding this node's own pixels. Groups have none.
    #[must_use]
    pub fn device(&self) -> Option<&RwLock<PaintDevice>> {
        match self {
            Self::PaintLayer(PaintLayer { device, .. })
            | Self::EffectMask(EffectMask { device, .. })
            | Self::TransparencyMask(Mask { device })
            | Self::SelectionMask(Mask { device })
            | Self::ProtectionMask(Mask { device }) => Some(device),
            Self::GroupLayer(_) => None,
        }
    }
    /// The composited result of a layer. Masks have none.
    #[must_use]
    pub fn projection(&self) -> Option<&RwLock<PaintDevice>> {
        match self {
            Self::PaintLayer(PaintLayer { projection, .. })
            | Self::GroupLayer(GroupLayer { projection }) => Some(projection),
            _ => None,
        }
    }
}

pub struct Node {
    id: NodeID,
    properties: NodeProperties,
    kind: NodeKind,
    extent: Mutex<Option<Rect>>,
}
impl Node {
    /// Wrap a kind with fresh identity.
    #[must_use]
    pub fn new(kind: NodeKind, properties: NodeProperties) -> Self {
        Self {
            id: NodeID::default(),
            properties,
            kind,
            extent: Mutex::new(None),
        }
    }
    /// Replace all properties, name included. Only before the node joins a graph.
    #[must_use]
    pub fn with_properties(mut self, properties: NodeProperties) -> Self {
        self.properties = properties;
        self
    }
    #[must_use]
    pub fn paint_layer(name: impl Into<String>, color_space: Arc<ColorSpace>) -> Self {
        let layer = PaintLayer {
            device: RwLock::new(PaintDevice::new(color_space.clone())),
            projection: RwLock::new(PaintDevice::new(color_space)),
        };
        Self::new(NodeKind::PaintLayer(layer), NodeProperties::named(name))
    }
    #[must_use]
    pub fn group_layer(name: impl Into<String>, color_space: Arc<ColorSpace>) -> Self {
        let group = GroupLayer {
            projection: RwLock::new(PaintDevice::new(color_space)),
        };
        Self::new(NodeKind::GroupLayer(group), NodeProperties::named(name))
    }
    /// An effect mask at full strength everywhere.
    #[must_use]
    pub fn effect_mask(name: impl Into<String>, filter: EffectFilter) -> Self {
        let mask = EffectMask {
            filter,
            device: Mask::new(u8::MAX).device,
        };
        Self::new(NodeKind::EffectMask(mask), NodeProperties::named(name))
    }
    #[must_use]
    pub fn transparency_mask(name: impl Into<String>, coverage: u8) -> Self {
        Self::new(
            NodeKind::TransparencyMask(Mask::new(coverage)),
            NodeProperties::named(name),
        )
    }
    #[must_use]
    pub fn selection_mask(name: impl Into<String>, coverage: u8) -> Self {
        Self::new(
            NodeKind::SelectionMask(Mask::new(coverage)),
            NodeProperties::named(name),
        )
    }
    #[must_use]
    pub fn protection_mask(name: impl Into<String>, coverage: u8) -> Self {
        Self::new(
            NodeKind::ProtectionMask(Mask::new(coverage)),
            NodeProperties::named(name),
        )
    }
    /// A copy with a fresh id, the same properties and a snapshot of every device.
    /// Projections start empty, they are recomposed once the copy is placed.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let copy = |device: &RwLock<PaintDevice>| RwLock::new(device.read().clone());
        let blank = |projection: &RwLock<PaintDevice>| {
            RwLock::new(PaintDevice::new(projection.read().color_space().clone()))
        };
        let kind = match &self.kind {
            NodeKind::PaintLayer(layer) => NodeKind::PaintLayer(PaintLayer {
                device: copy(&layer.device),
                projection: blank(&layer.projection),
            }),
            NodeKind::GroupLayer(group) => NodeKind::GroupLayer(GroupLayer {
                projection: blank(&group.projection),
            }),
            NodeKind::EffectMask(mask) => NodeKind::EffectMask(EffectMask {
                filter: mask.filter,
                device: copy(&mask.device),
            }),
            NodeKind::TransparencyMask(mask) => NodeKind::TransparencyMask(Mask {
                device: copy(&mask.device),
            }),
            NodeKind::SelectionMask(mask) => NodeKind::SelectionMask(Mask {
                device: copy(&mask.device),
            }),
            NodeKind::ProtectionMask(mask) => NodeKind::ProtectionMask(Mask {
                device: copy(&mask.device),
            }),
        };
        Self::new(kind, self.properties.clone())
    }
    #[must_use]
    pub fn id(&self) -> NodeID {
        self.id
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.properties.name
    }
    #[must_use]
    pub fn properties(&self) -> &NodeProperties {
        &self.properties
    }
    pub(super) fn properties_mut(&mut self) -> &mut NodeProperties {
        &mut self.properties
    }
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
    #[must_use]
    pub fn is_layer(&self) -> bool {
        self.node_type().is_layer()
    }
    #[must_use]
    pub fn is_mask(&self) -> bool {
        self.node_type().is_mask()
    }
    /// The color space pixels of this node composite in.
    #[must_use]
    pub fn color_space(&self) -> Arc<ColorSpace> {
        let device = match &self.kind {
            NodeKind::PaintLayer(PaintLayer { device, .. })
            | NodeKind::GroupLayer(GroupLayer { projection: device })
            | NodeKind::EffectMask(EffectMask { device, .. })
            | NodeKind::TransparencyMask(Mask { device })
            | NodeKind::SelectionMask(Mask { device })
            | NodeKind::ProtectionMask(Mask { device }) => device,
        };
        device.read().color_space().clone()
    }
    pub(super) fn cached_extent(&self) -> Option<Rect> {
        *self.extent.lock()
    }
    pub(super) fn set_cached_extent(&self, extent: Option<Rect>) {
        *self.extent.lock() = extent;
    }
}
impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type", &self.node_type())
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// A detached node and everything below it, in child order.
#[derive(Debug)]
pub struct Subtree {
    pub node: Node,
    pub children: Vec<Subtree>,
}
impl Subtree {
    #[must_use]
    pub fn id(&self) -> NodeID {
        self.node.id()
    }
    /// Ids of every node in the subtree, root first.
    #[must_use]
    pub fn ids(&self) -> Vec<NodeID> {
        let mut ids = vec![self.node.id()];
        for child in &self.children {
            ids.extend(child.ids());
        }
        ids
    }
    /// Builder-style child append.
    #[must_use]
    pub fn with_child(mut self, child: impl Into<Subtree>) -> Self {
        self.children.push(child.into());
        self
    }
}
impl From<Node> for Subtree {
    fn from(node: Node) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }
}
