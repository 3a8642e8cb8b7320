//! # Commands
//!
//! Every undoable change to an image is expressed as a [`Command`]. Applying a command to a
//! [`CommandConsumer`] hands back its inverse, which is what the [`history`] keeps: undoing is
//! just applying the stored inverse, which in turn yields the command to redo.

pub mod history;

use crate::device::DeviceSnapshot;
use crate::graph::{GraphError, LayerGraph, NodeID, NodeProperties, Subtree};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("command constructed for a state that does not match the current state")]
    MismatchedState,
    #[error("resource referenced by the command is not found")]
    UnknownResource,
    #[error("command makes no changes")]
    NoOp,
}
impl From<GraphError> for CommandError {
    fn from(value: GraphError) -> Self {
        match value {
            GraphError::NodeNotFound(_) => Self::UnknownResource,
            GraphError::InvalidHierarchy(_) => Self::MismatchedState,
        }
    }
}

pub trait CommandConsumer<C> {
    /// Apply a single command, returning the command that reverts it.
    /// If this generates an error, the state of `self` should *not* be observably changed.
    fn apply(&mut self, command: C) -> Result<C, CommandError>;
}

#[derive(Debug)]
pub enum Command {
    /// Replace the content of a node's device.
    DeviceContent {
        target: NodeID,
        content: DeviceSnapshot,
    },
    /// Replace a node's properties.
    PropertiesChanged {
        target: NodeID,
        properties: NodeProperties,
    },
    /// Insert a detached subtree.
    NodeAdded {
        parent: NodeID,
        index: usize,
        subtree: Subtree,
    },
    /// Detach a node and its descendants.
    NodeRemoved { parent: NodeID, target: NodeID },
    /// Move a node to a new parent and index, which may be its current parent.
    NodeMoved {
        target: NodeID,
        parent: NodeID,
        index: usize,
    },
    /// Several commands treated as one, applied in order.
    Scope(Box<[Command]>),
}
impl CommandConsumer<Command> for LayerGraph {
    fn apply(&mut self, command: Command) -> Result<Command, CommandError> {
        match command {
            Command::DeviceContent { target, content } => {
                let node = self.get(target).ok_or(CommandError::UnknownResource)?;
                let device = node.kind().device().ok_or(CommandError::MismatchedState)?;
                let previous = {
                    let mut device = device.write();
                    let previous = device.snapshot();
                    device.restore(&content);
                    previous
                };
                self.invalidate_extent(target);
                Ok(Command::DeviceContent {
                    target,
                    content: previous,
                })
            }
            Command::PropertiesChanged { target, properties } => {
                let previous = self.set_properties(target, properties)?;
                Ok(Command::PropertiesChanged {
                    target,
                    properties: previous,
                })
            }
            Command::NodeAdded {
                parent,
                index,
                subtree,
            } => {
                let target = self.add_child(parent, subtree, index)?;
                Ok(Command::NodeRemoved { parent, target })
            }
            Command::NodeRemoved { parent, target } => {
                let (_, index) = self
                    .index_of(target)
                    .ok_or(CommandError::UnknownResource)?;
                let subtree = self.remove_child(parent, target)?;
                Ok(Command::NodeAdded {
                    parent,
                    index,
                    subtree,
                })
            }
            Command::NodeMoved {
                target,
                parent,
                index,
            } => {
                let (old_parent, old_index) = if self.parent(target) == Some(parent) {
                    (parent, self.reorder(target, index)?)
                } else {
                    self.reparent(target, parent, index)?
                };
                Ok(Command::NodeMoved {
                    target,
                    parent: old_parent,
                    index: old_index,
                })
            }
            Command::Scope(commands) => {
                if commands.is_empty() {
                    return Err(CommandError::NoOp);
                }
                let mut inverses = Vec::with_capacity(commands.len());
                for command in commands.into_vec() {
                    match self.apply(command) {
                        Ok(inverse) => inverses.push(inverse),
                        Err(err) => {
                            // Roll back what was applied so far.
                            for inverse in inverses.into_iter().rev() {
                                if let Err(rollback) = self.apply(inverse) {
                                    log::error!("failed to roll back partial scope: {rollback}");
                                }
                            }
                            return Err(err);
                        }
                    }
                }
                inverses.reverse();
                Ok(Command::Scope(inverses.into_boxed_slice()))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{Command, CommandConsumer, CommandError};
    use crate::colorspace::builtin;
    use crate::graph::{LayerGraph, Node, NodeProperties};
    use crate::util::Rect;

    fn graph() -> LayerGraph {
        LayerGraph::new(Arc::new(builtin::rgba8()))
    }

    #[test]
    fn add_then_inverse_removes() {
        let mut graph = graph();
        let root = graph.root();
        let layer = Node::paint_layer("a", Arc::new(builtin::rgba8()));
        let id = layer.id();
        let inverse = graph
            .apply(Command::NodeAdded {
                parent: root,
                index: 0,
                subtree: layer.into(),
            })
            .unwrap();
        assert!(graph.contains(id));
        let redo = graph.apply(inverse).unwrap();
        assert!(!graph.contains(id));
        assert!(matches!(redo, Command::NodeAdded { index: 0, .. }));
        graph.apply(redo).unwrap();
        assert_eq!(graph.index_of(id), Some((root, 0)));
    }
    #[test]
    fn removal_restores_position() {
        let mut graph = graph();
        let root = graph.root();
        let space = Arc::new(builtin::rgba8());
        let ids: Vec<_> = (0..3)
            .map(|i| {
                graph
                    .add_child(root, Node::paint_layer(format!("{i}"), space.clone()), i)
                    .unwrap()
            })
            .collect();
        let inverse = graph
            .apply(Command::NodeRemoved {
                parent: root,
                target: ids[1],
            })
            .unwrap();
        graph.apply(inverse).unwrap();
        assert_eq!(graph.index_of(ids[1]), Some((root, 1)));
    }
    #[test]
    fn device_content_swaps() {
        let mut graph = graph();
        let root = graph.root();
        let id = graph
            .add_child(root, Node::paint_layer("a", Arc::new(builtin::rgba8())), 0)
            .unwrap();
        let device = graph.get(id).unwrap().kind().device().unwrap();
        let before = device.read().snapshot();
        device
            .write()
            .fill(Rect::new(0, 0, 1, 1), &[1, 2, 3, 4])
            .unwrap();
        let redo = graph
            .apply(Command::DeviceContent {
                target: id,
                content: before,
            })
            .unwrap();
        let device = graph.get(id).unwrap().kind().device().unwrap();
        assert!(device.read().is_empty());
        graph.apply(redo).unwrap();
        let device = graph.get(id).unwrap().kind().device().unwrap();
        assert_eq!(device.read().pixel(0, 0).as_slice(), &[1, 2, 3, 4]);
    }
    #[test]
    fn failing_scope_rolls_back() {
        let mut graph = graph();
        let root = graph.root();
        let id = graph
            .add_child(root, Node::paint_layer("a", Arc::new(builtin::rgba8())), 0)
            .unwrap();
        let missing = Node::paint_layer("gone", Arc::new(builtin::rgba8())).id();
        let scope = Command::Scope(Box::new([
            Command::PropertiesChanged {
                target: id,
                properties: NodeProperties::named("renamed"),
            },
            Command::PropertiesChanged {
                target: missing,
                properties: NodeProperties::named("nope"),
            },
        ]));
        assert_eq!(graph.apply(scope).unwrap_err(), CommandError::UnknownResource);
        assert_eq!(graph.get(id).unwrap().name(), "a");
        assert_eq!(
            graph.apply(Command::Scope(Box::new([]))).unwrap_err(),
            CommandError::NoOp
        );
    }
    #[test]
    fn move_round_trips() {
        let mut graph = graph();
        let root = graph.root();
        let space = Arc::new(builtin::rgba8());
        let group = graph
            .add_child(root, Node::group_layer("g", space.clone()), 0)
            .unwrap();
        let layer = graph
            .add_child(root, Node::paint_layer("a", space), 1)
            .unwrap();
        let back = graph
            .apply(Command::NodeMoved {
                target: layer,
                parent: group,
                index: 0,
            })
            .unwrap();
        assert_eq!(graph.parent(layer), Some(group));
        graph.apply(back).unwrap();
        assert_eq!(graph.index_of(layer), Some((root, 1)));
    }
}
