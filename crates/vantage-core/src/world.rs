//! Collaborator traits for the world host.
//!
//! The control plane does not load worlds or own scene content; it queries a
//! [`WorldSource`] for geometry and forwards search-tree visualization data
//! to a [`NodeSink`]. Both are object-safe so hosts can be swapped (real
//! scene, demo world, test double) without touching the control plane.

use glam::Vec3;

use crate::geometry::{Aabb, Collider};
use crate::view::ViewPoint;

/// Read access to the loaded world's physical content.
pub trait WorldSource: Send + Sync {
    /// Every collider volume currently loaded, with its layer membership.
    fn colliders(&self) -> Vec<Collider>;
}

/// Receiver for search-tree visualization updates.
pub trait NodeSink: Send + Sync {
    fn update_nodes(&self, nodes: Vec<NodeUpdate>);
    fn reset_nodes(&self);
}

/// One scored viewpoint attached to a search node.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewScoring {
    pub view: ViewPoint,
    pub score: f32,
}

/// A scored cell of a leaf node's sampling grid.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafGridCell {
    pub grid_id: String,
    pub node_id: String,
    pub position: Vec3,
    pub scorings: Vec<ViewScoring>,
}

/// One search-tree node as reported by the driving agent.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpdate {
    pub id: String,
    pub branch_id: String,
    pub parent_id: String,
    pub depth: i32,
    pub bounds: Aabb,
    pub score: f32,
    pub scorings: Vec<ViewScoring>,
    pub leaf_cells: Vec<LeafGridCell>,
}
