//! Default world and node collaborators.
//!
//! The control plane only talks to [`WorldSource`] and [`NodeSink`] traits;
//! these are the stock implementations the binary wires in. Embedders with a
//! real scene supply their own.

use std::sync::{Mutex, PoisonError};

use ahash::AHashMap;
use glam::Vec3;

use vantage_core::{
    geometry::{Aabb, Collider, WorldLayers},
    world::{NodeSink, NodeUpdate, WorldSource},
};

/// World geometry fixed at construction time.
pub struct StaticWorld {
    colliders: Vec<Collider>,
}

impl StaticWorld {
    pub fn new(colliders: Vec<Collider>) -> Self {
        Self { colliders }
    }

    /// A world with no geometry; its bounding box is the zero box.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// A small fixed scene so a fresh server answers bounding box queries
    /// with something other than the zero box: a ground slab and two blocks.
    pub fn demo() -> Self {
        Self::new(vec![
            Collider::new(
                Aabb::from_center_size(Vec3::new(0.0, -0.5, 0.0), Vec3::new(40.0, 1.0, 40.0)),
                WorldLayers::DEFAULT,
            ),
            Collider::new(
                Aabb::from_center_size(Vec3::new(-6.0, 2.0, 4.0), Vec3::new(4.0, 4.0, 4.0)),
                WorldLayers::DEFAULT,
            ),
            Collider::new(
                Aabb::from_center_size(Vec3::new(8.0, 3.0, -5.0), Vec3::new(6.0, 6.0, 6.0)),
                WorldLayers::VENUE_LAYER_1,
            ),
        ])
    }
}

impl WorldSource for StaticWorld {
    fn colliders(&self) -> Vec<Collider> {
        self.colliders.clone()
    }
}

/// In-memory node state keyed by node id. Updates overwrite, resets clear.
#[derive(Default)]
pub struct NodeStore {
    nodes: Mutex<AHashMap<String, NodeUpdate>>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<NodeUpdate> {
        self.lock().get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AHashMap<String, NodeUpdate>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NodeSink for NodeStore {
    fn update_nodes(&self, nodes: Vec<NodeUpdate>) {
        let mut map = self.lock();
        for node in nodes {
            map.insert(node.id.clone(), node);
        }
        tracing::debug!(total = map.len(), "node state updated");
    }

    fn reset_nodes(&self) {
        self.lock().clear();
        tracing::debug!("node state reset");
    }
}

// ============================================================================
// Tests
// ============================================================================
