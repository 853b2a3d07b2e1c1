//! JSON wire models and their domain conversions.
//!
//! Field names follow the protocol the driving agent already speaks, hence
//! the camelCase renames and the string-typed floats in the bounding box
//! response. Conversions to domain types are explicit per message; handlers
//! never pass wire structs further down.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use vantage_core::{
    geometry::Aabb,
    version::{VersionInfo, platform_name},
    view::{ViewPoint, look_rotation},
    world::{LeafGridCell, NodeUpdate, ViewScoring},
};

// ============================================================================
// Vectors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Vector3Wire {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3Wire {
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl From<Vec3> for Vector3Wire {
    fn from(v: Vec3) -> Self {
        Vector3Wire {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuaternionWire {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl QuaternionWire {
    /// True for the all-zero value clients send when they want the
    /// direction vector to drive the orientation instead.
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0 && self.w == 0.0
    }

    pub fn to_quat(self) -> Quat {
        Quat::from_xyzw(self.x, self.y, self.z, self.w)
    }
}

/// Vector with decimal-string components, used where clients parse the
/// values with locale-tolerant float parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector3Strings {
    pub x: String,
    pub y: String,
    pub z: String,
}

impl From<Vec3> for Vector3Strings {
    fn from(v: Vec3) -> Self {
        Vector3Strings {
            x: format!("{}", v.x),
            y: format!("{}", v.y),
            z: format!("{}", v.z),
        }
    }
}

// ============================================================================
// Camera parameters
// ============================================================================

/// One requested viewpoint.
///
/// Orientation comes from `quaternion` when it is non-zero, otherwise from
/// `direction` via a world-up look rotation. `fieldOfView` and `aspect` at
/// `0` mean "use the pool defaults".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraParameter {
    pub position: Vector3Wire,
    pub direction: Vector3Wire,
    pub quaternion: QuaternionWire,
    pub field_of_view: f32,
    pub aspect: f32,
}

impl CameraParameter {
    pub fn to_view(&self) -> ViewPoint {
        let rotation = if self.quaternion.is_zero() {
            look_rotation(self.direction.to_vec3(), Vec3::Y)
        } else {
            self.quaternion.to_quat()
        };
        ViewPoint {
            position: self.position.to_vec3(),
            rotation,
            field_of_view: self.field_of_view,
            aspect: self.aspect,
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderSceneRequest {
    pub camera_parameters: Vec<CameraParameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererConfig {
    pub texture_size: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateConfigRequest {
    pub renderer_config: RendererConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhotoScoring {
    pub camera_parameter: CameraParameter,
    pub score: f32,
}

impl PhotoScoring {
    pub fn into_scoring(self) -> ViewScoring {
        ViewScoring {
            view: self.camera_parameter.to_view(),
            score: self.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LeafGridNode {
    pub grid_id: String,
    pub node_id: String,
    pub position: Vector3Wire,
    pub photo_scorings: Vec<PhotoScoring>,
}

impl LeafGridNode {
    pub fn into_cell(self) -> LeafGridCell {
        LeafGridCell {
            grid_id: self.grid_id,
            node_id: self.node_id,
            position: self.position.to_vec3(),
            scorings: self
                .photo_scorings
                .into_iter()
                .map(PhotoScoring::into_scoring)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeData {
    pub id: String,
    pub branch_id: String,
    pub parent_id: String,
    pub depth: i32,
    pub min: Vector3Wire,
    pub max: Vector3Wire,
    pub score: f32,
    pub photo_scorings: Vec<PhotoScoring>,
    /// Only present on leaf nodes; `null` and absent both mean none.
    pub leaf_grid_nodes: Option<Vec<LeafGridNode>>,
}

impl NodeData {
    pub fn into_update(self) -> NodeUpdate {
        NodeUpdate {
            id: self.id,
            branch_id: self.branch_id,
            parent_id: self.parent_id,
            depth: self.depth,
            bounds: Aabb::new(self.min.to_vec3(), self.max.to_vec3()),
            score: self.score,
            scorings: self
                .photo_scorings
                .into_iter()
                .map(PhotoScoring::into_scoring)
                .collect(),
            leaf_cells: self
                .leaf_grid_nodes
                .unwrap_or_default()
                .into_iter()
                .map(LeafGridNode::into_cell)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateNodesRequest {
    pub nodes: Vec<NodeData>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundsPayload {
    pub min: Vector3Strings,
    pub max: Vector3Strings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BboxResponse {
    pub bbox: BoundsPayload,
}

impl BboxResponse {
    pub fn from_bounds(bounds: &Aabb) -> Self {
        BboxResponse {
            bbox: BoundsPayload {
                min: bounds.min.into(),
                max: bounds.max.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionPayload {
    pub major_version: u32,
    pub minor_version: u32,
    pub build_number: u32,
    pub revision_number: u32,
}

impl From<VersionInfo> for VersionPayload {
    fn from(version: VersionInfo) -> Self {
        VersionPayload {
            major_version: version.major,
            minor_version: version.minor,
            build_number: version.build,
            revision_number: version.revision,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfoResponse {
    pub version: String,
    pub version_info: VersionPayload,
    pub platform: String,
}

impl ServerInfoResponse {
    /// The running build's identity.
    pub fn current() -> Self {
        ServerInfoResponse {
            version: VersionInfo::CURRENT.to_string(),
            version_info: VersionInfo::CURRENT.into(),
            platform: platform_name().to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
