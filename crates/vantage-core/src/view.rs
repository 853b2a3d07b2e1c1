//! Camera viewpoints.
//!
//! A [`ViewPoint`] is the unit of work the control plane schedules: a world
//! position, an orientation, and the projection parameters a render unit
//! needs to draw one frame from that spot.

use glam::{Mat3, Quat, Vec3};

/// A camera viewpoint.
///
/// `field_of_view` and `aspect` use `<= 0` as "not specified": the render
/// unit pool substitutes its configured default field of view and the
/// surface aspect respectively.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewPoint {
    pub position: Vec3,
    pub rotation: Quat,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    /// Width over height.
    pub aspect: f32,
}

impl ViewPoint {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        ViewPoint {
            position,
            rotation,
            field_of_view: 0.0,
            aspect: 0.0,
        }
    }

    /// A viewpoint at `position` looking along `direction` with world-up.
    pub fn looking(position: Vec3, direction: Vec3) -> Self {
        ViewPoint::new(position, look_rotation(direction, Vec3::Y))
    }

    pub fn with_field_of_view(mut self, degrees: f32) -> Self {
        self.field_of_view = degrees;
        self
    }

    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }

    /// The direction this viewpoint faces.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }
}

impl Default for ViewPoint {
    fn default() -> Self {
        ViewPoint::new(Vec3::ZERO, Quat::IDENTITY)
    }
}

/// Rotation taking canonical forward (`+Z`) onto `direction`, keeping `up`
/// as close to vertical as the direction allows.
///
/// Degenerate inputs (zero direction, `up` parallel to `direction`) fall
/// back to stable axes rather than producing NaNs.
pub fn look_rotation(direction: Vec3, up: Vec3) -> Quat {
    let forward = direction.try_normalize().unwrap_or(Vec3::Z);
    let right = up
        .cross(forward)
        .try_normalize()
        .or_else(|| Vec3::Y.cross(forward).try_normalize())
        .unwrap_or(Vec3::X);
    let up = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, forward))
}
