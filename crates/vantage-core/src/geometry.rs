use bitflags::bitflags;
use glam::Vec3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// A zero-size box at the origin.
    pub const ZERO: Aabb = Aabb {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size * 0.5;
        Aabb {
            min: center - half,
            max: center + half,
        }
    }

    /// Grow this box so it contains `other`.
    pub fn encapsulate(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Aabb::ZERO
    }
}

bitflags! {
    /// Logical world layers a collider can belong to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WorldLayers: u32 {
        const DEFAULT             = 1 << 0;
        const WATER               = 1 << 1;
        const UI                  = 1 << 2;
        const FIRST_PERSON_ONLY   = 1 << 3;
        const THIRD_PERSON_ONLY   = 1 << 4;
        const RIDING_ITEM         = 1 << 5;
        const INTERACTABLE_EXHIBIT = 1 << 6;
        const OTHER_AVATAR        = 1 << 7;
        const OWN_AVATAR          = 1 << 8;
        const GRABBABLE_UI        = 1 << 9;
        const GRABBING_ITEM       = 1 << 10;
        const POST_PROCESSING     = 1 << 11;
        const PERFORMER           = 1 << 12;
        const AUDIENCE            = 1 << 13;
        const HAND_OR_POINTER     = 1 << 14;
        const GRABBABLE_OBJECT    = 1 << 15;
        const NAMEPLATE           = 1 << 16;
        const VENUE_LAYER_1       = 1 << 17;
        const VENUE_LAYER_2       = 1 << 18;
    }
}

impl WorldLayers {
    /// Layers that count as physical world geometry: everything except
    /// avatars, UI, and per-viewer decoration.
    pub fn physical() -> WorldLayers {
        WorldLayers::all()
            - (WorldLayers::WATER
                | WorldLayers::UI
                | WorldLayers::FIRST_PERSON_ONLY
                | WorldLayers::THIRD_PERSON_ONLY
                | WorldLayers::RIDING_ITEM
                | WorldLayers::INTERACTABLE_EXHIBIT
                | WorldLayers::OTHER_AVATAR
                | WorldLayers::OWN_AVATAR
                | WorldLayers::GRABBABLE_UI
                | WorldLayers::GRABBING_ITEM
                | WorldLayers::POST_PROCESSING
                | WorldLayers::PERFORMER
                | WorldLayers::AUDIENCE
                | WorldLayers::HAND_OR_POINTER
                | WorldLayers::GRABBABLE_OBJECT
                | WorldLayers::NAMEPLATE
                | WorldLayers::VENUE_LAYER_2)
    }
}

/// A physics volume contributed by world content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collider {
    pub bounds: Aabb,
    pub layers: WorldLayers,
}

impl Collider {
    pub fn new(bounds: Aabb, layers: WorldLayers) -> Self {
        Collider { bounds, layers }
    }
}

/// Bounding box of all colliders whose layers intersect `include`.
///
/// The fold starts from a zero-size box at the origin, so the result always
/// contains the origin even when every collider is filtered out.
pub fn world_bounding_box<'a>(
    colliders: impl IntoIterator<Item = &'a Collider>,
    include: WorldLayers,
) -> Aabb {
    let mut bounds = Aabb::ZERO;
    for collider in colliders {
        if collider.layers.intersects(include) {
            bounds.encapsulate(&collider.bounds);
        }
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encapsulate_grows_both_corners() {
        let mut a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(-2.0), Vec3::splat(0.5));
        a.encapsulate(&b);
        assert_eq!(a.min, Vec3::splat(-2.0));
        assert_eq!(a.max, Vec3::ONE);
    }

    #[test]
    fn test_from_center_size() {
        let b = Aabb::from_center_size(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(2.0));
        assert_eq!(b.min, Vec3::new(0.0, 1.0, 2.0));
        assert_eq!(b.max, Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(b.center(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_physical_excludes_avatar_and_ui() {
        let physical = WorldLayers::physical();
        assert!(physical.contains(WorldLayers::DEFAULT));
        assert!(physical.contains(WorldLayers::VENUE_LAYER_1));
        assert!(!physical.intersects(WorldLayers::OWN_AVATAR));
        assert!(!physical.intersects(WorldLayers::UI));
        assert!(!physical.intersects(WorldLayers::NAMEPLATE));
    }

    #[test]
    fn test_world_bounding_box_filters_layers() {
        let colliders = [
            Collider::new(
                Aabb::new(Vec3::splat(-4.0), Vec3::splat(-1.0)),
                WorldLayers::DEFAULT,
            ),
            Collider::new(
                Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0)),
                WorldLayers::VENUE_LAYER_1,
            ),
            // Should not contribute: avatar geometry.
            Collider::new(
                Aabb::new(Vec3::splat(50.0), Vec3::splat(60.0)),
                WorldLayers::OWN_AVATAR,
            ),
        ];
        let bbox = world_bounding_box(&colliders, WorldLayers::physical());
        assert_eq!(bbox.min, Vec3::splat(-4.0));
        assert_eq!(bbox.max, Vec3::splat(3.0));
    }

    #[test]
    fn test_world_bounding_box_empty_is_origin() {
        let colliders: [Collider; 0] = [];
        let bbox = world_bounding_box(&colliders, WorldLayers::physical());
        assert_eq!(bbox, Aabb::ZERO);
    }
}
