//! Render unit pool.
//!
//! A fixed number of camera slots created once at startup. Each unit holds
//! an enabled flag and a viewpoint; all units share one output surface
//! specification. The batch scheduler prepares units for the upcoming frame
//! and resets them after each batch's readback is in flight.

use vantage_core::view::ViewPoint;

use crate::tile::TileImage;

/// Shared pixel dimensions of every unit's output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceSpec {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSpec {
    pub const DEFAULT_SIZE: u32 = 224;

    pub fn new(width: u32, height: u32) -> Self {
        SurfaceSpec { width, height }
    }

    pub fn square(size: u32) -> Self {
        SurfaceSpec::new(size, size)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Length of one surface as tightly packed RGB24.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * TileImage::BYTES_PER_PIXEL
    }
}

impl Default for SurfaceSpec {
    fn default() -> Self {
        SurfaceSpec::square(SurfaceSpec::DEFAULT_SIZE)
    }
}

/// Pool geometry and projection defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    pub units: usize,
    pub surface: SurfaceSpec,
    /// Default vertical field of view in degrees for viewpoints that do not
    /// specify one.
    pub field_of_view: f32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            units: 36,
            surface: SurfaceSpec::default(),
            field_of_view: 60.0,
        }
    }
}

/// One camera slot in the pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderUnit {
    enabled: bool,
    view: ViewPoint,
}

impl RenderUnit {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The unit's viewpoint with field of view and aspect fully resolved.
    pub fn view(&self) -> &ViewPoint {
        &self.view
    }
}

/// The fixed-size pool of render units.
pub struct UnitPool {
    units: Vec<RenderUnit>,
    surface: SurfaceSpec,
    default_field_of_view: f32,
}

impl UnitPool {
    pub fn new(config: PoolConfig) -> Self {
        assert!(config.units > 0, "unit pool cannot be empty");
        let mut pool = UnitPool {
            units: Vec::new(),
            surface: config.surface,
            default_field_of_view: config.field_of_view,
        };
        let canonical = pool.canonical_view();
        pool.units = vec![
            RenderUnit {
                enabled: false,
                view: canonical,
            };
            config.units
        ];
        pool
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn surface(&self) -> SurfaceSpec {
        self.surface
    }

    pub fn default_field_of_view(&self) -> f32 {
        self.default_field_of_view
    }

    pub fn unit(&self, index: usize) -> &RenderUnit {
        &self.units[index]
    }

    pub fn units(&self) -> &[RenderUnit] {
        &self.units
    }

    pub fn enabled_count(&self) -> usize {
        self.units.iter().filter(|u| u.enabled).count()
    }

    /// Change the shared surface spec. Returns whether it actually changed;
    /// backends reallocate only on `true`. All units are reset so their
    /// derived aspect follows the new surface.
    pub fn configure(&mut self, surface: SurfaceSpec) -> bool {
        if surface == self.surface {
            return false;
        }
        tracing::debug!(
            width = surface.width,
            height = surface.height,
            "unit surface spec changed"
        );
        self.surface = surface;
        self.reset_all();
        true
    }

    /// Enable unit `index` and apply `view` for the upcoming frame.
    pub fn prepare(&mut self, index: usize, view: &ViewPoint) {
        let resolved = self.resolve(view);
        let unit = &mut self.units[index];
        unit.enabled = true;
        unit.view = resolved;
    }

    /// Prepare units `0..views.len()`; the rest of the pool is untouched.
    pub fn prepare_batch(&mut self, views: &[ViewPoint]) {
        assert!(
            views.len() <= self.units.len(),
            "batch of {} exceeds pool of {}",
            views.len(),
            self.units.len()
        );
        for (index, view) in views.iter().enumerate() {
            self.prepare(index, view);
        }
    }

    /// Disable unit `index` and restore the canonical pose. Idempotent.
    pub fn reset(&mut self, index: usize) {
        let canonical = self.canonical_view();
        let unit = &mut self.units[index];
        unit.enabled = false;
        unit.view = canonical;
    }

    pub fn reset_all(&mut self) {
        let canonical = self.canonical_view();
        for unit in &mut self.units {
            unit.enabled = false;
            unit.view = canonical;
        }
    }

    /// Origin position, forward-looking rotation, default projection.
    fn canonical_view(&self) -> ViewPoint {
        ViewPoint::default()
            .with_field_of_view(self.default_field_of_view)
            .with_aspect(self.surface.aspect())
    }

    /// Substitute pool defaults for unspecified projection parameters.
    fn resolve(&self, view: &ViewPoint) -> ViewPoint {
        let mut resolved = *view;
        if resolved.field_of_view <= 0.0 {
            resolved.field_of_view = self.default_field_of_view;
        }
        if resolved.aspect <= 0.0 {
            resolved.aspect = self.surface.aspect();
        }
        resolved
    }
}
