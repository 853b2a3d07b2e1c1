//! Deterministic CPU backend.
//!
//! Paints each enabled unit's surface a solid color derived from its
//! viewpoint and composes the grid on the CPU. Readbacks resolve at request
//! time. Used when no GPU adapter is available and as the reference
//! implementation in tests: the color is a pure function of the pose, so a
//! test can predict exactly which bytes a composed image carries.

use vantage_core::view::ViewPoint;

use crate::{
    backend::{BackendError, BackendResult, RenderBackend},
    readback::{ReadbackError, ReadbackTicket},
    tile::{TileImage, TileLayout},
    unit::UnitPool,
};

/// Solid RGB color painted for a viewpoint. Hashes position and rotation
/// only, so resolving projection defaults does not change the color.
pub fn view_color(view: &ViewPoint) -> [u8; 3] {
    let mut hash: u32 = 0x811c_9dc5;
    let mut feed = |value: f32| {
        for byte in value.to_bits().to_le_bytes() {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(0x0100_0193);
        }
    };
    feed(view.position.x);
    feed(view.position.y);
    feed(view.position.z);
    feed(view.rotation.x);
    feed(view.rotation.y);
    feed(view.rotation.z);
    feed(view.rotation.w);
    [(hash >> 16) as u8, (hash >> 8) as u8, hash as u8]
}

#[derive(Default)]
pub struct SoftwareBackend {
    layout: Option<TileLayout>,
    surfaces: Vec<Vec<u8>>,
    tiles: Option<TileImage>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        SoftwareBackend::default()
    }

    fn not_configured() -> BackendError {
        BackendError::RenderFailed {
            message: "backend not configured".to_string(),
        }
    }
}

impl RenderBackend for SoftwareBackend {
    fn configure(&mut self, layout: &TileLayout) -> BackendResult<()> {
        self.surfaces = vec![vec![0; layout.cell().byte_len()]; layout.pool_size()];
        self.tiles = Some(layout.blank_image());
        self.layout = Some(layout.clone());
        Ok(())
    }

    fn render_frame(&mut self, pool: &UnitPool) -> BackendResult<()> {
        let layout = self.layout.as_ref().ok_or_else(Self::not_configured)?;
        for (index, unit) in pool.units().iter().enumerate() {
            let surface = &mut self.surfaces[index];
            if unit.enabled() {
                let color = view_color(unit.view());
                for pixel in surface.chunks_exact_mut(TileImage::BYTES_PER_PIXEL) {
                    pixel.copy_from_slice(&color);
                }
            } else {
                surface.fill(0);
            }
        }
        let tiles = self.tiles.as_mut().ok_or_else(Self::not_configured)?;
        layout.compose_into(&self.surfaces, tiles);
        Ok(())
    }

    fn read_tiles(&mut self) -> BackendResult<TileImage> {
        self.tiles.clone().ok_or_else(Self::not_configured)
    }

    fn request_tiles(&mut self) -> ReadbackTicket {
        match &self.tiles {
            Some(tiles) => ReadbackTicket::completed(tiles.clone()),
            None => ReadbackTicket::failed(ReadbackError::CopyFailed(
                "backend not configured".to_string(),
            )),
        }
    }
}
