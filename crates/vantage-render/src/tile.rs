//! Tile layout and composition.
//!
//! Every render unit draws into its own surface; the composed output is one
//! square grid of those surfaces. The grid is `row_col` cells on each axis
//! with `row_col = ceil(sqrt(pool_size))`, so pools that are not perfect
//! squares leave trailing cells blank. Placement offsets follow the
//! surface's bottom-left origin: unit 0 occupies the top-left cell of the
//! composed image, the last unit the bottom-right.

use crate::unit::SurfaceSpec;

/// A composed image as tightly packed RGB24, rows top-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TileImage {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn black(width: u32, height: u32) -> Self {
        TileImage {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * Self::BYTES_PER_PIXEL],
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        assert_eq!(
            pixels.len(),
            width as usize * height as usize * Self::BYTES_PER_PIXEL,
            "pixel buffer does not match {}x{} RGB24",
            width,
            height
        );
        TileImage {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

/// Destination of one unit's output on the tile surface. `x` and `y` are
/// texel offsets from the surface's bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlacement {
    pub unit: usize,
    pub x: u32,
    pub y: u32,
}

/// Copy plan from unit surfaces onto the composed grid.
///
/// Computed once per pool geometry; the frame loop rebuilds it only when the
/// unit count or cell size changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayout {
    pool_size: usize,
    cell: SurfaceSpec,
    row_col: u32,
    placements: Vec<TilePlacement>,
}

impl TileLayout {
    pub fn new(pool_size: usize, cell: SurfaceSpec) -> Self {
        let row_col = (pool_size as f64).sqrt().ceil() as u32;
        let mut placements = Vec::with_capacity(pool_size);
        'rows: for row in 0..row_col {
            for col in 0..row_col {
                let unit = (row * row_col + col) as usize;
                if unit >= pool_size {
                    break 'rows;
                }
                placements.push(TilePlacement {
                    unit,
                    x: col * cell.width,
                    y: cell.height * (row_col - 1) - row * cell.height,
                });
            }
        }
        TileLayout {
            pool_size,
            cell,
            row_col,
            placements,
        }
    }

    /// Whether this layout is still valid for the given geometry.
    pub fn matches(&self, pool_size: usize, cell: SurfaceSpec) -> bool {
        self.pool_size == pool_size && self.cell == cell
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn cell(&self) -> SurfaceSpec {
        self.cell
    }

    pub fn row_col(&self) -> u32 {
        self.row_col
    }

    pub fn placements(&self) -> &[TilePlacement] {
        &self.placements
    }

    pub fn surface_width(&self) -> u32 {
        self.row_col * self.cell.width
    }

    pub fn surface_height(&self) -> u32 {
        self.row_col * self.cell.height
    }

    /// Convert a placement's bottom-origin `y` into the top-down row of the
    /// cell's first pixel row.
    pub fn top_row(&self, placement: &TilePlacement) -> u32 {
        self.surface_height() - self.cell.height - placement.y
    }

    pub fn blank_image(&self) -> TileImage {
        TileImage::black(self.surface_width(), self.surface_height())
    }

    /// Copy every placed unit surface into `out`. Each surface must be the
    /// cell size in tightly packed RGB24. Cells not covered by a placement
    /// are left untouched, so callers keep composing into an image that
    /// started from [`TileLayout::blank_image`].
    pub fn compose_into(&self, surfaces: &[Vec<u8>], out: &mut TileImage) {
        assert!(
            out.width() == self.surface_width() && out.height() == self.surface_height(),
            "composition target does not match layout"
        );
        let cell_row_bytes = self.cell.width as usize * TileImage::BYTES_PER_PIXEL;
        let out_row_bytes = self.surface_width() as usize * TileImage::BYTES_PER_PIXEL;
        for placement in &self.placements {
            let src = &surfaces[placement.unit];
            debug_assert_eq!(src.len(), self.cell.byte_len());
            let top = self.top_row(placement) as usize;
            let x_bytes = placement.x as usize * TileImage::BYTES_PER_PIXEL;
            for row in 0..self.cell.height as usize {
                let src_start = row * cell_row_bytes;
                let dst_start = (top + row) * out_row_bytes + x_bytes;
                out.pixels_mut()[dst_start..dst_start + cell_row_bytes]
                    .copy_from_slice(&src[src_start..src_start + cell_row_bytes]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_col_rounds_up() {
        assert_eq!(TileLayout::new(1, SurfaceSpec::square(4)).row_col(), 1);
        assert_eq!(TileLayout::new(2, SurfaceSpec::square(4)).row_col(), 2);
        assert_eq!(TileLayout::new(5, SurfaceSpec::square(4)).row_col(), 3);
        assert_eq!(TileLayout::new(36, SurfaceSpec::square(4)).row_col(), 6);
    }

    #[test]
    fn test_corner_placements_for_full_grid() {
        let layout = TileLayout::new(36, SurfaceSpec::square(224));
        let first = layout.placements()[0];
        let last = layout.placements()[35];
        assert_eq!((first.x, first.y), (0, 5 * 224));
        assert_eq!((last.x, last.y), (5 * 224, 0));
        assert_eq!(layout.surface_width(), 6 * 224);
    }

    #[test]
    fn test_indices_beyond_pool_are_skipped() {
        let layout = TileLayout::new(5, SurfaceSpec::square(4));
        assert_eq!(layout.placements().len(), 5);
        assert_eq!(layout.row_col(), 3);
        let last = layout.placements()[4];
        // Index 4 sits at row 1, col 1 of the 3x3 grid.
        assert_eq!((last.x, last.y), (4, 4));
    }

    #[test]
    fn test_matches_detects_geometry_change() {
        let layout = TileLayout::new(4, SurfaceSpec::square(8));
        assert!(layout.matches(4, SurfaceSpec::square(8)));
        assert!(!layout.matches(5, SurfaceSpec::square(8)));
        assert!(!layout.matches(4, SurfaceSpec::square(16)));
    }

    #[test]
    fn test_compose_puts_unit_zero_top_left() {
        let cell = SurfaceSpec::square(2);
        let layout = TileLayout::new(4, cell);
        let surfaces: Vec<Vec<u8>> = (0..4u8)
            .map(|unit| vec![unit + 1; cell.byte_len()])
            .collect();
        let mut out = layout.blank_image();
        layout.compose_into(&surfaces, &mut out);

        // Top-left pixel belongs to unit 0, bottom-right to unit 3.
        assert_eq!(out.pixels()[0], 1);
        assert_eq!(*out.pixels().last().unwrap(), 4);
        // Row 0 is unit 0 then unit 1, row 2 is unit 2 then unit 3.
        let row_bytes = 4 * TileImage::BYTES_PER_PIXEL;
        assert_eq!(out.pixels()[row_bytes / 2], 2);
        assert_eq!(out.pixels()[2 * row_bytes], 3);
    }

    #[test]
    fn test_blank_cells_stay_black() {
        let cell = SurfaceSpec::square(1);
        let layout = TileLayout::new(3, cell);
        let surfaces: Vec<Vec<u8>> = (0..3u8).map(|unit| vec![unit + 1; 3]).collect();
        let mut out = layout.blank_image();
        layout.compose_into(&surfaces, &mut out);

        // 3 units on a 2x2 grid leave the bottom-right cell untouched.
        let pixels = out.pixels();
        assert_eq!(pixels[0], 1);
        assert_eq!(pixels[3], 2);
        assert_eq!(pixels[6], 3);
        assert_eq!(&pixels[9..12], &[0, 0, 0]);
    }
}
