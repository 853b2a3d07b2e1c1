//! Backend abstraction for the frame loop.
//!
//! A backend owns the per-unit output surfaces and knows how to draw into
//! them and read them back as one composited tile image. The frame loop
//! drives a backend through [`RenderBackend::render_frame`] once per tick;
//! readbacks snapshot whatever the most recent frame produced.

use crate::{
    readback::ReadbackTicket,
    tile::{TileImage, TileLayout},
    unit::UnitPool,
};

#[derive(Debug)]
pub enum BackendError {
    /// No usable device was found during backend construction.
    NoDevice { message: String },
    /// Allocating or reallocating the unit surfaces failed.
    SurfaceAllocation {
        width: u32,
        height: u32,
        message: String,
    },
    /// Drawing a frame failed.
    RenderFailed { message: String },
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NoDevice { message } => {
                write!(f, "no usable render device: {}", message)
            }
            BackendError::SurfaceAllocation {
                width,
                height,
                message,
            } => {
                write!(
                    f,
                    "failed to allocate {}x{} unit surfaces: {}",
                    width, height, message
                )
            }
            BackendError::RenderFailed { message } => {
                write!(f, "render failed: {}", message)
            }
        }
    }
}

impl std::error::Error for BackendError {}

pub type BackendResult<T> = Result<T, BackendError>;

/// Rendering and readback surface shared by the software and GPU paths.
///
/// Implementations run on the frame-loop thread only, so no interior
/// synchronization is required beyond `Send`.
pub trait RenderBackend: Send {
    /// Reallocate unit surfaces for a new layout. Called once at startup and
    /// again whenever the pool geometry changes.
    fn configure(&mut self, layout: &TileLayout) -> BackendResult<()>;

    /// Draw one frame: every enabled unit renders from its viewpoint, every
    /// disabled unit's surface is cleared, and the results are placed on the
    /// composite grid.
    fn render_frame(&mut self, pool: &UnitPool) -> BackendResult<()>;

    /// Block until the most recently rendered composite is available and
    /// return a copy of it.
    fn read_tiles(&mut self) -> BackendResult<TileImage>;

    /// Start an asynchronous readback of the most recently rendered
    /// composite and return a ticket for it. The snapshot is taken at
    /// request time; later frames do not affect it.
    fn request_tiles(&mut self) -> ReadbackTicket;
}
