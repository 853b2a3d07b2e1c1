//! Vantage Render
//!
//! Frame-paced rendering pipeline: a fixed pool of render units, a tile
//! compositor that packs every unit's output onto one square surface, an
//! asynchronous readback pipeline, and a batch scheduler that turns a list
//! of viewpoints into per-batch tile images.
//!
//! # Example
//!
//! ```ignore
//! use vantage_render::{RenderConfig, RenderService, SoftwareBackend};
//! use vantage_core::view::ViewPoint;
//!
//! let service = RenderService::spawn(
//!     RenderConfig::default(),
//!     Box::new(SoftwareBackend::new()),
//! )?;
//! let run = service.render(vec![ViewPoint::looking(glam::Vec3::ZERO, glam::Vec3::Z)]);
//! for tiles in run {
//!     let tiles = tiles?;
//!     println!("{}x{}", tiles.width(), tiles.height());
//! }
//! ```

pub mod backend;
pub mod driver;
pub mod gpu;
pub mod readback;
pub mod sched;
pub mod software;
pub mod tile;
pub mod unit;

pub use backend::{BackendError, BackendResult, RenderBackend};
pub use driver::{RenderConfig, RenderRun, RenderService};
pub use gpu::GpuBackend;
pub use readback::{Readback, ReadbackError, ReadbackSender, ReadbackTicket};
pub use sched::{RenderError, RenderResult, RunStats};
pub use software::SoftwareBackend;
pub use tile::{TileImage, TileLayout, TilePlacement};
pub use unit::{PoolConfig, RenderUnit, SurfaceSpec, UnitPool};
