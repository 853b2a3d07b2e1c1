//! Test utilities for the vantage render control plane.
//!
//! The main component is [`MockBackend`], a render backend that records
//! every call and resolves readbacks from a script instead of drawing
//! anything. Tests hand the backend to a real `RenderService` (or drive it
//! directly) and keep the paired [`MockControl`] for assertions.
//!
//! # Example
//!
//! ```rust
//! use vantage_test_utils::{BackendCall, MockBackend};
//! use vantage_render::{RenderBackend, SurfaceSpec, TileLayout, UnitPool, PoolConfig};
//!
//! let (mut backend, control) = MockBackend::new();
//! let pool = UnitPool::new(PoolConfig { units: 2, surface: SurfaceSpec::square(4), field_of_view: 60.0 });
//! backend.configure(&TileLayout::new(2, pool.surface())).unwrap();
//! backend.render_frame(&pool).unwrap();
//!
//! assert_eq!(control.count_frames(), 1);
//! assert!(matches!(control.calls()[0], BackendCall::Configure { pool_size: 2, .. }));
//! ```
//!
//! # Interior Mutability
//!
//! The backend moves onto the frame loop thread while the control handle
//! stays with the test, so both sides share one `parking_lot::Mutex` behind
//! an `Arc`. `parking_lot` keeps the lock cheap and poison-free.

pub mod mock_backend;

pub use mock_backend::*;
