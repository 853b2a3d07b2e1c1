//! Vantage Core
//!
//! Shared vocabulary for the vantage render control plane: world geometry and
//! layer masks, camera viewpoints, version identity, and the collaborator
//! traits the control plane drives.

pub mod geometry;
pub mod logging;
pub mod version;
pub mod view;
pub mod world;
