//! HTTP control plane for the vantage render pipeline.
//!
//! A small synchronous server that exposes the render service, world
//! geometry, and node state over plain HTTP 1.1. Every route runs under a
//! single-permit [`gate::ControlGate`], so at most one request mutates the
//! pipeline at a time; the rest wait their turn or time out.
//!
//! The crate splits along the request path:
//!
//! - [`http`] reads requests off the socket and writes responses back,
//! - [`route`] matches method and path, takes the gate, and runs the handler,
//! - [`handlers`] implement the actual operations,
//! - [`wire`] holds the JSON models and their conversions to domain types,
//! - [`host`] provides the default world and node collaborators.

pub mod gate;
pub mod handlers;
pub mod host;
pub mod http;
pub mod route;
pub mod wire;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use vantage_core::world::{NodeSink, WorldSource};
use vantage_render::RenderService;

use crate::gate::ControlGate;

/// Shared state handed to every request handler.
///
/// One instance lives for the whole process, wrapped in an [`Arc`] and
/// cloned into each connection thread.
pub struct ServerContext {
    /// Single permit serializing all control operations.
    pub gate: ControlGate,
    /// Frame loop plus its render backend.
    pub renderer: RenderService,
    /// Source of world geometry for bounding box queries.
    pub world: Arc<dyn WorldSource>,
    /// Receiver of node state updates.
    pub nodes: Arc<dyn NodeSink>,
    /// Set by the shutdown route; the accept loop polls it.
    pub shutdown: Arc<AtomicBool>,
}

impl ServerContext {
    pub fn new(
        renderer: RenderService,
        world: Arc<dyn WorldSource>,
        nodes: Arc<dyn NodeSink>,
        gate_timeout: Duration,
    ) -> Self {
        Self {
            gate: ControlGate::new(gate_timeout),
            renderer,
            world,
            nodes,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True once a shutdown has been requested.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
