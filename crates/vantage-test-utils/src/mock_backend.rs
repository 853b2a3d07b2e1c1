//! Mock implementation of RenderBackend for testing.
//!
//! Records every backend operation and resolves readbacks from a script,
//! so scheduler and server tests can assert on frame ordering and exercise
//! delayed or failing readbacks without a GPU.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use vantage_core::view::ViewPoint;
use vantage_render::{
    BackendResult, ReadbackError, ReadbackSender, ReadbackTicket, RenderBackend, SurfaceSpec,
    TileImage, TileLayout, UnitPool, readback,
};

/// Records one backend operation for verification in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Configure {
        pool_size: usize,
        cell: SurfaceSpec,
    },
    /// A frame was drawn; carries the enabled units and their views.
    RenderFrame {
        enabled: Vec<(usize, ViewPoint)>,
    },
    ReadTiles,
    RequestTiles,
}

/// How the mock resolves the next requested readback.
#[derive(Debug, Clone)]
pub enum ReadbackScript {
    /// Resolve at request time with a black layout-sized image.
    Ready,
    /// Resolve after that many further frames have been drawn.
    ReadyAfter(u32),
    /// Hand out an already-failed ticket.
    Fail(ReadbackError),
}

struct PendingResolve {
    frames_left: u32,
    out: ReadbackSender,
    image: TileImage,
}

#[derive(Default)]
struct MockState {
    calls: Vec<BackendCall>,
    layout: Option<TileLayout>,
    script: VecDeque<ReadbackScript>,
    pending: Vec<PendingResolve>,
}

/// Scriptable recording backend.
///
/// The backend side moves wherever the real backend would go (usually the
/// frame loop thread); the paired [`MockControl`] stays with the test.
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> (Self, MockControl) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            MockBackend {
                state: state.clone(),
            },
            MockControl { state },
        )
    }

    fn blank_image(state: &MockState) -> TileImage {
        match &state.layout {
            Some(layout) => layout.blank_image(),
            None => TileImage::black(0, 0),
        }
    }
}

impl RenderBackend for MockBackend {
    fn configure(&mut self, layout: &TileLayout) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Configure {
            pool_size: layout.pool_size(),
            cell: layout.cell(),
        });
        state.layout = Some(layout.clone());
        Ok(())
    }

    fn render_frame(&mut self, pool: &UnitPool) -> BackendResult<()> {
        let mut state = self.state.lock();
        let enabled = pool
            .units()
            .iter()
            .enumerate()
            .filter(|(_, unit)| unit.enabled())
            .map(|(index, unit)| (index, *unit.view()))
            .collect();
        state.calls.push(BackendCall::RenderFrame { enabled });

        // Scripted readbacks resolve once their frame countdown runs out.
        let mut index = 0;
        while index < state.pending.len() {
            state.pending[index].frames_left -= 1;
            if state.pending[index].frames_left == 0 {
                let resolve = state.pending.remove(index);
                let _ = resolve.out.send(Ok(resolve.image));
            } else {
                index += 1;
            }
        }
        Ok(())
    }

    fn read_tiles(&mut self) -> BackendResult<TileImage> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::ReadTiles);
        Ok(Self::blank_image(&state))
    }

    fn request_tiles(&mut self) -> ReadbackTicket {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::RequestTiles);
        let image = Self::blank_image(&state);
        match state.script.pop_front() {
            None | Some(ReadbackScript::Ready | ReadbackScript::ReadyAfter(0)) => {
                ReadbackTicket::completed(image)
            }
            Some(ReadbackScript::ReadyAfter(frames)) => {
                let (out, ticket) = readback::channel();
                state.pending.push(PendingResolve {
                    frames_left: frames,
                    out,
                    image,
                });
                ticket
            }
            Some(ReadbackScript::Fail(error)) => ReadbackTicket::failed(error),
        }
    }
}

/// Assertion and scripting handle paired with a [`MockBackend`].
#[derive(Clone)]
pub struct MockControl {
    state: Arc<Mutex<MockState>>,
}

impl MockControl {
    /// Get a copy of all recorded calls (for test assertions).
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    /// Get total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Clear recorded calls (useful between test steps).
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Count drawn frames.
    pub fn count_frames(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, BackendCall::RenderFrame { .. }))
            .count()
    }

    /// Count async readback requests.
    pub fn count_readback_requests(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, BackendCall::RequestTiles))
            .count()
    }

    /// Enabled-unit snapshots of every recorded frame, in order.
    pub fn frame_snapshots(&self) -> Vec<Vec<(usize, ViewPoint)>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::RenderFrame { enabled } => Some(enabled.clone()),
                _ => None,
            })
            .collect()
    }

    /// Queue how the next readback request resolves. Requests beyond the
    /// script resolve immediately.
    pub fn script_readback(&self, script: ReadbackScript) {
        self.state.lock().script.push_back(script);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use vantage_render::{PoolConfig, Readback};

    use super::*;

    fn pool_of(units: usize) -> UnitPool {
        UnitPool::new(PoolConfig {
            units,
            surface: SurfaceSpec::square(2),
            field_of_view: 60.0,
        })
    }

    #[test]
    fn test_records_configure_and_frames() {
        let (mut backend, control) = MockBackend::new();
        let pool = pool_of(3);
        backend
            .configure(&TileLayout::new(3, pool.surface()))
            .unwrap();
        backend.render_frame(&pool).unwrap();
        backend.render_frame(&pool).unwrap();

        assert_eq!(control.call_count(), 3);
        assert_eq!(control.count_frames(), 2);
        assert!(matches!(
            control.calls()[0],
            BackendCall::Configure { pool_size: 3, .. }
        ));
    }

    #[test]
    fn test_unscripted_readback_is_ready_immediately() {
        let (mut backend, control) = MockBackend::new();
        let pool = pool_of(1);
        backend
            .configure(&TileLayout::new(1, pool.surface()))
            .unwrap();

        let mut ticket = backend.request_tiles();
        assert!(matches!(ticket.poll(), Readback::Ready(_)));
        assert_eq!(control.count_readback_requests(), 1);
    }

    #[test]
    fn test_ready_after_counts_frames() {
        let (mut backend, control) = MockBackend::new();
        let pool = pool_of(1);
        backend
            .configure(&TileLayout::new(1, pool.surface()))
            .unwrap();
        control.script_readback(ReadbackScript::ReadyAfter(2));

        let mut ticket = backend.request_tiles();
        assert!(matches!(ticket.poll(), Readback::Pending));

        backend.render_frame(&pool).unwrap();
        assert!(matches!(ticket.poll(), Readback::Pending));

        backend.render_frame(&pool).unwrap();
        assert!(matches!(ticket.poll(), Readback::Ready(_)));
    }

    #[test]
    fn test_scripted_failure() {
        let (mut backend, control) = MockBackend::new();
        let pool = pool_of(1);
        backend
            .configure(&TileLayout::new(1, pool.surface()))
            .unwrap();
        control.script_readback(ReadbackScript::Fail(ReadbackError::Incomplete));

        let mut ticket = backend.request_tiles();
        assert!(matches!(
            ticket.poll(),
            Readback::Failed(ReadbackError::Incomplete)
        ));
    }

    #[test]
    fn test_frame_snapshots_capture_views() {
        let (mut backend, control) = MockBackend::new();
        let mut pool = pool_of(2);
        backend
            .configure(&TileLayout::new(2, pool.surface()))
            .unwrap();

        let view = ViewPoint::looking(Vec3::new(5.0, 0.0, 0.0), Vec3::Z);
        pool.prepare(0, &view);
        backend.render_frame(&pool).unwrap();
        pool.reset_all();
        backend.render_frame(&pool).unwrap();

        let snapshots = control.frame_snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].len(), 1);
        assert_eq!(snapshots[0][0].0, 0);
        assert_eq!(snapshots[0][0].1.position, view.position);
        assert!(snapshots[1].is_empty());
    }
}
