//! Frame batch scheduling.
//!
//! A render run partitions its view requests into pool-sized batches and
//! walks them through a small per-batch state machine, one step per frame
//! tick:
//!
//! 1. **Arm**: assign the batch's views to units so the next frame draws
//!    them. This is the batch's single frame-boundary wait.
//! 2. **Capture**: the frame has been drawn; start an async readback of the
//!    composed tiles, then reset the units. Resetting happens strictly
//!    after the readback request so the snapshot still carries this batch's
//!    views.
//! 3. **Drain**: poll the readback once per tick. On success the image is
//!    emitted and the next batch arms in the same step; on failure the run
//!    aborts and the remaining batches are dropped.
//!
//! Runs are fail-fast: a failed readback emits `ReadbackFailed` for that
//! batch and nothing after it.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc::Sender,
    },
};

use vantage_core::view::ViewPoint;

use crate::{
    backend::{BackendError, RenderBackend},
    readback::{Readback, ReadbackError, ReadbackTicket},
    tile::TileImage,
    unit::UnitPool,
};

#[derive(Debug)]
pub enum RenderError {
    /// The async readback for a batch reported failure; the run was
    /// aborted at that batch.
    ReadbackFailed {
        batch: usize,
        source: ReadbackError,
    },
    /// The backend failed while drawing or reconfiguring.
    Backend(BackendError),
    /// The frame loop stopped before the run completed.
    LoopStopped,
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::ReadbackFailed { batch, source } => {
                write!(f, "readback failed for batch {}: {}", batch, source)
            }
            RenderError::Backend(source) => write!(f, "backend error: {}", source),
            RenderError::LoopStopped => write!(f, "render loop stopped before the run completed"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ReadbackFailed { source, .. } => Some(source),
            RenderError::Backend(source) => Some(source),
            RenderError::LoopStopped => None,
        }
    }
}

impl From<BackendError> for RenderError {
    fn from(err: BackendError) -> Self {
        RenderError::Backend(err)
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Counters shared between a run and its caller.
#[derive(Debug, Default)]
pub struct RunStats {
    frame_waits: AtomicUsize,
    batches_emitted: AtomicUsize,
}

impl RunStats {
    /// Frame-boundary waits the run has performed so far. Exactly one per
    /// batch, so a completed run reports `ceil(requests / pool_size)`.
    pub fn frame_waits(&self) -> usize {
        self.frame_waits.load(Ordering::Acquire)
    }

    pub fn batches_emitted(&self) -> usize {
        self.batches_emitted.load(Ordering::Acquire)
    }

    fn note_frame_wait(&self) {
        self.frame_waits.fetch_add(1, Ordering::AcqRel);
    }

    fn note_batch_emitted(&self) {
        self.batches_emitted.fetch_add(1, Ordering::AcqRel);
    }
}

/// Split views into pool-sized batches, preserving order. The last batch
/// may be shorter.
pub fn partition(views: &[ViewPoint], pool_size: usize) -> VecDeque<Vec<ViewPoint>> {
    assert!(pool_size > 0, "pool size must be positive");
    views.chunks(pool_size).map(<[ViewPoint]>::to_vec).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchPhase {
    Arm,
    Capture,
    Drain,
}

/// What a scheduler step left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    /// The run still has work; keep ticking.
    Working,
    /// The run emitted its last result or aborted.
    Finished,
}

/// One in-flight render run owned by the frame loop.
pub(crate) struct ActiveRun {
    batches: VecDeque<Vec<ViewPoint>>,
    batch_index: usize,
    phase: BatchPhase,
    ticket: Option<ReadbackTicket>,
    tx: Sender<RenderResult<TileImage>>,
    stats: Arc<RunStats>,
}

impl ActiveRun {
    /// Build a run from a non-empty view list. Empty lists never reach the
    /// frame loop; the driver completes them without consuming a frame.
    pub(crate) fn new(
        views: &[ViewPoint],
        pool_size: usize,
        tx: Sender<RenderResult<TileImage>>,
        stats: Arc<RunStats>,
    ) -> Self {
        let batches = partition(views, pool_size);
        debug_assert!(!batches.is_empty());
        ActiveRun {
            batches,
            batch_index: 0,
            phase: BatchPhase::Arm,
            ticket: None,
            tx,
            stats,
        }
    }

    /// Advance by exactly one unit of scheduler work. Called once per frame
    /// tick, before the frame is drawn.
    pub(crate) fn advance(
        &mut self,
        pool: &mut UnitPool,
        backend: &mut dyn RenderBackend,
    ) -> StepOutcome {
        match self.phase {
            BatchPhase::Arm => {
                self.arm_front(pool);
                StepOutcome::Working
            }
            BatchPhase::Capture => {
                self.ticket = Some(backend.request_tiles());
                // Reset strictly after the readback request so the snapshot
                // still carries this batch's views.
                pool.reset_all();
                self.stats.note_frame_wait();
                self.phase = BatchPhase::Drain;
                StepOutcome::Working
            }
            BatchPhase::Drain => {
                let readback = match self.ticket.as_mut() {
                    Some(ticket) => ticket.poll(),
                    None => Readback::Failed(ReadbackError::Disconnected),
                };
                match readback {
                    Readback::Pending => StepOutcome::Working,
                    Readback::Ready(image) => {
                        self.ticket = None;
                        self.batches.pop_front();
                        self.stats.note_batch_emitted();
                        let _ = self.tx.send(Ok(image));
                        self.batch_index += 1;
                        if self.batches.is_empty() {
                            StepOutcome::Finished
                        } else {
                            self.arm_front(pool);
                            StepOutcome::Working
                        }
                    }
                    Readback::Failed(source) => {
                        self.ticket = None;
                        tracing::warn!(
                            batch = self.batch_index,
                            error = %source,
                            "readback failed, aborting run"
                        );
                        let _ = self.tx.send(Err(RenderError::ReadbackFailed {
                            batch: self.batch_index,
                            source,
                        }));
                        StepOutcome::Finished
                    }
                }
            }
        }
    }

    /// Fail the run and drop everything still queued.
    pub(crate) fn abort(self, error: RenderError) {
        let _ = self.tx.send(Err(error));
    }

    fn arm_front(&mut self, pool: &mut UnitPool) {
        if let Some(batch) = self.batches.front() {
            pool.prepare_batch(batch);
        }
        self.phase = BatchPhase::Capture;
    }
}
