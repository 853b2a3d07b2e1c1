//! The frame loop and its service handle.
//!
//! All rendering happens on one dedicated thread that ticks at the target
//! frame rate. Each tick drains control commands, advances the active run
//! by one scheduler step, and draws a frame. [`RenderService`] is the
//! thread-safe handle: submitting views returns a [`RenderRun`] whose
//! results stream out as batches complete.
//!
//! Runs are served strictly in submission order. Reconfiguration is a
//! command like any other and is acknowledged once applied; callers that
//! interleave runs and reconfiguration serialize themselves (the control
//! gate in the server does exactly that).

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender, TryRecvError},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use vantage_core::view::ViewPoint;

use crate::{
    backend::RenderBackend,
    sched::{ActiveRun, RenderError, RenderResult, RunStats, StepOutcome},
    tile::{TileImage, TileLayout},
    unit::{PoolConfig, SurfaceSpec, UnitPool},
};

/// Frame loop configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    pub pool: PoolConfig,
    /// Target frames per second. Zero runs the loop unpaced, which tests
    /// use to finish runs as fast as the machine allows.
    pub frame_rate: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            pool: PoolConfig::default(),
            frame_rate: 90,
        }
    }
}

impl RenderConfig {
    fn frame_interval(&self) -> Option<Duration> {
        (self.frame_rate > 0).then(|| Duration::from_secs(1) / self.frame_rate)
    }
}

enum LoopCommand {
    Submit(ActiveRun),
    Configure {
        surface: SurfaceSpec,
        ack: Sender<RenderResult<()>>,
    },
}

/// Handle to the frame loop thread.
///
/// Cloneless by design: the server holds one behind an `Arc` and every
/// request thread calls through `&self`. Dropping the handle stops the
/// loop.
pub struct RenderService {
    commands: Sender<LoopCommand>,
    running: Arc<AtomicBool>,
    pool_size: usize,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RenderService {
    /// Configure the backend for the initial layout and start the loop.
    /// Backend construction problems surface here, not on the loop thread.
    pub fn spawn(config: RenderConfig, mut backend: Box<dyn RenderBackend>) -> RenderResult<Self> {
        let pool = UnitPool::new(config.pool);
        let layout = TileLayout::new(pool.len(), pool.surface());
        backend.configure(&layout)?;

        let (commands, rx) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let pool_size = pool.len();
        let interval = config.frame_interval();
        let loop_running = running.clone();
        let thread = thread::Builder::new()
            .name("vantage-frame-loop".to_string())
            .spawn(move || frame_loop(pool, layout, backend, rx, loop_running, interval))
            .expect("failed to spawn frame loop thread");

        Ok(RenderService {
            commands,
            running,
            pool_size,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Submit a render run. Results stream out of the returned [`RenderRun`]
    /// one composed image per batch, in order. An empty view list completes
    /// immediately without consuming a frame.
    pub fn render(&self, views: Vec<ViewPoint>) -> RenderRun {
        let (tx, rx) = mpsc::channel();
        let stats = Arc::new(RunStats::default());
        let run = RenderRun {
            rx,
            stats: stats.clone(),
            expected_batches: views.len().div_ceil(self.pool_size),
            emitted: 0,
            failed: false,
        };
        if views.is_empty() {
            return run;
        }
        let active = ActiveRun::new(&views, self.pool_size, tx, stats);
        if let Err(mpsc::SendError(command)) = self.commands.send(LoopCommand::Submit(active)) {
            if let LoopCommand::Submit(active) = command {
                active.abort(RenderError::LoopStopped);
            }
        }
        run
    }

    /// Resize every unit surface. No-op if the size is unchanged; otherwise
    /// blocks until the loop has rebuilt the layout and backend surfaces.
    pub fn reconfigure(&self, surface: SurfaceSpec) -> RenderResult<()> {
        let (ack, result) = mpsc::channel();
        self.commands
            .send(LoopCommand::Configure { surface, ack })
            .map_err(|_| RenderError::LoopStopped)?;
        result.recv().map_err(|_| RenderError::LoopStopped)?
    }

    /// Stop the loop and join the thread. Safe to call more than once.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("frame loop thread panicked");
            }
        }
    }
}

impl Drop for RenderService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Streaming results of one submitted run.
///
/// Iteration blocks until the next batch resolves. The sequence is finite:
/// one `Ok` image per completed batch, then either the end of the run or a
/// single `Err` after which nothing else is emitted. A run the loop never
/// resolves (stopped with the submission still in flight) ends with
/// `Err(LoopStopped)` rather than coming up short.
pub struct RenderRun {
    rx: Receiver<RenderResult<TileImage>>,
    stats: Arc<RunStats>,
    expected_batches: usize,
    emitted: usize,
    failed: bool,
}

impl RenderRun {
    /// Frame-boundary waits performed so far; one per captured batch.
    pub fn frame_waits(&self) -> usize {
        self.stats.frame_waits()
    }

    pub fn batches_emitted(&self) -> usize {
        self.stats.batches_emitted()
    }

    /// Drain the run, failing on the first error.
    pub fn collect_tiles(self) -> RenderResult<Vec<TileImage>> {
        self.collect()
    }
}

impl Iterator for RenderRun {
    type Item = RenderResult<TileImage>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rx.recv() {
            Ok(Ok(image)) => {
                self.emitted += 1;
                Some(Ok(image))
            }
            Ok(Err(err)) => {
                self.failed = true;
                Some(Err(err))
            }
            // Disconnected with batches outstanding: the loop dropped the
            // run without resolving it.
            Err(_) if !self.failed && self.emitted < self.expected_batches => {
                self.failed = true;
                Some(Err(RenderError::LoopStopped))
            }
            Err(_) => None,
        }
    }
}

// ============================================================================
// Frame loop
// ============================================================================

fn frame_loop(
    mut pool: UnitPool,
    mut layout: TileLayout,
    mut backend: Box<dyn RenderBackend>,
    commands: Receiver<LoopCommand>,
    running: Arc<AtomicBool>,
    interval: Option<Duration>,
) {
    tracing::debug!(
        units = pool.len(),
        width = pool.surface().width,
        height = pool.surface().height,
        "frame loop started"
    );
    let mut active: Option<ActiveRun> = None;
    let mut queue: VecDeque<ActiveRun> = VecDeque::new();

    while running.load(Ordering::Acquire) {
        let frame_start = Instant::now();

        loop {
            match commands.try_recv() {
                Ok(LoopCommand::Submit(run)) => queue.push_back(run),
                Ok(LoopCommand::Configure { surface, ack }) => {
                    let result =
                        apply_configure(&mut pool, &mut layout, backend.as_mut(), surface);
                    let _ = ack.send(result);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if active.is_none() {
            active = queue.pop_front();
        }

        if let Some(run) = active.as_mut() {
            if run.advance(&mut pool, backend.as_mut()) == StepOutcome::Finished {
                active = None;
            }
        }

        if let Err(err) = backend.render_frame(&pool) {
            tracing::error!(error = %err, "frame render failed");
            if let Some(run) = active.take() {
                run.abort(RenderError::Backend(err));
            }
            pool.reset_all();
        }

        if let Some(interval) = interval {
            let elapsed = frame_start.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        } else if active.is_none() && queue.is_empty() {
            // Unpaced and idle: don't spin the core while waiting for work.
            thread::sleep(Duration::from_millis(1));
        }
    }

    if let Some(run) = active.take() {
        run.abort(RenderError::LoopStopped);
    }
    for run in queue {
        run.abort(RenderError::LoopStopped);
    }
    // Commands that raced the stop flag fail like the queue does instead of
    // vanishing with the channel.
    while let Ok(command) = commands.try_recv() {
        match command {
            LoopCommand::Submit(run) => run.abort(RenderError::LoopStopped),
            LoopCommand::Configure { ack, .. } => {
                let _ = ack.send(Err(RenderError::LoopStopped));
            }
        }
    }
    tracing::debug!("frame loop stopped");
}

fn apply_configure(
    pool: &mut UnitPool,
    layout: &mut TileLayout,
    backend: &mut dyn RenderBackend,
    surface: SurfaceSpec,
) -> RenderResult<()> {
    if !pool.configure(surface) {
        return Ok(());
    }
    *layout = TileLayout::new(pool.len(), pool.surface());
    backend.configure(layout)?;
    tracing::info!(
        width = surface.width,
        height = surface.height,
        "render surfaces reconfigured"
    );
    Ok(())
}
