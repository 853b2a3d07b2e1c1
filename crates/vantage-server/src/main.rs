use std::{net::TcpListener, process::ExitCode, sync::Arc, thread, time::Duration};

use clap::Parser;

use vantage_render::{
    GpuBackend, PoolConfig, RenderBackend, RenderConfig, RenderService, SoftwareBackend,
    SurfaceSpec,
};
use vantage_server::{
    ServerContext, handlers,
    host::{NodeStore, StaticWorld},
    http,
    route::Router,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum BackendKind {
    /// Render on the GPU, falling back to software if no adapter is found.
    Gpu,
    /// Deterministic CPU backend, no adapter required.
    Software,
}

#[derive(Debug, Parser)]
#[command(name = "vantage-server", version, about = "HTTP control plane for the vantage render pipeline")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Number of render units in the pool.
    #[arg(long, default_value_t = 36, value_parser = clap::value_parser!(u16).range(1..))]
    units: u16,

    /// Width and height of each unit surface in texels.
    #[arg(long, default_value_t = 224, value_parser = clap::value_parser!(u32).range(1..))]
    texture_size: u32,

    /// Default vertical field of view in degrees.
    #[arg(long, default_value_t = 60.0)]
    field_of_view: f32,

    /// Target frame rate; 0 runs the frame loop unpaced.
    #[arg(long, default_value_t = 90)]
    frame_rate: u32,

    /// How long a request waits for the control gate, in milliseconds.
    #[arg(long, default_value_t = 3000)]
    gate_timeout_ms: u64,

    /// Render backend.
    #[arg(long, value_enum, default_value_t = BackendKind::Gpu)]
    backend: BackendKind,
}

fn main() -> ExitCode {
    vantage_core::logging::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let backend = select_backend(args.backend);
    let config = RenderConfig {
        pool: PoolConfig {
            units: usize::from(args.units),
            surface: SurfaceSpec::square(args.texture_size),
            field_of_view: args.field_of_view,
        },
        frame_rate: args.frame_rate,
    };
    let renderer = RenderService::spawn(config, backend)?;

    let ctx = Arc::new(ServerContext::new(
        renderer,
        Arc::new(StaticWorld::demo()),
        Arc::new(NodeStore::new()),
        Duration::from_millis(args.gate_timeout_ms),
    ));
    let router = Arc::new(Router::new(handlers::routes()));

    let listener = TcpListener::bind((args.host.as_str(), args.port))?;
    let accept = {
        let ctx = Arc::clone(&ctx);
        thread::Builder::new()
            .name("vantage-accept".to_string())
            .spawn(move || http::serve(listener, ctx, router))
            .expect("failed to spawn accept thread")
    };
    match accept.join() {
        Ok(result) => result?,
        Err(_) => return Err("accept loop panicked".into()),
    }

    ctx.renderer.shutdown();
    Ok(())
}

fn select_backend(kind: BackendKind) -> Box<dyn RenderBackend> {
    match kind {
        BackendKind::Software => Box::new(SoftwareBackend::new()),
        BackendKind::Gpu => match GpuBackend::new() {
            Ok(gpu) => Box::new(gpu),
            Err(err) => {
                tracing::warn!(error = %err, "no usable gpu, falling back to the software backend");
                Box::new(SoftwareBackend::new())
            }
        },
    }
}
