//! Request handlers and the route table.
//!
//! Handlers stay thin: parse the wire model, call into the pipeline, shape
//! the response. The router has already taken the control gate by the time
//! any of these run.

use std::sync::atomic::Ordering;

use image::{ExtendedColorType, ImageEncoder, codecs::png::PngEncoder};

use vantage_core::geometry::{WorldLayers, world_bounding_box};
use vantage_render::{SurfaceSpec, TileImage};

use crate::{
    ServerContext, http,
    route::{HandlerError, Method, PathPattern, Request, Response, Route},
    wire::{
        BboxResponse, CameraParameter, RenderSceneRequest, ServerInfoResponse,
        UpdateConfigRequest, UpdateNodesRequest,
    },
};

/// The full route table, in match order.
pub fn routes() -> Vec<Route> {
    vec![
        Route::new(Method::Get, PathPattern::Exact("/world/bbox"), world_bbox),
        Route::new(Method::Post, PathPattern::Exact("/world/render"), world_render),
        Route::new(
            Method::Post,
            PathPattern::Exact("/world/renderpng"),
            world_render_png,
        ),
        Route::new(Method::Post, PathPattern::Exact("/world/node"), world_node_update),
        Route::new(
            Method::Post,
            PathPattern::Exact("/world/node/reset"),
            world_node_reset,
        ),
        Route::new(Method::Post, PathPattern::Exact("/config"), update_config),
        Route::new(Method::Get, PathPattern::Exact("/info"), server_info),
        Route::new(
            Method::Post,
            PathPattern::Exact("/server/shutdown"),
            server_shutdown,
        ),
    ]
}

// ============================================================================
// World
// ============================================================================

/// `GET /world/bbox`: bounding box of all physical world geometry.
fn world_bbox(ctx: &ServerContext, _request: &Request) -> Result<Response, HandlerError> {
    let colliders = ctx.world.colliders();
    let bounds = world_bounding_box(&colliders, WorldLayers::physical());
    tracing::debug!(colliders = colliders.len(), "bounding box queried");
    Response::json(&BboxResponse::from_bounds(&bounds))
}

/// `POST /world/render`: render every requested viewpoint and return the
/// composed tile images as one multipart body, one part per batch.
fn world_render(ctx: &ServerContext, request: &Request) -> Result<Response, HandlerError> {
    let tiles = render_views(ctx, request)?;
    let (content_type, body) = http::multipart_tiles(&tiles);
    Ok(Response::with_content_type(content_type, body))
}

/// `POST /world/renderpng`: like render, but encodes only the first batch as
/// an actual PNG. No viewpoints means nothing to encode, so 204.
fn world_render_png(ctx: &ServerContext, request: &Request) -> Result<Response, HandlerError> {
    let tiles = render_views(ctx, request)?;
    let Some(first) = tiles.first() else {
        return Ok(Response::no_content());
    };
    Ok(Response::png(encode_png(first)?))
}

fn render_views(ctx: &ServerContext, request: &Request) -> Result<Vec<TileImage>, HandlerError> {
    let body: RenderSceneRequest = serde_json::from_slice(&request.body)?;
    let views = body
        .camera_parameters
        .iter()
        .map(CameraParameter::to_view)
        .collect::<Vec<_>>();
    tracing::info!(views = views.len(), "render requested");
    let tiles = ctx.renderer.render(views).collect_tiles()?;
    Ok(tiles)
}

fn encode_png(image: &TileImage) -> Result<Vec<u8>, HandlerError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(
        image.pixels(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

// ============================================================================
// Nodes
// ============================================================================

/// `POST /world/node`: merge a batch of search-tree node updates.
fn world_node_update(ctx: &ServerContext, request: &Request) -> Result<Response, HandlerError> {
    let body: UpdateNodesRequest = serde_json::from_slice(&request.body)?;
    let updates = body
        .nodes
        .into_iter()
        .map(|node| node.into_update())
        .collect::<Vec<_>>();
    tracing::debug!(nodes = updates.len(), "node update received");
    ctx.nodes.update_nodes(updates);
    Ok(Response::ok_empty())
}

/// `POST /world/node/reset`: drop all node state. The body is ignored.
fn world_node_reset(ctx: &ServerContext, _request: &Request) -> Result<Response, HandlerError> {
    ctx.nodes.reset_nodes();
    Ok(Response::ok_empty())
}

// ============================================================================
// Control
// ============================================================================

/// `POST /config`: resize the render surfaces.
fn update_config(ctx: &ServerContext, request: &Request) -> Result<Response, HandlerError> {
    let body: UpdateConfigRequest = serde_json::from_slice(&request.body)?;
    let size = body.renderer_config.texture_size;
    if size <= 0 {
        return Err(HandlerError::new(format!("invalid texture size: {}", size)));
    }
    tracing::info!(texture_size = size, "reconfigure requested");
    ctx.renderer.reconfigure(SurfaceSpec::square(size as u32))?;
    Ok(Response::ok_empty())
}

/// `GET /info`: version and platform of the running server.
fn server_info(_ctx: &ServerContext, _request: &Request) -> Result<Response, HandlerError> {
    Response::json(&ServerInfoResponse::current())
}

/// `POST /server/shutdown`: ask the accept loop to stop. The response still
/// goes out on this connection before the listener winds down.
fn server_shutdown(ctx: &ServerContext, _request: &Request) -> Result<Response, HandlerError> {
    tracing::info!("shutdown requested");
    ctx.shutdown.store(true, Ordering::Release);
    Ok(Response::ok_empty())
}
