//! End-to-end tests for the control plane: route dispatch against a live
//! render service, the gate policy around it, and one round trip over a
//! real socket.

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread,
    time::Duration,
};

use glam::Vec3;

use vantage_core::geometry::{Aabb, Collider, WorldLayers};
use vantage_render::{
    PoolConfig, RenderConfig, RenderService, SoftwareBackend, SurfaceSpec, software::view_color,
};
use vantage_server::{
    ServerContext, handlers,
    host::{NodeStore, StaticWorld},
    http,
    route::{Method, Request, Response, Router},
    wire::{CameraParameter, RenderSceneRequest, Vector3Wire},
};
use vantage_test_utils::MockBackend;

// ============================================================================
// Helpers
// ============================================================================

fn software_service(units: usize, cell: u32) -> RenderService {
    let config = RenderConfig {
        pool: PoolConfig {
            units,
            surface: SurfaceSpec::square(cell),
            field_of_view: 60.0,
        },
        frame_rate: 0,
    };
    RenderService::spawn(config, Box::new(SoftwareBackend::new()))
        .expect("software backend always spawns")
}

fn context_with(
    renderer: RenderService,
    world: StaticWorld,
    nodes: Arc<NodeStore>,
) -> Arc<ServerContext> {
    Arc::new(ServerContext::new(
        renderer,
        Arc::new(world),
        nodes,
        Duration::from_millis(500),
    ))
}

fn test_context(units: usize, cell: u32) -> Arc<ServerContext> {
    context_with(
        software_service(units, cell),
        StaticWorld::empty(),
        Arc::new(NodeStore::new()),
    )
}

fn dispatch(ctx: &ServerContext, method: Method, path: &str, body: &str) -> Response {
    let router = Router::new(handlers::routes());
    router.dispatch(ctx, &Request::new(method, path).with_body(body.as_bytes()))
}

/// JSON render request looking at `count` distinct positions.
fn render_body(count: usize) -> String {
    let request = RenderSceneRequest {
        camera_parameters: (0..count)
            .map(|i| CameraParameter {
                position: Vector3Wire {
                    x: i as f32,
                    y: 0.0,
                    z: 0.0,
                },
                ..Default::default()
            })
            .collect(),
    };
    serde_json::to_string(&request).expect("request serializes")
}

fn boundary_of(response: &Response) -> String {
    response
        .content_type
        .as_deref()
        .and_then(|ct| ct.strip_prefix("multipart/form-data;boundary=\""))
        .and_then(|rest| rest.strip_suffix('"'))
        .expect("multipart content type with quoted boundary")
        .to_string()
}

// ============================================================================
// World routes
// ============================================================================

#[test]
fn test_bbox_reports_physical_bounds_as_strings() {
    let world = StaticWorld::new(vec![
        Collider::new(
            Aabb::new(Vec3::new(-4.0, 0.0, -2.0), Vec3::new(-1.0, 1.0, 2.0)),
            WorldLayers::DEFAULT,
        ),
        Collider::new(
            Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0)),
            WorldLayers::VENUE_LAYER_1,
        ),
        // Avatar geometry must not count.
        Collider::new(
            Aabb::new(Vec3::splat(50.0), Vec3::splat(60.0)),
            WorldLayers::OWN_AVATAR,
        ),
    ]);
    let ctx = context_with(software_service(1, 1), world, Arc::new(NodeStore::new()));

    let response = dispatch(&ctx, Method::Get, "/world/bbox", "");
    assert_eq!(response.status, 200);
    let json: serde_json::Value = serde_json::from_slice(&response.body).expect("json body");
    assert_eq!(json["bbox"]["min"]["x"], "-4");
    assert_eq!(json["bbox"]["min"]["y"], "0");
    assert_eq!(json["bbox"]["min"]["z"], "-2");
    assert_eq!(json["bbox"]["max"]["x"], "3");
    assert_eq!(json["bbox"]["max"]["y"], "3");
    assert_eq!(json["bbox"]["max"]["z"], "3");
}

#[test]
fn test_render_returns_one_part_per_batch() {
    let ctx = test_context(4, 1);
    let response = dispatch(&ctx, Method::Post, "/world/render", &render_body(10));
    assert_eq!(response.status, 200);

    let boundary = boundary_of(&response);
    let text = String::from_utf8_lossy(&response.body);
    // ceil(10 / 4) batches, one part each.
    assert_eq!(text.matches(&format!("--{}\r\n", boundary)).count(), 3);
    assert!(text.contains("name=\"renderTexture0\"; filename=\"renderTexture0.png\""));
    assert!(text.contains("name=\"renderTexture2\"; filename=\"renderTexture2.png\""));
    assert!(text.ends_with(&format!("--{}--\r\n", boundary)));
}

#[test]
fn test_render_part_carries_the_composed_texels() {
    let ctx = test_context(1, 1);
    let response = dispatch(&ctx, Method::Post, "/world/render", &render_body(1));
    assert_eq!(response.status, 200);

    let expected = view_color(
        &CameraParameter {
            position: Vector3Wire {
                x: 0.0,
                y: 0.0,
                z: 0.0,
            },
            ..Default::default()
        }
        .to_view(),
    );
    assert!(
        response.body.windows(3).any(|texel| texel == expected),
        "multipart body should contain the rendered texel"
    );
}

#[test]
fn test_render_with_no_views_has_zero_parts() {
    let ctx = test_context(4, 1);
    let response = dispatch(&ctx, Method::Post, "/world/render", r#"{"cameraParameters":[]}"#);
    assert_eq!(response.status, 200);

    let boundary = boundary_of(&response);
    assert_eq!(
        String::from_utf8(response.body).expect("utf8"),
        format!("--{}--\r\n", boundary)
    );
}

#[test]
fn test_render_png_with_no_views_is_204() {
    let ctx = test_context(4, 1);
    let response = dispatch(
        &ctx,
        Method::Post,
        "/world/renderpng",
        r#"{"cameraParameters":[]}"#,
    );
    assert_eq!(response.status, 204);
    assert!(response.body.is_empty());
}

#[test]
fn test_render_png_dimensions_follow_the_configured_size() {
    let ctx = test_context(4, 2);
    let response = dispatch(&ctx, Method::Post, "/world/renderpng", &render_body(1));
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type.as_deref(), Some("image/png"));
    let image = image::load_from_memory(&response.body).expect("valid png");
    assert_eq!((image.width(), image.height()), (4, 4));

    let config = dispatch(
        &ctx,
        Method::Post,
        "/config",
        r#"{"rendererConfig":{"textureSize":3}}"#,
    );
    assert_eq!(config.status, 200);
    let response = dispatch(&ctx, Method::Post, "/world/renderpng", &render_body(1));
    let image = image::load_from_memory(&response.body).expect("valid png");
    assert_eq!((image.width(), image.height()), (6, 6));
}

#[test]
fn test_node_update_and_reset_round_trip() {
    let store = Arc::new(NodeStore::new());
    let ctx = context_with(software_service(1, 1), StaticWorld::empty(), store.clone());

    let body = r#"{
        "nodes": [{
            "id": "n-1",
            "branchId": "b-0",
            "parentId": "",
            "depth": 1,
            "min": {"x": -1.0, "y": 0.0, "z": -1.0},
            "max": {"x": 1.0, "y": 2.0, "z": 1.0},
            "score": 0.5,
            "photoScorings": []
        }]
    }"#;
    let response = dispatch(&ctx, Method::Post, "/world/node", body);
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
    assert!(store.contains("n-1"));
    assert_eq!(store.get("n-1").expect("stored").bounds.max.y, 2.0);

    let response = dispatch(&ctx, Method::Post, "/world/node/reset", "");
    assert_eq!(response.status, 200);
    assert!(store.is_empty());
}

// ============================================================================
// Control routes
// ============================================================================

#[test]
fn test_info_reports_version_and_platform() {
    let ctx = test_context(1, 1);
    let response = dispatch(&ctx, Method::Get, "/info", "");
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type.as_deref(), Some("application/json"));

    let json: serde_json::Value = serde_json::from_slice(&response.body).expect("json body");
    assert_eq!(json["version"], "1.1.0.0");
    assert_eq!(json["versionInfo"]["majorVersion"], 1);
    assert_eq!(json["versionInfo"]["revisionNumber"], 0);
    assert!(json["platform"].is_string());
}

#[test]
fn test_config_leaves_info_unchanged() {
    let ctx = test_context(4, 2);
    let before = dispatch(&ctx, Method::Get, "/info", "");
    let config = dispatch(
        &ctx,
        Method::Post,
        "/config",
        r#"{"rendererConfig":{"textureSize":8}}"#,
    );
    assert_eq!(config.status, 200);
    let after = dispatch(&ctx, Method::Get, "/info", "");
    assert_eq!(before, after);
}

#[test]
fn test_config_rejects_a_nonpositive_size() {
    let ctx = test_context(1, 1);
    let response = dispatch(
        &ctx,
        Method::Post,
        "/config",
        r#"{"rendererConfig":{"textureSize":0}}"#,
    );
    assert_eq!(response.status, 500);
    assert!(String::from_utf8_lossy(&response.body).contains("invalid texture size"));
}

#[test]
fn test_shutdown_sets_the_flag() {
    let ctx = test_context(1, 1);
    assert!(!ctx.shutdown_requested());
    let response = dispatch(&ctx, Method::Post, "/server/shutdown", "");
    assert_eq!(response.status, 200);
    assert!(ctx.shutdown_requested());
}

// ============================================================================
// Dispatch policy
// ============================================================================

#[test]
fn test_unmatched_requests_get_404() {
    let ctx = test_context(1, 1);
    let response = dispatch(&ctx, Method::Get, "/nope", "");
    assert_eq!(response.status, 404);
    assert!(String::from_utf8_lossy(&response.body).contains("no route"));

    // Right path, wrong method.
    let response = dispatch(&ctx, Method::Get, "/world/render", "");
    assert_eq!(response.status, 404);
}

#[test]
fn test_gate_timeout_surfaces_as_500_with_its_own_message() {
    let ctx = Arc::new(ServerContext::new(
        software_service(1, 1),
        Arc::new(StaticWorld::empty()),
        Arc::new(NodeStore::new()),
        Duration::from_millis(20),
    ));
    let permit = ctx.gate.acquire().expect("gate starts free");

    let blocked = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || dispatch(&ctx, Method::Get, "/info", ""))
    };
    let response = blocked.join().expect("no panic");
    assert_eq!(response.status, 500);
    assert_eq!(
        String::from_utf8_lossy(&response.body),
        "unable to acquire control gate in 20 ms"
    );

    drop(permit);
    assert_eq!(dispatch(&ctx, Method::Get, "/info", "").status, 200);
}

#[test]
fn test_gate_is_released_after_a_handler_failure() {
    let ctx = test_context(1, 1);
    let response = dispatch(&ctx, Method::Post, "/world/render", "not json");
    assert_eq!(response.status, 500);
    assert!(String::from_utf8_lossy(&response.body).starts_with("invalid request body"));

    let response = dispatch(&ctx, Method::Get, "/info", "");
    assert_eq!(response.status, 200);
}

#[test]
fn test_concurrent_renders_do_not_interleave() {
    let (backend, control) = MockBackend::new();
    let config = RenderConfig {
        pool: PoolConfig {
            units: 1,
            surface: SurfaceSpec::square(1),
            field_of_view: 60.0,
        },
        frame_rate: 0,
    };
    let renderer = RenderService::spawn(config, Box::new(backend)).expect("mock spawns");
    let ctx = context_with(renderer, StaticWorld::empty(), Arc::new(NodeStore::new()));

    let workers: Vec<_> = (0..4)
        .map(|owner| {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                let request = RenderSceneRequest {
                    camera_parameters: (0..3)
                        .map(|i| CameraParameter {
                            position: Vector3Wire {
                                x: (owner * 100 + i) as f32,
                                y: 0.0,
                                z: 0.0,
                            },
                            ..Default::default()
                        })
                        .collect(),
                };
                let body = serde_json::to_string(&request).expect("request serializes");
                dispatch(&ctx, Method::Post, "/world/render", &body)
            })
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().expect("no panic").status, 200);
    }

    // Every batch paints a view whose x encodes the submitting request.
    let owners: Vec<i32> = control
        .frame_snapshots()
        .iter()
        .filter(|frame| !frame.is_empty())
        .map(|frame| frame[0].1.position.x as i32 / 100)
        .collect();
    assert_eq!(owners.len(), 12);
    let mut grouped = owners.clone();
    grouped.dedup();
    assert_eq!(
        grouped.len(),
        4,
        "batches from different requests interleaved: {:?}",
        owners
    );
}

// ============================================================================
// End to end
// ============================================================================

fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.write_all(request.as_bytes()).expect("send");
    let mut response = String::new();
    stream.read_to_string(&mut response).expect("receive");
    response
}

#[test]
fn test_serve_round_trip_over_tcp() {
    let ctx = test_context(1, 1);
    let router = Arc::new(Router::new(handlers::routes()));
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind an ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let server = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || http::serve(listener, ctx, router))
    };

    let response = raw_request(addr, "GET /info HTTP/1.1\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK"), "got: {response}");
    assert!(response.contains("Connection: close"));
    assert!(response.contains("1.1.0.0"));

    let response = raw_request(addr, "POST /server/shutdown HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK"), "got: {response}");

    // The shutdown route stops the accept loop.
    server
        .join()
        .expect("serve thread")
        .expect("serve exits cleanly");
}
