pub fn init() {
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,wgpu_core=warn,wgpu_hal=warn,naga=warn".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
