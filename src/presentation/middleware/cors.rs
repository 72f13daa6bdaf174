//! CORS Middleware Configuration

use tower_http::cors::{Any, CorsLayer};

/// Create the CORS layer.
///
/// The service sits behind the platform's edge proxy, which enforces the
/// real origin policy; the layer here stays permissive.
pub fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
