//! Static file router over a generation directory.

use crate::store::NEXT_FILE;
use crate::web::config::ServerConfig;
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use percent_encoding::percent_decode_str;
use std::path::Path;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

/// Build the router serving `root` as static files.
///
/// `ServeDir` maps `/<source>/current.json` onto the tree, answers 404 for
/// missing files and `..` segments, and 405 for methods other than GET/HEAD.
pub fn create_app(root: &Path, config: &ServerConfig) -> Router {
    let files = ServeDir::new(root).append_index_html_on_directories(false);

    let mut app = Router::new()
        .fallback_service(files)
        .layer(middleware::from_fn(hide_transient_files));

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Half-written `next.json` files are never served.
///
/// The path is checked after percent-decoding, as `ServeDir` decodes it
/// before touching the filesystem.
async fn hide_transient_files(request: Request, next: Next) -> Response {
    if names_transient_file(request.uri().path()) {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}

fn names_transient_file(path: &str) -> bool {
    percent_decode_str(path)
        .decode_utf8_lossy()
        .split(['/', '\\'])
        .any(|segment| segment == NEXT_FILE)
}
