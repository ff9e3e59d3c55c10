/// axum routes for pull queries, the SSE stream and health
pub mod http;

pub use http::{build_router, serve, serve_listener, AppState};
