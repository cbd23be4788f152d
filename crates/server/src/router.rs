use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::middleware::admission_layer;
use crate::routes;
use crate::state::SharedState;

/// Build the router. Only the greeting routes sit behind admission control;
/// health and metrics are always reachable.
pub fn build_router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/", get(routes::greeting))
        .route("/user", get(routes::user_greeting))
        .route_layer(from_fn_with_state(state.clone(), admission_layer));

    Router::new()
        .route("/health", get(routes::health_check))
        .route("/metrics", get(routes::get_metrics))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
