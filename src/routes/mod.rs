pub mod catalog;
pub mod films;
pub mod users;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application router; shared by `main` and the HTTP tests.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(users::router())
        .merge(films::router())
        .merge(catalog::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
