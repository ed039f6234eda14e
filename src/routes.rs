use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware_layer, state::AppState};

/// Assembles the application router.
///
/// `/login`, `/logout` and `/health` are open; every other path falls
/// through to the reverse-proxy handler behind the auth and CSRF middleware.
pub fn app(state: AppState) -> Router {
    let open_routes = Router::new()
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/health", get(handlers::auth::health))
        .with_state(state.clone());

    // `layer` (not `route_layer`) so the middleware wraps the fallback too;
    // require_auth is added last, making it the outer layer that attaches the
    // session extension verify_csrf relies on.
    let proxied_routes = Router::new()
        .fallback(handlers::proxy::proxy)
        .layer(from_fn(middleware_layer::csrf::verify_csrf))
        .layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state);

    open_routes
        .merge(proxied_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CookieManagerLayer::new())
}
