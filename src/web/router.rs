//! Web application router and middleware setup.

use super::{auth, handlers, AppState};
use crate::web::config::WebConfig;
use axum::{
    middleware,
    routing::{get, get_service},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Create the axum application with all routes and middleware.
///
/// Everything except `/api/health` sits behind the auth middleware.
pub fn create_app(config: &WebConfig, mut state: AppState) -> Router {
    let mut app = Router::new()
        .route("/status/:relay", get(handlers::relay_status))
        .route("/on/:relay", get(handlers::relay_on))
        .route("/off/:relay", get(handlers::relay_off))
        .route("/toggle/:relay", get(handlers::relay_toggle))
        .route("/reboot/:relay", get(handlers::relay_reboot))
        .route("/all_on/", get(handlers::all_on))
        .route("/all_off/", get(handlers::all_off))
        .route("/api/channels", get(handlers::list_channels))
        .route("/", get(handlers::index));

    match config.static_dir() {
        Some(static_dir) => {
            info!("Serving static files from: {:?}", static_dir);
            app = app.nest_service("/static", get_service(ServeDir::new(static_dir)));
            state.index_file = config.dashboard_page();
        }
        None => {
            if let Some(static_path) = &config.static_path {
                warn!(
                    "Static path {:?} does not exist, serving default index",
                    static_path
                );
            }
        }
    }

    let mut app = app
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_basic_auth,
        ))
        .route("/api/health", get(handlers::health_check))
        .with_state(state);

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
