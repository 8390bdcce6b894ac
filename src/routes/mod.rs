use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod backup;
pub mod clients;
pub mod codes;
pub mod documents;
pub mod health;
pub mod logs;
pub mod users;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    // /me guards itself through its AuthenticatedUser argument.
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/me", get(auth::me));

    let documents_routes = Router::new()
        .route(
            "/",
            get(documents::list_documents).post(documents::create_document),
        )
        .route(
            "/:id",
            get(documents::get_document)
                .patch(documents::update_document)
                .delete(documents::delete_document),
        )
        .route("/:id/file", get(documents::download_document))
        .route("/:id/share", post(documents::share_document));

    let clients_routes = Router::new()
        .route("/", get(clients::list_clients).post(clients::create_client))
        .route("/:id", axum::routing::patch(clients::update_client))
        .route("/:id/credentials", post(clients::set_credentials))
        .route("/:id/warning-days", post(clients::set_warning_days))
        .route("/:id/sync", post(clients::trigger_sync))
        .route("/:id/sync/start", post(clients::start_sync_timer))
        .route("/:id/sync/stop", post(clients::stop_sync_timer));

    let codes_routes = Router::new()
        .route("/", get(codes::list_codes).post(codes::create_code))
        .route("/:id", axum::routing::patch(codes::update_code));

    let backup_routes = Router::new()
        .route("/", get(backup::export_backup))
        .route("/restore", post(backup::restore_backup));

    let share_routes = Router::new().route(
        "/share/:payload/:expires/:signature",
        get(documents::download_shared),
    );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/documents", documents_routes)
        .nest("/api/clients", clients_routes)
        .route("/api/users", post(users::create_user))
        .nest("/api/codes", codes_routes)
        .route("/api/logs", get(logs::list_logs))
        .nest("/api/backup", backup_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(share_routes)
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
