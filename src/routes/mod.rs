use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{state::AppState, subscription::ActiveSubscriber};

pub mod auth;
pub mod documents;
pub mod grievances;
pub mod health;
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

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
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

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/profile", get(auth::profile));

    let grievances_routes = Router::new()
        .route(
            "/",
            post(grievances::create_grievance).get(grievances::list_grievances),
        )
        .route("/statistics", get(grievances::statistics))
        .route("/:id", get(grievances::get_grievance))
        .route("/:id/step", patch(grievances::update_step))
        .route("/:id/notes", post(grievances::add_note));

    let documents_routes = Router::new().route(
        "/:id",
        post(documents::upload_document)
            .get(documents::list_documents)
            .delete(documents::delete_document),
    );

    let users_routes = Router::new()
        .route("/stewards", get(users::list_stewards))
        .route(
            "/me/preferences",
            get(users::get_preferences).put(users::update_preferences),
        );

    let max_body = state.config.max_upload_bytes + 1024 * 1024;

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/grievances", grievances_routes)
        .nest("/api/documents", documents_routes)
        .nest("/api/users", users_routes)
        .layer(middleware::from_extractor_with_state::<ActiveSubscriber, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(max_body))
}
