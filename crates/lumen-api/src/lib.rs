use axum::{
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use lumen_core::AppState;
use serde_json::json;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod middleware;
pub mod routes;

pub fn build_router() -> Router<AppState> {
    let cors = build_cors_layer();
    Router::new()
        .route("/health", get(health))
        // Auth
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/logout-all", post(routes::auth::logout_all))
        // Users
        .route(
            "/api/users/me",
            get(routes::users::get_me).patch(routes::users::update_me),
        )
        .route("/api/users/blocked", get(routes::users::list_blocked))
        .route("/api/users/{user_id}/block", post(routes::users::block_user))
        .route("/api/users/{user_id}/unblock", post(routes::users::unblock_user))
        // Direct messages
        .route("/api/messages/send", post(routes::messages::send_message))
        .route(
            "/api/messages/conversations",
            get(routes::messages::list_conversations),
        )
        .route("/api/messages/requests", get(routes::messages::list_requests))
        .route(
            "/api/messages/requests/{request_id}/respond",
            post(routes::messages::respond_to_request),
        )
        .route("/api/messages/{user_id}", get(routes::messages::get_thread))
        .route("/api/messages/{user_id}/read", put(routes::messages::mark_read))
        // Streams
        .route("/api/streams", post(routes::streams::create_stream))
        .route("/api/streams/{stream_id}", get(routes::streams::get_stream))
        .route("/api/streams/{stream_id}/end", post(routes::streams::end_stream))
        // Points and gifts
        .route("/api/points/balance", get(routes::gifts::get_balance))
        .route(
            "/api/points/transactions",
            get(routes::gifts::get_transactions),
        )
        .route("/api/gifts", get(routes::gifts::list_gifts))
        .route("/api/gifts/send", post(routes::gifts::send_gift))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer() -> tower_http::cors::CorsLayer {
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "lumen" })),
    )
}
