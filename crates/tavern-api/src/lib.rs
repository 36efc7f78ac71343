pub mod auth;
pub mod chat;
pub mod error;
pub mod flash;
pub mod games;
pub mod middleware;
pub mod preferences;
pub mod profile;
pub mod session;
pub mod views;

use axum::{
    Json, Router,
    http::{HeaderValue, header},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_http::set_header::SetResponseHeaderLayer;

use tavern_types::api::HealthResponse;

use crate::auth::AppState;
use crate::middleware::require_auth;

/// Every page depends on who is logged in, so nothing may be cached.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(games::index))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/game_data/{id}", get(games::game_data))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/profile", get(profile::profile))
        .route("/preferences", get(preferences::preferences_page).post(preferences::submit_preferences))
        .route("/post_game", get(games::post_game_page).post(games::post_game))
        .route("/apply_for_game/{id}", post(chat::apply_for_game))
        .route("/game_chat/{id}", get(chat::game_chat).post(chat::send_message))
        .route("/game_chat/{id}/accept/{user_id}", post(chat::accept))
        .route("/game_chat/{id}/reject/{user_id}", post(chat::reject))
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
