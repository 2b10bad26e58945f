pub mod auth;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/auth/telegram", post(auth::telegram_login))
        .with_state(state)
}
