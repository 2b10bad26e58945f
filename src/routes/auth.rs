use axum::{extract::State, Json};

use crate::dto::auth_dto::AuthResponse;
use crate::middleware::telegram_auth::VerifiedTelegramUser;
use crate::{error::Result, AppState};

pub async fn telegram_login(
    State(state): State<AppState>,
    VerifiedTelegramUser(user): VerifiedTelegramUser,
) -> Result<Json<AuthResponse>> {
    let profile = state.users.resolve(&user).await?;
    tracing::info!(
        telegram_id = user.id,
        profile_id = %profile.id,
        "Telegram user signed in"
    );
    Ok(Json(AuthResponse { user, profile }))
}
