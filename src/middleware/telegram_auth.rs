use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};

use crate::dto::auth_dto::InitDataRequest;
use crate::error::Error;
use crate::utils::telegram_auth::ParsedUser;
use crate::AppState;

/// Telegram user proven by the `initData` field of a JSON request body.
#[derive(Debug, Clone)]
pub struct VerifiedTelegramUser(pub ParsedUser);

#[async_trait]
impl FromRequest<AppState> for VerifiedTelegramUser {
    type Rejection = Error;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<InitDataRequest>::from_request(req, state)
            .await
            .map_err(|e| Error::BadRequest(e.body_text()))?;

        let user = state.auth_service.authenticate(&body.init_data)?;
        Ok(Self(user))
    }
}
