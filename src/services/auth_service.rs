use std::time::Duration;

use crate::config::BotToken;
use crate::error::{Error, Result};
use crate::utils::telegram_auth::{verify_init_data, InitData, ParsedUser};

pub const STALE_AUTH_DATE: &str = "stale_auth_date";

/// Verifies `initData` against the bot token loaded at startup.
#[derive(Clone, Debug)]
pub struct AuthService {
    bot_token: BotToken,
    max_age: Option<Duration>,
}

impl AuthService {
    pub fn new(bot_token: BotToken, max_age: Option<Duration>) -> Self {
        Self { bot_token, max_age }
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn authenticate(&self, init_data: &str) -> Result<ParsedUser> {
        self.authenticate_at(init_data, chrono::Utc::now().timestamp())
    }

    pub fn authenticate_at(&self, init_data: &str, now: i64) -> Result<ParsedUser> {
        let result = verify_init_data(init_data, self.bot_token.expose());
        let user = match result.into_user() {
            Ok(user) => user,
            Err(reason) => {
                let data = InitData::parse(init_data);
                tracing::warn!(
                    reason = %reason,
                    payload_len = init_data.len(),
                    field_count = data.len(),
                    has_auth_date = data.get("auth_date").is_some(),
                    has_query_id = data.query_id().is_some(),
                    "Rejected Telegram initData"
                );
                return Err(Error::Unauthorized(reason.to_string()));
            }
        };

        if let Some(max_age) = self.max_age {
            let auth_date = InitData::parse(init_data).auth_date();
            if !auth_date.is_some_and(|date| is_fresh(date, now, max_age)) {
                tracing::warn!(
                    telegram_id = user.id,
                    auth_date = ?auth_date,
                    max_age_secs = max_age.as_secs(),
                    "Rejected stale Telegram initData"
                );
                return Err(Error::Unauthorized(STALE_AUTH_DATE.to_string()));
            }
        }

        tracing::debug!(telegram_id = user.id, "Verified Telegram initData");
        Ok(user)
    }
}

/// `auth_date` is within `max_age` of `now`. Dates from the future are
/// tolerated up to the same window to absorb client clock skew.
pub fn is_fresh(auth_date: i64, now: i64, max_age: Duration) -> bool {
    let window = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
    now.saturating_sub(auth_date).saturating_abs() <= window
}
