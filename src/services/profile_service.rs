use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::profile::Profile;
use crate::utils::telegram_auth::ParsedUser;

/// Maps a verified Telegram user to the internal profile, creating it on first sight.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve(&self, user: &ParsedUser) -> Result<Profile>;
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn resolve(&self, user: &ParsedUser) -> Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, telegram_id, username, first_name, last_name, is_premium, photo_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (telegram_id) DO UPDATE SET
                username = EXCLUDED.username,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                is_premium = EXCLUDED.is_premium,
                photo_url = COALESCE(EXCLUDED.photo_url, profiles.photo_url),
                updated_at = NOW()
            RETURNING id, telegram_id, username, first_name, last_name, is_premium, photo_url, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_premium.unwrap_or(false))
        .bind(&user.photo_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(profile)
    }
}

/// Process-local directory for development without a database.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    profiles: Mutex<HashMap<i64, Profile>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn resolve(&self, user: &ParsedUser) -> Result<Profile> {
        let mut profiles = self
            .profiles
            .lock()
            .map_err(|_| Error::Internal("profile directory mutex poisoned".to_string()))?;
        let now = Utc::now();

        let profile = profiles.entry(user.id).or_insert_with(|| Profile {
            id: Uuid::new_v4(),
            telegram_id: user.id,
            username: None,
            first_name: None,
            last_name: None,
            is_premium: false,
            photo_url: None,
            created_at: now,
            updated_at: now,
        });
        profile.username = user.username.clone();
        profile.first_name = user.first_name.clone();
        profile.last_name = user.last_name.clone();
        profile.is_premium = user.is_premium.unwrap_or(false);
        if user.photo_url.is_some() {
            profile.photo_url = user.photo_url.clone();
        }
        profile.updated_at = now;

        Ok(profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, username: &str) -> ParsedUser {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "username": username,
            "photo_url": "https://t.me/i/userpic/320/a.jpg",
        }))
        .unwrap()
    }

    #[test]
    fn in_memory_directory_creates_once_and_refreshes() {
        let directory = InMemoryUserDirectory::new();

        let first = tokio_test::block_on(directory.resolve(&user(7, "old"))).unwrap();
        assert_eq!(first.telegram_id, 7);
        assert_eq!(first.username.as_deref(), Some("old"));

        let mut renamed = user(7, "new");
        renamed.photo_url = None;
        let second = tokio_test::block_on(directory.resolve(&renamed)).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.username.as_deref(), Some("new"));
        assert_eq!(second.photo_url, first.photo_url);
        assert_eq!(directory.len(), 1);

        tokio_test::block_on(directory.resolve(&user(8, "other"))).unwrap();
        assert_eq!(directory.len(), 2);
    }
}
