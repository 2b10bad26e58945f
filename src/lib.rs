pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::services::{auth_service::AuthService, profile_service::UserDirectory};

#[derive(Clone)]
pub struct AppState {
    pub auth_service: AuthService,
    pub users: Arc<dyn UserDirectory>,
}

impl AppState {
    pub fn new(config: &Config, users: Arc<dyn UserDirectory>) -> Self {
        let auth_service = AuthService::new(
            config.telegram_bot_token.clone(),
            config.init_data_max_age,
        );

        Self {
            auth_service,
            users,
        }
    }
}
