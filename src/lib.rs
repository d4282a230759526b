pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod services;

pub use db::DbPool;

use config::Config;
use tracing::warn;

use crate::auth::{generate_secret, TokenService};
use crate::services::{AuthService, DeviceService};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub auth: AuthService,
    pub devices: DeviceService,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let secret = match config.auth.jwt_secret.clone() {
            Some(secret) => secret,
            None => {
                warn!(
                    "No JWT secret configured; using a random one. Tokens will not survive a restart. Set {} to keep them.",
                    config::JWT_SECRET_ENV
                );
                generate_secret()
            }
        };

        let tokens = TokenService::new(&secret, config.token_ttl());
        let auth = AuthService::new(db.clone(), tokens);
        let devices = DeviceService::new(db.clone(), config.devices.tag_match);

        Self {
            config,
            db,
            auth,
            devices,
        }
    }
}
