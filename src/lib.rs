pub mod api;
pub mod cart;
pub mod config;
pub mod db;
pub mod gateway;
pub mod notifications;
pub mod token;

pub use db::DbPool;

use config::Config;
use notifications::EmailService;
use token::TokenService;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub tokens: TokenService,
    pub email: EmailService,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let tokens = TokenService::new(&config.auth);
        let email = EmailService::new(config.email.clone());
        Self {
            config,
            db,
            tokens,
            email,
        }
    }
}
