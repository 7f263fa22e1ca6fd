use sqlx::PgPool;
use std::sync::Arc;

use crate::audit::AuditLog;
use crate::auth::JwtService;
use crate::Config;

/// Shared handler state. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jwt: Arc<JwtService>,
    pub audit: AuditLog,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, db: PgPool, nats: Option<async_nats::Client>) -> Self {
        let jwt = Arc::new(JwtService::new(&config.jwt_secret, config.jwt_expiration_minutes));
        let audit = AuditLog::new(db.clone(), nats);
        Self { db, jwt, audit, config: Arc::new(config) }
    }
}
