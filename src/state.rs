use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    appointment::{AppointmentService, PgAppointmentRepository},
    auth::{AuthService, BcryptHasher, FileSessionStore},
    db::DbPool,
    error::{AppError, Result},
    notification::{NotificationService, PgNotificationRepository},
    reaper::ReaperService,
    user::PgUserRepository,
};

pub type PgAppointmentService =
    AppointmentService<PgAppointmentRepository, PgUserRepository, PgNotificationRepository>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub appointment_service: PgAppointmentService,
    pub notification_service: NotificationService<PgNotificationRepository>,
    pub reaper_service: ReaperService<PgAppointmentRepository, PgUserRepository, PgNotificationRepository>,
    pub auth_service: AuthService<PgUserRepository, BcryptHasher, FileSessionStore>,
}

impl AppState {
    pub fn new(db: DbPool, config: Arc<Config>) -> Self {
        let appointment_repository = PgAppointmentRepository::new(db.clone());
        let user_repository = PgUserRepository::new(db.clone());
        let notification_repository = PgNotificationRepository::new(db.clone());

        let notification_service = NotificationService::new(notification_repository);
        let appointment_service = AppointmentService::new(
            appointment_repository,
            user_repository.clone(),
            notification_service.clone(),
        );
        let reaper_service = ReaperService::new(appointment_service.clone());
        let auth_service = AuthService::new(
            user_repository,
            BcryptHasher::new(config.bcrypt_cost),
            FileSessionStore::new(config.session_file.clone()),
        );

        Self {
            db,
            config,
            appointment_service,
            notification_service,
            reaper_service,
            auth_service,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub reaper_schedule: String,
    pub bcrypt_cost: u32,
    pub session_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set".to_string()))?;

        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.parse().map_err(|_| {
                AppError::Config("DATABASE_MAX_CONNECTIONS must be a number".to_string())
            })?,
            None => 5,
        };

        let bcrypt_cost = match lookup("BCRYPT_COST") {
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::Config("BCRYPT_COST must be a number".to_string()))?,
            None => bcrypt::DEFAULT_COST,
        };

        Ok(Self {
            database_url,
            database_max_connections,
            // Daily at midnight
            reaper_schedule: lookup("REAPER_SCHEDULE").unwrap_or_else(|| "0 0 0 * * *".to_string()),
            bcrypt_cost,
            session_file: lookup("SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("session.json")),
        })
    }
}
