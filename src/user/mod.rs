pub mod user_models;
pub mod user_repository;

pub use user_models::{display_name_or, AccountStatus, NewUser, Role, User, UNKNOWN_STUDENT, UNKNOWN_TEACHER};
pub use user_repository::{PgUserRepository, UserRepository};
