pub mod auth_dto;
pub mod auth_service;
pub mod password;
pub mod session;

pub use auth_dto::{
    AccountSetupRequest, ChangePasswordRequest, LoginRequest, RegisterUserRequest, UpdateProfileRequest,
    MIN_PASSWORD_LEN,
};
pub use auth_service::AuthService;
pub use password::{BcryptHasher, CredentialHasher};
pub use session::{FileSessionStore, Session, SessionStore};
