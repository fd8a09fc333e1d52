use uuid::Uuid;
use validator::Validate;

use super::auth_dto::{
    check_new_password, non_blank, AccountSetupRequest, ChangePasswordRequest, LoginRequest,
    RegisterUserRequest, UpdateProfileRequest,
};
use super::password::CredentialHasher;
use super::session::{Session, SessionStore};
use crate::error::{AppError, FieldErrors, Result};
use crate::user::user_repository::username_taken;
use crate::user::{AccountStatus, NewUser, Role, User, UserRepository};

/// Login, logout and account registration over the user directory.
#[derive(Clone)]
pub struct AuthService<U, H, S> {
    users: U,
    hasher: H,
    sessions: S,
}

impl<U, H, S> AuthService<U, H, S>
where
    U: UserRepository,
    H: CredentialHasher,
    S: SessionStore,
{
    pub fn new(users: U, hasher: H, sessions: S) -> Self {
        Self {
            users,
            hasher,
            sessions,
        }
    }

    #[tracing::instrument(skip(self, payload), fields(username = %payload.username))]
    pub async fn login(&self, payload: LoginRequest) -> Result<Session> {
        payload.validate()?;

        let user = self
            .users
            .find_by_username(payload.username.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("User not found".into()))?;

        let Some(ref password_hash) = user.password_hash else {
            return Err(AppError::Authentication("Account has no password set".into()));
        };
        if !self.hasher.verify(&payload.password, password_hash)? {
            tracing::warn!("rejected login");
            return Err(AppError::Authentication("Invalid credentials".into()));
        }

        let session = Session::from(&user);
        self.sessions.save(&session).await?;

        tracing::info!(user_id = %session.user_id, role = %session.role, "logged in");
        Ok(session)
    }

    pub async fn logout(&self) -> Result<()> {
        self.sessions.clear().await?;
        tracing::info!("logged out");
        Ok(())
    }

    /// The session saved by a previous login, if any.
    pub async fn restore(&self) -> Result<Option<Session>> {
        self.sessions.load().await
    }

    #[tracing::instrument(skip(self, admin, payload), fields(admin_id = %admin.user_id, username = %payload.username))]
    pub async fn register_user(&self, admin: &Session, payload: RegisterUserRequest) -> Result<User> {
        Self::require_admin(admin)?;
        payload.validate()?;

        let new_user = NewUser {
            username: payload.username.trim().to_string(),
            password_hash: self.hasher.hash(&payload.password)?,
            role: payload.role,
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            department: payload.department,
            grade_level: payload.grade_level,
        };

        let user = self.users.create(&new_user).await?.ok_or_else(username_taken)?;

        tracing::info!(user_id = %user.id, role = %user.role, "account registered");
        Ok(user)
    }

    async fn current_user(&self, session: &Session) -> Result<User> {
        self.users
            .get_user_by_id(session.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".into()))
    }

    fn password_matches(&self, user: &User, password: &str) -> Result<bool> {
        match user.password_hash {
            Some(ref hash) => self.hasher.verify(password, hash),
            None => Ok(false),
        }
    }

    async fn save(&self, user: &User) -> Result<User> {
        self.users
            .update(user)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".into()))
    }

    /// Whether the signed-in user still has to complete first-login setup.
    pub async fn needs_account_setup(&self, session: &Session) -> Result<bool> {
        Ok(self.current_user(session).await?.needs_account_setup())
    }

    #[tracing::instrument(skip(self, session, payload), fields(user_id = %session.user_id))]
    pub async fn change_password(&self, session: &Session, payload: ChangePasswordRequest) -> Result<()> {
        payload.validate()?;

        let mut user = self.current_user(session).await?;
        if !self.password_matches(&user, &payload.current_password)? {
            return Err(AppError::Validation(FieldErrors::single(
                "current_password",
                "Current password is incorrect",
            )));
        }

        user.password_hash = Some(self.hasher.hash(&payload.new_password)?);
        self.save(&user).await?;

        tracing::info!("password changed");
        Ok(())
    }

    #[tracing::instrument(skip(self, session, payload), fields(user_id = %session.user_id))]
    pub async fn update_profile(&self, session: &Session, payload: UpdateProfileRequest) -> Result<User> {
        let mut errors = match payload.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };
        check_new_password(&mut errors, &payload.new_password, None);

        let mut user = self.current_user(session).await?;
        if !payload.new_password.is_empty() && !self.password_matches(&user, &payload.current_password)? {
            errors.add("current_password", "Current password is incorrect");
        }
        errors.into_result()?;

        user.first_name = payload.first_name.trim().to_string();
        user.last_name = payload.last_name.trim().to_string();
        user.username = payload.username.trim().to_string();
        match user.role {
            Role::Student => user.grade_level = non_blank(payload.grade_level.as_deref()).or(user.grade_level),
            Role::Teacher => user.department = non_blank(payload.department.as_deref()).or(user.department),
            Role::Admin => {}
        }
        if !payload.new_password.is_empty() {
            user.password_hash = Some(self.hasher.hash(&payload.new_password)?);
        }

        let updated = self.save(&user).await?;

        // Keep the persisted session's username in step
        if let Some(saved) = self.sessions.load().await? {
            if saved.user_id == updated.id {
                self.sessions.save(&Session::from(&updated)).await?;
            }
        }

        tracing::info!("profile updated");
        Ok(updated)
    }

    /// First-login completion: optional new password plus the role's required
    /// detail, then the account is marked updated.
    #[tracing::instrument(skip(self, session, payload), fields(user_id = %session.user_id))]
    pub async fn complete_account_setup(&self, session: &Session, payload: AccountSetupRequest) -> Result<User> {
        let mut user = self.current_user(session).await?;
        let grade_level = non_blank(payload.grade_level.as_deref());
        let department = non_blank(payload.department.as_deref());

        let mut errors = FieldErrors::new();
        check_new_password(&mut errors, &payload.new_password, Some(&payload.confirm_password));
        match user.role {
            Role::Student if grade_level.is_none() => errors.add("grade_level", "Please select a grade level"),
            Role::Teacher if department.is_none() => errors.add("department", "Please enter your department"),
            _ => {}
        }
        errors.into_result()?;

        if !payload.new_password.is_empty() {
            user.password_hash = Some(self.hasher.hash(&payload.new_password)?);
        }
        match user.role {
            Role::Student => user.grade_level = grade_level,
            Role::Teacher => user.department = department,
            Role::Admin => {}
        }
        user.account_status = AccountStatus::Updated;

        let updated = self.save(&user).await?;
        tracing::info!("account setup completed");
        Ok(updated)
    }

    fn require_admin(session: &Session) -> Result<()> {
        if session.role != Role::Admin {
            return Err(AppError::Forbidden("Only administrators can manage accounts".into()));
        }
        Ok(())
    }

    pub async fn list_accounts(&self, admin: &Session) -> Result<Vec<User>> {
        Self::require_admin(admin)?;
        self.users.list_all().await
    }

    pub async fn view_account(&self, admin: &Session, id: Uuid) -> Result<User> {
        Self::require_admin(admin)?;
        self.users
            .get_user_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".into()))
    }
}
