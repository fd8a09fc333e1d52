use serde::Deserialize;
use validator::Validate;

use crate::error::FieldErrors;
use crate::user::Role;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: Role,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    pub department: Option<String>,
    pub grade_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Please enter your current password"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "New password must be at least 6 characters long"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "New passwords do not match"))]
    pub confirm_password: String,
}

/// Editable profile fields. Leave `new_password` empty to keep the password.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: String,
    pub grade_level: Option<String>,
    pub department: Option<String>,
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// First-login completion. Leave `new_password` empty to keep the one the
/// admin issued.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountSetupRequest {
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
    pub grade_level: Option<String>,
    pub department: Option<String>,
}

pub const MIN_PASSWORD_LEN: usize = 6;

/// Shared by profile edits and account setup, where a new password is optional.
pub(crate) fn check_new_password(errors: &mut FieldErrors, new_password: &str, confirm: Option<&str>) {
    if new_password.is_empty() {
        return;
    }
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        errors.add("new_password", "Password must be at least 6 characters long");
    }
    if let Some(confirm) = confirm {
        if confirm != new_password {
            errors.add("confirm_password", "Passwords do not match");
        }
    }
}

/// Trimmed value, or `None` when blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
