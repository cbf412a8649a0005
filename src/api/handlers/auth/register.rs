//! Account registration.
//!
//! Registration never logs the user in and never touches the attempt tracker.

use tracing::info;

use super::{
    error::AuthError,
    password::hash_blocking,
    state::AuthState,
    storage::{CreateOutcome, NewUser, PublicUser},
    utils::{normalize_email, valid_email},
};

const MAX_NAME_CHARS: usize = 100;
const MIN_PASSWORD_CHARS: usize = 8;
const MAX_PASSWORD_CHARS: usize = 128;

/// Validate and create a new account.
///
/// # Errors
/// `InvalidRequest` for bad input, `AccountExists` when the email is taken and
/// `Infrastructure` for storage or hashing failures.
pub async fn register(
    auth_state: &AuthState,
    name: Option<&str>,
    email: &str,
    password: &str,
) -> Result<PublicUser, AuthError> {
    let name = name.map(str::trim).unwrap_or_default();
    let email = normalize_email(email);
    validate_registration(name, &email, password)?;

    let password_hash = hash_blocking(auth_state.passwords(), password.to_string()).await?;
    let outcome = auth_state
        .users()
        .create(NewUser {
            email,
            name: name.to_string(),
            password_hash,
        })
        .await?;

    match outcome {
        CreateOutcome::Created(user) => {
            info!(user_id = %user.id, "account registered");
            Ok(user)
        }
        CreateOutcome::EmailTaken => Err(AuthError::AccountExists),
    }
}

fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), AuthError> {
    let name_chars = name.chars().count();
    if name_chars == 0 || name_chars > MAX_NAME_CHARS {
        return Err(AuthError::InvalidRequest(format!(
            "Name must be between 1 and {MAX_NAME_CHARS} characters"
        )));
    }
    if !valid_email(email) {
        return Err(AuthError::InvalidRequest("Invalid email address".to_string()));
    }
    let password_chars = password.chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&password_chars) {
        return Err(AuthError::InvalidRequest(format!(
            "Password must be between {MIN_PASSWORD_CHARS} and {MAX_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}
