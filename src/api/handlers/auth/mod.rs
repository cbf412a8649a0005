//! Auth handlers and supporting modules.
//!
//! `POST /auth` logs in or registers, `GET /auth` resolves the `token`
//! cookie into an identity and `DELETE /auth` revokes it.
//!
//! ## Login Lockout
//!
//! Failed logins are counted per client address. After `max_attempts`
//! failures (default 5) the client is rejected with `429` until the lockout
//! window (default 300 seconds) has passed since its last failure. A
//! successful login clears the counter.
//!
//! ## Session Tokens
//!
//! Sessions are stateless HS256 tokens with a 15 minute lifetime carried in a
//! `Secure; HttpOnly; SameSite=Strict` cookie. Logout revokes the token id in
//! a process-local list.
//!
//! > **Note:** Revocations are not persisted. After a restart a logged-out
//! > token is accepted again until it expires.

pub mod clock;
pub mod error;
pub mod login;
pub mod password;
pub mod rate_limit;
pub mod register;
pub mod revocation;
pub(crate) mod session;
mod state;
pub mod storage;
pub mod token;
pub mod types;
mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AuthError;
pub use password::PasswordCost;
pub use state::{AuthConfig, AuthState};
pub use storage::{
    CreateOutcome, CredentialStore, MemoryCredentialStore, NewUser, PgCredentialStore, PublicUser,
    UserRecord,
};
