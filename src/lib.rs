//! # Mission Auth
//!
//! `mission-auth` is the login and session authority for the mission lesson
//! game. It exposes a small JSON API on `/auth`:
//!
//! - `POST` with `{"mode": "login", ...}` checks the client's lockout state,
//!   verifies the password against an Argon2id hash and sets an HS256 session
//!   token in a `token` cookie (`Secure; HttpOnly; SameSite=Strict`).
//! - `POST` with `{"mode": "register", ...}` creates an account.
//! - `GET` validates the cookie and returns the identity it carries.
//! - `DELETE` revokes the presented token and clears the cookie.
//!
//! ## Lockout
//!
//! Failed credential attempts are counted per client network address. Once a
//! client reaches the configured threshold (5 by default) it is rejected with
//! `RATE_LIMITED` until the lockout window (300 s by default) has elapsed since
//! its last failure. A successful login clears the counter.
//!
//! ## Revocation
//!
//! Revoked token ids live in process memory only. Tokens are short-lived (15
//! minutes by default), so a restart re-admitting a revoked token is bounded by
//! that TTL.

pub mod api;
pub mod cli;
pub mod db;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
