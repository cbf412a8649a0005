use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_MAX_LOGIN_ATTEMPTS: &str = "max-login-attempts";
pub const ARG_LOCKOUT_SECONDS: &str = "lockout-seconds";
pub const ARG_ATTEMPT_RETENTION_SECONDS: &str = "attempt-retention-seconds";
pub const ARG_HOUSEKEEPING_INTERVAL_SECONDS: &str = "housekeeping-interval-seconds";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";
pub const ARG_FRONTEND_ORIGIN: &str = "frontend-origin";

pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_lockout_args(command);
    with_http_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("HMAC secret used to sign session tokens (at least 32 bytes)")
                .env("MISSION_AUTH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Session token lifetime in seconds")
                .env("MISSION_AUTH_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_LOGIN_ATTEMPTS)
                .long(ARG_MAX_LOGIN_ATTEMPTS)
                .help("Failed logins allowed before a client is locked out")
                .env("MISSION_AUTH_MAX_LOGIN_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_SECONDS)
                .long(ARG_LOCKOUT_SECONDS)
                .help("Lockout window in seconds, counted from the last failure")
                .env("MISSION_AUTH_LOCKOUT_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ATTEMPT_RETENTION_SECONDS)
                .long(ARG_ATTEMPT_RETENTION_SECONDS)
                .help("Idle time after which a client's failure record is dropped")
                .env("MISSION_AUTH_ATTEMPT_RETENTION_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_HOUSEKEEPING_INTERVAL_SECONDS)
                .long(ARG_HOUSEKEEPING_INTERVAL_SECONDS)
                .help("How often expired revocations and idle records are pruned")
                .env("MISSION_AUTH_HOUSEKEEPING_INTERVAL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_http_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Identify clients by X-Forwarded-For / X-Real-IP (only behind a trusted proxy)")
                .env("MISSION_AUTH_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_FRONTEND_ORIGIN)
                .long(ARG_FRONTEND_ORIGIN)
                .help("Frontend URL allowed to call the API with credentials (enables CORS)")
                .env("MISSION_AUTH_FRONTEND_ORIGIN"),
        )
}

#[derive(Debug)]
pub struct Options {
    pub token_secret: SecretString,
    pub token_ttl_seconds: u64,
    pub max_login_attempts: u32,
    pub lockout_seconds: u64,
    pub attempt_retention_seconds: u64,
    pub housekeeping_interval_seconds: u64,
    pub trust_proxy_headers: bool,
    pub frontend_origin: Option<String>,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let token_secret = matches
            .get_one::<String>(ARG_TOKEN_SECRET)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --token-secret")?;

        Ok(Self {
            token_secret,
            token_ttl_seconds: matches
                .get_one::<u64>(ARG_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(900),
            max_login_attempts: matches
                .get_one::<u32>(ARG_MAX_LOGIN_ATTEMPTS)
                .copied()
                .unwrap_or(5),
            lockout_seconds: matches
                .get_one::<u64>(ARG_LOCKOUT_SECONDS)
                .copied()
                .unwrap_or(300),
            attempt_retention_seconds: matches
                .get_one::<u64>(ARG_ATTEMPT_RETENTION_SECONDS)
                .copied()
                .unwrap_or(86_400),
            housekeeping_interval_seconds: matches
                .get_one::<u64>(ARG_HOUSEKEEPING_INTERVAL_SECONDS)
                .copied()
                .unwrap_or(60),
            trust_proxy_headers: matches.get_flag(ARG_TRUST_PROXY_HEADERS),
            frontend_origin: matches.get_one::<String>(ARG_FRONTEND_ORIGIN).cloned(),
        })
    }
}
