use clap::{Arg, ArgMatches, Command};

pub const ARG_DSN: &str = "dsn";
pub const ARG_DB_MAX_CONNECTIONS: &str = "db-max-connections";
pub const ARG_DB_TIMEOUT_SECONDS: &str = "db-timeout-seconds";
pub const ARG_QUERY_CACHE_CAPACITY: &str = "query-cache-capacity";
pub const ARG_QUERY_CACHE_TTL_SECONDS: &str = "query-cache-ttl-seconds";

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "Postgres connection string. Without it accounts are kept in memory and lost on restart.",
                )
                .env("MISSION_AUTH_DSN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DB_MAX_CONNECTIONS)
                .long(ARG_DB_MAX_CONNECTIONS)
                .help("Maximum pooled database connections")
                .env("MISSION_AUTH_DB_MAX_CONNECTIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_DB_TIMEOUT_SECONDS)
                .long(ARG_DB_TIMEOUT_SECONDS)
                .help("Per-statement timeout in seconds")
                .env("MISSION_AUTH_DB_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_QUERY_CACHE_CAPACITY)
                .long(ARG_QUERY_CACHE_CAPACITY)
                .help("Maximum cached query results")
                .env("MISSION_AUTH_QUERY_CACHE_CAPACITY")
                .default_value("1000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_QUERY_CACHE_TTL_SECONDS)
                .long(ARG_QUERY_CACHE_TTL_SECONDS)
                .help("Lifetime of cached query results in seconds")
                .env("MISSION_AUTH_QUERY_CACHE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    pub dsn: Option<String>,
    pub max_connections: u32,
    pub timeout_seconds: u64,
    pub cache_capacity: u64,
    pub cache_ttl_seconds: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            dsn: matches.get_one::<String>(ARG_DSN).cloned(),
            max_connections: matches
                .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
                .copied()
                .unwrap_or(5),
            timeout_seconds: matches
                .get_one::<u64>(ARG_DB_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
            cache_capacity: matches
                .get_one::<u64>(ARG_QUERY_CACHE_CAPACITY)
                .copied()
                .unwrap_or(1000),
            cache_ttl_seconds: matches
                .get_one::<u64>(ARG_QUERY_CACHE_TTL_SECONDS)
                .copied()
                .unwrap_or(300),
        }
    }
}
