use clap::Parser;
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
};

use super::types::LogLevel;

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub listen_addr: SocketAddr,
    pub config_file_location: PathBuf,
    pub users_file_location: PathBuf,
    pub log_level: LogLevel,
}

impl CliConfig {
    /// Parses CLI/ENV and checks both files exist. Panics on bad input: there
    /// is nothing sensible to run without them.
    pub fn from_args() -> Self {
        let args = Args::try_parse().unwrap_or_else(|e| panic!("Invalid CLI/ENV: {e}"));

        let cfg = Self {
            listen_addr: SocketAddr::from((args.host, args.port)),
            config_file_location: args.config_file,
            users_file_location: args.users_file,
            log_level: args.log_level,
        };

        must_exist_file(&cfg.config_file_location, "--config / pgswitch.toml");
        must_exist_file(&cfg.users_file_location, "--users / users.toml");

        cfg
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "pgswitch",
    version,
    about = "Postgres pooler with query routing and rewriting"
)]
struct Args {
    // IPv4 or IPv6 literal (e.g., 0.0.0.0, 127.0.0.1, ::, ::1). Required via CLI or ENV.
    #[arg(long = "host", short = 'H', env = "PGSWITCH_HOST")]
    host: IpAddr,

    // Required via CLI or ENV.
    #[arg(long = "port", short = 'p', env = "PGSWITCH_PORT")]
    port: u16,

    // Not required via CLI or ENV (defaults to info).
    #[arg(long = "log", env = "PGSWITCH_LOG", default_value = "info")]
    log_level: LogLevel,

    // Must exist; no defaults.
    #[arg(long = "config", env = "PGSWITCH_CONFIG_FILE")]
    config_file: PathBuf,

    // Must exist; no defaults.
    #[arg(long = "users", env = "PGSWITCH_USERS_FILE")]
    users_file: PathBuf,
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn must_exist_file(path: &Path, hint: &str) {
    let md = fs::metadata(path).unwrap_or_else(|_| {
        panic!("required file missing: {} (from {hint})", path.display());
    });

    if !md.is_file() {
        panic!("path is not a file: {} (from {hint})", path.display());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
