use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use pgswitch::{Config, Server, analytics};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "pgswitch";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // This has to be the first thing we do, because it initializes the config
    let config = Config::init().await;

    init_tracing(&config);

    let server = Server::new(config.clone());
    server.warm_pools().await;

    let listener = server.bind(config.listen_addr)?;
    info!("{} listening on {}", APP_NAME, config.listen_addr);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("cannot listen for ctrl-c: {e}");
        }
    };

    server.serve(listener, shutdown).await?;

    let totals = analytics::snapshot();
    info!(
        statements = totals.statements,
        reroutes = totals.reroutes,
        rewrites = totals.rewrites,
        overflows = totals.overflows,
        decision_failures = totals.decision_failures,
        "{} shutting down",
        APP_NAME
    );

    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.filter_directive()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
