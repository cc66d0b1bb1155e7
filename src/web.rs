#![cfg(not(tarpaulin_include))]

use env_logger::Env;
use sheetchart::app;
use sheetchart::config::Config;

/// Main entry point for the chart server
///
/// Reads the configuration from the environment (and `.env`), then serves
/// the API until the process is stopped. Log verbosity follows `RUST_LOG`
/// and defaults to `info`.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    app::run(config).await
}
