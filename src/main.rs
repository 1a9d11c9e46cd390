//! Load test driver for the image processing service.
//!
//! Registers and logs in a test user, uploads a fixture image once, then sends
//! batches of concurrent `POST /images/{id}/process` requests until the
//! configured duration has elapsed. Every request prints `.` when the service
//! answered and `x` when it could not be reached.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `IMAGE_SERVICE_URL`, `LOADTEST_USERNAME`, `LOADTEST_PASSWORD`,
//!   `REQUEST_TIMEOUT_SECONDS` select the target and credentials
//! - `RUST_LOG` controls log verbosity (stderr)

mod client;
mod config;
mod error;
mod pipeline;
mod runner;
mod stats;
mod telemetry;

use anyhow::Result;
use config::Config;
use runner::LoadTest;
use telemetry::Telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment and CLI args
    let config = Config::load()?;

    let _telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let test = LoadTest::new(config)?;
    if let Err(e) = test.run().await {
        tracing::error!(error = %e, "Setup failed, aborting");
        println!("{}", e.operator_message());
        std::process::exit(1);
    }

    Ok(())
}
