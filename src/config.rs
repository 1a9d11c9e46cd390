use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:3001";
pub const DEFAULT_USERNAME: &str = "testuser";
pub const DEFAULT_PASSWORD: &str = "testpassword";

/// Image service load tester
#[derive(Parser, Debug, Clone)]
#[command(name = "image-load-test")]
#[command(about = "Load test the image service /images/{id}/process endpoint")]
pub struct CliArgs {
    /// Number of parallel requests per batch
    #[arg(long, default_value = "20")]
    pub concurrency: usize,

    /// Total duration to run in seconds
    #[arg(long, default_value = "300")]
    pub duration_seconds: u64,

    /// Pause between batches in milliseconds
    #[arg(long, default_value = "100")]
    pub batch_delay_ms: u64,

    /// Stop after this many batches even if the duration has not elapsed
    #[arg(long)]
    pub max_batches: Option<u64>,

    /// Fixture image uploaded once before the load phase
    #[arg(long, default_value = "test_image.jpg")]
    pub image: PathBuf,

    /// JSON file with the operations to request (defaults to the CPU-heavy pipeline)
    #[arg(long)]
    pub pipeline: Option<PathBuf>,

    /// Print stats every N seconds (0 = only at the end)
    #[arg(long, default_value = "0")]
    pub stats_interval_seconds: u64,

    /// Do not call /register before logging in
    #[arg(long)]
    pub skip_register: bool,
}

impl CliArgs {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("--concurrency must be at least 1");
        }
        if self.duration_seconds == 0 {
            anyhow::bail!("--duration-seconds must be at least 1");
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Image service base URL (e.g., http://localhost:3001)
    pub service_url: Url,

    pub username: String,

    pub password: String,

    /// Per-request timeout; unset means reqwest's default (none)
    pub request_timeout: Option<Duration>,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url =
            lookup("IMAGE_SERVICE_URL").unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());
        let service_url = Url::parse(&raw_url)
            .with_context(|| format!("Invalid IMAGE_SERVICE_URL '{}'", raw_url))?;
        if !matches!(service_url.scheme(), "http" | "https") {
            anyhow::bail!(
                "IMAGE_SERVICE_URL must use http or https, got '{}'",
                service_url.scheme()
            );
        }

        let request_timeout = lookup("REQUEST_TIMEOUT_SECONDS")
            .map(|raw| raw.parse::<u64>().context("Invalid REQUEST_TIMEOUT_SECONDS"))
            .transpose()?
            .map(Duration::from_secs);

        Ok(Self {
            service_url,
            username: lookup("LOADTEST_USERNAME").unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: lookup("LOADTEST_PASSWORD").unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
            request_timeout,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cli: CliArgs,
    pub env: EnvConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cli = CliArgs::parse();
        cli.validate()?;

        let env = EnvConfig::from_env()?;

        Ok(Self { cli, env })
    }
}
