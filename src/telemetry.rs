//! Logging setup.
//!
//! Log lines go to stderr so stdout only carries step banners, progress markers
//! and the final report. The filter comes from `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub struct Telemetry {
    name: &'static str,
    version: &'static str,
    default_level: &'static str,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: "image-load-test",
            version: "unknown",
            default_level: "info",
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Install the global subscriber. Calling it twice keeps the first one.
    pub fn register(self) -> Self {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_level));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);

        let installed = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!(name = self.name, version = self.version, "Logging initialised");
        }
        self
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}
