use crate::client::ImageServiceClient;
use crate::config::Config;
use crate::error::SetupError;
use crate::pipeline::{Pipeline, ProcessRequest};
use crate::stats::{RequestOutcome, RequestRecord, Stats, StatsSnapshot};
use anyhow::{Context, Result};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant, sleep};

/// Credentials and fixture obtained during setup, read by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub image_id: String,
}

pub struct LoadTest {
    config: Config,
    client: ImageServiceClient,
    pipeline: Pipeline,
    stats: Stats,
    stop_flag: Arc<AtomicBool>,
}

impl LoadTest {
    pub fn new(config: Config) -> Result<Self> {
        let pipeline = match &config.cli.pipeline {
            Some(path) => Pipeline::from_file(path)?,
            None => Pipeline::cpu_heavy(),
        };

        let client = ImageServiceClient::new(&config.env.service_url, config.env.request_timeout)
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            client,
            pipeline,
            stats: Stats::new(),
            stop_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Register, log in and upload the fixture image.
    pub async fn setup(&self) -> Result<Session, SetupError> {
        let env = &self.config.env;

        println!("--- Step 1: Registering and Logging In ---");
        if self.config.cli.skip_register {
            tracing::debug!("Skipping registration");
        } else {
            let status = self
                .client
                .register(&env.username, &env.password)
                .await
                .map_err(SetupError::Login)?;
            tracing::debug!(%status, username = %env.username, "Register answered");
        }

        let token = self
            .client
            .login(&env.username, &env.password)
            .await
            .map_err(SetupError::Login)?;
        println!("Successfully logged in. Token acquired.");

        println!("\n--- Step 2: Uploading Test Image ---");
        let image_id = self
            .client
            .upload_image(&token, &self.config.cli.image)
            .await
            .map_err(SetupError::Upload)?;
        println!("Image uploaded successfully. Image ID: {}", image_id);

        Ok(Session { token, image_id })
    }

    /// Run setup followed by the load phase and return the final statistics.
    pub async fn run(&self) -> Result<StatsSnapshot, SetupError> {
        let session = self.setup().await?;

        tracing::info!(
            service = %self.config.env.service_url,
            image_id = %session.image_id,
            concurrency = self.config.cli.concurrency,
            operations = self.pipeline.operations.len(),
            "Setup complete"
        );

        self.generate_load(Arc::new(session)).await;

        println!("\n\nLoad test finished.");
        let snapshot = self.stats.snapshot();
        snapshot.print(true);

        Ok(snapshot)
    }

    async fn generate_load(&self, session: Arc<Session>) {
        let cli = &self.config.cli;

        println!("\n--- Step 3: Starting Load Test ---");
        println!(
            "Sending {} concurrent requests for {} seconds...",
            cli.concurrency, cli.duration_seconds
        );

        // Setup Ctrl+C handler
        let stop_flag = self.stop_flag.clone();
        let ctrl_c = tokio::spawn(async move {
            watch_interrupts(tokio::signal::ctrl_c, stop_flag).await;
            println!("\nForce quit.");
            std::process::exit(130);
        });

        let reporter = (cli.stats_interval_seconds > 0).then(|| {
            let stats = self.stats.clone();
            let stop_flag = self.stop_flag.clone();
            let interval = Duration::from_secs(cli.stats_interval_seconds);
            tokio::spawn(async move {
                loop {
                    sleep(interval).await;
                    if stop_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    stats.snapshot().print(false);
                }
            })
        });

        let body = Arc::new(self.pipeline.request_for(&session.image_id));
        self.stats.mark_start();
        let deadline = Instant::now() + cli.duration();
        let mut batches: u64 = 0;

        while Instant::now() < deadline {
            if self.stop_flag.load(Ordering::Relaxed) {
                break;
            }
            if cli.max_batches.is_some_and(|max| batches >= max) {
                break;
            }

            let mut join_set = JoinSet::new();
            for _ in 0..cli.concurrency {
                join_set.spawn(send_processing_request(
                    self.client.clone(),
                    session.clone(),
                    body.clone(),
                    self.stats.clone(),
                ));
            }

            while let Some(joined) = join_set.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "Request task did not complete");
                }
            }

            batches += 1;
            self.stats.record_batch();
            tracing::debug!(batch = batches, "Batch complete");

            sleep(cli.batch_delay()).await;
        }

        self.stop_flag.store(true, Ordering::Relaxed);
        ctrl_c.abort();
        if let Some(reporter) = reporter {
            reporter.abort();
        }
    }
}

async fn send_processing_request(
    client: ImageServiceClient,
    session: Arc<Session>,
    body: Arc<ProcessRequest>,
    stats: Stats,
) -> RequestOutcome {
    let start = Instant::now();
    let outcome = match client
        .process_image(&session.token, &session.image_id, &body)
        .await
    {
        Ok(status) => RequestOutcome::Completed { status },
        Err(e) => {
            tracing::debug!(error = %e, "Process request failed");
            RequestOutcome::TransportError {
                error: e.to_string(),
            }
        }
    };
    let latency_ms = start.elapsed().as_millis() as u64;

    print_marker(outcome.marker());

    stats.record(RequestRecord {
        outcome: outcome.clone(),
        latency_ms,
    });

    outcome
}

/// Set the stop flag on the first interrupt and return on the second.
///
/// Once a signal listener is installed the default SIGINT action is gone, so
/// the caller is expected to exit the process when this returns.
async fn watch_interrupts<F, Fut>(mut next_interrupt: F, stop_flag: Arc<AtomicBool>)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let mut interrupts = 0;
    while next_interrupt().await.is_ok() {
        interrupts += 1;
        if interrupts >= 2 {
            return;
        }
        println!("\n\nStopping after the current batch... (press Ctrl+C again to force quit)");
        stop_flag.store(true, Ordering::Relaxed);
    }
    // The listener failed; keep waiting so the caller does not exit.
    std::future::pending::<()>().await;
}

fn print_marker(marker: char) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "{}", marker);
    let _ = stdout.flush();
}
