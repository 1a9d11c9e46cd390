use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum RequestOutcome {
    /// The service answered; the status may still be an error.
    Completed { status: StatusCode },
    TransportError { error: String },
}

impl RequestOutcome {
    /// Progress character printed for this request.
    pub fn marker(&self) -> char {
        match self {
            RequestOutcome::Completed { .. } => '.',
            RequestOutcome::TransportError { .. } => 'x',
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub outcome: RequestOutcome,
    pub latency_ms: u64,
}

/// Thread-safe statistics tracker
#[derive(Clone)]
pub struct Stats {
    inner: Arc<Mutex<StatsInner>>,
}

struct StatsInner {
    start_time: DateTime<Utc>,
    latencies_ms: Vec<u64>,

    batches: u64,
    succeeded: u64,
    rejected: u64,
    transport_errors: u64,

    status_codes: BTreeMap<u16, u64>,
    error_reasons: HashMap<String, u64>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatsInner {
                start_time: Utc::now(),
                latencies_ms: Vec::new(),
                batches: 0,
                succeeded: 0,
                rejected: 0,
                transport_errors: 0,
                status_codes: BTreeMap::new(),
                error_reasons: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Restart the clock; elapsed time and req/s are measured from here.
    pub fn mark_start(&self) {
        self.lock().start_time = Utc::now();
    }

    /// Record a completed request
    pub fn record(&self, record: RequestRecord) {
        let mut inner = self.lock();

        match &record.outcome {
            RequestOutcome::Completed { status } => {
                *inner.status_codes.entry(status.as_u16()).or_insert(0) += 1;
                if status.is_success() {
                    inner.succeeded += 1;
                } else {
                    inner.rejected += 1;
                    *inner
                        .error_reasons
                        .entry(format!("status {}", status))
                        .or_insert(0) += 1;
                }
            }
            RequestOutcome::TransportError { error } => {
                inner.transport_errors += 1;
                *inner
                    .error_reasons
                    .entry(format!("transport: {}", error))
                    .or_insert(0) += 1;
            }
        }

        inner.latencies_ms.push(record.latency_ms);
    }

    pub fn record_batch(&self) {
        self.lock().batches += 1;
    }

    /// Get a snapshot of current statistics
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.lock();

        let elapsed = Utc::now() - inner.start_time;
        let total_requests = inner.latencies_ms.len() as u64;

        let mut latencies = inner.latencies_ms.clone();
        latencies.sort_unstable();

        let p50 = percentile(&latencies, 0.5);
        let p95 = percentile(&latencies, 0.95);
        let p99 = percentile(&latencies, 0.99);
        let avg = if !latencies.is_empty() {
            latencies.iter().sum::<u64>() / latencies.len() as u64
        } else {
            0
        };

        let rps = if elapsed.num_milliseconds() > 0 {
            total_requests as f64 / (elapsed.num_milliseconds() as f64 / 1000.0)
        } else {
            0.0
        };

        StatsSnapshot {
            elapsed_seconds: elapsed.num_seconds().max(0) as u64,
            batches: inner.batches,
            total_requests,
            succeeded: inner.succeeded,
            rejected: inner.rejected,
            transport_errors: inner.transport_errors,
            requests_per_second: rps,
            latency_avg_ms: avg,
            latency_p50_ms: p50,
            latency_p95_ms: p95,
            latency_p99_ms: p99,
            status_codes: inner.status_codes.clone(),
            error_reasons: inner.error_reasons.clone(),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() as f64) * p).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub elapsed_seconds: u64,
    pub batches: u64,
    pub total_requests: u64,
    pub succeeded: u64,
    pub rejected: u64,
    pub transport_errors: u64,
    pub requests_per_second: f64,
    pub latency_avg_ms: u64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub error_reasons: HashMap<String, u64>,
}

impl StatsSnapshot {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / self.total_requests as f64) * 100.0
    }

    /// Print statistics in a readable format
    pub fn print(&self, is_final: bool) {
        let header = if is_final {
            "=== FINAL STATISTICS ==="
        } else {
            "=== PROGRESS ==="
        };

        println!("\n{}", header);
        println!("Elapsed: {}s", self.elapsed_seconds);
        println!("Batches: {}", self.batches);
        println!("Total Requests: {}", self.total_requests);
        println!("Requests/sec: {:.2}", self.requests_per_second);
        println!();

        if self.total_requests > 0 {
            println!("  ✓ 2xx: {}", self.succeeded);
            println!("  ✗ Other status: {}", self.rejected);
            println!("  ✗ Transport errors: {}", self.transport_errors);
            println!("  Success Rate: {:.2}%", self.success_rate());
            println!();

            println!("Status Codes:");
            for (status, count) in &self.status_codes {
                println!("  {}: {}", status, count);
            }
            println!();

            println!("Latency:");
            println!("  Average: {}ms", self.latency_avg_ms);
            println!("  P50: {}ms", self.latency_p50_ms);
            println!("  P95: {}ms", self.latency_p95_ms);
            println!("  P99: {}ms", self.latency_p99_ms);
            println!();
        }

        if !self.error_reasons.is_empty() {
            println!("Error Breakdown:");
            let mut reasons: Vec<_> = self.error_reasons.iter().collect();
            reasons.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
            for (reason, count) in reasons {
                println!("  {}: {}", reason, count);
            }
            println!();
        }

        if is_final {
            println!("=======================\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(status: u16, latency_ms: u64) -> RequestRecord {
        RequestRecord {
            outcome: RequestOutcome::Completed {
                status: StatusCode::from_u16(status).unwrap(),
            },
            latency_ms,
        }
    }

    #[test]
    fn test_stats_recording() {
        let stats = Stats::new();

        stats.record(completed(200, 100));
        stats.record(completed(200, 300));
        stats.record(completed(503, 50));
        stats.record(RequestRecord {
            outcome: RequestOutcome::TransportError {
                error: "connection refused".to_string(),
            },
            latency_ms: 10,
        });
        stats.record_batch();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.batches, 1);
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.succeeded, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.transport_errors, 1);
        assert_eq!(snapshot.status_codes.get(&200), Some(&2));
        assert_eq!(snapshot.status_codes.get(&503), Some(&1));
        assert_eq!(
            snapshot.error_reasons.get("transport: connection refused"),
            Some(&1)
        );
        assert_eq!(snapshot.success_rate(), 50.0);
    }

    #[test]
    fn test_latency_percentiles() {
        let stats = Stats::new();
        for latency in 1..=100 {
            stats.record(completed(200, latency));
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.latency_avg_ms, 50);
        assert_eq!(snapshot.latency_p50_ms, 51);
        assert_eq!(snapshot.latency_p95_ms, 96);
        assert_eq!(snapshot.latency_p99_ms, 100);
    }

    #[test]
    fn test_only_latencies_are_retained() {
        let stats = Stats::new();
        for _ in 0..3 {
            stats.record(RequestRecord {
                outcome: RequestOutcome::TransportError {
                    error: "connection reset by peer".to_string(),
                },
                latency_ms: 7,
            });
        }

        assert_eq!(stats.lock().latencies_ms, vec![7, 7, 7]);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(
            snapshot.error_reasons.get("transport: connection reset by peer"),
            Some(&3)
        );
    }

    #[test]
    fn test_mark_start_excludes_earlier_time() {
        let stats = Stats::new();
        stats.lock().start_time = Utc::now() - chrono::Duration::seconds(30);
        assert!(stats.snapshot().elapsed_seconds >= 30);

        stats.mark_start();
        stats.record(completed(200, 5));
        assert_eq!(stats.snapshot().elapsed_seconds, 0);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Stats::new().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.latency_p99_ms, 0);
        assert_eq!(snapshot.success_rate(), 0.0);
    }

    #[test]
    fn test_markers() {
        assert_eq!(completed(500, 1).outcome.marker(), '.');
        assert_eq!(
            RequestOutcome::TransportError {
                error: "timeout".to_string()
            }
            .marker(),
            'x'
        );
    }
}
