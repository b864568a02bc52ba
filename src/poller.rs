//! Fixed-rate poll driver.
//!
//! Each tick spawns an independent fetch → normalize → merge → dispatch
//! cycle. Ticks are measured start-to-start, so a slow fetch never delays
//! the next cycle and cycles may overlap. Only the fetch awaits; the
//! processing phase runs under the tracker lock, one cycle at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::PollerConfig;
use crate::fetch::{BasicClient, CacheBust, HttpClient, fetch_bytes};
use crate::parser::parse_batch;
use crate::tracker::{BatchReport, BusTracker};

/// Shortest schedule period; `tokio::time::interval` rejects zero.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle shared between the caller and every cycle task.
pub type SharedTracker = Arc<Mutex<BusTracker>>;

pub struct Poller<C> {
    client: Arc<C>,
    tracker: SharedTracker,
    url: Arc<str>,
    cycles: Arc<AtomicU64>,
}

impl<C> Clone for Poller<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            tracker: Arc::clone(&self.tracker),
            url: Arc::clone(&self.url),
            cycles: Arc::clone(&self.cycles),
        }
    }
}

impl Poller<CacheBust<BasicClient>> {
    /// Builds a poller for `config.base_url` with a time-stamped cache
    /// buster, applying the config's debug toggle to `tracker`.
    pub fn from_config(config: &PollerConfig, tracker: SharedTracker) -> Result<Self> {
        tracker
            .lock()
            .map_err(|_| anyhow!("bus tracker lock poisoned"))?
            .use_debug(config.debug);
        Ok(Self::new(
            CacheBust::now(BasicClient::new()),
            tracker,
            config.base_url.as_str(),
        ))
    }
}

impl<C: HttpClient + 'static> Poller<C> {
    pub fn new(client: C, tracker: SharedTracker, url: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            tracker,
            url: Arc::from(url.into()),
            cycles: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn tracker(&self) -> SharedTracker {
        Arc::clone(&self.tracker)
    }

    /// Runs one fetch-and-process cycle.
    ///
    /// # Errors
    ///
    /// Fails when the fetch or the batch parse fails; the registry is left
    /// untouched in that case.
    pub async fn run_cycle(&self) -> Result<BatchReport> {
        let bytes = fetch_bytes(self.client.as_ref(), &self.url).await?;
        let raw = parse_batch(&bytes)?;
        debug!(records = raw.len(), "Raw batch received");

        let mut tracker = self
            .tracker
            .lock()
            .map_err(|_| anyhow!("bus tracker lock poisoned"))?;
        Ok(tracker.process_batch(&raw))
    }

    /// Runs one cycle and logs its outcome instead of returning it.
    async fn run_logged(&self) {
        match self.run_cycle().await {
            Ok(report) => info!(
                records = report.records,
                inserted = report.inserted,
                updated = report.updated,
                fallbacks = report.fallbacks,
                listener_failures = report.dispatch.failures,
                "Poll cycle completed"
            ),
            Err(e) => error!(error = %format!("{e:#}"), "Failed to fetch bus data"),
        }
    }

    /// Starts polling: one cycle immediately, then one every `interval`.
    ///
    /// Polling continues until [`PollHandle::stop`] is called. An interval
    /// shorter than [`MIN_INTERVAL`] is raised to it.
    pub fn start(&self, interval: Duration) -> PollHandle {
        let interval = if interval < MIN_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                min_ms = MIN_INTERVAL.as_millis() as u64,
                "Poll interval too short, clamping"
            );
            MIN_INTERVAL
        } else {
            interval
        };
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let poller = self.clone();

        info!(interval_ms = interval.as_millis() as u64, url = %self.url, "Polling started");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let cycle = poller.cycles.fetch_add(1, Ordering::Relaxed) + 1;
                        let span = tracing::info_span!("poll_cycle", cycle);
                        let poller = poller.clone();
                        tokio::spawn(async move { poller.run_logged().await }.instrument(span));
                    }
                }
            }
            info!("Polling stopped");
        });

        PollHandle { cancel, task }
    }

    /// Number of cycles started so far.
    pub fn cycles_started(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

/// Controls a running poll schedule.
///
/// Dropping the handle does not stop polling.
pub struct PollHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Cancels future ticks. Cycles already in flight run to completion
    /// and still dispatch their results.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits until the scheduler task has exited after [`PollHandle::stop`].
    ///
    /// # Errors
    ///
    /// Fails when the scheduler task panicked or was aborted.
    pub async fn join(self) -> Result<()> {
        self.task.await.map_err(|e| {
            error!(error = %e, "Poll scheduler task failed");
            anyhow!("poll scheduler task failed: {e}")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticClient;
    use crate::types::BusRecord;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    const BATCH: &str = r#"[
        [12895, 4275, "SDF0010146", "1", "Stop A", "Route A", "23:00", "23:34", "", "roja", "blanca", "E2001A", "2", "", "9", ["12895", "4275"]],
        [13000, 4300, "SDF0010147", "7", "Stop B", "Route B", "23:05", "23:40", "", "azul", "blanca", "0055A5", "3", "", "4", []]
    ]"#;

    fn tracker() -> SharedTracker {
        Arc::new(Mutex::new(BusTracker::new()))
    }

    /// Reports each global batch size on a channel.
    fn watch_batches(tracker: &SharedTracker) -> mpsc::UnboundedReceiver<usize> {
        let (tx, rx) = mpsc::unbounded_channel();
        tracker
            .lock()
            .unwrap()
            .subscriptions_mut()
            .subscribe_global(move |batch: &[BusRecord]| {
                let _ = tx.send(batch.len());
            });
        rx
    }

    /// Serves queued responses in order, repeating the last one.
    struct SequenceClient {
        responses: Mutex<VecDeque<(u16, String)>>,
    }

    impl SequenceClient {
        fn new(responses: &[(u16, &str)]) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .iter()
                        .map(|(s, b)| (*s, b.to_string()))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl HttpClient for SequenceClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            let (status, body) = {
                let mut queue = self.responses.lock().unwrap();
                if queue.len() > 1 {
                    queue.pop_front().unwrap()
                } else {
                    queue.front().cloned().unwrap()
                }
            };
            StaticClient::with_status(status, body).execute(req).await
        }
    }

    /// Delays every response, counting requests as they start.
    struct SlowClient {
        delay: Duration,
        started: Arc<AtomicUsize>,
        inner: StaticClient,
    }

    #[async_trait]
    impl HttpClient for SlowClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.started.fetch_add(1, Ordering::SeqCst);
            sleep(self.delay).await;
            self.inner.execute(req).await
        }
    }

    #[tokio::test]
    async fn test_run_cycle_merges_and_dispatches() {
        let tracker = tracker();
        let mut batches = watch_batches(&tracker);
        let poller = Poller::new(
            CacheBust::fixed(StaticClient::ok(BATCH), "1"),
            Arc::clone(&tracker),
            "https://lpgc.es/guaguas/",
        );

        let report = poller.run_cycle().await.unwrap();

        assert_eq!(report.records, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(batches.try_recv().unwrap(), 2);
        assert_eq!(tracker.lock().unwrap().registry().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_aborts_only_that_cycle() {
        let tracker = tracker();
        let mut batches = watch_batches(&tracker);
        let poller = Poller::new(
            SequenceClient::new(&[(500, "oops"), (200, "not json"), (200, BATCH)]),
            Arc::clone(&tracker),
            "https://lpgc.es/guaguas/",
        );

        assert!(poller.run_cycle().await.is_err());
        assert!(poller.run_cycle().await.is_err());
        assert!(tracker.lock().unwrap().registry().is_empty());
        assert!(batches.try_recv().is_err());

        let report = poller.run_cycle().await.unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(batches.try_recv().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_start_runs_immediately_and_at_fixed_rate() {
        let tracker = tracker();
        let mut batches = watch_batches(&tracker);
        let poller = Poller::new(
            StaticClient::ok(BATCH),
            Arc::clone(&tracker),
            "https://lpgc.es/guaguas/",
        );

        let handle = poller.start(Duration::from_millis(20));
        for _ in 0..3 {
            let len = timeout(Duration::from_secs(5), batches.recv())
                .await
                .expect("cycle did not dispatch in time")
                .unwrap();
            assert_eq!(len, 2);
        }
        handle.stop();
        handle.join().await.unwrap();

        assert!(poller.cycles_started() >= 3);
        assert_eq!(tracker.lock().unwrap().registry().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped_and_polls() {
        let tracker = tracker();
        let mut batches = watch_batches(&tracker);
        let poller = Poller::new(
            StaticClient::ok(BATCH),
            Arc::clone(&tracker),
            "https://lpgc.es/guaguas/",
        );

        let handle = poller.start(Duration::ZERO);
        let len = timeout(Duration::from_secs(5), batches.recv())
            .await
            .expect("zero interval never polled")
            .unwrap();
        handle.stop();
        handle.join().await.unwrap();

        assert_eq!(len, 2);
        assert!(poller.cycles_started() >= 1);
    }

    #[tokio::test]
    async fn test_schedule_survives_failed_cycles() {
        let tracker = tracker();
        let mut batches = watch_batches(&tracker);
        let poller = Poller::new(
            SequenceClient::new(&[(502, ""), (502, ""), (200, BATCH)]),
            Arc::clone(&tracker),
            "https://lpgc.es/guaguas/",
        );

        let handle = poller.start(Duration::from_millis(10));
        let len = timeout(Duration::from_secs(5), batches.recv())
            .await
            .expect("schedule stopped after failures")
            .unwrap();
        handle.stop();

        assert_eq!(len, 2);
        assert!(poller.cycles_started() >= 3);
    }

    #[tokio::test]
    async fn test_slow_cycles_overlap() {
        let tracker = tracker();
        let mut batches = watch_batches(&tracker);
        let started = Arc::new(AtomicUsize::new(0));
        let poller = Poller::new(
            SlowClient {
                delay: Duration::from_millis(300),
                started: Arc::clone(&started),
                inner: StaticClient::ok(BATCH),
            },
            Arc::clone(&tracker),
            "https://lpgc.es/guaguas/",
        );

        let handle = poller.start(Duration::from_millis(20));
        sleep(Duration::from_millis(120)).await;

        assert!(started.load(Ordering::SeqCst) >= 2);
        assert!(batches.try_recv().is_err());
        handle.stop();
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_cycle_dispatch() {
        let tracker = tracker();
        let mut batches = watch_batches(&tracker);
        let started = Arc::new(AtomicUsize::new(0));
        let poller = Poller::new(
            SlowClient {
                delay: Duration::from_millis(100),
                started: Arc::clone(&started),
                inner: StaticClient::ok(BATCH),
            },
            Arc::clone(&tracker),
            "https://lpgc.es/guaguas/",
        );

        let handle = poller.start(Duration::from_secs(3600));
        sleep(Duration::from_millis(20)).await;
        handle.stop();
        assert!(handle.is_stopped());
        handle.join().await.unwrap();

        let len = timeout(Duration::from_secs(5), batches.recv())
            .await
            .expect("in-flight cycle was cancelled")
            .unwrap();
        assert_eq!(len, 2);
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_from_config_applies_debug_toggle() {
        let config = PollerConfig {
            debug: true,
            ..Default::default()
        };
        let poller = Poller::from_config(&config, tracker()).unwrap();
        assert!(poller.tracker().lock().unwrap().debug_enabled());
        assert_eq!(poller.cycles_started(), 0);
        assert_eq!(&*poller.url, crate::config::DEFAULT_URL);
    }
}
