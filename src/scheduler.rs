use crate::api::DeviceApi;
use crate::error::ApiError;
use crate::models::DeviceId;
use crate::store::{DeviceStore, Notice, PollState, StoreEvent};
use crate::tokens::{RefreshTarget, RequestToken};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};
use tokio::task::{AbortHandle, JoinError, JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

enum FetchResult {
    Applied,
    Stale,
    Failed(ApiError),
}

struct FetchOutcome {
    token: RequestToken,
    result: FetchResult,
}

/// Keeps the store fresh: a device list refresh on every tick and on demand,
/// and a metrics refresh whenever the selection or timeframe changes.
///
/// At most one fetch per target is in flight. A new trigger aborts the running
/// fetch for the same target, and the request token check in the store drops
/// any response that still slips through.
pub struct PollingScheduler<A> {
    api: A,
    store: DeviceStore,
    period: Duration,
    fetches: JoinSet<FetchOutcome>,
    in_flight: HashMap<RefreshTarget, (u64, AbortHandle)>,
    list_failure_reported: bool,
}

pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    store: DeviceStore,
}

impl<A> PollingScheduler<A>
where
    A: DeviceApi + Clone + Send + Sync + 'static,
{
    /// Starts polling on the current tokio runtime.
    pub fn spawn(api: A, store: DeviceStore, period: Duration) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let scheduler = PollingScheduler {
            api,
            store: store.clone(),
            period,
            fetches: JoinSet::new(),
            in_flight: HashMap::new(),
            list_failure_reported: false,
        };
        // Subscribe before spawning so no event sent after `spawn` returns is missed.
        let events = store.subscribe();
        let task = tokio::spawn(scheduler.run(shutdown_rx, events));
        info!(period_secs = period.as_secs_f64(), "polling scheduler started");

        SchedulerHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
            store,
        }
    }

    async fn run(
        mut self,
        mut shutdown: oneshot::Receiver<()>,
        mut events: broadcast::Receiver<StoreEvent>,
    ) {
        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    debug!("poll tick");
                    self.refresh_devices();
                }
                event = events.recv() => match event {
                    Ok(StoreEvent::RefreshRequested) => self.refresh_devices(),
                    Ok(StoreEvent::SelectionChanged(Some(id))) => self.refresh_metrics(id),
                    Ok(StoreEvent::TimeframeChanged(_)) => {
                        if let Some(id) = self.store.selected_id() {
                            self.refresh_metrics(id);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "scheduler fell behind store events, refreshing everything");
                        self.refresh_devices();
                        if let Some(id) = self.store.selected_id() {
                            self.refresh_metrics(id);
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(done) = self.fetches.join_next() => self.on_fetch_done(done),
            }
        }

        self.fetches.abort_all();
        self.store.set_poll_state(PollState::Idle);
        info!("polling scheduler stopped");
    }

    fn begin(&mut self, target: RefreshTarget) -> Option<RequestToken> {
        let token = self.store.begin_refresh(target)?;
        if let Some((seq, previous)) = self.in_flight.remove(&target) {
            debug!(?target, seq, "cancelling in-flight refresh");
            previous.abort();
        }
        Some(token)
    }

    fn refresh_devices(&mut self) {
        let Some(token) = self.begin(RefreshTarget::DeviceList) else {
            return;
        };
        self.store.set_poll_state(PollState::Polling);

        let api = self.api.clone();
        let store = self.store.clone();
        let handle = self.fetches.spawn(async move {
            let result = match api.list_devices().await {
                Ok(devices) => {
                    if store.apply_devices(&token, devices) {
                        FetchResult::Applied
                    } else {
                        FetchResult::Stale
                    }
                }
                Err(e) => FetchResult::Failed(e),
            };
            FetchOutcome { token, result }
        });
        self.in_flight
            .insert(RefreshTarget::DeviceList, (token.seq, handle));
    }

    fn refresh_metrics(&mut self, device_id: DeviceId) {
        let target = RefreshTarget::Metrics(device_id);
        let Some(token) = self.begin(target) else {
            return;
        };
        let timeframe = self.store.timeframe();

        let api = self.api.clone();
        let store = self.store.clone();
        let handle = self.fetches.spawn(async move {
            let result = match api.get_metrics(device_id, timeframe).await {
                Ok(samples) => {
                    if store.apply_metrics(&token, samples) {
                        FetchResult::Applied
                    } else {
                        FetchResult::Stale
                    }
                }
                Err(e) => FetchResult::Failed(e),
            };
            FetchOutcome { token, result }
        });
        self.in_flight.insert(target, (token.seq, handle));
    }

    fn on_fetch_done(&mut self, done: Result<FetchOutcome, JoinError>) {
        let outcome = match done {
            Ok(outcome) => outcome,
            // Aborted fetches were superseded.
            Err(e) if e.is_cancelled() => return,
            Err(e) => {
                warn!("refresh task failed: {}", e);
                return;
            }
        };

        let target = outcome.token.target;
        if matches!(self.in_flight.get(&target), Some((seq, _)) if *seq == outcome.token.seq) {
            self.in_flight.remove(&target);
        }
        if !self.in_flight.contains_key(&RefreshTarget::DeviceList) {
            self.store.set_poll_state(PollState::Idle);
        }

        match (target, outcome.result) {
            (_, FetchResult::Stale) => {
                debug!(?target, seq = outcome.token.seq, "refresh superseded");
            }
            (RefreshTarget::DeviceList, FetchResult::Applied) => {
                self.list_failure_reported = false;
            }
            (RefreshTarget::Metrics(_), FetchResult::Applied) => {}
            (RefreshTarget::DeviceList, FetchResult::Failed(e)) => {
                warn!("Error fetching devices: {}", e);
                // One notice per outage, not one per tick.
                if !self.list_failure_reported && self.store.is_current(&outcome.token) {
                    self.list_failure_reported = true;
                    self.store
                        .push_notice(Notice::error("Refresh failed", format!("Unable to load devices: {e}")));
                }
            }
            (RefreshTarget::Metrics(device_id), FetchResult::Failed(e)) => {
                warn!(device_id, "Error fetching metrics: {}", e);
                if self.store.is_current(&outcome.token) && self.store.selected_id() == Some(device_id) {
                    self.store
                        .push_notice(Notice::error("Metrics unavailable", format!("Unable to load metrics: {e}")));
                }
            }
        }
    }
}

impl SchedulerHandle {
    /// Stops polling and waits for the loop to exit. The store is closed, so
    /// nothing fetched afterwards can be applied.
    pub async fn shutdown(mut self) {
        self.store.close();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("polling scheduler ended abnormally: {}", e);
                }
            }
        }
    }

    /// Non-blocking variant of [`shutdown`](Self::shutdown) for UI teardown.
    pub fn stop(&mut self) {
        self.store.close();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::models::{Device, DeviceStatus, MetricSample, SpeedTestResult, Timeframe};
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    type Scripted = (Duration, Result<Vec<DeviceId>, ()>);

    #[derive(Clone, Default)]
    struct FakeApi {
        list_calls: Arc<AtomicUsize>,
        script: Arc<Mutex<VecDeque<Scripted>>>,
        metric_calls: Arc<Mutex<Vec<(DeviceId, Timeframe)>>>,
    }

    impl FakeApi {
        fn scripted(responses: Vec<Scripted>) -> Self {
            let api = FakeApi::default();
            *api.script.lock().unwrap() = responses.into();
            api
        }
    }

    fn device(id: DeviceId) -> Device {
        Device {
            id,
            hostname: format!("host-{id}"),
            username: None,
            location: None,
            status: DeviceStatus::Online,
            connection_type: None,
            wifi_ssid: None,
            signal_strength: None,
            last_seen: None,
            latency: None,
            download_speed: None,
            upload_speed: None,
        }
    }

    impl DeviceApi for FakeApi {
        async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let (delay, result) = next.unwrap_or((Duration::ZERO, Ok(vec![1])));
            time::sleep(delay).await;
            match result {
                Ok(ids) => Ok(ids.into_iter().map(device).collect()),
                Err(()) => Err(ApiError::Network(NetworkError::Timeout(Duration::from_secs(10)))),
            }
        }

        async fn get_metrics(
            &self,
            device_id: DeviceId,
            timeframe: Timeframe,
        ) -> Result<Vec<MetricSample>, ApiError> {
            self.metric_calls.lock().unwrap().push((device_id, timeframe));
            Ok(vec![MetricSample {
                timestamp: Utc::now(),
                signal_strength: Some(-55.0),
                download_speed: Some(device_id as f64),
                upload_speed: None,
                latency: None,
                dns_resolution_time: None,
            }])
        }

        async fn run_speed_test(&self, _device_id: DeviceId) -> Result<SpeedTestResult, ApiError> {
            Ok(SpeedTestResult {
                download: 0.0,
                upload: 0.0,
            })
        }

        async fn delete_device(&self, _device_id: DeviceId) -> Result<(), ApiError> {
            Ok(())
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    fn ids(store: &DeviceStore) -> Vec<DeviceId> {
        store.snapshot().devices.iter().map(|d| d.id).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn initial_refresh_populates_store() {
        let api = FakeApi::scripted(vec![(Duration::ZERO, Ok(vec![1, 2]))]);
        let store = DeviceStore::new();
        let handle = PollingScheduler::spawn(api, store.clone(), Duration::from_secs(3600));

        assert!(wait_until(|| ids(&store) == vec![1, 2]).await);
        assert!(wait_until(|| store.snapshot().poll_state == PollState::Idle).await);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn new_refresh_cancels_slow_older_one() {
        let api = FakeApi::scripted(vec![
            (Duration::from_millis(300), Ok(vec![1])),
            (Duration::ZERO, Ok(vec![2])),
        ]);
        let store = DeviceStore::new();
        let handle =
            PollingScheduler::spawn(api.clone(), store.clone(), Duration::from_secs(3600));

        assert!(wait_until(|| api.list_calls.load(Ordering::SeqCst) == 1).await);
        store.request_refresh();

        assert!(wait_until(|| ids(&store) == vec![2]).await);
        time::sleep(Duration::from_millis(400)).await;
        assert_eq!(ids(&store), vec![2]);
        handle.shutdown().await;
    }

    /// The first list call keeps its worker busy until the newer refresh has
    /// landed, so the cancel cannot stop it and only the token check can.
    #[derive(Clone)]
    struct LateListApi {
        store: DeviceStore,
        calls: Arc<AtomicUsize>,
        late_returned: Arc<AtomicBool>,
    }

    impl DeviceApi for LateListApi {
        async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                return Ok(vec![device(2)]);
            }
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            while ids(&self.store) != vec![2] && std::time::Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            self.late_returned.store(true, Ordering::SeqCst);
            Ok(vec![device(1)])
        }

        async fn get_metrics(
            &self,
            _device_id: DeviceId,
            _timeframe: Timeframe,
        ) -> Result<Vec<MetricSample>, ApiError> {
            Ok(Vec::new())
        }

        async fn run_speed_test(&self, _device_id: DeviceId) -> Result<SpeedTestResult, ApiError> {
            Ok(SpeedTestResult {
                download: 0.0,
                upload: 0.0,
            })
        }

        async fn delete_device(&self, _device_id: DeviceId) -> Result<(), ApiError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn response_outliving_its_cancel_is_discarded() {
        let store = DeviceStore::new();
        let api = LateListApi {
            store: store.clone(),
            calls: Arc::new(AtomicUsize::new(0)),
            late_returned: Arc::new(AtomicBool::new(false)),
        };
        let handle =
            PollingScheduler::spawn(api.clone(), store.clone(), Duration::from_secs(3600));

        assert!(wait_until(|| api.calls.load(Ordering::SeqCst) == 1).await);
        store.request_refresh();

        assert!(wait_until(|| api.late_returned.load(Ordering::SeqCst)).await);
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ids(&store), vec![2]);
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_refresh_periodically() {
        let api = FakeApi::default();
        let store = DeviceStore::new();
        let handle =
            PollingScheduler::spawn(api.clone(), store.clone(), Duration::from_millis(40));

        assert!(wait_until(|| api.list_calls.load(Ordering::SeqCst) >= 3).await);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn selection_and_timeframe_trigger_metrics() {
        let api = FakeApi::scripted(vec![(Duration::ZERO, Ok(vec![7, 8]))]);
        let store = DeviceStore::new();
        let handle =
            PollingScheduler::spawn(api.clone(), store.clone(), Duration::from_secs(3600));

        assert!(wait_until(|| ids(&store) == vec![7, 8]).await);
        store.select(8);
        assert!(wait_until(|| store.snapshot().metrics.len() == 1).await);
        assert_eq!(store.snapshot().metrics[0].download_speed, Some(8.0));

        store.set_timeframe(Timeframe::Month);
        assert!(wait_until(|| api.metric_calls.lock().unwrap().len() == 2).await);
        assert_eq!(
            *api.metric_calls.lock().unwrap(),
            vec![(8, Timeframe::Hour), (8, Timeframe::Month)]
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_raise_one_notice() {
        let api = FakeApi::scripted(vec![(Duration::ZERO, Err(())); 50]);
        let store = DeviceStore::new();
        store.replace_devices(vec![device(3)]);
        let handle =
            PollingScheduler::spawn(api.clone(), store.clone(), Duration::from_millis(30));

        assert!(wait_until(|| api.list_calls.load(Ordering::SeqCst) >= 3).await);
        handle.shutdown().await;

        assert_eq!(ids(&store), vec![3]);
        assert!(store.dismiss_notice().is_some());
        assert!(store.dismiss_notice().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_polling_and_closes_store() {
        let api = FakeApi::default();
        let store = DeviceStore::new();
        let handle =
            PollingScheduler::spawn(api.clone(), store.clone(), Duration::from_millis(20));
        assert!(wait_until(|| api.list_calls.load(Ordering::SeqCst) >= 1).await);

        handle.shutdown().await;
        let calls = api.list_calls.load(Ordering::SeqCst);
        store.request_refresh();
        time::sleep(Duration::from_millis(100)).await;

        assert!(store.is_closed());
        assert_eq!(api.list_calls.load(Ordering::SeqCst), calls);
        assert_eq!(store.snapshot().poll_state, PollState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_response_after_stop_is_dropped() {
        let api = FakeApi::scripted(vec![(Duration::from_millis(200), Ok(vec![9]))]);
        let store = DeviceStore::new();
        let mut handle =
            PollingScheduler::spawn(api.clone(), store.clone(), Duration::from_secs(3600));
        assert!(wait_until(|| api.list_calls.load(Ordering::SeqCst) == 1).await);

        handle.stop();
        time::sleep(Duration::from_millis(300)).await;

        assert!(ids(&store).is_empty());
    }
}
