//! Periodic refresh of station snapshots.
//!
//! The coordinator owns the set of registered stations, the latest snapshot per
//! station and the cached station metadata. A refresh cycle fetches every
//! registered station, swaps the merged map in under one write lock and then
//! notifies listeners. At most one cycle runs at a time.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::{
        Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde_json::json;
use tokio::{
    sync::{Mutex as AsyncMutex, watch},
    task::{self, JoinHandle},
    time::{self, MissedTickBehavior},
};

use crate::{
    client::StationClient,
    error::EnvistaError,
    model::{CoordinatorData, StationData, StationId, StationInfo},
};

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&CoordinatorData) + Send + Sync>;

/// Result of one completed refresh cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub updated: Vec<StationId>,
    pub failed: Vec<(StationId, EnvistaError)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Completed(RefreshReport),
    /// Another cycle was already in flight.
    Skipped,
}

pub struct UpdateCoordinator {
    client: Arc<dyn StationClient>,
    fetch_timeout: Option<Duration>,
    stations: RwLock<BTreeSet<StationId>>,
    data: RwLock<Arc<CoordinatorData>>,
    station_info: RwLock<HashMap<StationId, StationInfo>>,
    last_errors: RwLock<HashMap<StationId, EnvistaError>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,
    refresh_gate: AsyncMutex<()>,
    updates: watch::Sender<Arc<CoordinatorData>>,
}

impl UpdateCoordinator {
    pub fn new(client: Arc<dyn StationClient>) -> Self {
        let (updates, _) = watch::channel(Arc::new(CoordinatorData::new()));
        Self {
            client,
            fetch_timeout: None,
            stations: RwLock::new(BTreeSet::new()),
            data: RwLock::new(Arc::new(CoordinatorData::new())),
            station_info: RwLock::new(HashMap::new()),
            last_errors: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            refresh_gate: AsyncMutex::new(()),
            updates,
        }
    }

    /// Abort a single station's fetch after `timeout` and count it as failed.
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Add a station to the refresh set. Resolves the station through the
    /// client first, so an unknown id fails here rather than on every refresh.
    pub async fn register_station(&self, station_id: StationId) -> Result<(), EnvistaError> {
        if read(&self.stations).contains(&station_id) {
            return Ok(());
        }

        let info = self.get_station_info(station_id).await?;
        write(&self.stations).insert(station_id);
        tracing::info!(station_id, name = %info.name, "registered station");
        Ok(())
    }

    /// Drop a station together with its snapshot and cached metadata.
    pub fn unregister_station(&self, station_id: StationId) -> bool {
        let removed = write(&self.stations).remove(&station_id);
        if removed {
            {
                let mut data = write(&self.data);
                if data.contains_key(&station_id) {
                    let mut next = CoordinatorData::clone(&data);
                    next.remove(&station_id);
                    *data = Arc::new(next);
                }
            }
            write(&self.station_info).remove(&station_id);
            write(&self.last_errors).remove(&station_id);
            tracing::info!(station_id, "unregistered station");
        }
        removed
    }

    pub fn stations(&self) -> Vec<StationId> {
        read(&self.stations).iter().copied().collect()
    }

    /// Run one refresh cycle unless one is already running.
    ///
    /// Listeners are dispatched after the cycle has released its gate, so a
    /// slow listener never holds up the next refresh.
    pub async fn refresh(&self) -> RefreshOutcome {
        let (report, snapshot) = {
            let Ok(_guard) = self.refresh_gate.try_lock() else {
                tracing::debug!("refresh already in progress, skipping");
                return RefreshOutcome::Skipped;
            };
            self.run_cycle().await
        };

        self.notify(snapshot);
        RefreshOutcome::Completed(report)
    }

    /// Initial refresh during setup. Waits for any running cycle instead of
    /// skipping, and fails when stations are registered but none of them
    /// produced data.
    pub async fn first_refresh(&self) -> Result<RefreshReport, EnvistaError> {
        let (report, snapshot) = {
            let _guard = self.refresh_gate.lock().await;
            self.run_cycle().await
        };
        self.notify(snapshot);

        if !report.updated.is_empty() || report.failed.is_empty() {
            return Ok(report);
        }

        // A rejected token is more useful to the operator than "not ready".
        match report.failed.iter().find(|(_, e)| !e.is_transient()) {
            Some((_, err)) => Err(err.clone()),
            None => Err(EnvistaError::NotReady),
        }
    }

    async fn run_cycle(&self) -> (RefreshReport, Arc<CoordinatorData>) {
        let stations = self.stations();
        let mut report = RefreshReport::default();
        let mut fetched = Vec::with_capacity(stations.len());

        for station_id in stations {
            match self.fetch_latest(station_id).await {
                Ok(data) => fetched.push((station_id, data)),
                Err(err) => {
                    tracing::warn!(
                        station_id,
                        error = %err,
                        "refresh failed, keeping previous data"
                    );
                    report.failed.push((station_id, err));
                }
            }
        }

        let snapshot = {
            let registered = read(&self.stations);
            let mut data = write(&self.data);
            let mut next = CoordinatorData::clone(&data);
            for (station_id, station_data) in fetched {
                // Skip stations unregistered while their fetch was in flight.
                if registered.contains(&station_id) {
                    next.insert(station_id, station_data);
                    report.updated.push(station_id);
                }
            }
            report.failed.retain(|(station_id, _)| registered.contains(station_id));
            *data = Arc::new(next);
            Arc::clone(&data)
        };

        {
            let mut errors = write(&self.last_errors);
            for station_id in &report.updated {
                errors.remove(station_id);
            }
            for (station_id, err) in &report.failed {
                errors.insert(*station_id, err.clone());
            }
        }

        tracing::debug!(
            updated = report.updated.len(),
            failed = report.failed.len(),
            "refresh cycle finished"
        );

        self.updates.send_replace(Arc::clone(&snapshot));
        (report, snapshot)
    }

    async fn fetch_latest(&self, station_id: StationId) -> Result<StationData, EnvistaError> {
        let fetch = self.client.fetch_latest(station_id);
        match self.fetch_timeout {
            Some(after) => time::timeout(after, fetch)
                .await
                .map_err(|_| EnvistaError::Timeout { station_id, after })?,
            None => fetch.await,
        }
    }

    /// Hand every listener the snapshot on the blocking pool and return
    /// without waiting for them.
    fn notify(&self, snapshot: Arc<CoordinatorData>) {
        let listeners: Vec<(ListenerId, Listener)> = lock(&self.listeners)
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        for (id, listener) in listeners {
            let snapshot = Arc::clone(&snapshot);
            let handle = task::spawn_blocking(move || listener(&snapshot));
            tokio::spawn(async move {
                if handle.await.is_err_and(|err| err.is_panic()) {
                    tracing::error!(listener = id, "coordinator listener panicked");
                }
            });
        }
    }

    /// Latest snapshot for a station, `None` until a fetch has succeeded.
    pub fn get_latest(&self, station_id: StationId) -> Option<StationData> {
        read(&self.data).get(&station_id).cloned()
    }

    /// The whole snapshot map as of the last completed cycle.
    pub fn data(&self) -> Arc<CoordinatorData> {
        Arc::clone(&read(&self.data))
    }

    pub fn last_error(&self, station_id: StationId) -> Option<EnvistaError> {
        read(&self.last_errors).get(&station_id).cloned()
    }

    /// Station metadata, fetched on first use and cached afterwards.
    pub async fn get_station_info(
        &self,
        station_id: StationId,
    ) -> Result<StationInfo, EnvistaError> {
        if let Some(info) = self.cached_station_info(station_id) {
            return Ok(info);
        }

        let fetch = self.client.fetch_station_info(station_id);
        let info = match self.fetch_timeout {
            Some(after) => time::timeout(after, fetch)
                .await
                .map_err(|_| EnvistaError::Timeout { station_id, after })??,
            None => fetch.await?,
        };

        write(&self.station_info).insert(station_id, info.clone());
        Ok(info)
    }

    pub fn cached_station_info(&self, station_id: StationId) -> Option<StationInfo> {
        read(&self.station_info).get(&station_id).cloned()
    }

    pub fn invalidate_station_info(&self, station_id: StationId) {
        write(&self.station_info).remove(&station_id);
    }

    /// Call `listener` after every completed refresh cycle.
    ///
    /// Each call runs on tokio's blocking pool and the cycle does not wait for
    /// it. Calls from consecutive cycles may overlap.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CoordinatorData) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Receiver that always holds the latest snapshot map. Slow readers only
    /// miss intermediate values.
    pub fn watch(&self) -> watch::Receiver<Arc<CoordinatorData>> {
        self.updates.subscribe()
    }

    /// Refresh every `period` on a background task. The first tick is
    /// skipped since setup already ran an initial refresh.
    pub fn spawn(self: Arc<Self>, period: Duration) -> Result<JoinHandle<()>, EnvistaError> {
        if period.is_zero() {
            return Err(EnvistaError::InvalidConfiguration(
                "refresh interval must be greater than zero".into(),
            ));
        }

        Ok(tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let RefreshOutcome::Skipped = self.refresh().await {
                    tracing::warn!("previous refresh still running at scheduled tick");
                }
            }
        }))
    }

    /// Snapshot map and last errors for all stations, for operator debugging.
    pub fn diagnostics(&self) -> Result<serde_json::Value, serde_json::Error> {
        let data = self.data();
        let errors: HashMap<StationId, String> = read(&self.last_errors)
            .iter()
            .map(|(id, e)| (*id, e.to_string()))
            .collect();

        Ok(json!({
            "stations": self.stations(),
            "data": serde_json::to_value(&*data)?,
            "errors": serde_json::to_value(errors)?,
        }))
    }
}

impl fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("client", &self.client)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("stations", &self.stations())
            .finish_non_exhaustive()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::StationReading;
    use async_trait::async_trait;
    use std::{sync::atomic::AtomicUsize, time::Instant};
    use tokio::sync::mpsc;

    /// In-memory client with scripted responses.
    #[derive(Debug, Default)]
    pub(crate) struct FakeClient {
        latest: Mutex<HashMap<StationId, Result<StationData, EnvistaError>>>,
        info: Mutex<HashMap<StationId, StationInfo>>,
        delay: Option<Duration>,
        pub(crate) latest_calls: AtomicUsize,
        pub(crate) info_calls: AtomicUsize,
    }

    impl FakeClient {
        pub(crate) fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub(crate) fn add_station(&self, station_id: StationId, name: &str) {
            lock(&self.info).insert(
                station_id,
                StationInfo {
                    station_id,
                    name: name.to_string(),
                    short_name: None,
                    location: None,
                    active: true,
                    monitors: vec![],
                },
            );
        }

        pub(crate) fn set_latest(
            &self,
            station_id: StationId,
            result: Result<StationData, EnvistaError>,
        ) {
            lock(&self.latest).insert(station_id, result);
        }

        pub(crate) fn latest_calls(&self) -> usize {
            self.latest_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StationClient for FakeClient {
        async fn fetch_latest(&self, station_id: StationId) -> Result<StationData, EnvistaError> {
            self.latest_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let scripted = lock(&self.latest).get(&station_id).cloned();
            scripted.unwrap_or(Err(EnvistaError::TransientFetch {
                station_id,
                message: "no scripted response".into(),
            }))
        }

        async fn fetch_station_info(
            &self,
            station_id: StationId,
        ) -> Result<StationInfo, EnvistaError> {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            let info = lock(&self.info).get(&station_id).cloned();
            info.ok_or(EnvistaError::InvalidStation(station_id))
        }
    }

    pub(crate) fn data_with(station_id: StationId, td: f64, rain: Option<f64>) -> StationData {
        StationData {
            station_id,
            latest: Some(StationReading {
                td: Some(td),
                rain,
                ..Default::default()
            }),
        }
    }

    async fn single_station(client: &Arc<FakeClient>) -> UpdateCoordinator {
        client.add_station(1, "ONE");
        client.set_latest(1, Ok(data_with(1, 1.0, None)));
        let coordinator = UpdateCoordinator::new(client.clone());
        coordinator.register_station(1).await.expect("register");
        coordinator
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn register_unknown_station_fails() {
        let coordinator = UpdateCoordinator::new(Arc::new(FakeClient::default()));
        let err = coordinator.register_station(404).await.unwrap_err();
        assert_eq!(err, EnvistaError::InvalidStation(404));
        assert!(coordinator.stations().is_empty());
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let client = Arc::new(FakeClient::default());
        client.add_station(1, "ONE");
        let coordinator = UpdateCoordinator::new(client.clone());

        coordinator.register_station(1).await.expect("register");
        coordinator.register_station(1).await.expect("register again");

        assert_eq!(coordinator.stations(), vec![1]);
        assert_eq!(client.info_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_stores_snapshot_and_reads_are_stable() {
        let client = Arc::new(FakeClient::default());
        client.add_station(1, "ONE");
        client.set_latest(1, Ok(data_with(1, 20.5, Some(0.0))));
        let coordinator = UpdateCoordinator::new(client.clone());

        assert!(coordinator.get_latest(1).is_none());
        coordinator.register_station(1).await.expect("register");

        let outcome = coordinator.refresh().await;
        let expected = RefreshReport {
            updated: vec![1],
            failed: vec![],
        };
        assert_eq!(outcome, RefreshOutcome::Completed(expected));

        let first = coordinator.get_latest(1);
        let second = coordinator.get_latest(1);
        assert_eq!(first, Some(data_with(1, 20.5, Some(0.0))));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failing_station_keeps_previous_data() {
        let client = Arc::new(FakeClient::default());
        client.add_station(1, "A");
        client.add_station(2, "B");
        client.set_latest(1, Ok(data_with(1, 10.0, None)));
        client.set_latest(2, Ok(data_with(2, 11.0, None)));

        let coordinator = UpdateCoordinator::new(client.clone());
        coordinator.register_station(1).await.expect("register 1");
        coordinator.register_station(2).await.expect("register 2");
        coordinator.refresh().await;

        let failure = EnvistaError::TransientFetch {
            station_id: 1,
            message: "boom".into(),
        };
        client.set_latest(1, Err(failure.clone()));
        client.set_latest(2, Ok(data_with(2, 12.0, None)));

        let RefreshOutcome::Completed(report) = coordinator.refresh().await else {
            panic!("refresh should complete");
        };
        assert_eq!(report.updated, vec![2]);
        assert_eq!(report.failed, vec![(1, failure.clone())]);

        assert_eq!(coordinator.get_latest(1), Some(data_with(1, 10.0, None)));
        assert_eq!(coordinator.get_latest(2), Some(data_with(2, 12.0, None)));
        assert_eq!(coordinator.last_error(1), Some(failure));
        assert_eq!(coordinator.last_error(2), None);
    }

    #[tokio::test]
    async fn concurrent_refresh_is_skipped() {
        let client = Arc::new(FakeClient::with_delay(Duration::from_millis(50)));
        let coordinator = single_station(&client).await;

        let (a, b) = tokio::join!(coordinator.refresh(), coordinator.refresh());

        assert!(matches!(a, RefreshOutcome::Completed(_)));
        assert_eq!(b, RefreshOutcome::Skipped);
        assert_eq!(client.latest_calls(), 1);
    }

    #[tokio::test]
    async fn station_unregistered_mid_fetch_is_not_reported() {
        let client = Arc::new(FakeClient::with_delay(Duration::from_millis(50)));
        let coordinator = single_station(&client).await;

        let unregister = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            coordinator.unregister_station(1)
        };
        let (outcome, removed) = tokio::join!(coordinator.refresh(), unregister);

        assert!(removed);
        let expected = RefreshReport::default();
        assert_eq!(outcome, RefreshOutcome::Completed(expected));
        assert!(coordinator.get_latest(1).is_none());
    }

    #[tokio::test]
    async fn slow_fetch_times_out_for_that_station_only() {
        let client = Arc::new(FakeClient::with_delay(Duration::from_millis(200)));
        client.add_station(1, "ONE");
        client.set_latest(1, Ok(data_with(1, 1.0, None)));
        let coordinator = UpdateCoordinator::new(client.clone())
            .with_fetch_timeout(Some(Duration::from_millis(10)));
        coordinator.register_station(1).await.expect("register");

        let RefreshOutcome::Completed(report) = coordinator.refresh().await else {
            panic!("refresh should complete");
        };
        assert!(report.updated.is_empty());
        assert!(matches!(
            report.failed[0].1,
            EnvistaError::Timeout { station_id: 1, .. }
        ));
        assert!(coordinator.get_latest(1).is_none());
    }

    #[tokio::test]
    async fn listeners_are_notified_once_per_cycle() {
        let client = Arc::new(FakeClient::default());
        let coordinator = single_station(&client).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = coordinator.subscribe(move |data| {
            let _ = tx.send(data.contains_key(&1));
        });

        coordinator.refresh().await;
        coordinator.refresh().await;
        assert_eq!(rx.recv().await, Some(true));
        assert_eq!(rx.recv().await, Some(true));

        assert!(coordinator.unsubscribe(id));
        assert!(!coordinator.unsubscribe(id));
        coordinator.refresh().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn panicking_listener_does_not_break_the_cycle() {
        let client = Arc::new(FakeClient::default());
        let coordinator = single_station(&client).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        coordinator.subscribe(|_| panic!("listener failure"));
        coordinator.subscribe(move |_| {
            let _ = tx.send(());
        });

        assert!(matches!(coordinator.refresh().await, RefreshOutcome::Completed(_)));
        assert!(matches!(coordinator.refresh().await, RefreshOutcome::Completed(_)));
        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(rx.recv().await, Some(()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_listener_does_not_stall_refresh() {
        let client = Arc::new(FakeClient::default());
        let coordinator = single_station(&client).await;
        coordinator.subscribe(|_| std::thread::sleep(Duration::from_millis(300)));

        let started = Instant::now();
        let first = coordinator.refresh().await;
        let second = coordinator.refresh().await;

        assert!(matches!(first, RefreshOutcome::Completed(_)));
        assert!(matches!(second, RefreshOutcome::Completed(_)));
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(client.latest_calls(), 2);
    }

    #[tokio::test]
    async fn watch_receives_latest_snapshot() {
        let client = Arc::new(FakeClient::default());
        client.add_station(1, "ONE");
        client.set_latest(1, Ok(data_with(1, 3.0, None)));
        let coordinator = UpdateCoordinator::new(client.clone());
        coordinator.register_station(1).await.expect("register");

        let mut rx = coordinator.watch();
        coordinator.refresh().await;

        rx.changed().await.expect("sender alive");
        assert_eq!(rx.borrow().get(&1), Some(&data_with(1, 3.0, None)));
    }

    #[tokio::test]
    async fn first_refresh_fails_when_nothing_arrives() {
        let client = Arc::new(FakeClient::default());
        client.add_station(1, "ONE");
        let coordinator = UpdateCoordinator::new(client.clone());
        coordinator.register_station(1).await.expect("register");

        let err = coordinator.first_refresh().await.unwrap_err();
        assert_eq!(err, EnvistaError::NotReady);

        let rejected = EnvistaError::InvalidConfiguration("token rejected".into());
        client.set_latest(1, Err(rejected.clone()));
        assert_eq!(coordinator.first_refresh().await.unwrap_err(), rejected);

        client.set_latest(1, Ok(data_with(1, 1.0, None)));
        let report = coordinator.first_refresh().await.expect("first refresh");
        assert_eq!(report.updated, vec![1]);
    }

    #[tokio::test]
    async fn station_info_is_cached_until_invalidated() {
        let client = Arc::new(FakeClient::default());
        client.add_station(1, "ONE");
        let coordinator = UpdateCoordinator::new(client.clone());

        assert!(coordinator.cached_station_info(1).is_none());
        coordinator.get_station_info(1).await.expect("info");
        coordinator.get_station_info(1).await.expect("info");
        assert_eq!(client.info_calls.load(Ordering::SeqCst), 1);

        coordinator.invalidate_station_info(1);
        coordinator.get_station_info(1).await.expect("info");
        assert_eq!(client.info_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unregister_drops_station_state() {
        let client = Arc::new(FakeClient::default());
        let coordinator = single_station(&client).await;
        coordinator.refresh().await;

        assert!(coordinator.unregister_station(1));
        assert!(coordinator.get_latest(1).is_none());
        assert!(coordinator.cached_station_info(1).is_none());
        assert!(!coordinator.unregister_station(1));
    }

    #[tokio::test]
    async fn spawn_rejects_zero_period() {
        let client = Arc::new(FakeClient::default());
        let coordinator = Arc::new(single_station(&client).await);

        let err = coordinator.spawn(Duration::ZERO).unwrap_err();
        assert!(matches!(err, EnvistaError::InvalidConfiguration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_refreshes_once_per_period() {
        let client = Arc::new(FakeClient::default());
        let coordinator = Arc::new(single_station(&client).await);

        let handle = Arc::clone(&coordinator)
            .spawn(Duration::from_secs(60))
            .expect("spawn");
        settle().await;
        assert_eq!(client.latest_calls(), 0, "first tick is skipped");

        time::advance(Duration::from_secs(59)).await;
        settle().await;
        assert_eq!(client.latest_calls(), 0);

        time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(client.latest_calls(), 1);

        time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(client.latest_calls(), 2);
        assert!(coordinator.get_latest(1).is_some());

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_skips_tick_while_refresh_in_flight() {
        let client = Arc::new(FakeClient::with_delay(Duration::from_secs(90)));
        let coordinator = Arc::new(single_station(&client).await);

        let handle = Arc::clone(&coordinator)
            .spawn(Duration::from_secs(60))
            .expect("spawn");
        let manual = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.refresh().await })
        };
        settle().await;
        assert_eq!(client.latest_calls(), 1);

        // Tick at 60s finds the manual refresh still fetching.
        time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(client.latest_calls(), 1);

        time::advance(Duration::from_secs(30)).await;
        let outcome = manual.await.expect("manual refresh task");
        assert!(matches!(outcome, RefreshOutcome::Completed(_)));

        time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(client.latest_calls(), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn diagnostics_include_data_and_errors() {
        let client = Arc::new(FakeClient::default());
        client.add_station(1, "A");
        client.add_station(2, "B");
        client.set_latest(1, Ok(data_with(1, 9.5, Some(2.0))));
        let coordinator = UpdateCoordinator::new(client.clone());
        coordinator.register_station(1).await.expect("register");
        coordinator.register_station(2).await.expect("register");
        coordinator.refresh().await;

        let dump = coordinator.diagnostics().expect("diagnostics");
        assert_eq!(dump["stations"], json!([1, 2]));
        assert_eq!(dump["data"]["1"]["latest"]["td"], json!(9.5));
        let error = dump["errors"]["2"].as_str().unwrap_or_default();
        assert!(error.contains("no scripted response"));
    }
}
