// Dashboard service - Resolves the filter, runs fetch cycles and publishes snapshots
use crate::application::data_shaper::shape;
use crate::application::range_resolver::resolve_filter;
use crate::application::traffic_repository::{FetchError, TrafficRepository};
use crate::domain::dashboard::{DashboardData, DashboardSnapshot};
use crate::domain::time_range::{CustomSelection, FilterState, Preset, TimeRange};
use crate::domain::traffic::{CongestionQuery, JamsPayload};
use crate::infrastructure::config::DashboardConfig;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// A fetch cycle that has been numbered and announced as loading
struct Cycle {
    number: u64,
    range: TimeRange,
}

#[derive(Clone)]
pub struct DashboardService {
    repository: Arc<dyn TrafficRepository>,
    config: DashboardConfig,
    filter: Arc<Mutex<FilterState>>,
    cycles: Arc<AtomicU64>,
    snapshot: Arc<watch::Sender<Arc<DashboardSnapshot>>>,
}

impl DashboardService {
    pub fn new(repository: Arc<dyn TrafficRepository>, config: DashboardConfig) -> Self {
        let filter = FilterState::new(config.default_preset);
        let (snapshot, _) = watch::channel(Arc::new(DashboardSnapshot::empty(filter)));

        Self {
            repository,
            config,
            filter: Arc::new(Mutex::new(filter)),
            cycles: Arc::new(AtomicU64::new(0)),
            snapshot: Arc::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> Arc<DashboardSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DashboardSnapshot>> {
        self.snapshot.subscribe()
    }

    pub async fn select_preset(&self, preset: Preset) -> Arc<DashboardSnapshot> {
        self.select_preset_at(preset, Utc::now()).await
    }

    pub async fn select_preset_at(&self, preset: Preset, now: DateTime<Utc>) -> Arc<DashboardSnapshot> {
        let started = self.begin(now, |f| f.preset = preset);
        self.finish(started, now).await
    }

    pub async fn select_custom(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Arc<DashboardSnapshot> {
        self.select_custom_at(from, to, Utc::now()).await
    }

    /// Store the date-picker selection and switch to the custom preset. Nothing
    /// is fetched until both endpoints are present.
    pub async fn select_custom_at(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Arc<DashboardSnapshot> {
        let started = self.begin(now, |f| {
            f.preset = Preset::Custom;
            f.custom = CustomSelection::new(from, to);
        });
        self.finish(started, now).await
    }

    pub async fn select_day(&self, day: NaiveDate) -> Arc<DashboardSnapshot> {
        self.select_day_at(day, Utc::now()).await
    }

    pub async fn select_day_at(&self, day: NaiveDate, now: DateTime<Utc>) -> Arc<DashboardSnapshot> {
        let started = self.begin(now, |f| {
            f.preset = Preset::Day;
            f.day = Some(day);
        });
        self.finish(started, now).await
    }

    pub async fn refresh(&self) -> Arc<DashboardSnapshot> {
        self.refresh_at(Utc::now()).await
    }

    /// Re-run the fetch cycle for the current range without re-resolving it.
    /// Does nothing while a custom selection is missing a date.
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> Arc<DashboardSnapshot> {
        let started = {
            let filter = self.lock_filter();
            self.current_range(&filter, now)
                .map(|range| self.start_cycle(*filter, range))
        };
        self.finish(started, now).await
    }

    pub async fn traffic_jams(&self) -> Result<Option<JamsPayload>, FetchError> {
        self.traffic_jams_at(Utc::now()).await
    }

    /// Jam alerts for the current range; `None` while no range is resolvable.
    pub async fn traffic_jams_at(&self, now: DateTime<Utc>) -> Result<Option<JamsPayload>, FetchError> {
        let range = {
            let filter = self.lock_filter();
            self.current_range(&filter, now)
        };
        let Some(range) = range else {
            return Ok(None);
        };

        let jams = self
            .repository
            .traffic_jams(&range, self.config.speed_threshold)
            .await?;
        Ok(Some(jams))
    }

    /// The published range, or the filter's own range before the first cycle.
    /// `None` for a custom selection that still lacks a date.
    fn current_range(&self, filter: &FilterState, now: DateTime<Utc>) -> Option<TimeRange> {
        let resolved = resolve_filter(filter, &now)?;
        Some(self.snapshot().range.unwrap_or(resolved))
    }

    fn lock_filter(&self) -> MutexGuard<'_, FilterState> {
        self.filter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Change the filter and, if it resolves to a range, start a cycle for it.
    /// The filter lock is held throughout so cycle numbers follow filter order.
    fn begin(&self, now: DateTime<Utc>, change: impl FnOnce(&mut FilterState)) -> Option<Cycle> {
        let mut guard = self.lock_filter();
        change(&mut guard);
        let filter = *guard;

        match resolve_filter(&filter, &now) {
            Some(range) => Some(self.start_cycle(filter, range)),
            None => {
                tracing::debug!("Custom range incomplete, waiting for second date");
                self.snapshot
                    .send_modify(|snap| *snap = Arc::new(snap.with_filter(filter)));
                None
            }
        }
    }

    /// Caller must hold the filter lock.
    fn start_cycle(&self, filter: FilterState, range: TimeRange) -> Cycle {
        let number = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        self.snapshot
            .send_modify(|snap| *snap = Arc::new(snap.loading(number, filter, range)));

        tracing::info!(
            cycle = number,
            preset = %filter.preset,
            start = %range.start(),
            end = %range.end(),
            "Fetching dashboard data"
        );
        Cycle { number, range }
    }

    async fn finish(&self, started: Option<Cycle>, now: DateTime<Utc>) -> Arc<DashboardSnapshot> {
        let Some(cycle) = started else {
            return self.snapshot();
        };

        let result = self.fetch_all(&cycle.range).await;

        let published = self.snapshot.send_if_modified(|snap| {
            if snap.cycle != cycle.number {
                return false;
            }
            let next = match result {
                Ok(data) => snap.loaded(data, now),
                Err(e) => snap.failed(e.to_string(), now),
            };
            *snap = Arc::new(next);
            true
        });
        if !published {
            tracing::debug!(cycle = cycle.number, "Discarding stale fetch cycle result");
        }

        self.snapshot()
    }

    /// Run the four queries concurrently and wait for all of them. Any failure
    /// fails the whole cycle with the first error in query order.
    async fn fetch_all(&self, range: &TimeRange) -> Result<DashboardData, FetchError> {
        let congestion_query = CongestionQuery {
            traffic_cam_id: self.config.traffic_cam_id,
            speed_threshold: self.config.speed_threshold,
        };

        let (stats, peak_hours, congestion, records) = futures::join!(
            self.repository.traffic_stats(range),
            self.repository.peak_hours(range),
            self.repository.congestion(range, &congestion_query),
            self.repository.traffic_records(range),
        );

        let stats = logged("stats", stats);
        let peak_hours = logged("peak_hours", peak_hours);
        let congestion = logged("congestion", congestion);
        let records = logged("traffic_records", records);

        let stats = stats?;
        let peak_hours = peak_hours?;
        let congestion = congestion?;
        let records = records?;

        let chart = shape(&records);
        Ok(DashboardData {
            stats,
            peak_hours,
            congestion,
            records,
            chart,
        })
    }
}

fn logged<T>(query: &str, result: Result<T, FetchError>) -> Result<T, FetchError> {
    if let Err(e) = &result {
        tracing::warn!(query, error = %e, "Dashboard query failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::range_resolver::resolve;
    use crate::domain::dashboard::NO_RECORDS_NOTICE;
    use crate::domain::traffic::{
        Congestion, PeakHour, PeakHours, RecordsPayload, TrafficJam, TrafficRecord, TrafficStats,
    };
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Query {
        Stats,
        PeakHours,
        Congestion,
        Records,
    }

    #[derive(Default)]
    struct FakeRepository {
        calls: AtomicUsize,
        failing: Mutex<Vec<Query>>,
        empty_records: bool,
        /// Records query for this range blocks until the sender fires
        hold: Mutex<Option<(TimeRange, oneshot::Receiver<()>)>>,
        congestion_queries: Mutex<Vec<CongestionQuery>>,
        ranges: Mutex<Vec<TimeRange>>,
    }

    impl FakeRepository {
        fn check(&self, query: Query) -> Result<(), FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.lock().unwrap().contains(&query) {
                return Err(FetchError::Api {
                    status: Some(500),
                    message: format!("{:?} failed", query),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TrafficRepository for FakeRepository {
        async fn traffic_stats(&self, range: &TimeRange) -> Result<TrafficStats, FetchError> {
            self.ranges.lock().unwrap().push(*range);
            self.check(Query::Stats)?;
            Ok(TrafficStats {
                average_speed: Some(42.0),
                total_vehicle_count: Some(24685.0),
            })
        }

        async fn peak_hours(&self, _range: &TimeRange) -> Result<PeakHours, FetchError> {
            self.check(Query::PeakHours)?;
            Ok(PeakHours {
                peak_hours: vec![PeakHour {
                    hour: "08:00 - 09:00".to_string(),
                    vehicle_count: 1850.0,
                }],
            })
        }

        async fn congestion(
            &self,
            _range: &TimeRange,
            query: &CongestionQuery,
        ) -> Result<Congestion, FetchError> {
            self.congestion_queries.lock().unwrap().push(*query);
            self.check(Query::Congestion)?;
            Ok(Congestion {
                congestion_percentage: 68.0,
                status: "congestionado".to_string(),
            })
        }

        async fn traffic_records(&self, range: &TimeRange) -> Result<RecordsPayload, FetchError> {
            let held = {
                let mut hold = self.hold.lock().unwrap();
                match hold.take() {
                    Some((held_range, rx)) if held_range == *range => Some(rx),
                    other => {
                        *hold = other;
                        None
                    }
                }
            };
            if let Some(rx) = held {
                let _ = rx.await;
            }

            self.check(Query::Records)?;
            if self.empty_records {
                return Ok(RecordsPayload::Message {
                    message: "no data".to_string(),
                });
            }
            Ok(RecordsPayload::Records {
                traffic_records: vec![
                    record("2024-03-24T10:00:00Z", 120.0),
                    record("2024-03-24T08:00:00Z", 300.0),
                ],
            })
        }

        async fn traffic_jams(
            &self,
            _range: &TimeRange,
            _speed_threshold: Option<f64>,
        ) -> Result<JamsPayload, FetchError> {
            Ok(JamsPayload::Jams {
                traffic_jams: vec![TrafficJam {
                    traffic_cam_id: 3,
                    event_time: "2024-03-24 08:00:00".to_string(),
                }],
            })
        }
    }

    fn record(start_time: &str, count: f64) -> TrafficRecord {
        TrafficRecord {
            id: Some(1),
            traffic_cam_id: Some(1),
            start_time: Some(start_time.to_string()),
            end_time: None,
            vehicle_count: Some(count),
            average_speed: Some(40.0),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 24, 15, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn service(repo: Arc<FakeRepository>) -> DashboardService {
        let config = DashboardConfig {
            traffic_cam_id: 7,
            speed_threshold: Some(25.0),
            default_preset: Preset::Day,
        };
        DashboardService::new(repo, config)
    }

    #[tokio::test]
    async fn test_successful_cycle() {
        let repo = Arc::new(FakeRepository::default());
        let service = service(repo.clone());

        let snap = service.select_preset_at(Preset::Hour, now()).await;

        assert_eq!(snap.cycle, 1);
        assert!(!snap.loading);
        assert_eq!(snap.error, None);
        assert_eq!(snap.notice, None);
        assert_eq!(snap.range, resolve(Preset::Hour, &now(), None));
        assert_eq!(snap.stats.as_ref().unwrap().total_vehicle_count, Some(24685.0));
        assert_eq!(snap.congestion.as_ref().unwrap().congestion_percentage, 68.0);
        assert_eq!(snap.chart.len(), 2);
        assert_eq!(snap.chart[0].volume, Some(300.0));
        assert_eq!(repo.calls.load(Ordering::SeqCst), 4);

        let queries = repo.congestion_queries.lock().unwrap();
        assert_eq!(queries[0].traffic_cam_id, 7);
        assert_eq!(queries[0].speed_threshold, Some(25.0));
    }

    #[tokio::test]
    async fn test_message_payload_shows_notice() {
        let repo = Arc::new(FakeRepository {
            empty_records: true,
            ..Default::default()
        });
        let snap = service(repo).select_preset_at(Preset::Day, now()).await;

        assert!(snap.chart.is_empty());
        assert_eq!(snap.error, None);
        assert_eq!(snap.notice.as_deref(), Some(NO_RECORDS_NOTICE));
        assert!(snap.stats.is_some());
    }

    #[tokio::test]
    async fn test_single_failure_clears_all_slots() {
        let repo = Arc::new(FakeRepository::default());
        let service = service(repo.clone());

        let snap = service.select_preset_at(Preset::Week, now()).await;
        assert!(snap.stats.is_some());

        repo.failing.lock().unwrap().push(Query::Congestion);
        let snap = service.refresh_at(now()).await;

        assert_eq!(snap.error.as_deref(), Some("API Error (500): Congestion failed"));
        assert!(snap.stats.is_none());
        assert!(snap.peak_hours.is_none());
        assert!(snap.congestion.is_none());
        assert!(snap.records.is_none());
        assert!(snap.chart.is_empty());
        assert!(!snap.loading);
    }

    #[tokio::test]
    async fn test_first_failure_in_query_order_is_reported() {
        let repo = Arc::new(FakeRepository::default());
        repo.failing
            .lock()
            .unwrap()
            .extend([Query::Records, Query::PeakHours]);

        let snap = service(repo).select_preset_at(Preset::Day, now()).await;
        assert_eq!(snap.error.as_deref(), Some("API Error (500): PeakHours failed"));
    }

    #[tokio::test]
    async fn test_partial_custom_selection_does_not_fetch() {
        let repo = Arc::new(FakeRepository::default());
        let service = service(repo.clone());

        let snap = service
            .select_custom_at(Some(date(2024, 3, 1)), None, now())
            .await;

        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);
        assert_eq!(snap.range, None);
        assert_eq!(snap.filter.preset, Preset::Custom);
        assert_eq!(snap.filter.custom.from(), Some(date(2024, 3, 1)));

        let snap = service
            .select_custom_at(Some(date(2024, 3, 1)), Some(date(2024, 3, 9)), now())
            .await;
        assert_eq!(repo.calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            snap.range.map(|r| r.start()),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_partial_custom_selection_blocks_refresh_and_jams() {
        let repo = Arc::new(FakeRepository::default());
        let service = service(repo.clone());

        let week = service.select_preset_at(Preset::Week, now()).await;
        service
            .select_custom_at(Some(date(2024, 3, 1)), None, now())
            .await;

        let snap = service.refresh_at(now()).await;
        assert_eq!(repo.calls.load(Ordering::SeqCst), 4);
        assert_eq!(repo.ranges.lock().unwrap().len(), 1);
        assert_eq!(snap.cycle, week.cycle);
        assert_eq!(snap.filter.preset, Preset::Custom);
        assert!(!snap.loading);

        assert_eq!(service.traffic_jams_at(now()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_custom_range_survives_preset_switch() {
        let repo = Arc::new(FakeRepository::default());
        let service = service(repo);

        let custom = service
            .select_custom_at(Some(date(2024, 3, 1)), Some(date(2024, 3, 9)), now())
            .await;
        let week = service.select_preset_at(Preset::Week, now()).await;
        assert_ne!(week.range, custom.range);

        let back = service.select_preset_at(Preset::Custom, now()).await;
        assert_eq!(back.range, custom.range);
        assert_eq!(back.filter.custom, custom.filter.custom);
    }

    #[tokio::test]
    async fn test_refresh_keeps_range() {
        let repo = Arc::new(FakeRepository::default());
        let service = service(repo.clone());

        let first = service.select_preset_at(Preset::Hour, now()).await;
        let later = now() + chrono::TimeDelta::minutes(30);
        let refreshed = service.refresh_at(later).await;

        assert_eq!(refreshed.cycle, 2);
        assert_eq!(refreshed.range, first.range);
        assert_eq!(repo.ranges.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_select_day_uses_picked_date() {
        let repo = Arc::new(FakeRepository::default());
        let snap = service(repo)
            .select_day_at(date(2024, 3, 2), now())
            .await;

        let range = snap.range.unwrap();
        assert_eq!(range.start(), Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
        assert_eq!(snap.filter.day, Some(date(2024, 3, 2)));
    }

    #[tokio::test]
    async fn test_stale_cycle_is_discarded() {
        let repo = Arc::new(FakeRepository::default());
        let service = service(repo.clone());

        let month = resolve(Preset::Month, &now(), None).unwrap();
        let (release, held) = oneshot::channel();
        *repo.hold.lock().unwrap() = Some((month, held));

        let mut updates = service.subscribe();
        let slow = tokio::spawn({
            let service = service.clone();
            async move { service.select_preset_at(Preset::Month, now()).await }
        });
        updates.wait_for(|snap| snap.cycle == 1).await.unwrap();

        let fast = service.select_preset_at(Preset::Hour, now()).await;
        assert_eq!(fast.cycle, 2);
        assert!(!fast.loading);

        release.send(()).unwrap();
        slow.await.unwrap();

        let current = service.snapshot();
        assert_eq!(current.cycle, 2);
        assert_eq!(current.range, resolve(Preset::Hour, &now(), None));
        assert_eq!(current.filter.preset, Preset::Hour);
        assert!(!current.loading);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_selections_keep_filter_and_range_together() {
        let repo = Arc::new(FakeRepository::default());
        let service = service(repo);

        let presets = [Preset::Hour, Preset::Day, Preset::Week, Preset::Month];
        let tasks: Vec<_> = presets
            .iter()
            .cycle()
            .take(40)
            .map(|&preset| {
                let service = service.clone();
                tokio::spawn(async move { service.select_preset_at(preset, now()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let filter = *service.lock_filter();
        let current = service.snapshot();
        assert_eq!(current.cycle, 40);
        assert_eq!(current.filter, filter);
        assert_eq!(current.range, resolve_filter(&filter, &now()));
        assert!(!current.loading);
    }

    #[tokio::test]
    async fn test_traffic_jams_for_current_range() {
        let repo = Arc::new(FakeRepository::default());
        let service = service(repo);

        let jams = service.traffic_jams_at(now()).await.unwrap();
        assert!(matches!(jams, Some(JamsPayload::Jams { .. })));

        service
            .select_custom_at(None, Some(date(2024, 3, 1)), now())
            .await;
        assert_eq!(service.traffic_jams_at(now()).await.unwrap(), None);
    }
}
