//! Session-scoped cache coordinating loads of the two work-order datasets.
//!
//! Each dataset entry is a small state machine (idle → loading →
//! loaded/failed). Admission into the loading state happens in a single
//! critical section, so concurrent callers can never start duplicate
//! fetches; late arrivals subscribe to the in-flight load's completion
//! channel and resume when it settles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Months, NaiveDate, Utc};
use db::models::user::CompanyScope;
use db::models::work_order::{Dataset, WorkOrder};
use db::postgrest::StoreError;
use db::store::{RowFilter, TableStore};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use ts_rs::TS;

/// Rows fetched per page from the remote store.
pub const PAGE_SIZE: u64 = 1000;

/// How long a completion message stays visible before being cleared.
const PROGRESS_LINGER: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum DataCacheError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("load failed: {0}")]
    LoadFailed(String),
}

/// Inclusive opening-date window a load is parameterized with.
pub type DateRange = (NaiveDate, NaiveDate);

/// Which datasets an operation targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RefreshTarget {
    Clinical,
    Building,
    Both,
}

impl RefreshTarget {
    pub fn datasets(self) -> &'static [Dataset] {
        match self {
            RefreshTarget::Clinical => &[Dataset::Clinical],
            RefreshTarget::Building => &[Dataset::Building],
            RefreshTarget::Both => &[Dataset::Clinical, Dataset::Building],
        }
    }
}

/// Snapshot of one dataset's in-memory state.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub rows: Arc<Vec<WorkOrder>>,
    pub loading: bool,
    pub loaded: bool,
    pub error: Option<String>,
    pub progress: Option<String>,
}

impl CacheEntry {
    pub fn status(&self) -> CacheEntryStatus {
        CacheEntryStatus {
            records: self.rows.len(),
            loading: self.loading,
            loaded: self.loaded,
            error: self.error.clone(),
            progress: self.progress.clone(),
        }
    }
}

/// Wire form of a cache entry; the row payload is reduced to a count.
#[derive(Debug, Clone, Serialize, TS)]
pub struct CacheEntryStatus {
    pub records: usize,
    pub loading: bool,
    pub loaded: bool,
    pub error: Option<String>,
    pub progress: Option<String>,
}

/// Status of both dataset entries, as read by the dashboard.
#[derive(Debug, Clone, Serialize, TS)]
pub struct CacheStatus {
    pub clinical: CacheEntryStatus,
    pub building: CacheEntryStatus,
}

struct Slot {
    rows: Arc<Vec<WorkOrder>>,
    loaded: bool,
    error: Option<String>,
    progress: Option<String>,
    /// Completion channel of the in-flight load, if one is running.
    inflight: Option<watch::Receiver<bool>>,
    /// Bumped whenever the entry is reset or a new load is admitted; a
    /// finishing fetch only commits if its generation still matches.
    generation: u64,
    /// Bumped on every progress write so a lingering clear task never wipes
    /// a newer message.
    progress_epoch: u64,
}

impl Slot {
    fn new() -> Self {
        Self {
            rows: Arc::new(Vec::new()),
            loaded: false,
            error: None,
            progress: None,
            inflight: None,
            generation: 0,
            progress_epoch: 0,
        }
    }

    fn reset(&mut self) {
        self.rows = Arc::new(Vec::new());
        self.loaded = false;
        self.error = None;
        self.progress = None;
        self.inflight = None;
        self.generation += 1;
        self.progress_epoch += 1;
    }

    fn entry(&self) -> CacheEntry {
        CacheEntry {
            rows: self.rows.clone(),
            loading: self.inflight.is_some(),
            loaded: self.loaded,
            error: self.error.clone(),
            progress: self.progress.clone(),
        }
    }
}

struct Inner {
    slots: HashMap<Dataset, Slot>,
    /// Opening-date window the cached rows were fetched with. One window is
    /// shared by both datasets.
    range: Option<DateRange>,
}

enum Admitted {
    /// Cached rows satisfy the request.
    Hit(Arc<Vec<WorkOrder>>),
    /// A load is already in flight; wait on its completion channel.
    Join(watch::Receiver<bool>),
    /// This caller starts the load.
    Lead {
        tx: watch::Sender<bool>,
        generation: u64,
    },
}

/// How a finished fetch is folded into the entry.
#[derive(Clone, Copy)]
enum CommitMode {
    Replace,
    /// Keep existing rows, append fetched rows not already present (by id).
    Merge,
}

/// De-duplicated, memoized accessor for the work-order datasets.
///
/// One instance per authenticated session; the tenant scope is fixed at
/// construction and applied to every fetch. Dropped (or [`clear`]ed) on
/// sign-out.
///
/// [`clear`]: DataCache::clear
#[derive(Clone)]
pub struct DataCache {
    store: Arc<dyn TableStore>,
    scope: CompanyScope,
    inner: Arc<Mutex<Inner>>,
}

impl DataCache {
    pub fn new(store: Arc<dyn TableStore>, scope: CompanyScope) -> Self {
        let slots = Dataset::ALL
            .into_iter()
            .map(|dataset| (dataset, Slot::new()))
            .collect();
        Self {
            store,
            scope,
            inner: Arc::new(Mutex::new(Inner { slots, range: None })),
        }
    }

    /// Load a dataset, reusing cached rows when they already cover the
    /// requested window.
    ///
    /// Returns the cached rows on a hit; joins an in-flight load when one
    /// exists (its parameters are already fixed and are shared by every
    /// waiter); otherwise starts a fetch. Without an explicit range the
    /// trailing twelve months are requested.
    pub async fn load(
        &self,
        dataset: Dataset,
        range: Option<DateRange>,
    ) -> Result<Arc<Vec<WorkOrder>>, DataCacheError> {
        let requested = range.unwrap_or_else(default_range);
        match self.admit(dataset, Some(requested)).await {
            Admitted::Hit(rows) => {
                debug!(dataset = %dataset, records = rows.len(), "cache hit");
                Ok(rows)
            }
            Admitted::Join(rx) => self.settle(rx, dataset).await,
            Admitted::Lead { tx, generation } => {
                let rx = tx.subscribe();
                self.spawn_fetch(dataset, requested, generation, tx, CommitMode::Replace);
                self.settle(rx, dataset).await
            }
        }
    }

    /// Unconditionally invalidate the targeted entries and re-fetch them.
    pub async fn refresh(
        &self,
        target: RefreshTarget,
        range: Option<DateRange>,
    ) -> Result<(), DataCacheError> {
        for dataset in target.datasets().iter().copied() {
            // Let any in-flight load settle first so the forced re-fetch is
            // not coalesced with it; its outcome is discarded either way.
            let inflight = {
                let inner = self.inner.lock().await;
                inner.slots[&dataset].inflight.clone()
            };
            if let Some(rx) = inflight {
                let _ = self.settle(rx, dataset).await;
            }

            {
                let mut inner = self.inner.lock().await;
                inner.range = None;
                inner
                    .slots
                    .get_mut(&dataset)
                    .expect("slot exists for every dataset")
                    .reset();
            }
            self.load(dataset, range).await?;
        }
        Ok(())
    }

    /// Widen the cached window to also cover `range`, merging newly fetched
    /// rows with the cached ones (first occurrence per id wins).
    pub async fn load_additional(
        &self,
        target: RefreshTarget,
        range: DateRange,
    ) -> Result<(), DataCacheError> {
        let current = { self.inner.lock().await.range };
        let Some(current) = current else {
            // Nothing cached yet; a plain refresh with the requested window.
            return self.refresh(target, Some(range)).await;
        };

        let union = (current.0.min(range.0), current.1.max(range.1));
        if union == current {
            debug!("requested window is already loaded");
            return Ok(());
        }

        for dataset in target.datasets().iter().copied() {
            match self.admit(dataset, None).await {
                Admitted::Hit(_) => unreachable!("expansion never asks for a hit"),
                Admitted::Join(rx) => {
                    self.settle(rx, dataset).await?;
                }
                Admitted::Lead { tx, generation } => {
                    let rx = tx.subscribe();
                    self.spawn_fetch(dataset, union, generation, tx, CommitMode::Merge);
                    self.settle(rx, dataset).await?;
                }
            }
        }
        Ok(())
    }

    /// Reset every entry to its initial idle state.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.range = None;
        for slot in inner.slots.values_mut() {
            slot.reset();
        }
    }

    /// Read the current snapshot of one dataset's entry.
    pub async fn entry(&self, dataset: Dataset) -> CacheEntry {
        self.inner.lock().await.slots[&dataset].entry()
    }

    /// Status of both entries.
    pub async fn status(&self) -> CacheStatus {
        let inner = self.inner.lock().await;
        CacheStatus {
            clinical: inner.slots[&Dataset::Clinical].entry().status(),
            building: inner.slots[&Dataset::Building].entry().status(),
        }
    }

    /// Decide, in one critical section, whether this caller hits the cache,
    /// joins an in-flight load, or becomes the leader of a new one.
    async fn admit(&self, dataset: Dataset, hit_range: Option<DateRange>) -> Admitted {
        let mut inner = self.inner.lock().await;

        if let Some(requested) = hit_range {
            let covered = inner
                .range
                .is_some_and(|(start, end)| start <= requested.0 && end >= requested.1);
            let slot = &inner.slots[&dataset];
            if covered && slot.loaded && !slot.rows.is_empty() {
                return Admitted::Hit(slot.rows.clone());
            }
        }

        let slot = inner
            .slots
            .get_mut(&dataset)
            .expect("slot exists for every dataset");
        if let Some(rx) = &slot.inflight {
            return Admitted::Join(rx.clone());
        }

        let (tx, rx) = watch::channel(false);
        slot.inflight = Some(rx);
        slot.error = None;
        slot.generation += 1;
        slot.progress_epoch += 1;
        slot.progress = Some(format!("Starting {} data load", dataset.label()));
        Admitted::Lead {
            tx,
            generation: slot.generation,
        }
    }

    /// Run the paged fetch on a detached task so that a disconnecting caller
    /// does not cancel it; the result lands in the entry either way.
    fn spawn_fetch(
        &self,
        dataset: Dataset,
        range: DateRange,
        generation: u64,
        tx: watch::Sender<bool>,
        mode: CommitMode,
    ) {
        let cache = self.clone();
        tokio::spawn(async move {
            let filter = RowFilter {
                dataset,
                company_id: cache.scope.company_id(),
                opened_between: Some(range),
            };
            match cache.fetch_all(dataset, &filter).await {
                Ok(rows) => {
                    cache
                        .commit_success(dataset, generation, rows, range, mode)
                        .await
                }
                Err(err) => cache.commit_failure(dataset, generation, err).await,
            }
            let _ = tx.send(true);
        });
    }

    /// Wait for an in-flight load to settle, then report its outcome from
    /// the entry state.
    async fn settle(
        &self,
        mut rx: watch::Receiver<bool>,
        dataset: Dataset,
    ) -> Result<Arc<Vec<WorkOrder>>, DataCacheError> {
        if rx.wait_for(|done| *done).await.is_err() {
            // The fetch task died without settling (a bug, not a fetch
            // error); surface it like a failed load.
            return Err(DataCacheError::LoadFailed(
                "load task terminated unexpectedly".to_string(),
            ));
        }

        let inner = self.inner.lock().await;
        let slot = &inner.slots[&dataset];
        if slot.loaded {
            Ok(slot.rows.clone())
        } else {
            Err(DataCacheError::LoadFailed(
                slot.error
                    .clone()
                    .unwrap_or_else(|| "load failed".to_string()),
            ))
        }
    }

    /// Fetch every row matching the filter in fixed-size pages, reporting
    /// progress before each page request.
    ///
    /// The pages are ordered by opening timestamp descending; rows mutated
    /// at the source mid-sweep can be skipped or duplicated, which the
    /// remote store gives no way to prevent.
    async fn fetch_all(
        &self,
        dataset: Dataset,
        filter: &RowFilter,
    ) -> Result<Vec<WorkOrder>, StoreError> {
        let total = self.store.count_rows(filter).await?;
        if total == 0 {
            debug!(dataset = %dataset, "no rows match the filter");
            return Ok(Vec::new());
        }

        let mut rows: Vec<WorkOrder> = Vec::with_capacity(total as usize);
        let mut offset = 0u64;
        let mut has_more = true;
        let mut iterations = 0u64;
        // The count and the page sweep are separate queries; leave headroom
        // in case the table grows in between.
        let max_iterations = total.div_ceil(PAGE_SIZE) + 10;

        while has_more && iterations < max_iterations {
            iterations += 1;
            self.set_progress(
                dataset,
                format!(
                    "Loading {} data: {} of {} records ({}%)",
                    dataset.label(),
                    rows.len(),
                    total,
                    percentage(rows.len() as u64, total)
                ),
            )
            .await;

            let page = self.store.fetch_page(filter, offset, PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }

            let fetched = page.len() as u64;
            rows.extend(page);
            offset += PAGE_SIZE;
            has_more = fetched == PAGE_SIZE && (rows.len() as u64) < total;
        }

        if has_more && iterations >= max_iterations {
            warn!(
                dataset = %dataset,
                iterations,
                "stopping paged fetch at the iteration cap"
            );
        }
        if rows.len() as u64 != total {
            warn!(
                dataset = %dataset,
                expected = total,
                got = rows.len(),
                "row count drifted during paged fetch"
            );
        }

        Ok(rows)
    }

    async fn commit_success(
        &self,
        dataset: Dataset,
        generation: u64,
        fetched: Vec<WorkOrder>,
        range: DateRange,
        mode: CommitMode,
    ) {
        let mut inner = self.inner.lock().await;
        let slot = inner
            .slots
            .get_mut(&dataset)
            .expect("slot exists for every dataset");
        if slot.generation != generation {
            debug!(dataset = %dataset, "discarding fetch result; entry was reset mid-flight");
            return;
        }

        let rows = match mode {
            CommitMode::Replace => fetched,
            CommitMode::Merge => {
                let mut merged: Vec<WorkOrder> = (*slot.rows).clone();
                let mut seen: HashSet<i64> = merged.iter().map(|row| row.id).collect();
                merged.extend(fetched.into_iter().filter(|row| seen.insert(row.id)));
                merged
            }
        };

        let records = rows.len();
        slot.rows = Arc::new(rows);
        slot.loaded = true;
        slot.error = None;
        slot.inflight = None;
        slot.progress = Some(format!("Loaded {} {} records", records, dataset.label()));
        slot.progress_epoch += 1;
        let epoch = slot.progress_epoch;
        inner.range = Some(range);
        drop(inner);

        info!(dataset = %dataset, records, "dataset loaded");

        // Clear the completion message after a short linger.
        let cache = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(PROGRESS_LINGER).await;
            let mut inner = cache.inner.lock().await;
            let slot = inner
                .slots
                .get_mut(&dataset)
                .expect("slot exists for every dataset");
            if slot.progress_epoch == epoch {
                slot.progress = None;
            }
        });
    }

    async fn commit_failure(&self, dataset: Dataset, generation: u64, err: StoreError) {
        let mut inner = self.inner.lock().await;
        let slot = inner
            .slots
            .get_mut(&dataset)
            .expect("slot exists for every dataset");
        if slot.generation != generation {
            return;
        }

        warn!(dataset = %dataset, error = %err, "dataset load failed");
        // Rows and the loaded flag are left untouched: the entry stays
        // retryable and keeps whatever it held before this attempt.
        slot.error = Some(err.to_string());
        slot.inflight = None;
        slot.progress = None;
        slot.progress_epoch += 1;
    }

    async fn set_progress(&self, dataset: Dataset, message: String) {
        let mut inner = self.inner.lock().await;
        let slot = inner
            .slots
            .get_mut(&dataset)
            .expect("slot exists for every dataset");
        slot.progress = Some(message);
        slot.progress_epoch += 1;
    }
}

/// Percentage of `done` over `total`, clamped to 99 until the sweep is over.
fn percentage(done: u64, total: u64) -> u64 {
    if total == 0 {
        return 100;
    }
    (done * 100 / total).min(99)
}

/// The trailing twelve months, the window loaded when none is given.
fn default_range() -> DateRange {
    let today = Utc::now().date_naive();
    let start = today
        .checked_sub_months(Months::new(12))
        .unwrap_or(today);
    (start, today)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;

    /// In-memory row store that records every query it serves.
    struct MemoryStore {
        rows: StdMutex<HashMap<Dataset, Vec<WorkOrder>>>,
        count_calls: AtomicUsize,
        page_calls: StdMutex<Vec<(Dataset, u64, u64)>>,
        /// 1-based index of the page request that should fail, if any.
        fail_on_page: AtomicUsize,
        sql_log: StdMutex<Vec<String>>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                rows: StdMutex::new(HashMap::new()),
                count_calls: AtomicUsize::new(0),
                page_calls: StdMutex::new(Vec::new()),
                fail_on_page: AtomicUsize::new(0),
                sql_log: StdMutex::new(Vec::new()),
            }
        }

        fn with_rows(dataset: Dataset, rows: Vec<WorkOrder>) -> Arc<Self> {
            let store = Self::new();
            store.rows.lock().unwrap().insert(dataset, rows);
            Arc::new(store)
        }

        fn insert_rows(&self, dataset: Dataset, rows: Vec<WorkOrder>) {
            self.rows.lock().unwrap().insert(dataset, rows);
        }

        fn fail_on_page(&self, index: usize) {
            self.fail_on_page.store(index, Ordering::SeqCst);
        }

        fn pages_served(&self) -> Vec<(Dataset, u64, u64)> {
            self.page_calls.lock().unwrap().clone()
        }

        fn matching(&self, filter: &RowFilter) -> Vec<WorkOrder> {
            let rows = self.rows.lock().unwrap();
            let mut matching: Vec<WorkOrder> = rows
                .get(&filter.dataset)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|row| {
                    filter
                        .company_id
                        .is_none_or(|company| row.company_id == Some(company))
                })
                .filter(|row| {
                    filter.opened_between.is_none_or(|(start, end)| {
                        row.abertura.is_some_and(|opened| {
                            let date = opened.date_naive();
                            date >= start && date <= end
                        })
                    })
                })
                .collect();
            matching.sort_by(|a, b| b.abertura.cmp(&a.abertura));
            matching
        }
    }

    #[async_trait::async_trait]
    impl TableStore for MemoryStore {
        async fn count_rows(&self, filter: &RowFilter) -> Result<u64, StoreError> {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.matching(filter).len() as u64)
        }

        async fn fetch_page(
            &self,
            filter: &RowFilter,
            offset: u64,
            limit: u64,
        ) -> Result<Vec<WorkOrder>, StoreError> {
            let index = {
                let mut calls = self.page_calls.lock().unwrap();
                calls.push((filter.dataset, offset, limit));
                calls.len()
            };
            if self.fail_on_page.load(Ordering::SeqCst) == index {
                return Err(StoreError::Http {
                    status: 503,
                    body: "service unavailable".to_string(),
                });
            }
            let matching = self.matching(filter);
            Ok(matching
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        }

        async fn execute_sql(&self, sql: &str) -> Result<serde_json::Value, StoreError> {
            self.sql_log.lock().unwrap().push(sql.to_string());
            Ok(serde_json::Value::Null)
        }
    }

    /// `count` orders opened one minute apart, newest first at id 1.
    fn orders(count: i64, company_id: Option<Uuid>) -> Vec<WorkOrder> {
        let base = chrono::Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        (1..=count)
            .map(|id| WorkOrder {
                id,
                abertura: Some(base - chrono::Duration::minutes(id)),
                company_id,
                ..WorkOrder::default()
            })
            .collect()
    }

    fn range_2024() -> DateRange {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        )
    }

    #[tokio::test]
    async fn back_to_back_loads_fetch_once() {
        let store = MemoryStore::with_rows(Dataset::Building, orders(2500, None));
        let cache = DataCache::new(store.clone(), CompanyScope::AllCompanies);

        let first = cache
            .load(Dataset::Building, Some(range_2024()))
            .await
            .unwrap();
        let second = cache
            .load(Dataset::Building, Some(range_2024()))
            .await
            .unwrap();

        assert_eq!(first.len(), 2500);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.count_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.pages_served(),
            vec![
                (Dataset::Building, 0, 1000),
                (Dataset::Building, 1000, 1000),
                (Dataset::Building, 2000, 1000),
            ]
        );
    }

    #[tokio::test]
    async fn rows_come_back_newest_first() {
        let store = MemoryStore::with_rows(Dataset::Clinical, orders(1500, None));
        let cache = DataCache::new(store, CompanyScope::AllCompanies);

        let rows = cache
            .load(Dataset::Clinical, Some(range_2024()))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1500);
        for pair in rows.windows(2) {
            assert!(pair[0].abertura >= pair[1].abertura);
        }
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_fetch() {
        let store = MemoryStore::with_rows(Dataset::Clinical, orders(1200, None));
        let cache = DataCache::new(store.clone(), CompanyScope::AllCompanies);

        let (a, b) = tokio::join!(
            cache.load(Dataset::Clinical, Some(range_2024())),
            cache.load(Dataset::Clinical, Some(range_2024())),
        );

        assert_eq!(a.unwrap().len(), 1200);
        assert_eq!(b.unwrap().len(), 1200);
        assert_eq!(store.count_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tenant_scope_filters_rows() {
        let ours = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        let mut rows = orders(30, Some(ours));
        rows.extend(orders(20, Some(theirs)).into_iter().map(|mut row| {
            row.id += 1000;
            row
        }));
        let store = MemoryStore::with_rows(Dataset::Clinical, rows);

        let scoped = DataCache::new(store.clone(), CompanyScope::Company(ours));
        let loaded = scoped
            .load(Dataset::Clinical, Some(range_2024()))
            .await
            .unwrap();
        assert_eq!(loaded.len(), 30);
        assert!(loaded.iter().all(|row| row.company_id == Some(ours)));

        let privileged = DataCache::new(store, CompanyScope::AllCompanies);
        let loaded = privileged
            .load(Dataset::Clinical, Some(range_2024()))
            .await
            .unwrap();
        assert_eq!(loaded.len(), 50);
    }

    #[tokio::test]
    async fn failed_page_leaves_entry_retryable() {
        let store = MemoryStore::with_rows(Dataset::Building, orders(2500, None));
        store.fail_on_page(2);
        let cache = DataCache::new(store.clone(), CompanyScope::AllCompanies);

        let result = cache.load(Dataset::Building, Some(range_2024())).await;
        assert!(result.is_err());

        let entry = cache.entry(Dataset::Building).await;
        assert!(entry.rows.is_empty());
        assert!(!entry.loaded);
        assert!(!entry.loading);
        assert!(entry.error.as_deref().unwrap().contains("503"));

        // A later load retries and succeeds.
        store.fail_on_page(0);
        let rows = cache
            .load(Dataset::Building, Some(range_2024()))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2500);
    }

    #[tokio::test]
    async fn clear_then_load_fetches_again() {
        let store = MemoryStore::with_rows(Dataset::Clinical, orders(10, None));
        let cache = DataCache::new(store.clone(), CompanyScope::AllCompanies);

        cache
            .load(Dataset::Clinical, Some(range_2024()))
            .await
            .unwrap();
        cache.clear().await;
        let entry = cache.entry(Dataset::Clinical).await;
        assert!(entry.rows.is_empty());
        assert!(!entry.loaded);

        cache
            .load(Dataset::Clinical, Some(range_2024()))
            .await
            .unwrap();
        assert_eq!(store.count_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_both_invalidates_and_refetches_both() {
        let store = MemoryStore::new();
        store.insert_rows(Dataset::Clinical, orders(5, None));
        store.insert_rows(Dataset::Building, orders(7, None));
        let store = Arc::new(store);
        let cache = DataCache::new(store.clone(), CompanyScope::AllCompanies);

        cache
            .load(Dataset::Clinical, Some(range_2024()))
            .await
            .unwrap();
        cache
            .load(Dataset::Building, Some(range_2024()))
            .await
            .unwrap();
        assert_eq!(store.count_calls.load(Ordering::SeqCst), 2);

        cache
            .refresh(RefreshTarget::Both, Some(range_2024()))
            .await
            .unwrap();

        assert_eq!(store.count_calls.load(Ordering::SeqCst), 4);
        assert!(cache.entry(Dataset::Clinical).await.loaded);
        assert!(cache.entry(Dataset::Building).await.loaded);
    }

    #[tokio::test]
    async fn load_additional_merges_without_duplicates() {
        let june = orders(40, None);
        let store = MemoryStore::with_rows(Dataset::Clinical, june);
        let cache = DataCache::new(store.clone(), CompanyScope::AllCompanies);

        let narrow = (
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        );
        cache.load(Dataset::Clinical, Some(narrow)).await.unwrap();
        assert_eq!(cache.entry(Dataset::Clinical).await.rows.len(), 40);

        // Older rows appear once the window is widened.
        let mut widened = orders(40, None);
        let march = chrono::Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        widened.extend((2001..=2010).map(|id| WorkOrder {
            id,
            abertura: Some(march),
            ..WorkOrder::default()
        }));
        store.insert_rows(Dataset::Clinical, widened);

        let wide = (NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), narrow.1);
        cache
            .load_additional(RefreshTarget::Clinical, wide)
            .await
            .unwrap();

        let entry = cache.entry(Dataset::Clinical).await;
        assert_eq!(entry.rows.len(), 50);
        let distinct: HashSet<i64> = entry.rows.iter().map(|row| row.id).collect();
        assert_eq!(distinct.len(), 50);

        // A window inside the cached one is a no-op.
        let calls_before = store.count_calls.load(Ordering::SeqCst);
        cache
            .load_additional(RefreshTarget::Clinical, narrow)
            .await
            .unwrap();
        assert_eq!(store.count_calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn empty_dataset_loads_as_empty_and_refetches() {
        let store = MemoryStore::with_rows(Dataset::Building, Vec::new());
        let cache = DataCache::new(store.clone(), CompanyScope::AllCompanies);

        let rows = cache
            .load(Dataset::Building, Some(range_2024()))
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert!(cache.entry(Dataset::Building).await.loaded);
        assert!(store.pages_served().is_empty());

        // An empty result is never treated as a warm cache.
        cache
            .load(Dataset::Building, Some(range_2024()))
            .await
            .unwrap();
        assert_eq!(store.count_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_message_lingers_then_clears() {
        let store = MemoryStore::with_rows(Dataset::Clinical, orders(3, None));
        let cache = DataCache::new(store, CompanyScope::AllCompanies);

        cache
            .load(Dataset::Clinical, Some(range_2024()))
            .await
            .unwrap();
        let progress = cache.entry(Dataset::Clinical).await.progress;
        assert_eq!(progress.as_deref(), Some("Loaded 3 clinical records"));

        tokio::time::sleep(PROGRESS_LINGER + Duration::from_millis(100)).await;
        assert!(cache.entry(Dataset::Clinical).await.progress.is_none());
    }

    #[test]
    fn percentage_is_clamped_below_completion() {
        assert_eq!(percentage(0, 2500), 0);
        assert_eq!(percentage(1000, 2500), 40);
        assert_eq!(percentage(2500, 2500), 99);
        assert_eq!(percentage(0, 0), 100);
    }
}
