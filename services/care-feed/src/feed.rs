// services/care-feed/src/feed.rs
//
// Generic live feed: mirrors one backend table into an ordered local list
// from an initial snapshot plus the table's change stream.
//

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use svckit::backend::DataService;
use svckit::errors::SyncError;
use svckit::metrics;
use svckit::types::{ChangeKind, RowChange, CREATED_AT_COLUMN};

use crate::filter::{FilterDecision, RecordFilter};
use crate::notice::{Notice, NoticeSink};

/// A record type that can be mirrored by a [`Feed`].
pub trait FeedRecord: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;

    const TABLE: &'static str;
    const ORDER_COLUMN: &'static str = CREATED_AT_COLUMN;

    fn id(&self) -> &Self::Id;
    fn created_at(&self) -> DateTime<Utc>;

    /// Normalize a raw backend row.
    fn parse_row(row: &Value) -> Result<Self, SyncError>;

    /// Key of a raw row; delete payloads may carry nothing else.
    fn key_of(row: &Value) -> Option<Self::Id>;

    fn load_failed_notice() -> Notice;

    fn created_notice(&self) -> Option<Notice> {
        None
    }

    fn deleted_notice(&self) -> Option<Notice> {
        None
    }
}

/// Called with the id of every row the backend reports deleted.
pub type DeleteHook<Id> = Box<dyn Fn(&Id) + Send + Sync>;

/// A change already normalized to the feed's record type.
#[derive(Debug, Clone)]
pub enum Change<R: FeedRecord> {
    Created(R),
    Updated(R),
    Deleted(R::Id),
}

/// What applying a [`Change`] did to the local list.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied<R> {
    Inserted,
    Replaced,
    Removed(R),
    Ignored,
}

/// Read-only copy of a feed handed to consumers.
#[derive(Debug, Clone, Serialize)]
pub struct FeedView<R> {
    pub records: Vec<R>,
    pub loading: bool,
}

/// Local list plus the bookkeeping needed to merge a late snapshot.
///
/// Until the snapshot lands, the newest live version of every id touched by
/// a change (or `None` for a delete) is kept in `early`; the snapshot is then
/// read through it so a stale fetch never overwrites a live event. A resync
/// re-arms `early` and goes through the same merge.
pub struct FeedState<R: FeedRecord> {
    records: Vec<R>,
    loading: bool,
    snapshot_applied: bool,
    early: HashMap<R::Id, Option<R>>,
}

impl<R: FeedRecord> FeedState<R> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            loading: true,
            snapshot_applied: false,
            early: HashMap::new(),
        }
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn get(&self, id: &R::Id) -> Option<&R> {
        self.records.iter().find(|r| r.id() == id)
    }

    fn position(&self, id: &R::Id) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    fn remember(&mut self, id: R::Id, version: Option<R>) {
        if !self.snapshot_applied {
            self.early.insert(id, version);
        }
    }

    pub fn apply(&mut self, change: Change<R>) -> Applied<R> {
        match change {
            Change::Created(record) => {
                self.remember(record.id().clone(), Some(record.clone()));
                match self.position(record.id()) {
                    Some(idx) => {
                        self.records[idx] = record;
                        Applied::Replaced
                    }
                    None => {
                        self.records.insert(0, record);
                        Applied::Inserted
                    }
                }
            }
            Change::Updated(record) => {
                self.remember(record.id().clone(), Some(record.clone()));
                match self.position(record.id()) {
                    Some(idx) => {
                        self.records[idx] = record;
                        Applied::Replaced
                    }
                    None => Applied::Ignored,
                }
            }
            Change::Deleted(id) => {
                let idx = self.position(&id);
                self.remember(id, None);
                match idx {
                    Some(idx) => Applied::Removed(self.records.remove(idx)),
                    None => Applied::Ignored,
                }
            }
        }
    }

    /// Merge a fetch. Records that changed live since the fetch was armed and
    /// are absent from the snapshot stay in front in arrival order; every
    /// other local record is replaced by the fetched part, ordered newest
    /// first.
    pub fn apply_snapshot(&mut self, snapshot: Vec<R>) {
        let early = std::mem::take(&mut self.early);
        let mut seen: HashSet<R::Id> = HashSet::with_capacity(snapshot.len());
        let mut fetched: Vec<R> = Vec::with_capacity(snapshot.len());

        for record in snapshot {
            let id = record.id().clone();
            if !seen.insert(id.clone()) {
                warn!("Duplicate id {} in {} snapshot", id, R::TABLE);
                continue;
            }
            match early.get(&id) {
                Some(Some(live)) => fetched.push(live.clone()),
                Some(None) => {}
                None => fetched.push(record),
            }
        }
        fetched.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        let mut merged: Vec<R> = self
            .records
            .drain(..)
            .filter(|r| !seen.contains(r.id()) && matches!(early.get(r.id()), Some(Some(_))))
            .collect();
        merged.extend(fetched);

        self.records = merged;
        self.snapshot_applied = true;
        self.loading = false;
    }

    /// Start collecting live changes for another snapshot merge. `false`
    /// while the first snapshot (or an earlier resync) is still pending.
    pub fn begin_resync(&mut self) -> bool {
        if !self.snapshot_applied {
            return false;
        }
        self.snapshot_applied = false;
        self.early.clear();
        true
    }

    /// Drop local records failing `keep`. Returns how many were dropped.
    pub fn retain(&mut self, keep: impl Fn(&R) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(|r| keep(r));
        before - self.records.len()
    }

    /// Fetch failed: keep whatever is mirrored and stop loading.
    pub fn fail_snapshot(&mut self) {
        self.early.clear();
        self.snapshot_applied = true;
        self.loading = false;
    }

    /// Mutate the record with `id` in place. `None` if absent.
    pub fn modify(&mut self, id: &R::Id, f: impl FnOnce(&mut R) -> bool) -> Option<bool> {
        let idx = self.position(id)?;
        Some(f(&mut self.records[idx]))
    }

    pub fn view(&self) -> FeedView<R> {
        FeedView {
            records: self.records.clone(),
            loading: self.loading,
        }
    }
}

impl<R: FeedRecord> Default for FeedState<R> {
    fn default() -> Self {
        Self::new()
    }
}

struct Shared<R: FeedRecord> {
    state: Mutex<FeedState<R>>,
    notices: Arc<dyn NoticeSink>,
    filter: Option<Arc<dyn RecordFilter<R>>>,
    on_deleted: Option<DeleteHook<R::Id>>,
    version: watch::Sender<u64>,
    closed: AtomicBool,
}

impl<R: FeedRecord> Shared<R> {
    fn allows(&self, record: &R) -> bool {
        match &self.filter {
            Some(filter) => matches!(filter.evaluate(record), FilterDecision::Allow),
            None => true,
        }
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    fn ingest_snapshot(&self, rows: Vec<Value>) {
        let total = rows.len();
        let records: Vec<R> = rows
            .iter()
            .filter_map(|row| match R::parse_row(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping {} row: {}", R::TABLE, e);
                    None
                }
            })
            .filter(|record| self.allows(record))
            .collect();

        {
            let mut state = self.state.lock();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            state.apply_snapshot(records);
            info!("Loaded {} of {} {} rows", state.records().len(), total, R::TABLE);
        }
        self.bump();
    }

    fn snapshot_failed(&self, err: SyncError) {
        error!("Error fetching {}: {}", R::TABLE, err);
        {
            let mut state = self.state.lock();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            state.fail_snapshot();
        }
        self.bump();
        self.notices.show(R::load_failed_notice());
    }

    fn resync_failed(&self, err: &SyncError) {
        error!("Error resyncing {}: {}", R::TABLE, err);
        {
            let mut state = self.state.lock();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            state.fail_snapshot();
        }
        self.bump();
    }

    /// Drop mirrored records the filter now denies.
    fn refilter(&self) -> usize {
        let removed = {
            let mut state = self.state.lock();
            if self.closed.load(Ordering::SeqCst) {
                return 0;
            }
            state.retain(|r| self.allows(r))
        };
        if removed > 0 {
            info!("Filter dropped {} mirrored {} rows", removed, R::TABLE);
            self.bump();
        }
        removed
    }

    fn normalize(&self, change: RowChange) -> Result<Option<Change<R>>, SyncError> {
        match change.kind {
            ChangeKind::Insert => {
                let row = change
                    .record
                    .ok_or_else(|| SyncError::ValidationError("insert without record".to_string()))?;
                let record = R::parse_row(&row)?;
                Ok(self.allows(&record).then_some(Change::Created(record)))
            }
            ChangeKind::Update => {
                let row = change
                    .record
                    .ok_or_else(|| SyncError::ValidationError("update without record".to_string()))?;
                let record = R::parse_row(&row)?;
                if self.allows(&record) {
                    Ok(Some(Change::Updated(record)))
                } else {
                    Ok(Some(Change::Deleted(record.id().clone())))
                }
            }
            ChangeKind::Delete => {
                let id = change
                    .old_record
                    .as_ref()
                    .or(change.record.as_ref())
                    .and_then(R::key_of)
                    .ok_or_else(|| SyncError::ValidationError("delete without key".to_string()))?;
                Ok(Some(Change::Deleted(id)))
            }
        }
    }

    fn ingest_change(&self, change: RowChange) {
        let kind = change.kind;
        let normalized = match self.normalize(change) {
            Ok(Some(normalized)) => normalized,
            Ok(None) => {
                debug!("Filtered {} {} event", R::TABLE, kind.as_str());
                return;
            }
            Err(e) => {
                warn!("Dropping {} {} event: {}", R::TABLE, kind.as_str(), e);
                return;
            }
        };
        let created_notice = match &normalized {
            Change::Created(record) => record.created_notice(),
            _ => None,
        };
        // Filtered-out updates also become removals; only real deletes count here.
        let deleted_id = match (&normalized, kind) {
            (Change::Deleted(id), ChangeKind::Delete) => Some(id.clone()),
            _ => None,
        };

        let applied = {
            let mut state = self.state.lock();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            let applied = state.apply(normalized);
            if let (Some(id), Some(hook)) = (&deleted_id, &self.on_deleted) {
                hook(id);
            }
            applied
        };
        metrics::record_event(R::TABLE, kind.as_str());

        let notice = match applied {
            Applied::Inserted => created_notice,
            Applied::Removed(old) => old.deleted_notice(),
            Applied::Replaced | Applied::Ignored => None,
        };
        self.bump();
        if let Some(notice) = notice {
            self.notices.show(notice);
        }
    }
}

/// Snapshot query for `R`, timed into the backend operation metrics.
async fn fetch_snapshot<R: FeedRecord>(service: &dyn DataService) -> Result<Vec<Value>, SyncError> {
    let start = Instant::now();
    let result = service.fetch_ordered(R::TABLE, R::ORDER_COLUMN).await;
    metrics::record_operation(
        "fetch",
        service.driver_name(),
        result.is_ok(),
        start.elapsed().as_secs_f64(),
    );
    result
}

/// Live mirror of one table. Dropping it releases the subscription; call
/// [`Feed::close`] to also wait for the event pump to finish.
pub struct Feed<R: FeedRecord> {
    shared: Arc<Shared<R>>,
    service: Arc<dyn DataService>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    fetch_task: Mutex<Option<JoinHandle<()>>>,
    pump_task: Mutex<Option<JoinHandle<()>>>,
    resync_lock: AsyncMutex<()>,
}

impl<R: FeedRecord> Feed<R> {
    /// Subscribe first, then fetch, so no change between the two is lost.
    pub async fn start(
        service: Arc<dyn DataService>,
        notices: Arc<dyn NoticeSink>,
        filter: Option<Arc<dyn RecordFilter<R>>>,
    ) -> Result<Self, SyncError> {
        Self::start_with_delete_hook(service, notices, filter, None).await
    }

    /// Like [`Feed::start`], calling `on_deleted` for every deleted row.
    /// The hook runs with the feed state locked.
    pub async fn start_with_delete_hook(
        service: Arc<dyn DataService>,
        notices: Arc<dyn NoticeSink>,
        filter: Option<Arc<dyn RecordFilter<R>>>,
        on_deleted: Option<DeleteHook<R::Id>>,
    ) -> Result<Self, SyncError> {
        let mut subscription = service.subscribe(R::TABLE).await?;
        debug!("Subscribed to {}", subscription.table());
        let (version, _) = watch::channel(0u64);
        let shared = Arc::new(Shared {
            state: Mutex::new(FeedState::new()),
            notices,
            filter,
            on_deleted,
            version,
            closed: AtomicBool::new(false),
        });

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let pump_shared = shared.clone();
        let pump_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    change = subscription.next() => match change {
                        Some(change) => pump_shared.ingest_change(change),
                        None => {
                            warn!("Change stream for {} ended", R::TABLE);
                            break;
                        }
                    },
                }
            }
            subscription.release();
        });

        let fetch_shared = shared.clone();
        let fetch_service = service.clone();
        let fetch_task = tokio::spawn(async move {
            match fetch_snapshot::<R>(fetch_service.as_ref()).await {
                Ok(rows) => fetch_shared.ingest_snapshot(rows),
                Err(e) => fetch_shared.snapshot_failed(e),
            }
        });

        info!("{} feed started on {} backend", R::TABLE, service.driver_name());

        Ok(Self {
            shared,
            service,
            shutdown: Mutex::new(Some(shutdown_tx)),
            fetch_task: Mutex::new(Some(fetch_task)),
            pump_task: Mutex::new(Some(pump_task)),
            resync_lock: AsyncMutex::new(()),
        })
    }

    pub fn view(&self) -> FeedView<R> {
        self.shared.state.lock().view()
    }

    pub fn get(&self, id: &R::Id) -> Option<R> {
        self.shared.state.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state.lock().is_loading()
    }

    /// Count of local records matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&R) -> bool) -> usize {
        self.shared.state.lock().records().iter().filter(|&r| predicate(r)).count()
    }

    /// Bumped after every state change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.version.subscribe()
    }

    pub async fn wait_until_loaded(&self) {
        let mut changes = self.changes();
        while self.is_loading() {
            if changes.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn service(&self) -> &Arc<dyn DataService> {
        &self.service
    }

    pub(crate) fn notices(&self) -> &Arc<dyn NoticeSink> {
        &self.shared.notices
    }

    /// Mutate a local record. `None` when the record is absent or the feed
    /// is closed.
    pub(crate) fn modify(&self, id: &R::Id, f: impl FnOnce(&mut R) -> bool) -> Option<bool> {
        let changed = {
            let mut state = self.shared.state.lock();
            if self.is_closed() {
                return None;
            }
            state.modify(id, f)
        };
        if changed == Some(true) {
            self.shared.bump();
        }
        changed
    }

    /// Bring the local list back in line with the table and the current
    /// filter: records the filter now denies go at once, then a fresh
    /// snapshot is merged so rows the filter lets through again come back.
    /// Live changes arriving meanwhile win over the fetch, as on start.
    ///
    /// Before the first snapshot lands this only refilters; that snapshot is
    /// filtered on arrival anyway.
    pub async fn resync(&self) -> Result<(), SyncError> {
        let _guard = self.resync_lock.lock().await;
        self.shared.refilter();

        let armed = {
            let mut state = self.shared.state.lock();
            !self.is_closed() && state.begin_resync()
        };
        if !armed {
            return Ok(());
        }

        // Runs to completion even if the caller stops waiting, so the state
        // is never left armed.
        let shared = self.shared.clone();
        let service = self.service.clone();
        let task = tokio::spawn(async move {
            match fetch_snapshot::<R>(service.as_ref()).await {
                Ok(rows) => {
                    shared.ingest_snapshot(rows);
                    Ok(())
                }
                Err(e) => {
                    shared.resync_failed(&e);
                    Err(e)
                }
            }
        });
        match task.await {
            Ok(result) => result,
            Err(e) => Err(SyncError::Unknown(format!("{} resync task failed: {}", R::TABLE, e))),
        }
    }

    /// Cancel the initial fetch if still running, release the subscription
    /// and wait for the event pump to stop. Idempotent.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.fetch_task.lock().take() {
            task.abort();
        }
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
        let pump = self.pump_task.lock().take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                warn!("{} event pump ended abnormally: {}", R::TABLE, e);
            }
        }
        info!("{} feed closed", R::TABLE);
    }
}

impl<R: FeedRecord> Drop for Feed<R> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.fetch_task.get_mut().take() {
            task.abort();
        }
        // Dropping the shutdown sender stops the pump, which releases the subscription.
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::time::Duration;

    /// Poll `feed` until `check` holds, failing after two seconds.
    pub async fn eventually<R: FeedRecord>(
        feed: &Feed<R>,
        check: impl Fn(&FeedView<R>) -> bool,
    ) -> FeedView<R> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let view = feed.view();
                if check(&view) {
                    return view;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("feed did not reach the expected state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use svckit::types::AppointmentRecord;

    fn appointment(id: i64, hour: u32, name: &str) -> AppointmentRecord {
        AppointmentRecord {
            id,
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(),
            appointment_date: None,
            appointment_time: None,
            patient_name: Some(name.to_string()),
            patient_phone: None,
            service: None,
            appointment_type: None,
            reason: None,
            status: Some("scheduled".to_string()),
            priority: None,
            location: None,
            notes: None,
        }
    }

    fn ids(state: &FeedState<AppointmentRecord>) -> Vec<i64> {
        state.records().iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_snapshot_ordered_newest_first() {
        let mut state = FeedState::new();
        assert!(state.is_loading());

        state.apply_snapshot(vec![
            appointment(1, 8, "a"),
            appointment(2, 12, "b"),
            appointment(3, 10, "c"),
        ]);

        assert_eq!(ids(&state), vec![2, 3, 1]);
        assert!(!state.is_loading());
    }

    #[test]
    fn test_created_prepends() {
        let mut state = FeedState::new();
        state.apply_snapshot(vec![appointment(1, 8, "a"), appointment(2, 9, "b")]);

        assert_eq!(state.apply(Change::Created(appointment(3, 7, "c"))), Applied::Inserted);
        assert_eq!(ids(&state), vec![3, 2, 1]);
    }

    #[test]
    fn test_created_twice_converges() {
        let mut state = FeedState::new();
        state.apply_snapshot(vec![]);

        state.apply(Change::Created(appointment(3, 7, "c")));
        assert_eq!(state.apply(Change::Created(appointment(3, 7, "c"))), Applied::Replaced);
        assert_eq!(ids(&state), vec![3]);
    }

    #[test]
    fn test_updated_replaces_in_place() {
        let mut state = FeedState::new();
        state.apply_snapshot(vec![appointment(1, 8, "a"), appointment(2, 9, "b"), appointment(3, 10, "c")]);

        let mut changed = appointment(2, 9, "b");
        changed.status = Some("in-progress".to_string());
        assert_eq!(state.apply(Change::Updated(changed)), Applied::Replaced);

        assert_eq!(ids(&state), vec![3, 2, 1]);
        assert_eq!(state.get(&2).unwrap().status.as_deref(), Some("in-progress"));
    }

    #[test]
    fn test_updated_unknown_id_is_noop() {
        let mut state = FeedState::new();
        state.apply_snapshot(vec![appointment(1, 8, "a")]);

        assert_eq!(state.apply(Change::Updated(appointment(9, 8, "z"))), Applied::Ignored);
        assert_eq!(ids(&state), vec![1]);
    }

    #[test]
    fn test_deleted_removes() {
        let mut state = FeedState::new();
        state.apply_snapshot(vec![appointment(1, 8, "a"), appointment(2, 9, "b")]);

        match state.apply(Change::Deleted(1)) {
            Applied::Removed(old) => assert_eq!(old.id, 1),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ids(&state), vec![2]);
        assert_eq!(state.apply(Change::Deleted(1)), Applied::Ignored);
    }

    #[test]
    fn test_live_create_before_snapshot_kept_once() {
        let mut state = FeedState::new();
        state.apply(Change::Created(appointment(5, 11, "live")));

        // Snapshot without id 5
        state.apply_snapshot(vec![appointment(1, 8, "a"), appointment(2, 9, "b")]);
        assert_eq!(ids(&state), vec![5, 2, 1]);
    }

    #[test]
    fn test_live_create_also_in_snapshot_not_duplicated() {
        let mut state = FeedState::new();
        state.apply(Change::Created(appointment(5, 11, "live")));

        state.apply_snapshot(vec![appointment(5, 11, "fetched"), appointment(1, 8, "a")]);
        assert_eq!(ids(&state), vec![5, 1]);
        assert_eq!(state.get(&5).unwrap().patient_name.as_deref(), Some("live"));
    }

    #[test]
    fn test_early_update_and_delete_win_over_snapshot() {
        let mut state = FeedState::new();
        let mut newer = appointment(1, 8, "a");
        newer.status = Some("completed".to_string());
        state.apply(Change::Updated(newer));
        state.apply(Change::Deleted(2));

        state.apply_snapshot(vec![appointment(1, 8, "a"), appointment(2, 9, "b")]);
        assert_eq!(ids(&state), vec![1]);
        assert_eq!(state.get(&1).unwrap().status.as_deref(), Some("completed"));
    }

    #[test]
    fn test_duplicate_snapshot_ids_collapse() {
        let mut state = FeedState::new();
        state.apply_snapshot(vec![appointment(1, 8, "a"), appointment(1, 8, "dup")]);
        assert_eq!(ids(&state), vec![1]);
    }

    #[test]
    fn test_resync_waits_for_first_snapshot() {
        let mut state: FeedState<AppointmentRecord> = FeedState::new();
        assert!(!state.begin_resync());

        state.apply_snapshot(vec![]);
        assert!(state.begin_resync());
        assert!(!state.begin_resync());
    }

    #[test]
    fn test_resync_replaces_stale_records() {
        let mut state = FeedState::new();
        state.apply_snapshot(vec![appointment(1, 8, "a"), appointment(2, 9, "b")]);
        assert!(state.begin_resync());

        // Arrives while the resync fetch is in flight
        state.apply(Change::Created(appointment(3, 12, "live")));

        state.apply_snapshot(vec![appointment(1, 8, "a"), appointment(4, 10, "d")]);
        assert_eq!(ids(&state), vec![3, 4, 1]);
        assert!(!state.is_loading());
    }

    #[test]
    fn test_retain_reports_dropped() {
        let mut state = FeedState::new();
        state.apply_snapshot(vec![appointment(1, 8, "a"), appointment(2, 9, "b"), appointment(3, 10, "c")]);

        assert_eq!(state.retain(|r| r.id != 2), 1);
        assert_eq!(ids(&state), vec![3, 1]);
    }

    #[test]
    fn test_fail_snapshot_stops_loading() {
        let mut state: FeedState<AppointmentRecord> = FeedState::new();
        state.fail_snapshot();
        assert!(!state.is_loading());
        assert!(state.records().is_empty());
    }
}
