//! Collector - one bounded, resumable pass over a work list
//!
//! This module contains the collection loop that:
//! - Treats every work item already in the fetch log as done
//! - Waits for a usable credential before each fetch
//! - Classifies each fetched file listing
//! - Appends exactly one record per finished item, synced before moving on
//! - Stops cleanly when quota will not free up within the allowed wait

use crate::classifier::classify;
use crate::collector::{FetchLog, FetchRecord, WorkItem, WorkItemState};
use crate::credentials::{CredentialPool, PoolError, UNKNOWN_RESET};
use crate::fetcher::{FetchError, Fetcher};
use crate::store::{CanonicalStore, StoreResult};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Why a collection pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every work item reached a terminal state
    Completed,

    /// No credential becomes ready before `ready_at`; the rest stays pending
    Deferred { ready_at: DateTime<Utc> },

    /// Every credential is spent and none reported when its quota resets
    QuotaUnknown,
}

impl StopReason {
    /// Stop reason for a pass that ran out of quota
    pub fn out_of_quota(ready_at: DateTime<Utc>) -> Self {
        if ready_at == UNKNOWN_RESET {
            StopReason::QuotaUnknown
        } else {
            StopReason::Deferred { ready_at }
        }
    }
}

/// Outcome of one collection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Items fetched and recorded as Done in this pass
    pub succeeded: usize,

    /// Items recorded as Failed in this pass
    pub failed: usize,

    /// Items that already had a record when the pass started
    pub already_done: usize,

    /// Items left Pending for a later pass
    pub pending: usize,

    pub stop: StopReason,

    /// Final state of every work item, in work-list order
    pub items: Vec<WorkItem>,
}

impl RunReport {
    /// Returns true if nothing is left for a later pass
    pub fn is_complete(&self) -> bool {
        self.stop == StopReason::Completed && self.pending == 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded={}, failed={}, skipped={}, pending={}",
            self.succeeded, self.failed, self.already_done, self.pending
        )
    }
}

/// Drives a work list through a [`Fetcher`] into a [`FetchLog`]
pub struct Collector {
    fetcher: Arc<dyn Fetcher>,
    pool: CredentialPool,
    max_wait: Duration,
    concurrency: usize,
}

type FetchOutcome = (usize, Result<Value, FetchError>);

impl Collector {
    /// Creates a sequential collector
    ///
    /// # Arguments
    ///
    /// * `fetcher` - The per-source adapter that fetches one item
    /// * `pool` - The pool the fetcher's client draws credentials from
    /// * `max_wait` - Longest wait for quota before the pass stops as deferred
    pub fn new(fetcher: Arc<dyn Fetcher>, pool: CredentialPool, max_wait: Duration) -> Self {
        Self {
            fetcher,
            pool,
            max_wait,
            concurrency: 1,
        }
    }

    /// Allows up to `concurrency` fetches in flight at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Runs one bounded pass over `items`
    ///
    /// Items already present in `log` are skipped. Per-item failures are
    /// recorded and the pass continues. Transient failures get no record and
    /// stay pending. Only an empty credential pool or a log write failure
    /// aborts the pass.
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - The pass completed or stopped cleanly on quota
    /// * `Err(HarvestError)` - The pass was aborted
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        log: &mut FetchLog,
    ) -> Result<RunReport, HarvestError> {
        let mut items = dedup_items(items);
        let mut queue = VecDeque::new();
        let mut already_done = 0;

        for (index, item) in items.iter_mut().enumerate() {
            if log.contains(&item.id) {
                item.state = WorkItemState::Done;
                already_done += 1;
            } else {
                item.state = WorkItemState::Pending;
                queue.push_back(index);
            }
        }

        tracing::info!(
            "Collecting {} work item(s): {} already recorded, {} to fetch",
            items.len(),
            already_done,
            queue.len()
        );

        let clock = self.pool.clock();
        let start_time = std::time::Instant::now();
        let mut in_flight: JoinSet<FetchOutcome> = JoinSet::new();
        let mut stop = StopReason::Completed;
        let mut succeeded = 0;
        let mut failed = 0;
        let mut processed = 0;

        loop {
            while stop == StopReason::Completed && in_flight.len() < self.concurrency {
                let Some(index) = queue.pop_front() else {
                    break;
                };

                match self.pool.wait_ready(self.max_wait).await {
                    Ok(()) => {}
                    Err(PoolError::NotReadyWithin { ready_at }) => {
                        queue.push_front(index);
                        stop = StopReason::out_of_quota(ready_at);
                        break;
                    }
                    Err(PoolError::Exhausted) => {
                        return Err(HarvestError::Pool(PoolError::Exhausted));
                    }
                }

                items[index].state = WorkItemState::Fetching;
                let item = items[index].clone();
                let fetcher = Arc::clone(&self.fetcher);
                in_flight.spawn(async move { (index, fetcher.fetch(&item).await) });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (index, result) = joined?;
            let item = &mut items[index];

            let record = match result {
                Ok(payload) => {
                    let artifacts = classify(&self.fetcher.file_listing(&payload));
                    if !artifacts.is_empty() {
                        tracing::debug!("{}: {} artifact(s) flagged", item.id, artifacts.len());
                    }
                    item.state = WorkItemState::Done;
                    succeeded += 1;
                    FetchRecord::success(item, clock.now(), payload, artifacts)
                }
                Err(FetchError::QuotaDeferred { ready_at }) => {
                    tracing::info!("{}: deferred, quota resets at {}", item.id, ready_at);
                    item.state = WorkItemState::Pending;
                    if stop == StopReason::Completed {
                        stop = StopReason::out_of_quota(ready_at);
                    }
                    continue;
                }
                Err(FetchError::PoolExhausted) => {
                    item.state = WorkItemState::Pending;
                    return Err(HarvestError::Pool(PoolError::Exhausted));
                }
                Err(e) if !e.is_item_failure() => {
                    tracing::warn!("{}: left pending for a later pass: {}", item.id, e);
                    item.state = WorkItemState::Pending;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("{}: fetch failed: {}", item.id, e);
                    item.state = WorkItemState::Failed;
                    failed += 1;
                    FetchRecord::failure(item, clock.now(), e.to_string())
                }
            };

            log.append(&record)?;
            processed += 1;

            if processed % 10 == 0 {
                let elapsed = start_time.elapsed();
                tracing::info!(
                    "Progress: {} items recorded, {} queued, {:.2} items/sec",
                    processed,
                    queue.len(),
                    processed as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
                );
            }
        }

        let pending = items.iter().filter(|item| !item.state.is_terminal()).count();

        let report = RunReport {
            succeeded,
            failed,
            already_done,
            pending,
            stop,
            items,
        };

        match stop {
            StopReason::Completed => tracing::info!("Collection complete: {}", report),
            StopReason::Deferred { ready_at } => tracing::info!(
                "Collection deferred until {}: {}",
                ready_at,
                report
            ),
            StopReason::QuotaUnknown => tracing::warn!(
                "Collection stopped, quota spent with no reported reset: {}",
                report
            ),
        }

        Ok(report)
    }
}

/// Drops repeated ids, keeping the first occurrence
fn dedup_items(items: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}

/// Builds the work list for `host` from entities that have no metrics yet
///
/// Every repository identity on `host` becomes one work item; ids are
/// deduplicated and sorted so repeated runs walk the same order.
pub fn work_items_from_store(store: &dyn CanonicalStore, host: &str) -> StoreResult<Vec<WorkItem>> {
    let mut ids = BTreeSet::new();
    for entity in store.entities_without_metrics()? {
        for identity in entity.identities() {
            if identity.host == host {
                ids.insert(identity.work_item_id());
            }
        }
    }

    tracing::info!("Generated {} work item(s) for {}", ids.len(), host);
    Ok(ids.into_iter().map(|id| WorkItem::new(id, host)).collect())
}
