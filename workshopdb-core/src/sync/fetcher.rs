//! Detail resolution with fixpoint dependency closure
//!
//! The worklist/visited-set shape makes two properties explicit: no id is
//! ever queried twice, and the loop terminates once a round discovers no
//! unvisited children.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use crate::api::{ItemDetails, WorkshopApi, DETAILS_BATCH_LIMIT, RESULT_OK};
use crate::error::SyncError;
use crate::progress::{CancelFlag, ProgressEvent, ProgressSink, SyncPhase};
use crate::snapshot::{item_url, ItemId, ItemRecord};

/// Per-run fetch accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Records the details endpoint returned, live or unpublished
    pub fetched: u64,
    /// Ids skipped because their batch failed; they stay skeletons
    pub skipped: u64,
    /// Ids the service reported as no longer published
    pub unpublished: u64,
}

/// Resolves item details and the transitive closure of their dependencies
pub struct DetailFetcher<'a> {
    api: &'a dyn WorkshopApi,
    progress: &'a dyn ProgressSink,
    cancel: &'a CancelFlag,
    batch_size: usize,
}

impl<'a> DetailFetcher<'a> {
    pub fn new(
        api: &'a dyn WorkshopApi,
        progress: &'a dyn ProgressSink,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            api,
            progress,
            cancel,
            batch_size: DETAILS_BATCH_LIMIT,
        }
    }

    #[cfg(test)]
    fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, DETAILS_BATCH_LIMIT);
        self
    }

    /// Resolve details for `seeds` plus every dependency id they
    /// transitively reference
    ///
    /// Ids enter the visited set the moment they are scheduled, so each is
    /// queried at most once and the pending worklist must eventually drain.
    /// A failed batch is logged and skipped; its ids remain skeletons for
    /// this run and are natural candidates for the next incremental pass.
    pub async fn resolve(
        &self,
        seeds: Vec<ItemId>,
        database: &mut BTreeMap<ItemId, ItemRecord>,
    ) -> Result<FetchStats, SyncError> {
        let mut stats = FetchStats::default();
        let mut visited: HashSet<ItemId> = HashSet::new();
        let mut pending: Vec<ItemId> = Vec::new();

        for id in seeds {
            if visited.insert(id.clone()) {
                pending.push(id);
            }
        }

        let mut done: u64 = 0;
        let mut total: u64 = pending.len() as u64;

        while !pending.is_empty() {
            let mut discovered: Vec<ItemId> = Vec::new();

            for chunk in pending.chunks(self.batch_size) {
                if self.cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }

                match self.api.get_details(chunk).await {
                    Ok(records) => {
                        stats.fetched += records.len() as u64;
                        for details in records {
                            apply_details(
                                details,
                                database,
                                &mut discovered,
                                &mut visited,
                                &mut stats,
                            );
                        }
                    }
                    Err(err) => {
                        warn!(
                            "details batch of {} ids failed, skipping: {err:#}",
                            chunk.len()
                        );
                        stats.skipped += chunk.len() as u64;
                    }
                }

                done += chunk.len() as u64;
                self.progress.report(ProgressEvent::Phase {
                    phase: SyncPhase::Fetching,
                    done,
                    total,
                });
            }

            debug!(
                "closure round complete: {done}/{total} processed, {} newly discovered",
                discovered.len()
            );
            total += discovered.len() as u64;
            pending = discovered;
        }

        Ok(stats)
    }
}

/// Fold one details record into the database and queue unseen children
fn apply_details(
    details: ItemDetails,
    database: &mut BTreeMap<ItemId, ItemRecord>,
    discovered: &mut Vec<ItemId>,
    visited: &mut HashSet<ItemId>,
    stats: &mut FetchStats,
) {
    let id = details.id;

    {
        let entry = database
            .entry(id.clone())
            .or_insert_with(|| ItemRecord::skeleton(&id));

        if details.result != RESULT_OK {
            debug!("item {id} reported result {}, marking unpublished", details.result);
            entry.unpublished = Some(true);
            entry.dependencies = None;
            stats.unpublished += 1;
            return;
        }

        entry.url = Some(item_url(&id));
        if entry.name.is_none() {
            entry.name = details.title;
        }
        if details.time_created.is_some() {
            entry.time_created = details.time_created;
        }
        if details.time_updated.is_some() {
            entry.time_updated = details.time_updated;
        }
    }

    for child in details.children {
        // the service occasionally reports an item as its own child
        if child == id {
            continue;
        }

        let known = database
            .get(&child)
            .filter(|record| record.is_populated())
            .map(|record| {
                (
                    record.name.clone().unwrap_or_default(),
                    record.url.clone().unwrap_or_else(|| item_url(&child)),
                )
            });

        match known {
            Some((name, url)) => {
                if let Some(parent) = database.get_mut(&id) {
                    parent.add_dependency(child, name, url);
                }
            }
            None => {
                database
                    .entry(child.clone())
                    .or_insert_with(|| ItemRecord::skeleton(&child));
                if visited.insert(child.clone()) {
                    discovered.push(child);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ItemPage};
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedDetails {
        items: HashMap<String, ItemDetails>,
        queried: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    impl ScriptedDetails {
        fn new(items: Vec<ItemDetails>) -> Self {
            Self {
                items: items.into_iter().map(|d| (d.id.clone(), d)).collect(),
                queried: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn queried_ids(&self) -> Vec<String> {
            self.queried
                .lock()
                .unwrap()
                .iter()
                .flatten()
                .cloned()
                .collect()
        }
    }

    fn live(id: &str, title: &str, children: &[&str]) -> ItemDetails {
        ItemDetails {
            id: id.to_string(),
            result: RESULT_OK,
            title: Some(title.to_string()),
            time_created: Some(10),
            time_updated: Some(20),
            children: children.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn gone(id: &str) -> ItemDetails {
        ItemDetails {
            id: id.to_string(),
            result: 9,
            title: None,
            time_created: None,
            time_updated: None,
            children: Vec::new(),
        }
    }

    #[async_trait]
    impl WorkshopApi for ScriptedDetails {
        async fn list_items(
            &self,
            _app_id: u64,
            _cursor: &str,
            _page_size: u32,
        ) -> Result<ItemPage, ApiError> {
            unimplemented!("not exercised by fetcher tests")
        }

        async fn get_details(&self, ids: &[ItemId]) -> Result<Vec<ItemDetails>, ApiError> {
            if self.fail {
                return Err(ApiError::Status {
                    endpoint: "details",
                    status: 503,
                });
            }

            self.queried.lock().unwrap().push(ids.to_vec());
            Ok(ids
                .iter()
                .map(|id| self.items.get(id).cloned().unwrap_or_else(|| gone(id)))
                .collect())
        }

        async fn get_bulk_timestamps(
            &self,
            _ids: &[ItemId],
        ) -> Result<HashMap<ItemId, i64>, ApiError> {
            unimplemented!("not exercised by fetcher tests")
        }
    }

    async fn run_fetch(
        api: &ScriptedDetails,
        seeds: &[&str],
    ) -> (BTreeMap<ItemId, ItemRecord>, FetchStats) {
        let cancel = CancelFlag::new();
        let progress = NoProgress;
        let fetcher = DetailFetcher::new(api, &progress, &cancel).with_batch_size(2);

        let mut database = BTreeMap::new();
        for id in seeds {
            database.insert(id.to_string(), ItemRecord::skeleton(id));
        }
        let stats = fetcher
            .resolve(seeds.iter().map(|s| s.to_string()).collect(), &mut database)
            .await
            .unwrap();
        (database, stats)
    }

    #[tokio::test]
    async fn populates_seed_records() {
        let api = ScriptedDetails::new(vec![live("1", "One", &[]), live("2", "Two", &[])]);
        let (database, stats) = run_fetch(&api, &["1", "2"]).await;

        assert_eq!(stats.fetched, 2);
        assert_eq!(database["1"].name.as_deref(), Some("One"));
        assert_eq!(database["1"].time_updated, Some(20));
        assert!(database["1"].url.is_some());
        assert_eq!(database["2"].name.as_deref(), Some("Two"));
    }

    #[tokio::test]
    async fn gone_items_are_marked_unpublished_without_dependencies() {
        let api = ScriptedDetails::new(vec![gone("300")]);
        let (database, stats) = run_fetch(&api, &["300"]).await;

        assert_eq!(stats.unpublished, 1);
        assert_eq!(database["300"].unpublished, Some(true));
        assert!(database["300"].dependencies.is_none());
    }

    #[tokio::test]
    async fn closure_resolves_children_outside_the_seed_set() {
        let api = ScriptedDetails::new(vec![
            live("A", "Parent", &["B"]),
            live("B", "Child", &[]),
        ]);
        let (database, _) = run_fetch(&api, &["A"]).await;

        // the referenced child exists with at least a url
        assert!(database.contains_key("B"));
        assert!(database["B"].url.is_some());
        assert_eq!(database["B"].name.as_deref(), Some("Child"));
    }

    #[tokio::test]
    async fn no_id_is_queried_twice() {
        // A and B reference each other; the cycle must not loop
        let api = ScriptedDetails::new(vec![
            live("A", "One", &["B"]),
            live("B", "Two", &["A"]),
        ]);
        let (_, stats) = run_fetch(&api, &["A"]).await;

        let queried = api.queried_ids();
        assert_eq!(stats.fetched, 2);
        assert_eq!(
            queried.iter().filter(|id| id.as_str() == "A").count(),
            1
        );
        assert_eq!(
            queried.iter().filter(|id| id.as_str() == "B").count(),
            1
        );
    }

    #[tokio::test]
    async fn edge_recorded_when_child_already_populated() {
        // B resolves in round one, A's re-listed child is then known
        let api = ScriptedDetails::new(vec![
            live("B", "Child", &[]),
            live("A", "Parent", &["B"]),
        ]);
        let (database, _) = run_fetch(&api, &["B", "A"]).await;

        let deps = database["A"].dependencies.as_ref().unwrap();
        assert_eq!(deps["B"].0, "Child");
    }

    #[tokio::test]
    async fn failed_batches_leave_skeletons_and_do_not_abort() {
        let mut api = ScriptedDetails::new(vec![live("1", "One", &[])]);
        api.fail = true;

        let (database, stats) = run_fetch(&api, &["1"]).await;

        assert_eq!(stats.fetched, 0);
        assert_eq!(stats.skipped, 1);
        assert!(database["1"].name.is_none());
        assert!(database["1"].url.is_some());
    }

    #[tokio::test]
    async fn cancellation_aborts_between_batches() {
        let api = ScriptedDetails::new(vec![live("1", "One", &[])]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let progress = NoProgress;
        let fetcher = DetailFetcher::new(&api, &progress, &cancel);

        let mut database = BTreeMap::new();
        let err = fetcher
            .resolve(vec!["1".to_string()], &mut database)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
    }
}
