//! Platform/DLC dependency attachment
//!
//! The one parallel stage of the pipeline: per-item lookups are chunked
//! across the available parallelism, dispatched concurrently, and folded
//! back into the database after a join barrier. Chunks are independent and
//! order-insensitive; a failed chunk is logged and skipped.

use std::collections::BTreeMap;

use futures::future::join_all;
use tracing::{debug, warn};

use super::platform;
use crate::api::AppDependencyProvider;
use crate::error::SyncError;
use crate::progress::{CancelFlag, ProgressEvent, ProgressSink, SyncPhase};
use crate::snapshot::{ItemId, ItemRecord};

/// Resolve platform requirements for `ids` and fold the DLC edges into
/// `database`
///
/// Each resolved app id is checked against the static platform table; the
/// matching pseudo-item is created on demand and the edge recorded as
/// `database[id].dependencies[app_id] = [name, store_url]`.
pub async fn attach_app_dependencies(
    provider: &dyn AppDependencyProvider,
    ids: &[ItemId],
    database: &mut BTreeMap<ItemId, ItemRecord>,
    progress: &dyn ProgressSink,
    cancel: &CancelFlag,
) -> Result<(), SyncError> {
    if ids.is_empty() {
        return Ok(());
    }
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let chunk_size = ids.len().div_ceil(workers);
    let chunks: Vec<&[ItemId]> = ids.chunks(chunk_size).collect();
    let total = chunks.len() as u64;

    progress.report(ProgressEvent::Phase {
        phase: SyncPhase::AttachingDeps,
        done: 0,
        total,
    });
    debug!(
        "dispatching {} app-dependency chunks across {workers} workers",
        chunks.len()
    );

    let futures: Vec<_> = chunks
        .into_iter()
        .map(|chunk| provider.app_dependencies(chunk))
        .collect();
    let results = join_all(futures).await;

    let mut edges = 0usize;
    for result in results {
        let map = match result {
            Ok(map) => map,
            Err(err) => {
                warn!("app-dependency chunk failed, skipping: {err:#}");
                continue;
            }
        };

        for (id, app_ids) in map {
            for app_id in app_ids {
                let Some(name) = platform::known_app(app_id) else {
                    debug!("item {id} requires unknown platform app {app_id}");
                    continue;
                };

                let key = app_id.to_string();
                let url = platform::store_url(app_id);
                database
                    .entry(key.clone())
                    .or_insert_with(|| ItemRecord::platform(name, &url));
                if let Some(record) = database.get_mut(&id) {
                    record.add_dependency(key, name.to_string(), url);
                    edges += 1;
                }
            }
        }
    }

    progress.report(ProgressEvent::Phase {
        phase: SyncPhase::AttachingDeps,
        done: total,
        total,
    });
    debug!("attached {edges} platform dependency edges");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    struct FixedDeps {
        deps: HashMap<String, Vec<u64>>,
        fail: bool,
    }

    #[async_trait]
    impl AppDependencyProvider for FixedDeps {
        async fn app_dependencies(
            &self,
            ids: &[ItemId],
        ) -> Result<HashMap<ItemId, Vec<u64>>, ApiError> {
            if self.fail {
                return Err(ApiError::Status {
                    endpoint: "appdeps",
                    status: 500,
                });
            }
            Ok(ids
                .iter()
                .filter_map(|id| self.deps.get(id).map(|d| (id.clone(), d.clone())))
                .collect())
        }
    }

    fn database_with(ids: &[&str]) -> BTreeMap<ItemId, ItemRecord> {
        ids.iter()
            .map(|id| (id.to_string(), ItemRecord::skeleton(id)))
            .collect()
    }

    #[tokio::test]
    async fn folds_known_platform_edges_and_creates_pseudo_items() {
        let provider = FixedDeps {
            deps: HashMap::from([("1".to_string(), vec![1_149_640])]),
            fail: false,
        };
        let mut database = database_with(&["1", "2"]);
        let ids: Vec<ItemId> = vec!["1".to_string(), "2".to_string()];

        attach_app_dependencies(
            &provider,
            &ids,
            &mut database,
            &NoProgress,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        let deps = database["1"].dependencies.as_ref().unwrap();
        assert_eq!(deps["1149640"].0, "RimWorld - Royalty");
        assert!(database["1149640"].is_platform());
        assert!(database["2"].dependencies.is_none());
    }

    #[tokio::test]
    async fn unknown_platform_apps_are_ignored() {
        let provider = FixedDeps {
            deps: HashMap::from([("1".to_string(), vec![42])]),
            fail: false,
        };
        let mut database = database_with(&["1"]);
        let ids: Vec<ItemId> = vec!["1".to_string()];

        attach_app_dependencies(
            &provider,
            &ids,
            &mut database,
            &NoProgress,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        assert!(database["1"].dependencies.is_none());
        assert!(!database.contains_key("42"));
    }

    #[tokio::test]
    async fn failed_chunks_are_skipped() {
        let provider = FixedDeps {
            deps: HashMap::new(),
            fail: true,
        };
        let mut database = database_with(&["1"]);
        let ids: Vec<ItemId> = vec!["1".to_string()];

        attach_app_dependencies(
            &provider,
            &ids,
            &mut database,
            &NoProgress,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        assert!(database["1"].dependencies.is_none());
    }
}
