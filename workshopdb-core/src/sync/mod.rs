//! Top-level sync orchestration
//!
//! One run drives Crawling → (Diffing) → Fetching → (AttachingDeps) →
//! Writing on the caller's worker. The snapshot file is read at most once
//! at the start (update mode) and written at most once at the end; callers
//! are responsible for serializing concurrent runs against the same output
//! path.

mod appdeps;
mod crawler;
mod diff;
mod fetcher;
pub mod platform;

pub use appdeps::attach_app_dependencies;
pub use crawler::CatalogCrawler;
pub use diff::{classify, CatalogDiff};
pub use fetcher::{DetailFetcher, FetchStats};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{AppDependencyProvider, WorkshopApi, DETAILS_BATCH_LIMIT};
use crate::error::SyncError;
use crate::progress::{CancelFlag, NoProgress, ProgressEvent, ProgressSink, SyncPhase};
use crate::snapshot::merge::{merge_trees, MergeRules};
use crate::snapshot::{ItemId, ItemRecord, Snapshot};

/// Catalog targeted when the operator does not specify one
pub const DEFAULT_APP_ID: u64 = 294_100;

/// Page size used for catalog enumeration
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Tuning and mode parameters for one sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub app_id: u64,
    pub page_size: u32,
    /// Snapshot lifetime in seconds; 0 writes a never-expiring snapshot
    pub expiry_secs: i64,
    /// Attach platform/DLC dependencies after fetching
    pub attach_app_deps: bool,
    /// Merge into an existing snapshot instead of overwriting it
    pub update: bool,
    pub output: PathBuf,
    pub merge_rules: MergeRules,
}

impl SyncOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            app_id: DEFAULT_APP_ID,
            page_size: DEFAULT_PAGE_SIZE,
            expiry_secs: 0,
            attach_app_deps: true,
            update: false,
            output: output.into(),
            merge_rules: MergeRules::default(),
        }
    }
}

/// What a completed run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Ids enumerated from the live catalog
    pub enumerated: usize,
    pub fetched: u64,
    pub skipped: u64,
    pub unpublished: u64,
    /// Incremental classification counts; zero on a full rebuild
    pub new: usize,
    pub changed: usize,
    pub deleted: usize,
    /// True when the run merged into an existing snapshot
    pub updated: bool,
}

/// The sync engine
///
/// Constructed once with its collaborators and reused across runs; there
/// is no hidden global state.
pub struct SyncEngine {
    api: Arc<dyn WorkshopApi>,
    app_deps: Option<Arc<dyn AppDependencyProvider>>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
}

impl SyncEngine {
    pub fn new(api: Arc<dyn WorkshopApi>) -> Self {
        Self {
            api,
            app_deps: None,
            progress: Arc::new(NoProgress),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_app_dependency_provider(
        mut self,
        provider: Arc<dyn AppDependencyProvider>,
    ) -> Self {
        self.app_deps = Some(provider);
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Flag shared with the caller; setting it stops the run at the next
    /// page or batch boundary without writing anything
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Execute one full or incremental sync run
    pub async fn run(&self, opts: &SyncOptions) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        let crawler = CatalogCrawler::new(self.api.as_ref(), self.progress.as_ref(), &self.cancel);
        let live_ids = crawler.enumerate(opts.app_id, opts.page_size).await?;
        if live_ids.is_empty() {
            return Err(SyncError::EmptyCatalog {
                app_id: opts.app_id,
            });
        }
        report.enumerated = live_ids.len();
        info!("enumerated {} items for app {}", live_ids.len(), opts.app_id);

        // Prior snapshot, update mode only. An unreadable or structurally
        // invalid file downgrades to a full rebuild instead of failing.
        let mut prior: Option<Snapshot> = None;
        if opts.update {
            match Snapshot::load(&opts.output) {
                Ok(snapshot) => prior = Some(snapshot),
                Err(err) => {
                    warn!("existing snapshot unusable, rebuilding from scratch: {err:#}");
                }
            }
        }

        let version = if opts.expiry_secs == 0 {
            0
        } else {
            Utc::now().timestamp() + opts.expiry_secs
        };
        let mut fresh = Snapshot::new(version);

        let worklist: Vec<ItemId> = match prior.as_mut() {
            Some(existing) => match self.bulk_timestamps(&live_ids).await? {
                Some(stamps) => {
                    let diff = classify(&live_ids, &stamps, existing);
                    report.new = diff.new.len();
                    report.changed = diff.changed.len();
                    report.deleted = diff.deleted.len();
                    self.progress.report(ProgressEvent::Summary {
                        new: diff.new.len() as u64,
                        changed: diff.changed.len() as u64,
                        deleted: diff.deleted.len() as u64,
                    });
                    info!(
                        "classified catalog: {} new, {} changed, {} deleted",
                        diff.new.len(),
                        diff.changed.len(),
                        diff.deleted.len()
                    );

                    let now = Utc::now().timestamp();
                    for id in &diff.deleted {
                        if let Some(record) = existing.database.get_mut(id) {
                            record.tombstone(now);
                        }
                    }

                    diff.worklist()
                }
                None => {
                    warn!("bulk timestamps unavailable, fetching the full live id set");
                    live_ids.clone()
                }
            },
            None => live_ids.clone(),
        };

        for id in &worklist {
            fresh
                .database
                .entry(id.clone())
                .or_insert_with(|| ItemRecord::skeleton(id));
        }

        let fetcher = DetailFetcher::new(self.api.as_ref(), self.progress.as_ref(), &self.cancel);
        let stats = fetcher.resolve(worklist, &mut fresh.database).await?;
        report.fetched = stats.fetched;
        report.skipped = stats.skipped;
        report.unpublished = stats.unpublished;

        if opts.attach_app_deps {
            if let Some(provider) = &self.app_deps {
                let ids: Vec<ItemId> = fresh
                    .database
                    .iter()
                    .filter(|(_, record)| !record.is_platform())
                    .map(|(id, _)| id.clone())
                    .collect();
                attach_app_dependencies(
                    provider.as_ref(),
                    &ids,
                    &mut fresh.database,
                    self.progress.as_ref(),
                    &self.cancel,
                )
                .await?;
            }
        }

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        self.progress.report(ProgressEvent::Phase {
            phase: SyncPhase::Writing,
            done: 0,
            total: 1,
        });

        let document = match prior {
            Some(existing) => {
                report.updated = true;
                merged_document(existing, &fresh, &opts.merge_rules)
                    .map_err(|source| SyncError::SnapshotWrite {
                        path: opts.output.clone(),
                        source,
                    })?
            }
            None => serde_json::to_value(&fresh).map_err(|err| SyncError::SnapshotWrite {
                path: opts.output.clone(),
                source: anyhow::Error::new(err),
            })?,
        };

        write_document(&opts.output, &document)?;
        self.progress.report(ProgressEvent::Phase {
            phase: SyncPhase::Writing,
            done: 1,
            total: 1,
        });
        info!(
            "wrote snapshot to {} ({} fetched, {} skipped)",
            opts.output.display(),
            report.fetched,
            report.skipped
        );

        Ok(report)
    }

    /// Chunked bulk-timestamp pass for change detection
    ///
    /// A failed chunk is logged and skipped; if every chunk fails the
    /// caller falls back to fetching the full live id set.
    async fn bulk_timestamps(
        &self,
        ids: &[ItemId],
    ) -> Result<Option<HashMap<ItemId, i64>>, SyncError> {
        let mut stamps = HashMap::new();
        let mut any_ok = false;
        let total = ids.len() as u64;
        let mut done: u64 = 0;

        for chunk in ids.chunks(DETAILS_BATCH_LIMIT) {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            match self.api.get_bulk_timestamps(chunk).await {
                Ok(map) => {
                    any_ok = true;
                    stamps.extend(map);
                }
                Err(err) => {
                    warn!(
                        "timestamp batch of {} ids failed, skipping: {err:#}",
                        chunk.len()
                    );
                }
            }

            done += chunk.len() as u64;
            self.progress.report(ProgressEvent::Phase {
                phase: SyncPhase::Diffing,
                done,
                total,
            });
        }

        debug!("collected {} remote timestamps", stamps.len());
        Ok(any_ok.then_some(stamps))
    }
}

/// Merge the loaded snapshot with the freshly built one
fn merged_document(
    existing: Snapshot,
    fresh: &Snapshot,
    rules: &MergeRules,
) -> Result<Value, anyhow::Error> {
    let mut old_tree = serde_json::to_value(&existing)?;
    let new_tree = serde_json::to_value(fresh)?;

    if let (Value::Object(old), Value::Object(new)) = (&mut old_tree, new_tree) {
        merge_trees(old, new, rules);
    }

    Ok(old_tree)
}

fn write_document(path: &Path, document: &Value) -> Result<(), SyncError> {
    let content =
        serde_json::to_string_pretty(document).map_err(|err| SyncError::SnapshotWrite {
            path: path.to_path_buf(),
            source: anyhow::Error::new(err),
        })?;

    std::fs::write(path, content).map_err(|err| SyncError::SnapshotWrite {
        path: path.to_path_buf(),
        source: anyhow::Error::new(err),
    })?;

    Ok(())
}
