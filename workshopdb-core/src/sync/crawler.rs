//! Catalog enumeration over the cursor-paginated list endpoint

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::api::{ApiError, WorkshopApi, START_CURSOR};
use crate::error::SyncError;
use crate::progress::{CancelFlag, ProgressEvent, ProgressSink, SyncPhase};
use crate::snapshot::ItemId;

/// Walks the list endpoint to enumerate every item id in a catalog
pub struct CatalogCrawler<'a> {
    api: &'a dyn WorkshopApi,
    progress: &'a dyn ProgressSink,
    cancel: &'a CancelFlag,
}

impl<'a> CatalogCrawler<'a> {
    pub fn new(
        api: &'a dyn WorkshopApi,
        progress: &'a dyn ProgressSink,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            api,
            progress,
            cancel,
        }
    }

    /// Enumerate all item ids for `app_id`
    ///
    /// The first response fixes the page count as
    /// `ceil(total / first_page_len)`; the loop stops once the page
    /// counter passes it or the cursor stops advancing. A rejected
    /// credential is fatal to the whole sync, there is nothing to
    /// enumerate without the list endpoint.
    pub async fn enumerate(
        &self,
        app_id: u64,
        page_size: u32,
    ) -> Result<Vec<ItemId>, SyncError> {
        let mut ids = Vec::new();
        let mut seen: HashSet<ItemId> = HashSet::new();
        let mut cursor = START_CURSOR.to_string();
        let mut page: u64 = 1;
        let mut pages: u64 = 1;

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let batch = self
                .api
                .list_items(app_id, &cursor, page_size)
                .await
                .map_err(|err| match err {
                    ApiError::CredentialRejected { status } => SyncError::InvalidCredential {
                        reason: format!("credential rejected with HTTP {status}"),
                    },
                    other => SyncError::ApiUnavailable {
                        source: anyhow::Error::new(other),
                    },
                })?;

            if page == 1 {
                if batch.ids.is_empty() {
                    debug!("first list page for app {app_id} is empty");
                    break;
                }
                pages = batch.total.div_ceil(batch.ids.len() as u64).max(1);
            }

            self.progress.report(ProgressEvent::Phase {
                phase: SyncPhase::Crawling,
                done: page.min(pages),
                total: pages,
            });
            debug!("crawled page {page}/{pages} ({} ids)", batch.ids.len());

            for id in batch.ids {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }

            page += 1;
            if page > pages {
                break;
            }
            if batch.next_cursor.is_empty() || batch.next_cursor == cursor {
                warn!(
                    "cursor stopped advancing after page {}/{pages} for app {app_id}",
                    page - 1
                );
                break;
            }
            cursor = batch.next_cursor;
        }

        Ok(ids)
    }
}
