//! reqwest-backed workshop service client
//!
//! Speaks the catalog service's JSON WebAPI: a cursor-paginated file query
//! endpoint, a chunked details endpoint (also used in a children-free form
//! for bulk timestamps) and the platform-dependency lookup.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{
    ApiError, ApiKey, AppDependencyProvider, ItemDetails, ItemPage, WorkshopApi,
    DETAILS_BATCH_LIMIT,
};
use crate::snapshot::ItemId;

/// Default public endpoint of the workshop WebAPI
pub const DEFAULT_BASE_URL: &str = "https://api.steampowered.com";

const LIST_ENDPOINT: &str = "IPublishedFileService/QueryFiles/v1";
const DETAILS_ENDPOINT: &str = "IPublishedFileService/GetDetails/v1";
const APP_DEPS_ENDPOINT: &str = "IPublishedFileService/GetAppDependencies/v1";

/// HTTP implementation of [`WorkshopApi`] and [`AppDependencyProvider`]
pub struct HttpWorkshopApi {
    client: reqwest::Client,
    base_url: String,
    key: ApiKey,
}

impl HttpWorkshopApi {
    pub fn new(key: ApiKey) -> Result<Self, ApiError> {
        Self::with_base_url(key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(key: ApiKey, base_url: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("workshopdb/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| ApiError::Transport {
                endpoint: "client",
                source,
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(String, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}/{}/", self.base_url, endpoint);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ApiError::CredentialRejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })
    }

    fn base_query(&self) -> Vec<(String, String)> {
        vec![("key".to_string(), self.key.as_str().to_string())]
    }

    /// Details query shared by `get_details` and `get_bulk_timestamps`;
    /// the latter drops the children payload
    async fn query_details(
        &self,
        ids: &[ItemId],
        include_children: bool,
    ) -> Result<Vec<DetailsEntry>, ApiError> {
        if ids.len() > DETAILS_BATCH_LIMIT {
            return Err(ApiError::InvalidRequest {
                endpoint: DETAILS_ENDPOINT,
                detail: format!(
                    "{} ids exceeds the {DETAILS_BATCH_LIMIT} per-call limit",
                    ids.len()
                ),
            });
        }

        let mut query = self.base_query();
        query.push((
            "includechildren".to_string(),
            include_children.to_string(),
        ));
        query.push(("itemcount".to_string(), ids.len().to_string()));
        for (index, id) in ids.iter().enumerate() {
            query.push((format!("publishedfileids[{index}]"), id.clone()));
        }

        let payload: Envelope<DetailsPayload> =
            self.get_json(DETAILS_ENDPOINT, &query).await?;

        Ok(payload.response.publishedfiledetails)
    }
}

#[async_trait]
impl WorkshopApi for HttpWorkshopApi {
    async fn list_items(
        &self,
        app_id: u64,
        cursor: &str,
        page_size: u32,
    ) -> Result<ItemPage, ApiError> {
        let mut query = self.base_query();
        query.push(("appid".to_string(), app_id.to_string()));
        query.push(("cursor".to_string(), cursor.to_string()));
        query.push(("numperpage".to_string(), page_size.to_string()));
        query.push(("return_only_ids".to_string(), "true".to_string()));

        let payload: Envelope<QueryFilesPayload> =
            self.get_json(LIST_ENDPOINT, &query).await?;

        let page = payload.response;
        debug!(
            "list page for app {app_id}: {} ids, total {}",
            page.publishedfiledetails.len(),
            page.total
        );

        Ok(ItemPage {
            ids: page
                .publishedfiledetails
                .into_iter()
                .map(|entry| entry.publishedfileid)
                .collect(),
            total: page.total,
            next_cursor: page.next_cursor,
        })
    }

    async fn get_details(&self, ids: &[ItemId]) -> Result<Vec<ItemDetails>, ApiError> {
        let entries = self.query_details(ids, true).await?;
        debug!("details batch: {} of {} ids returned", entries.len(), ids.len());

        Ok(entries
            .into_iter()
            .map(|entry| ItemDetails {
                id: entry.publishedfileid,
                result: entry.result,
                title: entry.title,
                time_created: entry.time_created,
                time_updated: entry.time_updated,
                children: entry
                    .children
                    .into_iter()
                    .map(|child| child.publishedfileid)
                    .collect(),
            })
            .collect())
    }

    async fn get_bulk_timestamps(
        &self,
        ids: &[ItemId],
    ) -> Result<HashMap<ItemId, i64>, ApiError> {
        let entries = self.query_details(ids, false).await?;

        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                entry
                    .time_updated
                    .map(|stamp| (entry.publishedfileid, stamp))
            })
            .collect())
    }
}

#[async_trait]
impl AppDependencyProvider for HttpWorkshopApi {
    async fn app_dependencies(
        &self,
        ids: &[ItemId],
    ) -> Result<HashMap<ItemId, Vec<u64>>, ApiError> {
        let mut query = self.base_query();
        for (index, id) in ids.iter().enumerate() {
            query.push((format!("publishedfileids[{index}]"), id.clone()));
        }

        let payload: Envelope<AppDepsPayload> =
            self.get_json(APP_DEPS_ENDPOINT, &query).await?;

        Ok(payload
            .response
            .app_dependencies
            .into_iter()
            .map(|entry| (entry.publishedfileid, entry.appids))
            .collect())
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Deserialize)]
struct QueryFilesPayload {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    next_cursor: String,
    #[serde(default)]
    publishedfiledetails: Vec<FileRef>,
}

#[derive(Deserialize)]
struct FileRef {
    publishedfileid: String,
}

#[derive(Deserialize)]
struct DetailsPayload {
    #[serde(default)]
    publishedfiledetails: Vec<DetailsEntry>,
}

#[derive(Deserialize)]
struct DetailsEntry {
    publishedfileid: String,
    #[serde(default)]
    result: i32,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    time_created: Option<i64>,
    #[serde(default)]
    time_updated: Option<i64>,
    #[serde(default)]
    children: Vec<FileRef>,
}

#[derive(Deserialize)]
struct AppDepsPayload {
    #[serde(default)]
    app_dependencies: Vec<AppDepsEntry>,
}

#[derive(Deserialize)]
struct AppDepsEntry {
    publishedfileid: String,
    #[serde(default)]
    appids: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_payloads_deserialize() {
        let page: Envelope<QueryFilesPayload> = serde_json::from_str(
            r#"{"response": {"total": 3, "next_cursor": "AoJw", "publishedfiledetails": [
                {"publishedfileid": "100"}, {"publishedfileid": "200"}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(page.response.total, 3);
        assert_eq!(page.response.publishedfiledetails.len(), 2);

        let details: Envelope<DetailsPayload> = serde_json::from_str(
            r#"{"response": {"publishedfiledetails": [{
                "publishedfileid": "100",
                "result": 1,
                "title": "A Mod",
                "time_created": 10,
                "time_updated": 20,
                "children": [{"publishedfileid": "200"}]
            }]}}"#,
        )
        .unwrap();
        let entry = &details.response.publishedfiledetails[0];
        assert_eq!(entry.result, 1);
        assert_eq!(entry.children[0].publishedfileid, "200");
    }

    #[test]
    fn missing_optional_wire_fields_default() {
        let details: Envelope<DetailsPayload> = serde_json::from_str(
            r#"{"response": {"publishedfiledetails": [{
                "publishedfileid": "300", "result": 9
            }]}}"#,
        )
        .unwrap();
        let entry = &details.response.publishedfiledetails[0];
        assert_eq!(entry.result, 9);
        assert!(entry.title.is_none());
        assert!(entry.children.is_empty());
    }

    #[tokio::test]
    async fn oversized_details_batch_is_rejected_locally() {
        let key = ApiKey::new("0123456789abcdef0123456789abcdef").unwrap();
        let api = HttpWorkshopApi::new(key).unwrap();
        let ids: Vec<ItemId> = (0..=DETAILS_BATCH_LIMIT).map(|i| i.to_string()).collect();

        let err = api.get_details(&ids).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest { .. }));
    }
}
