use crate::auth::{Credentials, TokenSource};
use crate::errors::{Error, Result};
use crate::metrics::STORE_FAILURES_TOTAL;
use crate::model::{Reading, Snapshot};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

/// Remote collection of readings keyed by store-generated ids.
///
/// There is no server-side filtering: every query is answered by fetching
/// the whole collection and working on it client-side.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Fetch the entire collection; `None` when it holds no records.
    async fn fetch_all(&self) -> Result<Option<Snapshot>>;

    /// Append a reading under a newly generated key and return the key.
    async fn push(&self, reading: &Reading) -> Result<String>;

    /// Delete one record. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

/// Firebase Realtime Database over its REST interface
pub struct FirebaseStore {
    client: Client,
    base_url: String,
    collection: String,
    tokens: TokenSource,
}

impl FirebaseStore {
    pub fn new(
        database_url: &str,
        collection: &str,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        info!(
            "Using Firebase store at {}/{} ({})",
            database_url.trim_end_matches('/'),
            collection,
            credentials_label(&credentials)
        );

        Ok(Self {
            tokens: TokenSource::new(credentials, client.clone()),
            client,
            base_url: database_url.trim_end_matches('/').to_string(),
            collection: collection.trim_matches('/').to_string(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/{}.json", self.base_url, self.collection)
    }

    fn record_url(&self, key: &str) -> String {
        format!("{}/{}/{}.json", self.base_url, self.collection, key)
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(match self.tokens.query_param().await? {
            Some((name, value)) => request.query(&[(name, value)]),
            None => request,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).await?.send().await.map_err(|e| {
            STORE_FAILURES_TOTAL.inc();
            error!("Store request failed: {}", e);
            Error::Http(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        STORE_FAILURES_TOTAL.inc();
        let body = response.text().await.unwrap_or_default();
        error!("Store returned {}: {}", status, body);
        Err(Error::StoreStatus {
            status: status.as_u16(),
            body,
        })
    }
}

fn credentials_label(credentials: &Credentials) -> &'static str {
    match credentials {
        Credentials::ServiceAccount(_) => "service account",
        Credentials::DatabaseSecret(_) => "database secret",
        Credentials::Anonymous => "unauthenticated",
    }
}

#[async_trait]
impl ReadingStore for FirebaseStore {
    async fn fetch_all(&self) -> Result<Option<Snapshot>> {
        let response = self.send(self.client.get(self.collection_url())).await?;
        let bytes = response.bytes().await?;
        let snapshot: Option<Snapshot> = serde_json::from_slice(&bytes)?;
        debug!(
            "Fetched {} records ({} bytes)",
            snapshot.as_ref().map_or(0, |s| s.len()),
            bytes.len()
        );
        Ok(snapshot.filter(|s| !s.is_empty()))
    }

    async fn push(&self, reading: &Reading) -> Result<String> {
        let response = self
            .send(self.client.post(self.collection_url()).json(reading))
            .await?;
        let created: PushResponse = response.json().await?;
        debug!("Stored reading under key {}", created.name);
        Ok(created.name)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.send(self.client.delete(self.record_url(key))).await?;
        Ok(())
    }
}
