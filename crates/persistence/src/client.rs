//! Supabase REST client

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use trifivend_config::RecorderConfig;

use crate::error::PersistenceError;

/// PostgREST client for one Supabase project
#[derive(Clone)]
pub struct SupabaseClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl SupabaseClient {
    pub fn new(config: &RecorderConfig) -> Result<Self, PersistenceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PersistenceError::Client(e.to_string()))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", key);
        }
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, bearer);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));
        headers
    }

    /// Insert one row
    pub async fn insert<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> Result<(), PersistenceError> {
        let response = self
            .client
            .post(self.table_url(table))
            .headers(self.headers())
            .json(row)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::trace!(table = %table, status = status.as_u16(), "Row inserted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(PersistenceError::Rejected {
            table: table.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}
