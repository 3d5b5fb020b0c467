use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::items_url;
use crate::error::Stac2IsoError;

pub trait CatalogClient: Send + Sync {
    /// `collections` array of the catalog root; empty when the key is absent.
    fn fetch_collection_list(&self, catalog_root: &str) -> Result<Vec<Value>, Stac2IsoError>;
    fn fetch_collection(&self, collection_url: &str) -> Result<Value, Stac2IsoError>;
    /// `features` of the first items page; a non-success status yields no items.
    fn fetch_items(&self, collection_url: &str) -> Result<Vec<Value>, Stac2IsoError>;
}

#[derive(Clone)]
pub struct StacHttpClient {
    client: Client,
}

impl StacHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, Stac2IsoError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("stac2iso/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| Stac2IsoError::CatalogHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| Stac2IsoError::CatalogHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn send(&self, url: &str) -> Result<reqwest::blocking::Response, Stac2IsoError> {
        debug!(url = %url, "GET");
        self.client
            .get(url)
            .send()
            .map_err(|err| Stac2IsoError::CatalogHttp(err.to_string()))
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, Stac2IsoError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "catalog request failed".to_string());
        Err(Stac2IsoError::CatalogStatus { status, message })
    }

    fn decode(response: reqwest::blocking::Response) -> Result<Value, Stac2IsoError> {
        response
            .json()
            .map_err(|err| Stac2IsoError::CatalogDecode(err.to_string()))
    }
}

impl CatalogClient for StacHttpClient {
    fn fetch_collection_list(&self, catalog_root: &str) -> Result<Vec<Value>, Stac2IsoError> {
        let response = Self::handle_status(self.send(catalog_root)?)?;
        let body = Self::decode(response)?;
        Ok(array_field(body, "collections"))
    }

    fn fetch_collection(&self, collection_url: &str) -> Result<Value, Stac2IsoError> {
        let response = Self::handle_status(self.send(collection_url)?)?;
        Self::decode(response)
    }

    fn fetch_items(&self, collection_url: &str) -> Result<Vec<Value>, Stac2IsoError> {
        let url = items_url(collection_url);
        let response = self.send(&url)?;
        if !response.status().is_success() {
            warn!(url = %url, status = response.status().as_u16(), "items request failed");
            return Ok(Vec::new());
        }
        let body = Self::decode(response)?;
        Ok(array_field(body, "features"))
    }
}

pub fn array_field(mut body: Value, key: &str) -> Vec<Value> {
    match body.get_mut(key).map(Value::take) {
        Some(Value::Array(values)) => values,
        _ => Vec::new(),
    }
}
