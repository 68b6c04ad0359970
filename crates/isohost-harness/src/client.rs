//! HTTP client bound to a started host

use crate::error::{HarnessError, Result};
use isohost_server::IsolatedHost;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Per-request timeout of test clients
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for one host under test
#[derive(Debug, Clone)]
pub struct TestClient {
    http: Client,
    base_url: Url,
}

impl TestClient {
    /// Create a client for `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let http = Client::builder().timeout(DEFAULT_REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url })
    }

    /// Create a client for a started host
    pub fn for_host(host: &IsolatedHost) -> Result<Self> {
        let base_url = host.base_url().ok_or(HarnessError::HostNotServing)?;
        Self::new(&base_url)
    }

    /// Address requests are sent to
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Send a GET request
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = self.url(path)?;
        tracing::debug!("GET {}", url);
        Ok(self.http.get(url).send().await?)
    }

    /// GET and decode a JSON body; non-success statuses are errors
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path).await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    /// GET and return only the status code
    pub async fn get_status(&self, path: &str) -> Result<u16> {
        Ok(self.get(path).await?.status().as_u16())
    }
}
