use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::protocol::{BacklogResponse, ReconciliationResponse};
use tracing::debug;
use url::Url;

use crate::error::DataSourceError;

pub const DEFAULT_BACKLOG_PATH: &str = "idoc-issues";
pub const DEFAULT_RECONCILED_BACKLOG_PATH: &str = "idoc-data";
pub const DEFAULT_RECONCILE_PATH: &str = "idoc-update";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend the orchestrator reads the backlog from and sends reconciliation to.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_backlog(&self) -> Result<BacklogResponse, DataSourceError>;
    /// Raw body; the caller unwraps whichever shape the backend used.
    async fn fetch_reconciled_backlog(&self) -> Result<Value, DataSourceError>;
    async fn submit_reconciliation(&self) -> Result<ReconciliationResponse, DataSourceError>;
}

pub struct MissingDataSource;

#[async_trait]
impl DataSource for MissingDataSource {
    async fn fetch_backlog(&self) -> Result<BacklogResponse, DataSourceError> {
        Err(DataSourceError::Unavailable(
            "no backend configured for backlog".to_string(),
        ))
    }

    async fn fetch_reconciled_backlog(&self) -> Result<Value, DataSourceError> {
        Err(DataSourceError::Unavailable(
            "no backend configured for reconciled backlog".to_string(),
        ))
    }

    async fn submit_reconciliation(&self) -> Result<ReconciliationResponse, DataSourceError> {
        Err(DataSourceError::Unavailable(
            "no backend configured for reconciliation".to_string(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub backlog: String,
    pub reconciled_backlog: String,
    pub reconcile: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG_PATH.to_string(),
            reconciled_backlog: DEFAULT_RECONCILED_BACKLOG_PATH.to_string(),
            reconcile: DEFAULT_RECONCILE_PATH.to_string(),
        }
    }
}

/// JSON-over-HTTP backend: `GET` for both backlogs, `POST` to reconcile.
pub struct HttpDataSource {
    http: Client,
    base_url: Url,
    endpoints: Endpoints,
}

impl HttpDataSource {
    pub fn new(base_url: &str) -> Result<Self, DataSourceError> {
        Self::with_options(base_url, Endpoints::default(), DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_options(
        base_url: &str,
        endpoints: Endpoints,
        timeout: Duration,
    ) -> Result<Self, DataSourceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| DataSourceError::Transport {
                endpoint: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: parse_base_url(base_url)?,
            endpoints,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, DataSourceError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| DataSourceError::InvalidUrl {
                url: format!("{}{}", self.base_url, path),
                source,
            })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
    ) -> Result<(String, Response), DataSourceError> {
        let url = self.endpoint_url(path)?;
        let endpoint = url.to_string();
        debug!(%method, %endpoint, "calling data source");

        let mut request = self.http.request(method.clone(), url);
        if method == Method::POST {
            request = request.header(CONTENT_TYPE, "application/json");
        }

        let response = request.send().await.map_err(|source| DataSourceError::Transport {
            endpoint: endpoint.clone(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(DataSourceError::Status { endpoint, status });
        }
        Ok((endpoint, response))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
    ) -> Result<T, DataSourceError> {
        let (endpoint, response) = self.send(method, path).await?;
        let body = response.bytes().await.map_err(|source| DataSourceError::Transport {
            endpoint: endpoint.clone(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|error| DataSourceError::Decode {
            endpoint,
            message: error.to_string(),
        })
    }
}

/// Base URLs are treated as directories so relative endpoint paths append to them.
fn parse_base_url(raw: &str) -> Result<Url, DataSourceError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).map_err(|source| DataSourceError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn fetch_backlog(&self) -> Result<BacklogResponse, DataSourceError> {
        self.call(Method::GET, &self.endpoints.backlog).await
    }

    async fn fetch_reconciled_backlog(&self) -> Result<Value, DataSourceError> {
        self.call(Method::GET, &self.endpoints.reconciled_backlog).await
    }

    async fn submit_reconciliation(&self) -> Result<ReconciliationResponse, DataSourceError> {
        self.call(Method::POST, &self.endpoints.reconcile).await
    }
}

#[cfg(test)]
#[path = "tests/data_source_tests.rs"]
mod tests;
