//! HTTP client for the store's v2 keys API
//!
//! Every request walks the configured endpoints in order. An endpoint that
//! cannot be connected to is skipped; the first endpoint that answers is
//! authoritative, whatever it answers. When no endpoint answers, the whole
//! round is retried after a jittered pause, forever.

use crate::common::{encode_key_path, jittered, wire_bool, Error, Result, StoreConfig};
use crate::store::types::{Precondition, Response, Wait};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;

type Params = Vec<(&'static str, String)>;

/// Failover-aware store client. Cheap to clone; clones share one connection pool.
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    endpoints: Arc<[String]>,
    version: u32,
    prefix: Arc<str>,
    retry_interval: Duration,
    retry_jitter: f64,
}

impl Client {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            endpoints: config
                .endpoints
                .iter()
                .map(|e| e.trim_end_matches('/').to_string())
                .collect(),
            version: config.version,
            prefix: Arc::from(config.prefix.trim_matches('/')),
            retry_interval: config.retry_interval(),
            retry_jitter: config.retry_jitter,
        })
    }

    /// Client for the given endpoints with every other setting at its default.
    pub fn connect<I, S>(endpoints: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(&StoreConfig::with_endpoints(endpoints))
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn retry_jitter(&self) -> f64 {
        self.retry_jitter
    }

    fn url(&self, endpoint: &str, path: &str) -> String {
        let path = encode_key_path(path);
        if self.prefix.is_empty() {
            format!("{}/v{}/{}", endpoint, self.version, path)
        } else {
            format!("{}/v{}/{}/{}", endpoint, self.version, self.prefix, path)
        }
    }

    /// Read a key, optionally long-polling for a change.
    pub async fn get(&self, path: &str, wait: Wait) -> Result<Response> {
        self.request(Method::GET, path, &read_params(wait)).await
    }

    /// Conditionally write a key, or delete it when `value` is `None`.
    ///
    /// A failed precondition comes back as [`Error::Rejected`]; check it with
    /// [`Error::is_precondition_failed`]. Deleting with a ttl or with an
    /// existence precondition is refused before anything is sent.
    pub async fn set(
        &self,
        path: &str,
        value: Option<&str>,
        precondition: Option<Precondition>,
        ttl: Option<u64>,
    ) -> Result<Response> {
        let (method, params) = write_params(value, precondition.as_ref(), ttl)?;
        self.request(method, path, &params).await
    }

    /// Delete a key, optionally only if it still holds a value or index.
    pub async fn delete(&self, path: &str, precondition: Option<Precondition>) -> Result<Response> {
        self.set(path, None, precondition, None).await
    }

    /// Delete a directory node.
    pub async fn delete_dir(&self, path: &str, recursive: bool) -> Result<Response> {
        let params = vec![("dir", wire_bool(true)), ("recursive", wire_bool(recursive))];
        self.request(Method::DELETE, path, &params).await
    }

    async fn request(&self, method: Method, path: &str, params: &Params) -> Result<Response> {
        loop {
            for endpoint in self.endpoints.iter() {
                let url = self.url(endpoint, path);
                tracing::debug!(%method, %url, ?params, "store request");

                let response = match self
                    .http
                    .request(method.clone(), &url)
                    .query(params)
                    .send()
                    .await
                {
                    Ok(response) => response,
                    Err(e) if e.is_connect() => {
                        tracing::warn!(%endpoint, error = %e, "Connection error when making request");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };

                let result = decode(response).await;
                tracing::debug!(?result, "store response");
                return result;
            }

            let delay = jittered(self.retry_interval, self.retry_jitter);
            tracing::warn!(
                "Could not contact any store endpoint. Waiting for {:.2?}",
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn read_params(wait: Wait) -> Params {
    match wait {
        Wait::No => vec![("wait", wire_bool(false))],
        Wait::Next => vec![("wait", wire_bool(true))],
        Wait::After(index) => vec![
            ("wait", wire_bool(true)),
            ("waitIndex", (index + 1).to_string()),
        ],
    }
}

fn write_params(
    value: Option<&str>,
    precondition: Option<&Precondition>,
    ttl: Option<u64>,
) -> Result<(Method, Params)> {
    let mut params = Params::new();

    let method = match value {
        Some(value) => {
            params.push(("value", value.to_string()));
            Method::PUT
        }
        None => {
            if ttl.is_some() {
                return Err(Error::InvalidArgument(
                    "cannot combine a delete with a ttl".into(),
                ));
            }
            if precondition.is_some_and(Precondition::is_existence) {
                return Err(Error::InvalidArgument(
                    "cannot combine a delete with an existence precondition".into(),
                ));
            }
            Method::DELETE
        }
    };

    if let Some(ttl) = ttl {
        params.push(("ttl", ttl.to_string()));
    }

    match precondition {
        Some(Precondition::Absent) => params.push(("prevExist", wire_bool(false))),
        Some(Precondition::Present) => params.push(("prevExist", wire_bool(true))),
        Some(Precondition::Value(v)) => params.push(("prevValue", v.clone())),
        Some(Precondition::Index(i)) => params.push(("prevIndex", i.to_string())),
        None => {}
    }

    Ok((method, params))
}

async fn decode(response: reqwest::Response) -> Result<Response> {
    let status = response.status();
    let body = response.bytes().await?;

    // Rejections carry a JSON payload whatever the status code.
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&body) {
        if value.get("errorCode").is_some() {
            return Err(Error::Rejected(serde_json::from_value(value)?));
        }
        if status.is_success() {
            return Ok(serde_json::from_value(value)?);
        }
    }

    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    Ok(serde_json::from_slice(&body)?)
}
