//! Minimal PVE REST client: API token auth and `data` envelope unwrapping.

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use vmsync_engine::provider::{ProviderError, Result};

use crate::models::Envelope;

#[derive(Clone)]
pub(crate) struct PveClient {
    http: reqwest::Client,
    base: String,
}

impl PveClient {
    /// `token_id` is the full token ID (`user@realm!name`), `secret` its UUID.
    pub fn new(url: &str, token_id: &str, secret: &str, insecure_tls: bool) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("PVEAPIToken={}={}", token_id, secret))
            .map_err(|e| ProviderError::Auth(format!("invalid API token: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(insecure_tls)
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            base: api_base(url),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with(path, &[] as &[(&str, &str)]).await
    }

    pub async fn get_with<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base, path);
        debug!(url = %url, "GET");
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(message),
                _ => ProviderError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }
}

/// Normalize a PVE URL to its JSON API root, without trailing slash.
fn api_base(url: &str) -> String {
    let base = url.trim_end_matches('/');
    let base = base.strip_suffix("/api2/json").unwrap_or(base);
    format!("{}/api2/json", base)
}

fn transport(e: reqwest::Error) -> ProviderError {
    ProviderError::Transport(e.to_string())
}
