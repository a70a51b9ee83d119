//! vCenter REST client with session handling.

use std::sync::RwLock;

use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use vmsync_engine::provider::{ProviderError, Result};

const SESSION_HEADER: &str = "vmware-api-session-id";

pub(crate) struct VcenterClient {
    http: reqwest::Client,
    base: String,
    username: String,
    password: String,
    session: RwLock<Option<String>>,
}

impl VcenterClient {
    pub fn new(url: &str, username: &str, password: &str, insecure_tls: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_tls)
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            base: api_base(url),
            username: username.to_string(),
            password: password.to_string(),
            session: RwLock::new(None),
        })
    }

    /// Create a new API session and keep its token.
    pub async fn login(&self) -> Result<()> {
        let url = format!("{}/session", self.base);
        debug!(url = %url, user = %self.username, "POST session");
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(transport)?;
        let token: String = decode(response).await?;
        if let Ok(mut session) = self.session.write() {
            *session = Some(token);
        }
        info!(user = %self.username, "Opened vCenter session");
        Ok(())
    }

    fn session_token(&self) -> Option<String> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    async fn send<Q: Serialize + ?Sized>(&self, path: &str, query: &Q) -> Result<Response> {
        let url = format!("{}{}", self.base, path);
        debug!(url = %url, "GET");
        let mut request = self.http.request(Method::GET, &url).query(query);
        if let Some(token) = self.session_token() {
            request = request.header(SESSION_HEADER, token);
        }
        request.send().await.map_err(transport)
    }

    /// GET a JSON resource. An expired session is renewed once.
    pub async fn get<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self.send(path, query).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return decode(response).await;
        }
        debug!("vCenter session expired, logging in again");
        self.login().await?;
        decode(self.send(path, query).await?).await
    }
}

/// Normalize a vCenter URL to its REST root, without trailing slash.
fn api_base(url: &str) -> String {
    let base = url.trim_end_matches('/');
    let base = base.strip_suffix("/api").unwrap_or(base);
    format!("{}/api", base)
}

fn transport(e: reqwest::Error) -> ProviderError {
    ProviderError::Transport(e.to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
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
    response
        .json()
        .await
        .map_err(|e| ProviderError::Decode(e.to_string()))
}
