//! Thin NetBox REST client: token auth, JSON bodies, pagination.

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use vmsync_engine::registry::{RegistryError, Result};

use crate::models::Paginated;

/// Client for the NetBox REST API.
#[derive(Clone)]
pub struct NetBoxClient {
    http: reqwest::Client,
    api: String,
}

impl NetBoxClient {
    /// Create a client for the NetBox instance at `url` (with or without the
    /// trailing `/api`).
    pub fn new(url: &str, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Token {}", token))
            .map_err(|e| RegistryError::Internal(format!("invalid token: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            api: api_root(url),
        })
    }

    /// Base URL of the API, ending in `/api/`.
    pub fn api_url(&self) -> &str {
        &self.api
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api, path)
    }

    /// GET a single object. `Ok(None)` on 404.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self.http.get(&url).send().await.map_err(transport)?;
        match decode(response).await {
            Ok(object) => Ok(Some(object)),
            Err(RegistryError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// GET the first page of a list endpoint.
    pub async fn list_page<T, Q>(&self, path: &str, query: &Q) -> Result<Paginated<T>>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.url(path);
        debug!(url = %url, "GET list");
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    /// GET a page by the absolute URL found in a previous page's `next`.
    pub async fn next_page<T: DeserializeOwned>(&self, url: &str) -> Result<Paginated<T>> {
        debug!(url = %url, "GET next page");
        let response = self.http.get(url).send().await.map_err(transport)?;
        decode(response).await
    }

    /// GET every object of a list endpoint, following `next` links.
    pub async fn list<T, Q>(&self, path: &str, query: &Q) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let mut page: Paginated<T> = self.list_page(path, query).await?;
        let mut items = Vec::new();
        loop {
            items.append(&mut page.results);
            match page.next.take() {
                Some(next) => page = self.next_page(&next).await?,
                None => break,
            }
        }
        Ok(items)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.url(path);
        debug!(url = %url, "PATCH");
        let response = self
            .http
            .patch(&url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        check(response).await.map(|_| ())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        debug!(url = %url, "DELETE");
        let response = self.http.delete(&url).send().await.map_err(transport)?;
        check(response).await.map(|_| ())
    }
}

/// Normalize a NetBox URL to its API root.
fn api_root(url: &str) -> String {
    let base = url.trim_end_matches('/');
    let base = base.strip_suffix("/api").unwrap_or(base);
    format!("{}/api/", base)
}

pub(crate) fn transport(e: reqwest::Error) -> RegistryError {
    RegistryError::Transport(e.to_string())
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let message = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(RegistryError::NotFound(url));
    }
    Err(RegistryError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check(response).await?;
    response
        .json()
        .await
        .map_err(|e| RegistryError::Decode(e.to_string()))
}
