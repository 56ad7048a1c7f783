//! JSON-over-HTTP client shared by the gateway and control-plane clients.
//!
//! # Responsibilities
//! - Build endpoint URLs from path segments (each segment percent-encoded)
//! - Attach timeout, user agent and optional bearer token
//! - Map non-success statuses to typed errors, keeping the response body
//! - Follow `next` links on paged collections

use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised by a single HTTP exchange.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    /// True when the remote answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// One page of a paged collection (`{"data": [...], "next": "/path?offset=..."}`).
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct Page<T> {
    #[serde(default)]
    data: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

/// Thin wrapper around `reqwest::Client` bound to a base URL.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    bearer: Option<String>,
}

impl RestClient {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, ClientError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base = Url::parse(&normalized).map_err(|e| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl {
                url: base_url.to_string(),
                reason: "expected an http(s) URL".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|source| ClientError::Request {
                url: base.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            base,
            bearer: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token.filter(|t| !t.is_empty());
        self
    }

    /// The base URL all endpoints are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build an endpoint URL below the base from raw path segments.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in `new`: the base is always a hierarchical http(s) URL.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Like [`endpoint`](Self::endpoint) with query parameters appended.
    pub fn endpoint_with_query(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint(segments);
        url.query_pairs_mut().extend_pairs(query);
        url
    }

    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let response = self.execute(Method::GET, url.clone(), |b| b).await?;
        decode(url, response).await
    }

    /// GET a single entity; 404 maps to `None`.
    pub async fn get_optional<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, ClientError> {
        match self.execute(Method::GET, url.clone(), |b| b).await {
            Ok(response) => decode(url, response).await.map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// GET every page of a collection, following `next` links.
    pub async fn get_paged<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, ClientError> {
        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next.take() {
            let page: Page<T> = self.get(url.clone()).await?;
            items.extend(page.data);
            if let Some(link) = page.next.filter(|l| !l.is_empty()) {
                let resolved = url.join(&link).map_err(|e| ClientError::InvalidUrl {
                    url: link.clone(),
                    reason: e.to_string(),
                })?;
                next = Some(resolved);
            }
        }
        Ok(items)
    }

    pub async fn post<B, T>(&self, url: Url, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(Method::POST, url.clone(), |b| b.json(body)).await?;
        decode(url, response).await
    }

    /// POST where the response body is irrelevant.
    pub async fn post_unit<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<(), ClientError> {
        self.execute(Method::POST, url, |b| b.json(body)).await.map(drop)
    }

    pub async fn put_unit<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<(), ClientError> {
        self.execute(Method::PUT, url, |b| b.json(body)).await.map(drop)
    }

    pub async fn patch<B, T>(&self, url: Url, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(Method::PATCH, url.clone(), |b| b.json(body)).await?;
        decode(url, response).await
    }

    pub async fn delete(&self, url: Url) -> Result<(), ClientError> {
        self.execute(Method::DELETE, url, |b| b).await.map(drop)
    }

    async fn execute<F>(&self, method: Method, url: Url, build: F) -> Result<reqwest::Response, ClientError>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let mut builder = self.http.request(method.clone(), url.clone());
        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }

        tracing::trace!(method = %method, url = %url, "Sending request");
        let response = build(builder).send().await.map_err(|source| ClientError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            method,
            url: url.to_string(),
            status,
            body,
        })
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base", &self.base.as_str())
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

async fn decode<T: DeserializeOwned>(url: Url, response: reqwest::Response) -> Result<T, ClientError> {
    response.json::<T>().await.map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
    })
}
