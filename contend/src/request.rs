//! Request execution against the target.
//!
//! A [`RequestExecutor`] turns one [`Request`] into one [`Outcome`]. It never fails:
//! 4xx and 5xx responses are ordinary outcomes, and connection-level problems are
//! carried in [`Outcome::transport_error`] with no status code.
//!
//! [`HttpExecutor`] is the `reqwest` implementation. [`Recorded`] wraps any executor
//! and feeds every outcome into the per-endpoint statistics, keyed by the endpoint's
//! template label (`/products/[id] [GET]`) rather than the concrete path, so the
//! numbers aggregate over the whole id domain.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use crate::{
    aggregate::StatsAggregator,
    error::{ConfigError, Result},
    resource::{ResourceId, ResourceRecord},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// The logical endpoints the harness talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Read(ResourceId),
    /// Same request as `Read`, reported under its own label.
    ReadAfterWrite(ResourceId),
    Write(ResourceId),
    Health,
}

impl Endpoint {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::Write(_) => Method::Post,
            _ => Method::Get,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Endpoint::Read(id) | Endpoint::ReadAfterWrite(id) => format!("/products/{id}"),
            Endpoint::Write(id) => format!("/products/{id}/details"),
            Endpoint::Health => "/healthz".to_string(),
        }
    }

    /// Metric label for the endpoint template, independent of the id.
    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::Read(_) => "/products/[id] [GET]",
            Endpoint::ReadAfterWrite(_) => "/products/[id] [GET] (after write)",
            Endpoint::Write(_) => "/products/[id]/details [POST]",
            Endpoint::Health => "/healthz",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub endpoint: Endpoint,
    pub body: Option<ResourceRecord>,
}

impl Request {
    pub fn read(id: ResourceId) -> Self {
        Self {
            endpoint: Endpoint::Read(id),
            body: None,
        }
    }

    pub fn read_after_write(id: ResourceId) -> Self {
        Self {
            endpoint: Endpoint::ReadAfterWrite(id),
            body: None,
        }
    }

    pub fn write(record: ResourceRecord) -> Self {
        Self {
            endpoint: Endpoint::Write(record.product_id),
            body: Some(record),
        }
    }

    pub fn health() -> Self {
        Self {
            endpoint: Endpoint::Health,
            body: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Other,
}

/// A connection-level failure: nothing usable came back from the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, detail)
    }
}

impl From<&reqwest::Error> for TransportError {
    fn from(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Other => "error",
        };
        write!(f, "{kind}: {}", self.detail)
    }
}

/// What came back for one request.
///
/// Exactly one of `status` and `transport_error` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub endpoint: Endpoint,
    pub status: Option<u16>,
    pub body: Vec<u8>,
    pub transport_error: Option<TransportError>,
    pub latency: Duration,
}

impl Outcome {
    pub fn response(endpoint: Endpoint, status: u16, body: Vec<u8>, latency: Duration) -> Self {
        Self {
            endpoint,
            status: Some(status),
            body,
            transport_error: None,
            latency,
        }
    }

    pub fn transport(endpoint: Endpoint, error: TransportError, latency: Duration) -> Self {
        Self {
            endpoint,
            status: None,
            body: Vec::new(),
            transport_error: Some(error),
            latency,
        }
    }

    pub fn is_transport_error(&self) -> bool {
        self.transport_error.is_some()
    }
}

/// Sends a single request and reports what happened.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: Request) -> Outcome;
}

/// `reqwest`-backed executor for a target base url such as `http://localhost:8080`.
#[derive(Debug, Clone, TypedBuilder)]
pub struct HttpExecutor {
    #[builder(setter(into))]
    host: String,
    client: Client,
}

impl HttpExecutor {
    /// Builds an executor with its own connection pool.
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self> {
        let host = host.into().trim_end_matches('/').to_string();
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ConfigError::InvalidHost(host).into());
        }
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(num_cpus::get() * 16)
            .build()?;
        Ok(Self::builder().host(host).client(client).build())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn send(&self, request: &Request) -> reqwest::Result<(u16, Vec<u8>)> {
        let url = format!(
            "{}{}",
            self.host.trim_end_matches('/'),
            request.endpoint.path()
        );
        let builder = match request.endpoint.method() {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        let builder = match &request.body {
            Some(record) => builder.json(record),
            None => builder,
        };
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok((status, body.to_vec()))
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(&self, request: Request) -> Outcome {
        let start = Instant::now();
        let result = self.send(&request).await;
        let latency = start.elapsed();
        match result {
            Ok((status, body)) => Outcome::response(request.endpoint, status, body, latency),
            Err(err) => Outcome::transport(request.endpoint, TransportError::from(&err), latency),
        }
    }
}

/// Decorator that records every outcome of the wrapped executor under its endpoint
/// label.
pub struct Recorded<E: ?Sized> {
    inner: Arc<E>,
    stats: Arc<StatsAggregator>,
}

impl<E: ?Sized> Recorded<E> {
    pub fn new(inner: Arc<E>, stats: Arc<StatsAggregator>) -> Self {
        Self { inner, stats }
    }
}

#[async_trait]
impl<E> RequestExecutor for Recorded<E>
where
    E: RequestExecutor + ?Sized,
{
    async fn execute(&self, request: Request) -> Outcome {
        let outcome = self.inner.execute(request).await;
        tracing::debug!(
            endpoint = outcome.endpoint.label(),
            status = ?outcome.status,
            latency_us = outcome.latency.as_micros() as u64,
            "request finished"
        );
        self.stats.record_request(&outcome);
        outcome
    }
}
