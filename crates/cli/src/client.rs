//! API client for the ops view server

use anyhow::{Context, Result};
use mirror_lib::{
    health::{HealthResponse, ReadinessResponse},
    ClusterSnapshot,
};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::time::Duration;
use url::Url;

/// Per-request timeout for one-shot fetches. The live feed has none.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// API client for the ops view server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    async fn send(&self, path: &str, timeout: Option<Duration>) -> Result<Response> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        request.send().await.context("Failed to send request")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(path, Some(REQUEST_TIMEOUT)).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// GET a probe endpoint, which answers 503 with a JSON body when failing
    async fn get_probe<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(path, Some(REQUEST_TIMEOUT)).await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> Result<ClusterSnapshot> {
        self.get("api/snapshot").await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_probe("api/health").await
    }

    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        self.get_probe("api/ready").await
    }

    /// Open the live feed
    pub async fn stream(&self) -> Result<SnapshotFeed> {
        let response = self.send("api/stream", None).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        Ok(SnapshotFeed {
            response,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
        })
    }
}

/// One decoded server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub id: Option<String>,
    pub data: String,
}

/// Incremental decoder for a `text/event-stream` body.
///
/// Only the `id` and `data` fields are kept; comments and other fields are
/// ignored. Input may be split anywhere, including inside a line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    id: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk and return every event it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if self.data.is_empty() {
                    self.id = None;
                } else {
                    events.push(SseEvent {
                        id: self.id.take(),
                        data: self.data.join("\n"),
                    });
                    self.data.clear();
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "data" => self.data.push(value.to_string()),
                "id" => self.id = Some(value.to_string()),
                _ => {}
            }
        }

        events
    }
}

/// A snapshot received on the live feed
#[derive(Debug)]
pub struct FeedUpdate {
    /// `None` for the initial snapshot, `update-<n>` afterwards
    pub id: Option<String>,
    pub snapshot: ClusterSnapshot,
}

/// Open live feed connection
pub struct SnapshotFeed {
    response: Response,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
}

impl SnapshotFeed {
    /// Next snapshot, or `None` once the server closes the feed
    pub async fn next(&mut self) -> Result<Option<FeedUpdate>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                let snapshot = serde_json::from_str(&event.data)
                    .context("Failed to parse snapshot from feed")?;
                return Ok(Some(FeedUpdate {
                    id: event.id,
                    snapshot,
                }));
            }

            match self.response.chunk().await.context("Feed interrupted")? {
                Some(chunk) => self.pending.extend(self.decoder.feed(&chunk)),
                None => return Ok(None),
            }
        }
    }
}
