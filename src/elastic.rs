use std::time::Duration;

use anyhow::Context as _;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::config::ElasticConfig;

#[derive(Debug, Clone)]
pub struct ElasticClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ElasticClient {
    pub fn new(config: &ElasticConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build elasticsearch http client")?;
        Ok(Self {
            client,
            base_url: config.host.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {key}")),
            None => request,
        }
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        let response = self
            .request(Method::GET, "/")
            .send()
            .await
            .with_context(|| format!("GET {}/", self.base_url))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("elasticsearch ping returned {status}");
        }
        Ok(())
    }

    /// Pings up to `attempts` times, `interval` apart.
    pub async fn wait_until_ready(&self, attempts: u32, interval: Duration) -> anyhow::Result<()> {
        tracing::info!(host = %self.base_url, "waiting for elasticsearch");
        for attempt in 1..=attempts.max(1) {
            match self.ping().await {
                Ok(()) => {
                    tracing::info!(host = %self.base_url, "elasticsearch is up");
                    return Ok(());
                }
                Err(err) => tracing::info!(attempt, error = %format!("{err:#}"), "still waiting"),
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        anyhow::bail!("could not connect to elasticsearch at {}", self.base_url);
    }

    pub async fn index_exists(&self, index: &str) -> anyhow::Result<bool> {
        let response = self
            .request(Method::HEAD, &format!("/{index}"))
            .send()
            .await
            .with_context(|| format!("HEAD /{index}"))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => anyhow::bail!("HEAD /{index} returned {status}"),
        }
    }

    /// Deletes `index` if present, then creates it with `mapping`.
    pub async fn recreate_index(&self, index: &str, mapping: &Value) -> anyhow::Result<()> {
        if self.index_exists(index).await? {
            tracing::warn!(index, "deleting existing index");
            send_json(self.request(Method::DELETE, &format!("/{index}")))
                .await
                .with_context(|| format!("delete index {index}"))?;
        }
        send_json(self.request(Method::PUT, &format!("/{index}")).json(mapping))
            .await
            .with_context(|| format!("create index {index}"))?;
        tracing::info!(index, "created index");
        Ok(())
    }

    /// Indexes `documents` through `_bulk` in chunks of `chunk_size`. Any rejected item fails the call.
    pub async fn bulk_index(
        &self,
        index: &str,
        documents: &[Value],
        chunk_size: usize,
    ) -> anyhow::Result<usize> {
        let mut indexed = 0;
        for chunk in documents.chunks(chunk_size.max(1)) {
            let body = bulk_body(index, chunk)?;
            let response = send_json(
                self.request(Method::POST, "/_bulk")
                    .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                    .body(body),
            )
            .await
            .with_context(|| format!("bulk index into {index}"))?;

            if response.get("errors").and_then(Value::as_bool) == Some(true) {
                let reason = first_bulk_error(&response).unwrap_or_else(|| "unknown".to_owned());
                anyhow::bail!("bulk index into {index} rejected documents: {reason}");
            }
            indexed += chunk.len();
        }
        Ok(indexed)
    }

    pub async fn search(&self, index: &str, body: &Value) -> anyhow::Result<Value> {
        send_json(
            self.request(Method::POST, &format!("/{index}/_search"))
                .json(body),
        )
        .await
        .with_context(|| format!("search {index}"))
    }
}

async fn send_json(request: reqwest::RequestBuilder) -> anyhow::Result<Value> {
    let response = request.send().await.context("send request")?;
    let status = response.status();
    let raw = response
        .text()
        .await
        .context("read elasticsearch response body")?;
    if !status.is_success() {
        let message = parse_error_reason(&raw).unwrap_or(raw);
        anyhow::bail!("elasticsearch error ({status}): {message}");
    }
    serde_json::from_str(&raw).context("parse elasticsearch response")
}

fn parse_error_reason(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let reason = value.get("error")?.get("reason")?.as_str()?.to_owned();
    Some(reason)
}

pub fn bulk_body(index: &str, documents: &[Value]) -> anyhow::Result<String> {
    let action = serde_json::json!({ "index": { "_index": index } }).to_string();
    let mut body = String::new();
    for document in documents {
        body.push_str(&action);
        body.push('\n');
        body.push_str(&serde_json::to_string(document).context("serialize document")?);
        body.push('\n');
    }
    Ok(body)
}

fn first_bulk_error(response: &Value) -> Option<String> {
    response
        .get("items")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("index")?.get("error"))
        .map(|error| {
            error
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| error.to_string())
        })
        .next()
}
