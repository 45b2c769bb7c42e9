use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

/// Marker a bulk body can carry to make the stub reject the batch.
#[allow(dead_code)]
pub const REJECT_MARKER: &str = "REJECT_ME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct ElasticStubConfig {
    /// Indices that answer `HEAD /<index>` with 200.
    pub existing_indices: Vec<String>,
    /// Canned `/<index>/_search` response per aggregation name.
    pub aggregations: Vec<(String, Value)>,
    /// Hits returned for non-aggregation searches.
    pub hits: Vec<Value>,
}

pub struct ElasticStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl ElasticStub {
    pub fn spawn(config: ElasticStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start elasticsearch stub");
        let base_url = format!("http://{}", server.server_addr());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let recorded = Arc::clone(&requests);
        let handle = thread::spawn(move || {
            let mut existing: HashSet<String> = config.existing_indices.iter().cloned().collect();
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let method = request.method().to_string().to_uppercase();
                let path = request.url().to_string();
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                recorded.lock().expect("lock requests").push(RecordedRequest {
                    method: method.clone(),
                    path: path.clone(),
                    body: body.clone(),
                });

                let index = path.trim_start_matches('/').to_owned();
                let (status, payload) = match (method.as_str(), path.as_str()) {
                    ("GET", "/") => (200, json!({ "tagline": "You Know, for Search" })),
                    ("HEAD", _) if existing.contains(&index) => (200, Value::Null),
                    ("HEAD", _) => (404, Value::Null),
                    ("DELETE", _) => {
                        existing.remove(&index);
                        (200, json!({ "acknowledged": true }))
                    }
                    ("PUT", _) => {
                        existing.insert(index);
                        (200, json!({ "acknowledged": true }))
                    }
                    ("POST", "/_bulk") if body.contains(REJECT_MARKER) => (
                        200,
                        json!({
                            "errors": true,
                            "items": [{ "index": { "status": 400, "error": {
                                "type": "mapper_parsing_exception",
                                "reason": "failed to parse field [bible_chapter]"
                            } } }]
                        }),
                    ),
                    ("POST", "/_bulk") => (200, json!({ "errors": false, "items": [] })),
                    ("POST", p) if p.ends_with("/_search") => (200, search_response(&config, &body)),
                    _ => (404, json!({ "error": { "reason": format!("no route {method} {path}") } })),
                };

                let response = if payload.is_null() {
                    tiny_http::Response::from_string("").with_status_code(status)
                } else {
                    tiny_http::Response::from_string(payload.to_string())
                        .with_status_code(status)
                        .with_header(
                            tiny_http::Header::from_bytes("Content-Type", "application/json")
                                .expect("content type header"),
                        )
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("lock requests").clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

impl Drop for ElasticStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn search_response(config: &ElasticStubConfig, body: &str) -> Value {
    let Ok(request) = serde_json::from_str::<Value>(body) else {
        return json!({ "error": { "reason": "invalid json" } });
    };
    if let Some(aggs) = request.get("aggs").and_then(Value::as_object) {
        let mut aggregations = serde_json::Map::new();
        for name in aggs.keys() {
            let canned = config
                .aggregations
                .iter()
                .find(|(agg, _)| agg == name)
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| json!({ "buckets": [] }));
            aggregations.insert(name.clone(), canned);
        }
        return json!({ "hits": { "hits": [] }, "aggregations": aggregations });
    }
    let hits: Vec<Value> = config
        .hits
        .iter()
        .map(|source| json!({ "_source": source }))
        .collect();
    json!({ "hits": { "hits": hits } })
}
