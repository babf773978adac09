use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One request seen by the ingestion endpoint
#[derive(Debug, Clone)]
pub struct Received {
    pub body: serde_json::Value,
    pub content_type: Option<String>,
    pub status: StatusCode,
    pub received_at: DateTime<Utc>,
}

#[derive(Default)]
struct Behaviour {
    status: Option<StatusCode>,
    body: String,
    delay: Duration,
}

#[derive(Clone, Default)]
struct Ingest {
    behaviour: Arc<Mutex<Behaviour>>,
    received: Arc<Mutex<Vec<Received>>>,
}

async fn log_entry(
    State(ingest): State<Ingest>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let (status, reply, delay) = {
        let behaviour = ingest.behaviour.lock().unwrap();
        (
            behaviour.status.unwrap_or(StatusCode::OK),
            behaviour.body.clone(),
            behaviour.delay,
        )
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ingest.received.lock().unwrap().push(Received {
        body,
        content_type,
        status,
        received_at: Utc::now(),
    });
    (status, reply)
}

/// Stand-in ingestion service listening on an OS-assigned local port
pub struct TestServer {
    ingest: Ingest,
    handle: JoinHandle<()>,
    addr: SocketAddr,
}

impl TestServer {
    pub async fn launch() -> anyhow::Result<Self> {
        let ingest = Ingest::default();
        let app = Router::new()
            .route("/log_entry", post(log_entry))
            .with_state(ingest.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?; // 0: port picked by the OS
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(TestServer {
            ingest,
            handle,
            addr,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/log_entry", self.addr)
    }

    pub fn respond_with(&self, status: StatusCode) {
        self.ingest.behaviour.lock().unwrap().status = Some(status);
    }

    pub fn respond_with_body(&self, status: StatusCode, body: impl Into<String>) {
        let mut behaviour = self.ingest.behaviour.lock().unwrap();
        behaviour.status = Some(status);
        behaviour.body = body.into();
    }

    pub fn delay_responses(&self, delay: Duration) {
        self.ingest.behaviour.lock().unwrap().delay = delay;
    }

    pub fn received(&self) -> Vec<Received> {
        self.ingest.received.lock().unwrap().clone()
    }

    /// Card ids of requests that were answered with 200, in arrival order
    pub fn accepted_cards(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|r| r.status == StatusCode::OK)
            .filter_map(|r| r.body["card_id"].as_str().map(str::to_string))
            .collect()
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}
