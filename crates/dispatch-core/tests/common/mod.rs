// Shared fixtures for the dispatch-core integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dispatch_core::error::Result;
use dispatch_core::{
    ConnectionId, DispatchError, EndpointPool, Generator, OutputMessage, Request, RequestBody,
    Response, Services, Session, VideoJob,
};
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Semaphore;

/// Scripted generator.
///
/// - search: `"nothing"` yields no result, `"fail"` errors, anything
///   else echoes the query; earlier searches sleep longer.
/// - caption: a title of `"panic"` panics.
/// - video: sleeps `video_delay`, optionally waits on `gate`, and tracks
///   concurrency and endpoint exclusivity.
#[derive(Default)]
pub struct MockGenerator {
    pub video_delay: Duration,
    pub gate: Option<Arc<Semaphore>>,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub started: AtomicUsize,
    pub endpoints_in_use: Mutex<HashSet<String>>,
    pub double_booked: AtomicUsize,
}

impl MockGenerator {
    pub fn new() -> Self {
        MockGenerator::default()
    }

    pub fn with_video_delay(mut self, delay: Duration) -> Self {
        self.video_delay = delay;
        self
    }

    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate_caption(&self, title: &str, description: &str) -> Result<String> {
        if title == "panic" {
            panic!("caption backend exploded");
        }
        Ok(format!("{}: {}", title, description))
    }

    async fn generate_thumbnail(&self, title: &str, _description: &str) -> Result<String> {
        Ok(format!("thumb://{}", title))
    }

    async fn search_video(
        &self,
        query: &str,
        search_count: u32,
        attempt_count: u32,
    ) -> Result<Option<Value>> {
        // Earlier requests take longer, so a racing implementation would reorder them.
        let delay = 5u64.saturating_sub(search_count as u64) * 10;
        tokio::time::sleep(Duration::from_millis(delay)).await;

        match query {
            "nothing" => Ok(None),
            "fail" => Err(DispatchError::collaborator("backend returned HTTP 503")),
            _ => Ok(Some(json!({
                "title": query,
                "searchCount": search_count,
                "attemptCount": attempt_count,
            }))),
        }
    }

    async fn generate_video(&self, job: &VideoJob) -> Result<String> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self
            .endpoints_in_use
            .lock()
            .unwrap()
            .insert(job.endpoint_url.clone())
        {
            self.double_booked.fetch_add(1, Ordering::SeqCst);
        }

        // Each permit lets exactly one call through.
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        tokio::time::sleep(self.video_delay).await;

        self.endpoints_in_use.lock().unwrap().remove(&job.endpoint_url);
        self.active.fetch_sub(1, Ordering::SeqCst);

        if job.title == "fail" {
            return Err(DispatchError::collaborator("HTTP 500"));
        }
        Ok(format!("video://{}", job.title))
    }
}

pub fn endpoints(n: usize) -> EndpointPool {
    EndpointPool::new((1..=n).map(|i| format!("http://endpoint-{}", i)))
}

pub fn services(pool_size: usize, generator: Arc<MockGenerator>) -> Services {
    Services::new(endpoints(pool_size), generator)
}

pub struct TestConnection {
    pub session: Session,
    pub rx: UnboundedReceiver<OutputMessage>,
}

impl TestConnection {
    pub fn open(id: u64, services: &Services) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::start(ConnectionId(id), services.clone(), tx);
        TestConnection { session, rx }
    }

    pub async fn send(&self, request_id: &str, body: RequestBody) {
        self.session
            .submit(Request::new(request_id, body))
            .await
            .expect("session accepts work");
    }

    /// Next frame, failing the test if none arrives within five seconds.
    pub async fn next(&mut self) -> OutputMessage {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for output")
            .expect("outbound channel closed")
    }

    pub async fn next_response(&mut self) -> Response {
        match self.next().await {
            OutputMessage::Response(r) => r,
            other => panic!("expected a response, got {:?}", other),
        }
    }

    /// `true` if nothing arrives within `wait`.
    pub async fn quiet_for(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.rx.recv()).await.is_err()
    }
}
