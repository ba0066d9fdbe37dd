//! Boundary to the external generation backends.
//!
//! The core never talks to a model server itself; it calls a
//! [`Generator`] and treats each call as a single async operation that
//! may succeed, fail, or take arbitrarily long.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// Everything a backend needs to render one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoJob {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub prompt_prefix: String,
    /// Caption composed from prefix, title and description.
    pub caption: String,
    pub options: Map<String, Value>,
    /// Address of the endpoint leased for this job.
    pub endpoint_url: String,
}

impl VideoJob {
    /// Text prompt sent to the video model.
    pub fn prompt(&self) -> String {
        format!("{}, high quality, cinematic, 4K, intricate details", self.caption)
    }
}

#[async_trait]
pub trait Generator: Send + Sync + 'static {
    async fn generate_caption(&self, title: &str, description: &str) -> Result<String>;

    /// Returns a reference to the image (URL or data URI).
    async fn generate_thumbnail(&self, title: &str, description: &str) -> Result<String>;

    /// `Ok(None)` when the backend produced nothing usable.
    async fn search_video(
        &self,
        query: &str,
        search_count: u32,
        attempt_count: u32,
    ) -> Result<Option<Value>>;

    /// Returns a reference to the rendered video.
    async fn generate_video(&self, job: &VideoJob) -> Result<String>;
}
