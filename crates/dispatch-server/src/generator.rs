//! HTTP-backed `Generator` talking to hosted inference endpoints.
//!
//! - captions and search results come from a text-generation model
//! - thumbnails come from a text-to-image model, returned as data URIs
//! - video clips are rendered by whichever endpoint the generation lane
//!   leased, using the parameter block those endpoints expect
//!
//! A model given as a bare id (`org/name`) is resolved against the
//! inference base URL; a full `http(s)://` URL is used as-is.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dispatch_core::error::Result;
use dispatch_core::{DispatchError, Generator, VideoJob};
use reqwest::{header, Client, RequestBuilder, Response};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::BackendConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_NEGATIVE_PROMPT: &str =
    "low quality, worst quality, deformed, distorted, disfigured, blurry, text, watermark";

pub struct RemoteGenerator {
    http: Client,
    backend: BackendConfig,
}

impl RemoteGenerator {
    pub fn new(backend: BackendConfig) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(RemoteGenerator { http, backend })
    }

    fn model_url(&self, model: &str) -> String {
        resolve_model_url(&self.backend.inference_base, model)
    }

    fn post(&self, url: &str) -> RequestBuilder {
        let request = self.http.post(url);
        match &self.backend.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn text_generation(
        &self,
        prompt: &str,
        max_new_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let url = self.model_url(&self.backend.text_model);
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": max_new_tokens,
                "temperature": temperature,
                "return_full_text": false,
            },
        });

        let response = self.post(&url).json(&body).send().await.map_err(transport)?;
        let value: Value = ensure_success(response).await?.json().await.map_err(transport)?;
        generated_text(&value)
            .ok_or_else(|| DispatchError::collaborator("text model returned no generated_text"))
    }
}

#[async_trait]
impl Generator for RemoteGenerator {
    async fn generate_caption(&self, title: &str, description: &str) -> Result<String> {
        let prompt = format!(
            "Generate a detailed story for a video named: \"{}\"\n\
             Visual description of the video: {}.\n\
             Instructions: Write the story summary, including the plot, action, what should happen.\n\
             Make it around 200-300 words long.\n\
             A video can be anything from a tutorial, webcam, trailer, movie, live stream etc.",
            title, description
        );
        let raw = self.text_generation(&prompt, 180, 0.7).await?;
        Ok(clean_caption(&raw))
    }

    async fn generate_thumbnail(&self, title: &str, description: &str) -> Result<String> {
        let url = self.model_url(&self.backend.image_model);
        let body = json!({
            "inputs": format!("Thumbnail for video titled '{}': {}", title, description),
            "parameters": { "width": 1024, "height": 512 },
        });

        let response = ensure_success(
            self.post(&url)
                .header(header::ACCEPT, "image/jpeg")
                .json(&body)
                .send()
                .await
                .map_err(transport)?,
        )
        .await?;

        let mime = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response.bytes().await.map_err(transport)?;
        if bytes.is_empty() {
            return Err(DispatchError::collaborator("image model returned no data"));
        }
        Ok(format!("data:{};base64,{}", mime, BASE64.encode(&bytes)))
    }

    async fn search_video(
        &self,
        query: &str,
        search_count: u32,
        attempt_count: u32,
    ) -> Result<Option<Value>> {
        let prompt = search_prompt(query, search_count, attempt_count);
        let completion = self.text_generation(&prompt, 300, 0.6).await?;
        let result = parse_search_result(&completion);
        if result.is_none() {
            warn!(query, "search completion was not a usable YAML mapping");
        }
        Ok(result)
    }

    async fn generate_video(&self, job: &VideoJob) -> Result<String> {
        let body = json!({
            "inputs": { "prompt": job.prompt() },
            "parameters": video_parameters(&job.options),
        });
        debug!(endpoint = %job.endpoint_url, video_id = %job.video_id, "posting clip request");

        let response = self
            .post(&job.endpoint_url)
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let result: Value = ensure_success(response).await?.json().await.map_err(transport)?;

        if let Some(error) = result.get("error") {
            return Err(DispatchError::collaborator(format!("endpoint error: {}", error)));
        }
        match result.get("video").and_then(Value::as_str) {
            Some(video) if !video.is_empty() => Ok(video.to_string()),
            _ => Err(DispatchError::collaborator("No video data in response")),
        }
    }
}

fn transport(err: reqwest::Error) -> DispatchError {
    DispatchError::collaborator(err.to_string())
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DispatchError::collaborator(format!(
        "HTTP {} - {}",
        status.as_u16(),
        body.trim()
    )))
}

fn resolve_model_url(base: &str, model: &str) -> String {
    if model.starts_with("http://") || model.starts_with("https://") {
        model.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), model)
    }
}

/// Text-generation responses come back either as `[{generated_text}]`
/// or as a bare `{generated_text}` object depending on the server.
fn generated_text(value: &Value) -> Option<String> {
    let first = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    first
        .get("generated_text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Strip a `Caption:` label and drop a trailing unfinished sentence.
fn clean_caption(raw: &str) -> String {
    let text = raw.replace("Caption: ", "");
    let padded = format!(" {} ", text);
    let chunks: Vec<&str> = padded.split(". ").collect();
    if chunks.len() > 1 {
        chunks[..chunks.len() - 1].join(". ").trim().to_string()
    } else {
        text.trim().to_string()
    }
}

fn search_prompt(query: &str, search_count: u32, attempt_count: u32) -> String {
    format!(
        r#"# Instruction
Your response MUST be a YAML object containing a title, description, and tags, consistent with what we can find on a video sharing platform.
Format your YAML response with only those fields: "title" (single string of a short sentence), "description" (single string of a few sentences to describe the visuals), and "tags" (array of strings). Do not add any other field.
The description is a prompt for a generative AI, so please describe the visual elements of the scene in details, including: camera angle and focus, people's appearance, their age, actions, precise look, clothing, the location characteristics, lighting, action, objects, weather.
Make the result unique and different from previous search results. ONLY RETURN YAML AND WITH ENGLISH CONTENT - DO NOT ADD ANY OTHER COMMENT!

# Context
This is attempt {attempt_count} at generating search result number {search_count}.

# Input
Describe the video for this theme: "{query}".
Don't forget to repeat singular elements about the characters, location.. in your description.

# Output

```yaml
title: ""#
    )
}

/// Turn a completion of the search prompt into a result record.
///
/// The prompt ends inside an opening `title: "`, so the completion is
/// re-prefixed with it before parsing. Anything after a closing code
/// fence is ignored. `None` unless the text parses as a YAML mapping.
fn parse_search_result(completion: &str) -> Option<Value> {
    let text = format!("title: \"{}", completion.trim());
    let yaml = text.split("```").next().unwrap_or_default();
    let yaml = yaml.trim().trim_start_matches("---").trim_end_matches("...");

    let parsed: serde_yaml::Value = serde_yaml::from_str(yaml).ok()?;
    let mapping = parsed.as_mapping()?;

    let text_field = |key: &str, fallback: &str| {
        mapping
            .get(key)
            .and_then(yaml_scalar)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    };
    let title = text_field("title", "Untitled Video");
    let description = text_field("description", "No description available");
    let tags: Vec<String> = mapping
        .get("tags")
        .and_then(serde_yaml::Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(yaml_scalar)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Some(json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "title": title,
        "description": description,
        "thumbnailUrl": "",
        "videoUrl": "",
        "isLatent": true,
        "useFixedSeed": description.to_lowercase().contains("webcam"),
        "seed": rand::random::<u32>(),
        "views": 0,
        "tags": tags,
    }))
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parameter block for the clip endpoints, each entry overridable from
/// the request's `options`.
fn video_parameters(options: &Map<String, Value>) -> Value {
    let opt = |key: &str, default: Value| options.get(key).cloned().unwrap_or(default);
    json!({
        "negative_prompt": opt("negative_prompt", json!(DEFAULT_NEGATIVE_PROMPT)),
        "width": opt("width", json!(640)),
        "height": opt("height", json!(416)),
        "num_frames": opt("num_frames", json!(153)),
        "num_inference_steps": opt("num_inference_steps", json!(12)),
        "guidance_scale": opt("guidance_scale", json!(3.3)),
        "seed": opt("seed", json!(42)),
        "double_num_frames": false,
        "fps": opt("frame_rate", json!(25)),
        "super_resolution": false,
        "grain_amount": 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_model_ids_resolve_against_the_base() {
        assert_eq!(
            resolve_model_url("https://api.example/models/", "org/model"),
            "https://api.example/models/org/model"
        );
        assert_eq!(
            resolve_model_url("https://api.example/models", "https://my.endpoint"),
            "https://my.endpoint"
        );
    }

    #[test]
    fn generated_text_accepts_both_shapes() {
        assert_eq!(
            generated_text(&json!([{"generated_text": "a"}])).as_deref(),
            Some("a")
        );
        assert_eq!(
            generated_text(&json!({"generated_text": "b"})).as_deref(),
            Some("b")
        );
        assert_eq!(generated_text(&json!([])), None);
    }

    #[test]
    fn caption_drops_label_and_unfinished_sentence() {
        assert_eq!(
            clean_caption("Caption: A cat naps. It wakes up. Then it"),
            "A cat naps. It wakes up"
        );
        assert_eq!(clean_caption("Single fragment"), "Single fragment");
    }

    #[test]
    fn search_completion_becomes_a_record() {
        let completion = "Squirrels at dawn\"\ndescription: \"Webcam view of a park\"\ntags: [nature, 4]\n```\ntrailing chatter";
        let result = parse_search_result(completion).unwrap();
        assert_eq!(result["title"], "Squirrels at dawn");
        assert_eq!(result["description"], "Webcam view of a park");
        assert_eq!(result["tags"], json!(["nature", "4"]));
        assert_eq!(result["useFixedSeed"], true);
        assert_eq!(result["isLatent"], true);
        assert_eq!(result["views"], 0);
        assert!(result["id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn search_completion_with_missing_fields_uses_fallbacks() {
        let result = parse_search_result("\"\ntags: oops").unwrap();
        assert_eq!(result["title"], "Untitled Video");
        assert_eq!(result["description"], "No description available");
        assert_eq!(result["tags"], json!([]));
        assert_eq!(result["useFixedSeed"], false);
    }

    #[test]
    fn unparsable_search_completion_is_no_result() {
        assert!(parse_search_result("unterminated: [").is_none());
    }

    #[test]
    fn video_parameters_take_option_overrides() {
        let mut options = Map::new();
        options.insert("seed".into(), json!(7));
        options.insert("frame_rate".into(), json!(30));
        let params = video_parameters(&options);
        assert_eq!(params["seed"], 7);
        assert_eq!(params["fps"], 30);
        assert_eq!(params["width"], 640);
        assert_eq!(params["num_frames"], 153);
        assert_eq!(params["guidance_scale"], 3.3);
    }

    #[test]
    fn video_prompt_extends_the_caption() {
        let job = VideoJob {
            video_id: "v".into(),
            title: "t".into(),
            description: "d".into(),
            prompt_prefix: "p".into(),
            caption: "p - t - d".into(),
            options: Map::new(),
            endpoint_url: "http://e".into(),
        };
        assert_eq!(
            job.prompt(),
            "p - t - d, high quality, cinematic, 4K, intricate details"
        );
    }
}
