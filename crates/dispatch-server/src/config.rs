//! Configuration for the dispatch WebSocket server.
//!
//! Everything comes from environment variables, with defaults for all
//! but the endpoint list:
//!
//! - `DISPATCH_BIND_ADDR`              (default: "0.0.0.0")
//! - `DISPATCH_PORT`                   (default: "8080")
//! - `DISPATCH_MAX_CLIENTS`            (default: "1024")
//! - `VIDEO_ROUND_ROBIN_ENDPOINT_URLS` (required, comma-separated)
//! - `DISPATCH_ACQUIRE_TIMEOUT_MS`     (default: "10000")
//! - `DISPATCH_MAX_MESSAGE_BYTES`      (default: "10485760")
//! - `HF_TOKEN`                        (optional)
//! - `HF_TEXT_MODEL`, `HF_IMAGE_MODEL`, `HF_INFERENCE_BASE`

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const DEFAULT_TEXT_MODEL: &str = "HuggingFaceH4/zephyr-7b-beta";
pub const DEFAULT_IMAGE_MODEL: &str =
    "https://api-inference.huggingface.co/models/black-forest-labs/FLUX.1-schnell";
pub const DEFAULT_INFERENCE_BASE: &str = "https://api-inference.huggingface.co/models";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Maximum number of simultaneously connected clients.
    pub max_clients: usize,

    /// Video generation endpoints. Their count bounds generation concurrency.
    pub endpoint_urls: Vec<String>,

    /// How long a generation request waits for a free endpoint.
    pub acquire_timeout: Duration,

    /// Largest inbound WebSocket message accepted.
    pub max_message_bytes: usize,

    pub backend: BackendConfig,
}

/// Remote model settings for the HTTP-backed generator.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub token: Option<String>,
    pub text_model: String,
    pub image_model: String,
    pub inference_base: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            token: None,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            inference_base: DEFAULT_INFERENCE_BASE.to_string(),
        }
    }
}

impl Config {
    /// Construct a `Config` from environment variables, falling back
    /// to defaults where there are any.
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("DISPATCH_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = read_env_or_default("DISPATCH_PORT", 8080u16)?;
        let max_clients = read_env_or_default("DISPATCH_MAX_CLIENTS", 1024usize)?;
        let acquire_timeout_ms = read_env_or_default("DISPATCH_ACQUIRE_TIMEOUT_MS", 10_000u64)?;
        let max_message_bytes = read_env_or_default("DISPATCH_MAX_MESSAGE_BYTES", 10usize << 20)?;

        let endpoint_urls = parse_endpoint_list(
            &env::var("VIDEO_ROUND_ROBIN_ENDPOINT_URLS").unwrap_or_default(),
        )?;

        let defaults = BackendConfig::default();
        let backend = BackendConfig {
            token: env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
            text_model: env::var("HF_TEXT_MODEL").unwrap_or(defaults.text_model),
            image_model: env::var("HF_IMAGE_MODEL").unwrap_or(defaults.image_model),
            inference_base: env::var("HF_INFERENCE_BASE").unwrap_or(defaults.inference_base),
        };

        Ok(Config {
            bind_addr,
            port,
            max_clients,
            endpoint_urls,
            acquire_timeout: Duration::from_millis(acquire_timeout_ms),
            max_message_bytes,
            backend,
        })
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Split a comma-separated endpoint list, dropping blanks.
///
/// An empty result is an error: with no endpoints every generation
/// request would time out.
pub fn parse_endpoint_list(raw: &str) -> Result<Vec<String>> {
    let urls: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        bail!("VIDEO_ROUND_ROBIN_ENDPOINT_URLS must list at least one endpoint");
    }
    Ok(urls)
}

fn read_env_or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {}: {:?}", key, val)),
        Err(_) => Ok(default),
    }
}
