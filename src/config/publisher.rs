//! Publisher configuration: scheduler cadence, upload tuning, and Graph API access.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;

/// Default upload chunk size (10 MiB).
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Sweep intervals outside this range are accepted but logged as unusual.
pub const RECOMMENDED_SWEEP_INTERVAL_SECS: std::ops::RangeInclusive<u64> = 15..=60;

/// Cadence and bounds for the two schedulers and the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between durability sweeps.
    pub sweep_interval_secs: u64,
    /// Claim age after which a `publishing` post counts as orphaned.
    ///
    /// Must exceed `attempt_timeout_secs`: a claim older than that cannot
    /// belong to a live attempt in any process.
    pub stuck_threshold_secs: u64,
    /// Maximum concurrent attempts started by the sweep.
    pub sweep_concurrency: usize,
    /// Maximum due posts fetched per sweep.
    pub sweep_batch_limit: usize,
    /// Backstop for a whole publish attempt.
    pub attempt_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            stuck_threshold_secs: 2400,
            sweep_concurrency: num_cpus::get().clamp(2, 8),
            sweep_batch_limit: 100,
            attempt_timeout_secs: 2100,
        }
    }
}

impl SchedulerConfig {
    /// Validate scheduler values.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=3600).contains(&self.sweep_interval_secs) {
            return Err("sweep_interval_secs must be between 1 and 3600".into());
        }
        if self.stuck_threshold_secs <= self.sweep_interval_secs {
            return Err("stuck_threshold_secs must exceed sweep_interval_secs".into());
        }
        if self.sweep_concurrency == 0 {
            return Err("sweep_concurrency must be greater than 0".into());
        }
        if self.sweep_batch_limit == 0 {
            return Err("sweep_batch_limit must be greater than 0".into());
        }
        if self.attempt_timeout_secs == 0 {
            return Err("attempt_timeout_secs must be greater than 0".into());
        }
        if self.stuck_threshold_secs <= self.attempt_timeout_secs {
            return Err("stuck_threshold_secs must exceed attempt_timeout_secs".into());
        }
        Ok(())
    }

    /// Whether the sweep interval sits outside the recommended 15–60s band.
    pub fn interval_is_unusual(&self) -> bool {
        !RECOMMENDED_SWEEP_INTERVAL_SECS.contains(&self.sweep_interval_secs)
    }

    /// Sweep period.
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Orphan threshold as a chrono duration, for comparing against claim times.
    pub fn stuck_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(
            u32::try_from(self.stuck_threshold_secs).unwrap_or(u32::MAX),
        ))
    }

    /// Attempt backstop.
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

/// Chunked upload tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Chunk size hinted at Start and used for the transfer-call bound.
    /// The server's ranges stay authoritative.
    pub chunk_size_bytes: u64,
    /// Timeout for a single transfer call.
    pub chunk_timeout_secs: u64,
    /// Timeout for the whole start/transfer/finish session.
    pub session_timeout_secs: u64,
    /// Retries per chunk for network errors and chunk timeouts.
    pub max_chunk_retries: u32,
    /// First retry delay; doubles on each further retry.
    pub retry_base_delay_ms: u64,
    /// Upper bound on transfer calls; derived from the payload size when unset.
    pub max_transfer_calls: Option<u32>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            chunk_timeout_secs: 120,
            session_timeout_secs: 1800,
            max_chunk_retries: 3,
            retry_base_delay_ms: 500,
            max_transfer_calls: None,
        }
    }
}

impl UploadConfig {
    /// Validate upload values.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size_bytes == 0 {
            return Err("chunk_size_bytes must be greater than 0".into());
        }
        if self.chunk_timeout_secs == 0 {
            return Err("chunk_timeout_secs must be greater than 0".into());
        }
        if self.session_timeout_secs < self.chunk_timeout_secs {
            return Err("session_timeout_secs must be at least chunk_timeout_secs".into());
        }
        if self.max_transfer_calls == Some(0) {
            return Err("max_transfer_calls must be greater than 0 when set".into());
        }
        Ok(())
    }

    /// Per-chunk timeout.
    pub const fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    /// Whole-session timeout.
    pub const fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Base retry delay.
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Transfer-call bound for a payload of `total_size` bytes.
    ///
    /// Defaults to three calls per expected chunk plus ten, so servers that
    /// hand out smaller ranges than requested still finish.
    pub fn transfer_call_bound(&self, total_size: u64) -> u32 {
        self.max_transfer_calls.unwrap_or_else(|| {
            let chunks = total_size.div_ceil(self.chunk_size_bytes.max(1));
            u32::try_from(chunks.saturating_mul(3).saturating_add(10)).unwrap_or(u32::MAX)
        })
    }
}

/// Credentials and endpoints for the Graph video API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphApiConfig {
    /// Base URL for regular Graph calls (feed, token check).
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    /// Base URL for video upload calls.
    #[serde(default = "default_video_base_url")]
    pub video_base_url: String,
    /// API version path segment.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Page that owns published posts.
    pub page_id: String,
    /// Page access token.
    pub access_token: String,
    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".into()
}

fn default_video_base_url() -> String {
    "https://graph-video.facebook.com".into()
}

fn default_api_version() -> String {
    "v19.0".into()
}

const fn default_request_timeout_secs() -> u64 {
    60
}

impl GraphApiConfig {
    /// Config with default URLs and version for `page_id`.
    pub fn new(page_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            graph_base_url: default_graph_base_url(),
            video_base_url: default_video_base_url(),
            api_version: default_api_version(),
            page_id: page_id.into(),
            access_token: access_token.into(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Validate Graph settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.page_id.trim().is_empty() {
            return Err("page_id must not be empty".into());
        }
        if self.access_token.trim().is_empty() {
            return Err("access_token must not be empty".into());
        }
        for (name, url) in [
            ("graph_base_url", &self.graph_base_url),
            ("video_base_url", &self.video_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("{name} must be an http(s) URL"));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".into());
        }
        Ok(())
    }

    /// Per-request HTTP timeout.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for GraphApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphApiConfig")
            .field("graph_base_url", &self.graph_base_url)
            .field("video_base_url", &self.video_base_url)
            .field("api_version", &self.api_version)
            .field("page_id", &self.page_id)
            .field("access_token", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Upload settings.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Graph API access; absent when a custom endpoint is wired in.
    #[serde(default)]
    pub graph: Option<GraphApiConfig>,
}

impl PublisherConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        self.upload
            .validate()
            .map_err(|e| format!("upload invalid: {e}"))?;
        if self.scheduler.attempt_timeout_secs < self.upload.session_timeout_secs {
            let msg = "attempt_timeout_secs must be at least upload.session_timeout_secs";
            return Err(format!("scheduler invalid: {msg}"));
        }
        if let Some(graph) = &self.graph {
            graph.validate().map_err(|e| format!("graph invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment, reading `.env` first if present.
    ///
    /// Recognised variables: `PUBLISHER_SWEEP_INTERVAL_SECS`,
    /// `PUBLISHER_STUCK_THRESHOLD_SECS`, `PUBLISHER_SWEEP_CONCURRENCY`,
    /// `PUBLISHER_SWEEP_BATCH_LIMIT`, `PUBLISHER_ATTEMPT_TIMEOUT_SECS`,
    /// `PUBLISHER_CHUNK_SIZE_BYTES`, `PUBLISHER_CHUNK_TIMEOUT_SECS`,
    /// `PUBLISHER_SESSION_TIMEOUT_SECS`, `PUBLISHER_MAX_CHUNK_RETRIES`,
    /// `PUBLISHER_RETRY_BASE_DELAY_MS`, `PUBLISHER_MAX_TRANSFER_CALLS`,
    /// and `GRAPH_PAGE_ID` + `GRAPH_ACCESS_TOKEN` (both required to enable Graph),
    /// `GRAPH_API_VERSION`, `GRAPH_BASE_URL`, `GRAPH_VIDEO_BASE_URL`,
    /// `GRAPH_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> AppResult<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err).context("failed to read .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, starting from defaults.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        let s = &mut cfg.scheduler;
        set_parsed(&lookup, "PUBLISHER_SWEEP_INTERVAL_SECS", &mut s.sweep_interval_secs)?;
        set_parsed(&lookup, "PUBLISHER_STUCK_THRESHOLD_SECS", &mut s.stuck_threshold_secs)?;
        set_parsed(&lookup, "PUBLISHER_SWEEP_CONCURRENCY", &mut s.sweep_concurrency)?;
        set_parsed(&lookup, "PUBLISHER_SWEEP_BATCH_LIMIT", &mut s.sweep_batch_limit)?;
        set_parsed(&lookup, "PUBLISHER_ATTEMPT_TIMEOUT_SECS", &mut s.attempt_timeout_secs)?;

        let u = &mut cfg.upload;
        set_parsed(&lookup, "PUBLISHER_CHUNK_SIZE_BYTES", &mut u.chunk_size_bytes)?;
        set_parsed(&lookup, "PUBLISHER_CHUNK_TIMEOUT_SECS", &mut u.chunk_timeout_secs)?;
        set_parsed(&lookup, "PUBLISHER_SESSION_TIMEOUT_SECS", &mut u.session_timeout_secs)?;
        set_parsed(&lookup, "PUBLISHER_MAX_CHUNK_RETRIES", &mut u.max_chunk_retries)?;
        set_parsed(&lookup, "PUBLISHER_RETRY_BASE_DELAY_MS", &mut u.retry_base_delay_ms)?;
        if let Some(calls) = parse_var(&lookup, "PUBLISHER_MAX_TRANSFER_CALLS")? {
            u.max_transfer_calls = Some(calls);
        }

        let page_id = lookup("GRAPH_PAGE_ID");
        let token = lookup("GRAPH_ACCESS_TOKEN");
        if let (Some(page_id), Some(token)) = (page_id, token) {
            let mut graph = GraphApiConfig::new(page_id, token);
            if let Some(version) = lookup("GRAPH_API_VERSION") {
                graph.api_version = version;
            }
            if let Some(url) = lookup("GRAPH_BASE_URL") {
                graph.graph_base_url = url;
            }
            if let Some(url) = lookup("GRAPH_VIDEO_BASE_URL") {
                graph.video_base_url = url;
            }
            set_parsed(&lookup, "GRAPH_REQUEST_TIMEOUT_SECS", &mut graph.request_timeout_secs)?;
            cfg.graph = Some(graph);
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value `{raw}`"))
        })
        .transpose()
}

fn set_parsed<T, F>(lookup: &F, key: &str, slot: &mut T) -> AppResult<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = parse_var(lookup, key)? {
        *slot = value;
    }
    Ok(())
}
