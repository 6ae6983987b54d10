//! Graph video API endpoint.
//!
//! Chunked uploads go to `{video_base}/{version}/{page_id}/videos` with
//! `upload_phase` set to `start`, `transfer`, or `finish`. Offsets come
//! back as decimal strings. When Start answers with an `upload_url`
//! instead of a session, the whole file is sent there in one request.
//!
//! Start takes no chunk-size parameter; Graph picks every range itself, so
//! [`StartRequest::chunk_size`] is not sent.
//!
//! The page token travels as the `access_token` query parameter. Transport
//! errors are stripped of their URL before they become a [`PublishError`],
//! because that message is stored on the post and written to logs.

use anyhow::Context;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use async_trait::async_trait;

use crate::config::GraphApiConfig;
use crate::core::error::{AppResult, PublishError};
use crate::core::upload::{
    OffsetRange, PublishEndpoint, PublishMetadata, SessionHandle, StartRequest, StartResponse,
};

/// Graph error code for an invalid or expired access token.
const INVALID_TOKEN_CODE: i64 = 190;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireOffset {
    Text(String),
    Number(u64),
}

impl WireOffset {
    fn value(&self, field: &str) -> Result<u64, PublishError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| PublishError::Protocol(format!("{field} is not an offset: `{s}`"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StartBody {
    video_id: Option<String>,
    upload_session_id: Option<String>,
    start_offset: Option<WireOffset>,
    end_offset: Option<WireOffset>,
    upload_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferBody {
    start_offset: WireOffset,
    end_offset: WireOffset,
}

#[derive(Debug, Deserialize)]
struct SuccessBody {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct IdBody {
    id: String,
}

fn from_reqwest(err: reqwest::Error) -> PublishError {
    let err = err.without_url();
    if err.is_decode() {
        PublishError::Protocol(err.to_string())
    } else {
        PublishError::Network(err.to_string())
    }
}

fn map_graph_error(status: StatusCode, error: &Value) -> PublishError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown Graph API error")
        .to_string();
    let code = error.get("code").and_then(Value::as_i64);
    let transient = error
        .get("is_transient")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if code == Some(INVALID_TOKEN_CODE) || status == StatusCode::UNAUTHORIZED {
        PublishError::Auth(message)
    } else if transient || status.is_server_error() {
        PublishError::Network(message)
    } else {
        PublishError::Rejected(message)
    }
}

/// [`PublishEndpoint`] for a Facebook page's videos and feed.
pub struct GraphVideoEndpoint {
    http: reqwest::Client,
    config: GraphApiConfig,
}

impl GraphVideoEndpoint {
    /// Build an endpoint from validated Graph settings.
    pub fn new(config: GraphApiConfig) -> AppResult<Self> {
        config.validate().map_err(anyhow::Error::msg)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("HTTP client build failed")?;
        Ok(Self { http, config })
    }

    fn graph_url(&self, suffix: &str) -> String {
        format!(
            "{}/{}/{}{suffix}",
            self.config.graph_base_url.trim_end_matches('/'),
            self.config.api_version,
            self.config.page_id
        )
    }

    fn videos_url(&self) -> String {
        format!(
            "{}/{}/{}/videos",
            self.config.video_base_url.trim_end_matches('/'),
            self.config.api_version,
            self.config.page_id
        )
    }

    fn token(&self) -> (&'static str, &str) {
        ("access_token", self.config.access_token.as_str())
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, PublishError> {
        let response = request.send().await.map_err(from_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(from_reqwest)?;
        let body: Value = serde_json::from_str(&text).map_err(|_| {
            let snippet: String = text.chars().take(200).collect();
            if status.is_success() {
                PublishError::Protocol(format!("non-JSON response: {snippet}"))
            } else {
                let message = format!("HTTP {status}: {snippet}");
                map_graph_error(status, &serde_json::json!({ "message": message }))
            }
        })?;

        if let Some(error) = body.get("error") {
            return Err(map_graph_error(status, error));
        }
        if !status.is_success() {
            return Err(map_graph_error(
                status,
                &serde_json::json!({ "message": format!("HTTP {status}") }),
            ));
        }
        serde_json::from_value(body).map_err(|e| PublishError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl PublishEndpoint for GraphVideoEndpoint {
    fn platform(&self) -> &str {
        "facebook"
    }

    async fn start_session(&self, request: StartRequest) -> Result<StartResponse, PublishError> {
        let file_size = request.file_size.to_string();
        let body: StartBody = self
            .send(self.http.post(self.videos_url()).query(&[
                ("upload_phase", "start"),
                self.token(),
                ("file_size", file_size.as_str()),
            ]))
            .await?;

        let video_id = body
            .video_id
            .ok_or_else(|| PublishError::Protocol("start response has no video_id".into()))?;

        if let Some(upload_url) = body.upload_url {
            return Ok(StartResponse::Direct {
                object_id: video_id,
                upload_url,
            });
        }

        match (body.upload_session_id, body.start_offset, body.end_offset) {
            (Some(session_id), Some(start), Some(end)) => Ok(StartResponse::Chunked {
                session: SessionHandle {
                    session_id,
                    object_id: video_id,
                },
                range: OffsetRange::new(start.value("start_offset")?, end.value("end_offset")?),
            }),
            _ => Err(PublishError::Protocol(
                "start response matched neither the session nor the direct contract".into(),
            )),
        }
    }

    async fn transfer_chunk(
        &self,
        session: &SessionHandle,
        range: OffsetRange,
        bytes: &[u8],
    ) -> Result<OffsetRange, PublishError> {
        let start_offset = range.start.to_string();
        let form = Form::new().part(
            "video_file_chunk",
            Part::bytes(bytes.to_vec()).file_name("chunk"),
        );
        let body: TransferBody = self
            .send(
                self.http
                    .post(self.videos_url())
                    .query(&[
                        ("upload_phase", "transfer"),
                        self.token(),
                        ("upload_session_id", session.session_id.as_str()),
                        ("start_offset", start_offset.as_str()),
                    ])
                    .multipart(form),
            )
            .await?;
        Ok(OffsetRange::new(
            body.start_offset.value("start_offset")?,
            body.end_offset.value("end_offset")?,
        ))
    }

    async fn finish_session(
        &self,
        session: &SessionHandle,
        metadata: &PublishMetadata,
    ) -> Result<String, PublishError> {
        let mut params = vec![
            ("upload_phase", "finish"),
            self.token(),
            ("upload_session_id", session.session_id.as_str()),
            ("description", metadata.description.as_str()),
        ];
        if let Some(title) = metadata.title.as_deref() {
            params.push(("title", title));
        }
        let body: SuccessBody = self
            .send(self.http.post(self.videos_url()).query(&params))
            .await?;
        if !body.success {
            return Err(PublishError::Rejected(format!(
                "finish for video {} was not acknowledged",
                session.object_id
            )));
        }
        Ok(session.object_id.clone())
    }

    async fn upload_direct(
        &self,
        object_id: &str,
        upload_url: &str,
        bytes: &[u8],
    ) -> Result<String, PublishError> {
        let auth = HeaderValue::from_str(&format!("OAuth {}", self.config.access_token))
            .map_err(|e| PublishError::Auth(e.to_string()))?;
        let body: SuccessBody = self
            .send(
                self.http
                    .post(upload_url)
                    .header(AUTHORIZATION, auth)
                    .header("offset", "0")
                    .header("file_size", bytes.len().to_string())
                    .body(bytes.to_vec()),
            )
            .await?;
        if !body.success {
            return Err(PublishError::Rejected(format!(
                "direct upload for video {object_id} was not acknowledged"
            )));
        }
        Ok(object_id.to_string())
    }

    async fn publish_text(&self, metadata: &PublishMetadata) -> Result<String, PublishError> {
        let body: IdBody = self
            .send(
                self.http
                    .post(self.graph_url("/feed"))
                    .query(&[self.token(), ("message", metadata.description.as_str())]),
            )
            .await?;
        Ok(body.id)
    }

    async fn verify(&self) -> Result<(), PublishError> {
        let body: IdBody = self
            .send(self.http.get(self.graph_url("")).query(&[self.token()]))
            .await?;
        tracing::info!("Graph token accepted for page {}", body.id);
        Ok(())
    }
}
