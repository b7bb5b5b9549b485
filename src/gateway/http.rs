//! HTTP implementation of [`MatchGateway`] over the arena service's REST and
//! SSE endpoints.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use crate::dto::dispute::{DisputeList, DisputeSnapshot, OpenDisputeRequest};
use crate::dto::event::MatchStreamEvent;
use crate::dto::results::MatchResults;
use crate::dto::snapshot::MatchSnapshot;
use crate::gateway::{EventStream, GatewayError, GatewayResult, MatchGateway};

/// Runtime configuration describing how to reach the arena service.
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Base URL of the arena API, without a trailing slash.
    pub base_url: String,
    /// Bearer token identifying the acting user.
    pub bearer_token: Option<String>,
}

impl HttpGatewayConfig {
    /// Construct a configuration from an explicit base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
        }
    }

    /// Attach the acting user's bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

/// Error body returned by the arena service on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
}

/// [`MatchGateway`] backed by `reqwest`, speaking REST for commands and
/// fetches and a minimal SSE reader for the push subscription.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Arc<str>,
    bearer_token: Option<Arc<str>>,
}

impl HttpGateway {
    /// Build the gateway; fails only if the TLS backend cannot initialise.
    pub fn new(config: HttpGatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| GatewayError::transport("building http client", source))?;

        Ok(Self {
            client,
            base_url: Arc::<str>::from(config.base_url.trim_end_matches('/')),
            bearer_token: config.bearer_token.map(Arc::<str>::from),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token.as_ref()),
            None => builder,
        }
    }

    fn get_json<T>(&self, path: String) -> BoxFuture<'static, GatewayResult<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let builder = self.request(Method::GET, &path);
        async move {
            let response = builder
                .send()
                .await
                .map_err(|source| GatewayError::transport(format!("GET {path}"), source))?;
            let response = reject_error_status(response).await?;
            response
                .json::<T>()
                .await
                .map_err(|source| GatewayError::transport(format!("decoding GET {path}"), source))
        }
        .boxed()
    }

    fn post_command(&self, path: String) -> BoxFuture<'static, GatewayResult<()>> {
        let builder = self.request(Method::POST, &path);
        async move {
            let response = builder
                .send()
                .await
                .map_err(|source| GatewayError::transport(format!("POST {path}"), source))?;
            reject_error_status(response).await?;
            Ok(())
        }
        .boxed()
    }
}

/// Map a non-2xx response onto the gateway error taxonomy, preferring the
/// service's own message when one is present.
async fn reject_error_status(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
        message: None,
        code: None,
    });
    let message = body
        .message
        .unwrap_or_else(|| format!("arena service returned {status}"));

    Err(match status {
        StatusCode::CONFLICT if body.code.as_deref() == Some("duplicate_dispute") => {
            GatewayError::DuplicateDispute
        }
        StatusCode::CONFLICT => GatewayError::Conflict(message),
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        _ => GatewayError::Rejected(message),
    })
}

/// Parse the body of an SSE response into match events.
///
/// Only `data:` lines are considered; malformed frames are skipped with a
/// debug log and unknown event types surface as
/// [`MatchStreamEvent::Unknown`]. The stream ends when the connection drops.
fn sse_events(response: Response) -> EventStream {
    let mut bytes = response.bytes_stream();
    let stream = async_stream::stream! {
        let mut buffer = Vec::new();
        while let Some(chunk) = bytes.next().await {
            let Ok(chunk) = chunk else {
                // Transport error mid-stream: treat as a drop.
                break;
            };
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let Ok(line) = std::str::from_utf8(&line) else {
                    debug!("skipping non-utf8 SSE line");
                    continue;
                };
                let Some(data) = line.trim_end().strip_prefix("data:") else {
                    continue;
                };

                match serde_json::from_str::<MatchStreamEvent>(data.trim_start()) {
                    Ok(event) => yield event,
                    Err(err) => {
                        debug!(error = %err, "skipping malformed SSE frame");
                    }
                }
            }
        }
    };
    stream.boxed()
}

impl MatchGateway for HttpGateway {
    fn fetch_match(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<MatchSnapshot>> {
        self.get_json(format!("matches/{match_id}"))
    }

    fn fetch_results(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<MatchResults>> {
        self.get_json(format!("matches/{match_id}/results"))
    }

    fn subscribe(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<EventStream>> {
        let builder = self
            .request(Method::GET, &format!("matches/{match_id}/events"))
            .header(reqwest::header::ACCEPT, "text/event-stream");
        async move {
            let response = builder
                .send()
                .await
                .map_err(|source| GatewayError::transport("opening event subscription", source))?;
            let response = reject_error_status(response).await?;
            Ok(sse_events(response))
        }
        .boxed()
    }

    fn ready_up(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<()>> {
        self.post_command(format!("matches/{match_id}/ready"))
    }

    fn submit(&self, match_id: Uuid, artifact: String) -> BoxFuture<'static, GatewayResult<()>> {
        let builder = self
            .request(Method::POST, &format!("matches/{match_id}/submissions"))
            .json(&serde_json::json!({ "artifact": artifact }));
        async move {
            let response = builder
                .send()
                .await
                .map_err(|source| GatewayError::transport("submitting artifact", source))?;
            reject_error_status(response).await?;
            Ok(())
        }
        .boxed()
    }

    fn lock_submission(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<()>> {
        self.post_command(format!("matches/{match_id}/submissions/lock"))
    }

    fn forfeit(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<()>> {
        self.post_command(format!("matches/{match_id}/forfeit"))
    }

    fn create_dispute(
        &self,
        match_id: Uuid,
        request: OpenDisputeRequest,
    ) -> BoxFuture<'static, GatewayResult<DisputeSnapshot>> {
        let builder = self
            .request(Method::POST, &format!("matches/{match_id}/disputes"))
            .json(&request);
        async move {
            let response = builder
                .send()
                .await
                .map_err(|source| GatewayError::transport("creating dispute", source))?;
            let response = reject_error_status(response).await?;
            response
                .json::<DisputeSnapshot>()
                .await
                .map_err(|source| GatewayError::transport("decoding dispute", source))
        }
        .boxed()
    }

    fn list_disputes(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<DisputeList>> {
        self.get_json(format!("matches/{match_id}/disputes"))
    }
}
