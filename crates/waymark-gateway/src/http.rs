//! Blocking REST client run on a small worker pool.
//!
//! [`HttpGateway::submit`] only enqueues. Worker threads pick requests off a
//! channel, perform them with [`HttpBackend`], and push the completion onto a
//! second channel that the core drains once per tick.

use std::io;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, warn};
use waymark_core::{
    GatewayCompletion, GatewayRequest, MessageDraft, MessageError, MessageRecord, MessageTarget,
    RemoteGateway, VoteDirection, WorldId,
};

use crate::wire::{
    RegisterBody, RegisterResponse, ReportBody, SaveBody, VoteBody, WireMessage, error_reason,
    parse_message_array,
};

/// Header carrying the credential on authenticated calls.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Errors raised while constructing the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The base URL is not an http(s) URL.
    #[error("invalid backend URL: {0}")]
    InvalidBaseUrl(String),
    /// A worker thread could not be spawned.
    #[error("failed to spawn gateway worker: {0}")]
    Spawn(#[source] io::Error),
}

/// Connection settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Backend root, e.g. `https://example.org`.
    pub base_url: String,
    /// Per-request timeout covering connect, send and receive.
    pub timeout: Duration,
    /// Worker threads performing requests. At least one is always started.
    pub worker_threads: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://runemessages-api-production.up.railway.app".to_string(),
            timeout: Duration::from_secs(10),
            worker_threads: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

/// Performs one [`GatewayRequest`] synchronously and maps every failure into
/// a [`MessageError`].
#[derive(Clone, Debug)]
pub struct HttpBackend {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpBackend {
    /// Builds a backend for `base_url`, which must be an `http` or `https`
    /// URL. Every request gives up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(GatewayError::InvalidBaseUrl(base_url.to_string()));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            agent,
            base_url: base_url.to_string(),
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs `request` to completion.
    pub fn execute(&self, request: GatewayRequest) -> GatewayCompletion {
        match request {
            GatewayRequest::Register { username } => {
                let result = self.register(&username);
                GatewayCompletion::Registered { username, result }
            }
            GatewayRequest::Verify { api_key } => {
                let result = self.verify(&api_key);
                GatewayCompletion::Verified { api_key, result }
            }
            GatewayRequest::FetchRegion { ticket } => {
                let result = self.fetch_region(ticket.key.world, ticket.key.region.0);
                GatewayCompletion::RegionFetched { ticket, result }
            }
            GatewayRequest::FetchMine { api_key, world } => {
                let result = self.fetch_mine(&api_key, world);
                GatewayCompletion::MineFetched { world, result }
            }
            GatewayRequest::Save { api_key, draft } => {
                let result = self.save(&api_key, &draft);
                GatewayCompletion::Saved { draft, result }
            }
            GatewayRequest::Delete { api_key, target } => {
                let result = self.delete(&api_key, &target);
                GatewayCompletion::Deleted { target, result }
            }
            GatewayRequest::Vote {
                api_key,
                target,
                direction,
            } => {
                let result = self.vote(&api_key, &target, direction);
                GatewayCompletion::Voted {
                    target,
                    direction,
                    result,
                }
            }
            GatewayRequest::Report {
                api_key,
                target,
                reason,
            } => {
                let result = self.report(&api_key, &target, &reason);
                GatewayCompletion::Reported { target, result }
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn message_url(&self, target: &MessageTarget, suffix: &str) -> String {
        self.url(&format!(
            "/messages/{}/{}/{}{suffix}",
            target.world, target.region, target.id
        ))
    }

    fn register(&self, username: &str) -> Result<String, MessageError> {
        let response = self
            .agent
            .post(&self.url("/register"))
            .send_json(RegisterBody { username })
            .map_err(map_error)?;
        let body: RegisterResponse = response.into_json().map_err(malformed)?;
        body.api_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| MessageError::Refused("registration response had no API key".into()))
    }

    fn verify(&self, api_key: &str) -> Result<(), MessageError> {
        self.agent
            .get(&self.url("/verify"))
            .set(API_KEY_HEADER, api_key)
            .call()
            .map_err(map_error)?;
        Ok(())
    }

    fn fetch_region(&self, world: WorldId, region: i32) -> Result<Vec<MessageRecord>, MessageError> {
        let response = self
            .agent
            .get(&self.url("/messages"))
            .query("worldId", &world.to_string())
            .query("regionId", &region.to_string())
            .call()
            .map_err(map_error)?;
        let body = response.into_string().map_err(malformed)?;
        Ok(parse_message_array(&body))
    }

    fn fetch_mine(&self, api_key: &str, world: WorldId) -> Result<Vec<MessageRecord>, MessageError> {
        let response = self
            .agent
            .get(&self.url("/messages/mine"))
            .set(API_KEY_HEADER, api_key)
            .query("worldId", &world.to_string())
            .call()
            .map_err(map_error)?;
        let body = response.into_string().map_err(malformed)?;
        Ok(parse_message_array(&body))
    }

    fn save(&self, api_key: &str, draft: &MessageDraft) -> Result<MessageRecord, MessageError> {
        let response = self
            .agent
            .post(&self.url("/messages"))
            .set(API_KEY_HEADER, api_key)
            .send_json(SaveBody::from_draft(draft))
            .map_err(map_error)?;
        let stored: WireMessage = response.into_json().map_err(malformed)?;
        let mut record = stored.into_record();
        if record.author.is_empty() {
            record.author = draft.author.clone();
        }
        if record.text.is_empty() {
            record.text = draft.text.clone();
        }
        Ok(record)
    }

    fn delete(&self, api_key: &str, target: &MessageTarget) -> Result<(), MessageError> {
        self.agent
            .delete(&self.message_url(target, ""))
            .set(API_KEY_HEADER, api_key)
            .call()
            .map_err(map_error)?;
        Ok(())
    }

    fn vote(
        &self,
        api_key: &str,
        target: &MessageTarget,
        direction: VoteDirection,
    ) -> Result<(), MessageError> {
        self.agent
            .post(&self.message_url(target, "/vote"))
            .set(API_KEY_HEADER, api_key)
            .send_json(VoteBody { vote: direction })
            .map_err(map_error)?;
        Ok(())
    }

    fn report(&self, api_key: &str, target: &MessageTarget, reason: &str) -> Result<(), MessageError> {
        self.agent
            .post(&self.message_url(target, "/report"))
            .set(API_KEY_HEADER, api_key)
            .send_json(ReportBody { reason })
            .map_err(map_error)?;
        Ok(())
    }
}

/// Maps a ureq failure onto the core taxonomy.
fn map_error(error: ureq::Error) -> MessageError {
    match error {
        ureq::Error::Status(401 | 403, _) => MessageError::AuthenticationMissing,
        ureq::Error::Status(code, response) if code < 500 => {
            let reason = response
                .into_string()
                .ok()
                .and_then(|body| error_reason(&body))
                .unwrap_or_else(|| format!("HTTP {code}"));
            MessageError::Refused(reason)
        }
        ureq::Error::Status(code, _) => MessageError::TransientNetworkFailure(format!("HTTP {code}")),
        ureq::Error::Transport(transport) => {
            MessageError::TransientNetworkFailure(transport.to_string())
        }
    }
}

fn malformed(error: io::Error) -> MessageError {
    MessageError::TransientNetworkFailure(format!("malformed response: {error}"))
}

// ---------------------------------------------------------------------------
// HttpGateway
// ---------------------------------------------------------------------------

/// [`RemoteGateway`] backed by [`HttpBackend`] on worker threads.
///
/// Dropping the gateway closes the request channel; workers exit once their
/// current request finishes.
pub struct HttpGateway {
    request_sender: Sender<GatewayRequest>,
    completion_sender: Sender<GatewayCompletion>,
    completion_receiver: Receiver<GatewayCompletion>,
    worker_count: usize,
}

impl HttpGateway {
    /// Validates the backend URL and starts the worker threads.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let backend = HttpBackend::new(&config.base_url, config.timeout)?;
        let (request_sender, request_receiver) = unbounded::<GatewayRequest>();
        let (completion_sender, completion_receiver) = unbounded::<GatewayCompletion>();
        let worker_count = config.worker_threads.max(1);

        for index in 0..worker_count {
            let receiver = request_receiver.clone();
            let sender = completion_sender.clone();
            let backend = backend.clone();

            thread::Builder::new()
                .name(format!("gateway-worker-{index}"))
                .spawn(move || {
                    while let Ok(request) = receiver.recv() {
                        let kind = request.kind();
                        let completion = backend.execute(request);
                        debug!(kind, "gateway request finished");
                        if sender.send(completion).is_err() {
                            break;
                        }
                    }
                })
                .map_err(GatewayError::Spawn)?;
        }

        debug!(workers = worker_count, base_url = backend.base_url(), "gateway started");
        Ok(Self {
            request_sender,
            completion_sender,
            completion_receiver,
            worker_count,
        })
    }

    /// Number of worker threads serving requests.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

impl RemoteGateway for HttpGateway {
    fn submit(&self, request: GatewayRequest) {
        if let Err(rejected) = self.request_sender.send(request) {
            let request = rejected.into_inner();
            warn!(kind = request.kind(), "gateway workers are gone, failing request");
            let failure = request.into_failure(MessageError::TransientNetworkFailure(
                "gateway is shut down".into(),
            ));
            // The receiver lives in `self`, so this send cannot fail.
            let _ = self.completion_sender.send(failure);
        }
    }

    fn drain_completions(&self) -> Vec<GatewayCompletion> {
        self.completion_receiver.try_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
