//! Contract between the core and the remote message backend.
//!
//! A [`RemoteGateway`] accepts [`GatewayRequest`]s without blocking and runs
//! them elsewhere. Results come back as [`GatewayCompletion`]s, which the core
//! collects with [`RemoteGateway::drain_completions`] from its own tick, so no
//! completion ever touches core state from another thread.
//!
//! Every completion echoes the context of its request and carries a
//! `Result<_, MessageError>`; transport details never leak past the gateway.

use crate::error::MessageError;
use crate::location::{RegionId, WorldId};
use crate::message::{MessageDraft, MessageId, MessageRecord, VoteDirection};
use crate::region_tracker::FetchTicket;

/// Backend address of an existing message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageTarget {
    /// World the message lives in.
    pub world: WorldId,
    /// Region the message is stored under.
    pub region: RegionId,
    /// Message id.
    pub id: MessageId,
}

impl MessageTarget {
    /// Address of `record`.
    pub fn of(record: &MessageRecord) -> Self {
        Self {
            world: record.world_id,
            region: record.region_id,
            id: record.id.clone(),
        }
    }
}

/// Work submitted to the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayRequest {
    /// `POST /register`.
    Register {
        /// Display name to register.
        username: String,
    },
    /// `GET /verify`.
    Verify {
        /// Credential to check.
        api_key: String,
    },
    /// `GET /messages?worldId&regionId`.
    FetchRegion {
        /// Region and request generation.
        ticket: FetchTicket,
    },
    /// `GET /messages/mine?worldId`.
    FetchMine {
        /// Credential of the author.
        api_key: String,
        /// World to list.
        world: WorldId,
    },
    /// `POST /messages`.
    Save {
        /// Credential of the author.
        api_key: String,
        /// Validated message to store.
        draft: MessageDraft,
    },
    /// `DELETE /messages/{world}/{region}/{id}`.
    Delete {
        /// Credential of the author.
        api_key: String,
        /// Message to delete.
        target: MessageTarget,
    },
    /// `POST /messages/{world}/{region}/{id}/vote`.
    Vote {
        /// Credential of the voter.
        api_key: String,
        /// Message voted on.
        target: MessageTarget,
        /// Up or down.
        direction: VoteDirection,
    },
    /// `POST /messages/{world}/{region}/{id}/report`.
    Report {
        /// Credential of the reporter.
        api_key: String,
        /// Message reported.
        target: MessageTarget,
        /// Free-form reason.
        reason: String,
    },
}

impl GatewayRequest {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayRequest::Register { .. } => "register",
            GatewayRequest::Verify { .. } => "verify",
            GatewayRequest::FetchRegion { .. } => "fetch_region",
            GatewayRequest::FetchMine { .. } => "fetch_mine",
            GatewayRequest::Save { .. } => "save",
            GatewayRequest::Delete { .. } => "delete",
            GatewayRequest::Vote { .. } => "vote",
            GatewayRequest::Report { .. } => "report",
        }
    }

    /// Builds the completion reporting that this request failed with `error`.
    pub fn into_failure(self, error: MessageError) -> GatewayCompletion {
        match self {
            GatewayRequest::Register { username } => GatewayCompletion::Registered {
                username,
                result: Err(error),
            },
            GatewayRequest::Verify { api_key } => GatewayCompletion::Verified {
                api_key,
                result: Err(error),
            },
            GatewayRequest::FetchRegion { ticket } => GatewayCompletion::RegionFetched {
                ticket,
                result: Err(error),
            },
            GatewayRequest::FetchMine { world, .. } => GatewayCompletion::MineFetched {
                world,
                result: Err(error),
            },
            GatewayRequest::Save { draft, .. } => GatewayCompletion::Saved {
                draft,
                result: Err(error),
            },
            GatewayRequest::Delete { target, .. } => GatewayCompletion::Deleted {
                target,
                result: Err(error),
            },
            GatewayRequest::Vote {
                target, direction, ..
            } => GatewayCompletion::Voted {
                target,
                direction,
                result: Err(error),
            },
            GatewayRequest::Report { target, .. } => GatewayCompletion::Reported {
                target,
                result: Err(error),
            },
        }
    }
}

/// Outcome of a [`GatewayRequest`], delivered on the core's tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCompletion {
    /// Registration finished; `Ok` carries the issued API key.
    Registered {
        /// Name that was registered.
        username: String,
        /// Issued credential.
        result: Result<String, MessageError>,
    },
    /// Credential check finished.
    Verified {
        /// Credential that was checked.
        api_key: String,
        /// `Ok` if the backend accepted it.
        result: Result<(), MessageError>,
    },
    /// Region fetch finished.
    RegionFetched {
        /// Ticket of the request.
        ticket: FetchTicket,
        /// Records of the region.
        result: Result<Vec<MessageRecord>, MessageError>,
    },
    /// Author listing finished.
    MineFetched {
        /// World that was listed.
        world: WorldId,
        /// The author's records.
        result: Result<Vec<MessageRecord>, MessageError>,
    },
    /// Save finished; `Ok` carries the stored record with its server id.
    Saved {
        /// What was submitted.
        draft: MessageDraft,
        /// Stored record.
        result: Result<MessageRecord, MessageError>,
    },
    /// Delete finished.
    Deleted {
        /// Deleted message.
        target: MessageTarget,
        /// Outcome.
        result: Result<(), MessageError>,
    },
    /// Vote finished.
    Voted {
        /// Message voted on.
        target: MessageTarget,
        /// Direction voted.
        direction: VoteDirection,
        /// Outcome.
        result: Result<(), MessageError>,
    },
    /// Report finished.
    Reported {
        /// Message reported.
        target: MessageTarget,
        /// Outcome.
        result: Result<(), MessageError>,
    },
}

/// Asynchronous access to the message backend.
pub trait RemoteGateway {
    /// Queues `request`. Never blocks on the network.
    fn submit(&self, request: GatewayRequest);

    /// Takes every completion that arrived since the last call.
    fn drain_completions(&self) -> Vec<GatewayCompletion>;
}
