//! Spatial message cache and presentation lifecycle for location-pinned
//! messages: region tracking, per-region caching, selection, tile
//! exclusivity and marker presence.

pub mod client;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod location;
pub mod message;
pub mod overlay;
pub mod presenter;
pub mod region_cache;
pub mod region_tracker;
pub mod selection;
pub mod session;

#[cfg(test)]
mod test_support;

pub use client::{ClientEvent, ClientSettings, GameState, HostFrame, MessageClient, TickReport};
pub use error::MessageError;
pub use gateway::{GatewayCompletion, GatewayRequest, MessageTarget, RemoteGateway};
pub use lifecycle::{Admission, LifecycleManager, PresenceState, ReconcileStats};
pub use location::{LocationIndex, LocationKey, REGION_SIZE, RegionId, WorldId};
pub use message::{
    MAX_TEXT_CHARS, MarkerKind, MessageDraft, MessageId, MessageRecord, TextRejection,
    VoteDirection, validate_text,
};
pub use overlay::{DEFAULT_LABEL_RADIUS, MessageDetails, MessageLabel, clamp_radius};
pub use presenter::{Placement, Presenter};
pub use region_cache::{RegionCache, RegionKey};
pub use region_tracker::{FetchTicket, RegionDelta, RegionTracker};
pub use selection::{MAX_OTHERS_PER_REGION, SelectionPolicy, TOP_VOTED_COUNT};
pub use session::{BackoffConfig, Credentials, RegistrationGate, RegistrationState};
