//! Fakes and record builders shared by the unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::gateway::{GatewayCompletion, GatewayRequest, RemoteGateway};
use crate::location::{LocationKey, RegionId, WorldId};
use crate::message::{MarkerKind, MessageId, MessageRecord};
use crate::presenter::{Placement, Presenter};
use crate::region_tracker::FetchTicket;

/// World every builder places records in.
pub const TEST_WORLD: WorldId = WorldId(301);

/// A consistent record at `(dx, dy)` from the south-west corner of `region`,
/// plane 0, in [`TEST_WORLD`].
pub fn record_in(id: &str, author: &str, region: i32, dx: i32, dy: i32) -> MessageRecord {
    MessageRecord {
        id: MessageId::new(id),
        author: author.to_string(),
        text: format!("message {id}"),
        location: RegionId(region).base_tile(0).offset(dx, dy),
        world_id: TEST_WORLD,
        region_id: RegionId(region),
        created_at: 1_700_000_000_000,
        marker_kind: MarkerKind::Note,
        upvotes: 0,
        downvotes: 0,
        reported_by_viewer: false,
    }
}

/// Overrides the vote counters of `record`.
pub fn with_votes(mut record: MessageRecord, upvotes: u32, downvotes: u32) -> MessageRecord {
    record.upvotes = upvotes;
    record.downvotes = downvotes;
    record
}

// ---------------------------------------------------------------------------
// RecordingPresenter
// ---------------------------------------------------------------------------

/// Side effect observed by [`RecordingPresenter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresenterEvent {
    Spawned(MessageId),
    Relocated(MessageId),
    Deactivated(MessageId),
    Despawned(MessageId),
}

/// Presenter that resolves every tile except hidden ones and records calls.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    hidden: FxHashSet<LocationKey>,
    hide_everything: bool,
    refused: FxHashSet<MessageId>,
    /// Handle per id; `true` while active.
    handles: FxHashMap<MessageId, bool>,
    events: Vec<PresenterEvent>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hide(&mut self, location: LocationKey) {
        self.hidden.insert(location);
    }

    pub fn show(&mut self, location: LocationKey) {
        self.hidden.remove(&location);
    }

    pub fn hide_everything(&mut self, hide: bool) {
        self.hide_everything = hide;
    }

    pub fn refuse_spawn(&mut self, id: &MessageId) {
        self.refused.insert(id.clone());
    }

    pub fn allow_spawn(&mut self, id: &MessageId) {
        self.refused.remove(id);
    }

    pub fn events(&self) -> &[PresenterEvent] {
        &self.events
    }

    pub fn is_live(&self, id: &MessageId) -> bool {
        self.handles.get(id).copied().unwrap_or(false)
    }

    pub fn live_count(&self) -> usize {
        self.handles.values().filter(|&&active| active).count()
    }

    pub fn spawn_count(&self) -> usize {
        self.count(|e| matches!(e, PresenterEvent::Spawned(_)))
    }

    pub fn despawn_count(&self) -> usize {
        self.count(|e| matches!(e, PresenterEvent::Despawned(_)))
    }

    fn count(&self, predicate: impl Fn(&PresenterEvent) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

impl Presenter for RecordingPresenter {
    fn resolve(&self, location: LocationKey) -> Option<Placement> {
        if self.hide_everything || self.hidden.contains(&location) {
            return None;
        }
        Some(Placement {
            local_x: location.x * 128,
            local_y: location.y * 128,
            plane: location.plane,
        })
    }

    fn spawn(&mut self, record: &MessageRecord, _placement: Placement) -> bool {
        if self.refused.contains(&record.id) {
            return false;
        }
        self.handles.insert(record.id.clone(), true);
        self.events.push(PresenterEvent::Spawned(record.id.clone()));
        true
    }

    fn relocate(&mut self, id: &MessageId, _placement: Placement) {
        self.events.push(PresenterEvent::Relocated(id.clone()));
    }

    fn deactivate(&mut self, id: &MessageId) {
        if let Some(active) = self.handles.get_mut(id) {
            *active = false;
        }
        self.events.push(PresenterEvent::Deactivated(id.clone()));
    }

    fn despawn(&mut self, id: &MessageId) {
        self.handles.remove(id);
        self.events.push(PresenterEvent::Despawned(id.clone()));
    }
}

// ---------------------------------------------------------------------------
// ScriptedGateway
// ---------------------------------------------------------------------------

/// In-memory gateway: records submitted requests, hands back completions the
/// test queues.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    submitted: RefCell<Vec<GatewayRequest>>,
    completions: RefCell<VecDeque<GatewayCompletion>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every request submitted since the last call.
    pub fn take_submitted(&self) -> Vec<GatewayRequest> {
        self.submitted.borrow_mut().drain(..).collect()
    }

    /// Queues a completion for the next drain.
    pub fn complete(&self, completion: GatewayCompletion) {
        self.completions.borrow_mut().push_back(completion);
    }

    /// Tickets of the region fetches submitted since the last call; other
    /// requests are discarded.
    pub fn take_fetch_tickets(&self) -> Vec<FetchTicket> {
        self.take_submitted()
            .into_iter()
            .filter_map(|r| match r {
                GatewayRequest::FetchRegion { ticket } => Some(ticket),
                _ => None,
            })
            .collect()
    }
}

impl RemoteGateway for ScriptedGateway {
    fn submit(&self, request: GatewayRequest) {
        self.submitted.borrow_mut().push(request);
    }

    fn drain_completions(&self) -> Vec<GatewayCompletion> {
        self.completions.borrow_mut().drain(..).collect()
    }
}
