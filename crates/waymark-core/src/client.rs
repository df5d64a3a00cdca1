//! The message client: one owned context holding every piece of core state,
//! driven by the host once per tick.
//!
//! Each [`MessageClient::tick`] runs, in order:
//!
//! 1. registration poll,
//! 2. region reconcile and eviction of departed regions,
//! 3. fetch requests for tracked regions that need one,
//! 4. every gateway completion that arrived since the last tick,
//! 5. a presence pass over all known messages.
//!
//! Completions are only ever applied in step 4, on the caller's thread, so
//! the cache, the claim table and presence states have a single writer.
//!
//! Viewer actions ([`submit_message`](MessageClient::submit_message),
//! [`vote`](MessageClient::vote), ...) reject locally checkable problems
//! synchronously with a [`MessageError`]; everything decided by the backend
//! surfaces later as a [`ClientEvent`].

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashSet;
use tracing::{debug, info, trace, warn};

use crate::error::MessageError;
use crate::gateway::{GatewayCompletion, GatewayRequest, MessageTarget, RemoteGateway};
use crate::lifecycle::{Admission, LifecycleManager, ReconcileStats};
use crate::location::{LocationKey, RegionId, WorldId};
use crate::message::{MarkerKind, MessageDraft, MessageId, MessageRecord, VoteDirection, validate_text};
use crate::overlay::{MessageDetails, MessageLabel, labels_near};
use crate::presenter::Presenter;
use crate::region_cache::{RegionCache, RegionKey};
use crate::region_tracker::{FetchTicket, RegionTracker};
use crate::selection::{Audience, SelectionPolicy, select};
use crate::session::{BackoffConfig, Credentials, RegistrationGate, RegistrationOutcome, RegistrationState};

// ---------------------------------------------------------------------------
// Host input
// ---------------------------------------------------------------------------

/// Coarse state of the host session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    /// At the login screen.
    LoginScreen,
    /// Switching worlds.
    Hopping,
    /// Loading a scene.
    Loading,
    /// In game.
    LoggedIn,
}

/// Everything the host reports for one tick.
#[derive(Clone, Copy, Debug)]
pub struct HostFrame<'a> {
    /// Session state.
    pub state: GameState,
    /// Viewer display name, once known.
    pub viewer: Option<&'a str>,
    /// Current world.
    pub world: WorldId,
    /// Regions currently in view, if the host has a scene.
    pub visible_regions: Option<&'a [RegionId]>,
}

/// Viewer preferences and policy knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSettings {
    /// Present the viewer's own messages.
    pub show_own: bool,
    /// Fetch and present other authors' messages.
    pub show_others: bool,
    /// Save placements to the backend; otherwise they stay local.
    pub sync_enabled: bool,
    /// Slot budget per region.
    pub selection: SelectionPolicy,
    /// Registration retry schedule.
    pub backoff: BackoffConfig,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            show_own: true,
            show_others: true,
            sync_enabled: true,
            selection: SelectionPolicy::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Something the host should react to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// Chat-style line for the viewer.
    Notice(String),
    /// A credential was issued and should be persisted.
    CredentialsIssued(Credentials),
    /// The stored credential was rejected and should be forgotten.
    CredentialsRevoked,
    /// A message of the viewer was deleted.
    Deleted(MessageId),
    /// The viewer's messages in a world, for a side-panel listing.
    MineLoaded {
        /// World that was listed.
        world: WorldId,
        /// The viewer's messages; empty on failure.
        messages: Vec<MessageRecord>,
    },
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Regions that became visible.
    pub entered: usize,
    /// Regions that stopped being visible.
    pub left: usize,
    /// Messages removed because their region is no longer tracked.
    pub evicted: usize,
    /// Region fetches submitted.
    pub fetches_issued: usize,
    /// Gateway completions applied.
    pub completions: usize,
    /// Presence transitions.
    pub presence: ReconcileStats,
}

const NOTICE_PLACED: &str = "Message placed successfully!";
const NOTICE_PLACED_LOCAL: &str = "Message placed locally (sync disabled).";
const NOTICE_VOTED: &str = "Vote recorded!";
const NOTICE_REPORTED: &str = "Message has been reported.";
const NOTICE_DELETED: &str = "Message deleted successfully!";
const NOTICE_REGISTERED: &str = "Registered successfully!";
const NOTICE_REGISTRATION_FAILED: &str = "Registration failed. Messages will be local only.";

// ---------------------------------------------------------------------------
// MessageClient
// ---------------------------------------------------------------------------

/// Owns the region tracker, cache, lifecycle and session state.
pub struct MessageClient<G: RemoteGateway, R: Rng = ChaCha8Rng> {
    gateway: G,
    rng: R,
    settings: ClientSettings,
    tracker: RegionTracker,
    cache: RegionCache,
    lifecycle: LifecycleManager,
    gate: RegistrationGate,
    voted: FxHashSet<MessageId>,
    reported: FxHashSet<MessageId>,
    votes_in_flight: FxHashSet<MessageId>,
    reports_in_flight: FxHashSet<MessageId>,
    events: Vec<ClientEvent>,
    viewer: Option<String>,
    world: Option<WorldId>,
    tick: u64,
    local_sequence: u32,
    session_live: bool,
}

impl<G: RemoteGateway> MessageClient<G> {
    /// Creates a client with an OS-seeded RNG.
    pub fn new(gateway: G, settings: ClientSettings, stored: Option<Credentials>) -> Self {
        let rng = ChaCha8Rng::from_rng(&mut rand::rng());
        Self::with_rng(gateway, settings, stored, rng)
    }
}

impl<G: RemoteGateway, R: Rng> MessageClient<G, R> {
    /// Creates a client with the given RNG, e.g. a seeded one for tests.
    pub fn with_rng(gateway: G, settings: ClientSettings, stored: Option<Credentials>, rng: R) -> Self {
        let gate = RegistrationGate::new(stored, settings.backoff);
        Self {
            gateway,
            rng,
            settings,
            tracker: RegionTracker::new(),
            cache: RegionCache::new(),
            lifecycle: LifecycleManager::new(),
            gate,
            voted: FxHashSet::default(),
            reported: FxHashSet::default(),
            votes_in_flight: FxHashSet::default(),
            reports_in_flight: FxHashSet::default(),
            events: Vec::new(),
            viewer: None,
            world: None,
            tick: 0,
            local_sequence: 0,
            session_live: false,
        }
    }

    // -- tick ---------------------------------------------------------------

    /// Runs one cycle for `frame`.
    pub fn tick(&mut self, frame: &HostFrame<'_>, presenter: &mut dyn Presenter) -> TickReport {
        match frame.state {
            GameState::LoginScreen | GameState::Hopping => {
                if self.session_live {
                    self.soft_reset(presenter);
                }
                return TickReport::default();
            }
            GameState::Loading => return TickReport::default(),
            GameState::LoggedIn => {}
        }

        self.session_live = true;
        self.tick += 1;
        self.world = Some(frame.world);
        self.viewer = frame.viewer.map(str::to_string);
        let mut report = TickReport::default();

        if let Some(viewer) = frame.viewer {
            if let Some(request) = self.gate.poll(self.tick, viewer) {
                self.gateway.submit(request);
            }
        }

        if let Some(visible) = frame.visible_regions {
            let delta = self.tracker.reconcile(visible, frame.world);
            report.entered = delta.entered.len();
            report.left = delta.left.len();

            for key in &delta.left {
                self.cache.evict(key);
                report.evicted += self.lifecycle.evict_region(key, presenter);
            }
            let tracker = &self.tracker;
            report.evicted += self
                .lifecycle
                .retain_regions(|key| tracker.is_tracked(key), presenter);
            if report.evicted > 0 {
                debug!(count = report.evicted, "cleaned up messages from departed regions");
            }

            if self.settings.show_others {
                for ticket in self.tracker.begin_due_fetches() {
                    self.gateway.submit(GatewayRequest::FetchRegion { ticket });
                    report.fetches_issued += 1;
                }
            }
        }

        for completion in self.gateway.drain_completions() {
            self.apply(completion, presenter);
            report.completions += 1;
        }

        report.presence = self.lifecycle.reconcile(presenter);
        report
    }

    /// Despawns everything and forgets all state, including the session's
    /// vote and report history.
    pub fn shutdown(&mut self, presenter: &mut dyn Presenter) {
        self.soft_reset(presenter);
        self.voted.clear();
        self.reported.clear();
        self.events.clear();
    }

    /// Logout or world hop: drops regions, cache, claims and presence but
    /// keeps vote and report history.
    fn soft_reset(&mut self, presenter: &mut dyn Presenter) {
        debug!("resetting message state");
        self.lifecycle.clear(presenter);
        self.cache.clear();
        self.tracker.clear();
        self.gate.reset_session();
        self.votes_in_flight.clear();
        self.reports_in_flight.clear();
        self.viewer = None;
        self.world = None;
        self.session_live = false;
    }

    // -- completions --------------------------------------------------------

    fn apply(&mut self, completion: GatewayCompletion, presenter: &mut dyn Presenter) {
        match completion {
            GatewayCompletion::Registered { username, result } => {
                match self.gate.on_registered(&username, result, self.tick) {
                    RegistrationOutcome::Issued(creds) => {
                        self.events.push(ClientEvent::CredentialsIssued(creds));
                        self.notice(NOTICE_REGISTERED);
                    }
                    RegistrationOutcome::Failed => self.notice(NOTICE_REGISTRATION_FAILED),
                    RegistrationOutcome::Stale => {}
                }
            }
            GatewayCompletion::Verified { api_key, result } => {
                if self.gate.on_verified(&api_key, result) {
                    self.events.push(ClientEvent::CredentialsRevoked);
                }
            }
            GatewayCompletion::RegionFetched { ticket, result } => {
                self.apply_fetch(ticket, result, presenter);
            }
            GatewayCompletion::MineFetched { world, result } => {
                let messages = result.unwrap_or_else(|err| {
                    warn!(world = %world, error = %err, "failed to list own messages");
                    Vec::new()
                });
                self.events.push(ClientEvent::MineLoaded { world, messages });
            }
            GatewayCompletion::Saved { draft, result } => match result {
                Ok(record) => self.admit_saved(record, presenter),
                Err(err) => {
                    warn!(location = %draft.location, error = %err, "failed to save message");
                    self.notice_error(&err);
                }
            },
            GatewayCompletion::Deleted { target, result } => match result {
                Ok(()) => self.forget_message(&target.id, presenter),
                Err(err) => {
                    warn!(id = %target.id, error = %err, "failed to delete message");
                    self.notice_error(&err);
                }
            },
            GatewayCompletion::Voted {
                target,
                direction,
                result,
            } => {
                self.votes_in_flight.remove(&target.id);
                match result {
                    Ok(()) => {
                        self.voted.insert(target.id.clone());
                        if let Some(record) = self.lifecycle.record_mut(&target.id) {
                            record.apply_vote(direction);
                        }
                        if let Some(record) = self.cache.record_mut(&target.id) {
                            record.apply_vote(direction);
                        }
                        info!(id = %target.id, direction = direction.as_str(), "vote recorded");
                        self.notice(NOTICE_VOTED);
                    }
                    Err(err) => {
                        warn!(id = %target.id, error = %err, "failed to vote on message");
                        if !err.is_transient() {
                            self.notice_error(&err);
                        }
                    }
                }
            }
            GatewayCompletion::Reported { target, result } => {
                self.reports_in_flight.remove(&target.id);
                match result {
                    Ok(()) => {
                        self.reported.insert(target.id.clone());
                        if let Some(record) = self.lifecycle.record_mut(&target.id) {
                            record.reported_by_viewer = true;
                        }
                        if let Some(record) = self.cache.record_mut(&target.id) {
                            record.reported_by_viewer = true;
                        }
                        self.notice(NOTICE_REPORTED);
                    }
                    Err(err) => {
                        warn!(id = %target.id, error = %err, "failed to report message");
                        if !err.is_transient() {
                            self.notice_error(&err);
                        }
                    }
                }
            }
        }
    }

    fn apply_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<MessageRecord>, MessageError>,
        presenter: &mut dyn Presenter,
    ) {
        let records = match result {
            Ok(records) => records,
            Err(err) => {
                warn!(region = %ticket.key.region, error = %err, "failed to load messages for region");
                self.tracker.fail(&ticket);
                return;
            }
        };
        if !self.tracker.accept(&ticket) {
            debug!(
                region = %ticket.key.region,
                generation = ticket.generation,
                "discarding stale region fetch"
            );
            return;
        }

        let key = ticket.key;
        let records: Vec<MessageRecord> = records
            .into_iter()
            .filter(|record| belongs_to(record, &key))
            .collect();

        let fresh: FxHashSet<MessageId> = records.iter().map(|r| r.id.clone()).collect();
        let dropped = self.lifecycle.retain_region(&key, &fresh, presenter);
        if dropped > 0 {
            debug!(region = %key.region, count = dropped, "removed messages missing from refetch");
        }
        self.cache.put(key, records);

        let Some(cached) = self.cache.get(&key) else {
            return;
        };
        let viewer = self.viewer.as_deref().unwrap_or("");
        let audience = Audience {
            viewer,
            show_own: self.settings.show_own,
            show_others: self.settings.show_others,
        };
        let refreshed = self.lifecycle.refresh_votes(cached);
        if refreshed > 0 {
            trace!(region = %key.region, count = refreshed, "refreshed vote counts");
        }
        let presented = self.lifecycle.others_in_region(&key, viewer);
        let policy = self.settings.selection.after_presented(presented);
        let known = self.lifecycle.known_ids();
        let selection = select(cached, audience, &known, &policy, &mut self.rng);
        let (own, top, random) = (
            selection.own.len(),
            selection.top_voted.len(),
            selection.random_picks.len(),
        );

        let mut admitted = 0;
        for record in selection.into_ordered() {
            if let Ok(Admission::Admitted(_)) = self.lifecycle.admit(record, presenter) {
                admitted += 1;
            }
        }
        if admitted > 0 {
            debug!(
                region = %key.region,
                admitted,
                own,
                top_voted = top,
                random = random,
                "loaded messages for region"
            );
        }
    }

    fn admit_saved(&mut self, record: MessageRecord, presenter: &mut dyn Presenter) {
        let location = record.location;
        let current = self.world == Some(record.world_id)
            && self.tracker.is_tracked(&record.region_key());
        if !current {
            debug!(
                id = %record.id,
                world = %record.world_id,
                region = %record.region_id,
                "saved message belongs to a region no longer loaded"
            );
            self.notice(NOTICE_PLACED);
            return;
        }
        match self.lifecycle.admit(record, presenter) {
            Ok(Admission::Admitted(_)) | Ok(Admission::AlreadyKnown) => self.notice(NOTICE_PLACED),
            Ok(Admission::LocationTaken) => {
                self.notice_error(&MessageError::PlacementConflict(location));
            }
            Err(err) => warn!(error = %err, "backend returned an inconsistent saved message"),
        }
    }

    fn forget_message(&mut self, id: &MessageId, presenter: &mut dyn Presenter) {
        self.lifecycle.remove(id, presenter);
        self.cache.remove_message(id);
        self.notice(NOTICE_DELETED);
        self.events.push(ClientEvent::Deleted(id.clone()));
    }

    // -- viewer actions -----------------------------------------------------

    /// Places a message with `text` at `location`.
    ///
    /// With sync enabled the message is saved remotely and appears once the
    /// backend confirms it; with sync disabled it is placed locally at once.
    pub fn submit_message(
        &mut self,
        text: &str,
        marker_kind: MarkerKind,
        location: LocationKey,
        presenter: &mut dyn Presenter,
    ) -> Result<(), MessageError> {
        let text = validate_text(text)?;
        let author = self.viewer.clone().ok_or(MessageError::NotLoggedIn)?;
        let world_id = self.world.ok_or(MessageError::NotLoggedIn)?;

        if self.lifecycle.is_claimed(&location) {
            return Err(MessageError::PlacementConflict(location));
        }

        let draft = MessageDraft {
            author,
            text,
            location,
            world_id,
            marker_kind,
        };

        if self.settings.sync_enabled {
            let api_key = self
                .gate
                .api_key()
                .ok_or(MessageError::AuthenticationMissing)?
                .to_string();
            self.gateway.submit(GatewayRequest::Save { api_key, draft });
            return Ok(());
        }

        let id = MessageId::local(unix_millis(), self.local_sequence);
        self.local_sequence = self.local_sequence.wrapping_add(1);
        let record = draft.into_local_record(id, unix_millis());
        match self.lifecycle.admit(record, presenter)? {
            Admission::LocationTaken => Err(MessageError::PlacementConflict(location)),
            Admission::Admitted(_) | Admission::AlreadyKnown => {
                self.notice(NOTICE_PLACED_LOCAL);
                Ok(())
            }
        }
    }

    /// Votes on a known message.
    pub fn vote(&mut self, id: &MessageId, direction: VoteDirection) -> Result<(), MessageError> {
        let target = self.target_of(id)?;
        if self.voted.contains(id) || self.votes_in_flight.contains(id) {
            return Err(MessageError::AlreadyVoted(id.clone()));
        }
        let api_key = self.require_api_key()?;
        self.votes_in_flight.insert(id.clone());
        self.gateway.submit(GatewayRequest::Vote {
            api_key,
            target,
            direction,
        });
        Ok(())
    }

    /// Reports a known message on behalf of the viewer.
    pub fn report(&mut self, id: &MessageId) -> Result<(), MessageError> {
        let target = self.target_of(id)?;
        if self.reported.contains(id) || self.reports_in_flight.contains(id) {
            return Err(MessageError::AlreadyReported(id.clone()));
        }
        let api_key = self.require_api_key()?;
        let reporter = self.viewer.as_deref().unwrap_or("Unknown");
        let reason = format!("Reported by {reporter}");
        self.reports_in_flight.insert(id.clone());
        self.gateway.submit(GatewayRequest::Report {
            api_key,
            target,
            reason,
        });
        Ok(())
    }

    /// Deletes one of the viewer's messages. Local-only placements are
    /// removed at once; synced ones after the backend confirms.
    pub fn delete(&mut self, target: MessageTarget, presenter: &mut dyn Presenter) -> Result<(), MessageError> {
        if target.id.is_local() {
            if !self.lifecycle.contains(&target.id) {
                return Err(MessageError::UnknownMessage(target.id));
            }
            self.forget_message(&target.id, presenter);
            return Ok(());
        }
        let api_key = self.require_api_key()?;
        self.gateway.submit(GatewayRequest::Delete { api_key, target });
        Ok(())
    }

    /// Requests the viewer's own messages in the current world. The answer
    /// arrives as [`ClientEvent::MineLoaded`].
    pub fn request_my_messages(&mut self) -> Result<(), MessageError> {
        let world = self.world.ok_or(MessageError::NotLoggedIn)?;
        match self.gate.api_key() {
            Some(api_key) => {
                let api_key = api_key.to_string();
                self.gateway.submit(GatewayRequest::FetchMine { api_key, world });
            }
            None => self.events.push(ClientEvent::MineLoaded {
                world,
                messages: Vec::new(),
            }),
        }
        Ok(())
    }

    // -- inspection ---------------------------------------------------------

    /// The message occupying `location`, if any.
    pub fn message_at(&self, location: &LocationKey) -> Option<&MessageRecord> {
        self.lifecycle.find_at(location)
    }

    /// Details of the message occupying `location`.
    pub fn examine(&self, location: &LocationKey) -> Option<MessageDetails> {
        self.message_at(location).map(MessageDetails::from)
    }

    /// Overlay labels around `viewer_location`.
    pub fn labels(&self, viewer_location: LocationKey, radius: u32) -> Vec<MessageLabel> {
        labels_near(&self.lifecycle, viewer_location, radius)
    }

    /// Takes every event emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    /// Whether the viewer voted on `id` this session.
    pub fn has_voted(&self, id: &MessageId) -> bool {
        self.voted.contains(id)
    }

    /// Whether the viewer reported `id` this session.
    pub fn has_reported(&self, id: &MessageId) -> bool {
        self.reported.contains(id)
    }

    /// Registration state of the viewer.
    pub fn registration_state(&self) -> RegistrationState {
        self.gate.state()
    }

    /// Current settings.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Replaces the settings. Turning `show_others` on fetches every tracked
    /// region again on the next tick.
    pub fn update_settings(&mut self, settings: ClientSettings) {
        if settings.show_others && !self.settings.show_others {
            for key in self.tracker.tracked_regions() {
                self.tracker.invalidate(key.region);
            }
        }
        self.settings = settings;
    }

    /// Presence bookkeeping, read-only.
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Fetched region sets, read-only.
    pub fn cache(&self) -> &RegionCache {
        &self.cache
    }

    /// Region tracking, read-only.
    pub fn tracker(&self) -> &RegionTracker {
        &self.tracker
    }

    /// The gateway this client talks to.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Number of logged-in ticks processed.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    // -- helpers ------------------------------------------------------------

    fn target_of(&self, id: &MessageId) -> Result<MessageTarget, MessageError> {
        self.lifecycle
            .record(id)
            .map(MessageTarget::of)
            .ok_or_else(|| MessageError::UnknownMessage(id.clone()))
    }

    fn require_api_key(&self) -> Result<String, MessageError> {
        self.gate
            .api_key()
            .map(str::to_string)
            .ok_or(MessageError::AuthenticationMissing)
    }

    fn notice(&mut self, text: &str) {
        self.events.push(ClientEvent::Notice(text.to_string()));
    }

    fn notice_error(&mut self, err: &MessageError) {
        let text = err.user_notice().unwrap_or_else(|| err.to_string());
        self.events.push(ClientEvent::Notice(text));
    }
}

/// Whether a fetched record really belongs to the requested partition.
fn belongs_to(record: &MessageRecord, key: &RegionKey) -> bool {
    if record.world_id != key.world {
        warn!(
            id = %record.id,
            world = %record.world_id,
            expected = %key.world,
            "fetched message belongs to another world"
        );
        return false;
    }
    if record.region_id != key.region {
        warn!(
            id = %record.id,
            region = %record.region_id,
            expected = %key.region,
            "fetched message belongs to another region"
        );
        return false;
    }
    true
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
