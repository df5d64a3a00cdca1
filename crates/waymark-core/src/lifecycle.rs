//! Per-message presence state machine.
//!
//! ```text
//!              resolve ok + spawn ok
//!  Unspawned ─────────────────────────▶ Active ◀──┐
//!                                        │       │ resolve ok + spawn ok
//!                       resolve fails    ▼       │
//!                                      Inactive ──┘
//! ```
//!
//! Any state leaves the machine through [`LifecycleManager::remove`] (deletion)
//! or [`LifecycleManager::evict_region`] (region unloaded), which despawn the
//! marker if one was ever presented and release the tile claim.
//!
//! The tile claim in the [`LocationIndex`] is taken once, at admission, and is
//! held through every state until removal.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::error::MessageError;
use crate::location::{LocationIndex, LocationKey};
use crate::message::{MessageId, MessageRecord};
use crate::presenter::Presenter;
use crate::region_cache::RegionKey;

/// Presence of a known message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresenceState {
    /// Known, never successfully presented.
    Unspawned,
    /// Currently presented.
    Active,
    /// Presented before, tile does not resolve right now.
    Inactive,
}

impl PresenceState {
    /// Whether the host holds (or held) a marker for this message.
    pub fn was_presented(self) -> bool {
        matches!(self, PresenceState::Active | PresenceState::Inactive)
    }
}

/// Result of a successful [`LifecycleManager::admit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Newly tracked, in the given state.
    Admitted(PresenceState),
    /// The id was already tracked; nothing changed.
    AlreadyKnown,
    /// Another message holds the tile; the record was skipped.
    LocationTaken,
}

/// Counters of one [`LifecycleManager::reconcile`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// `Unspawned → Active`.
    pub spawned: usize,
    /// `Inactive → Active`.
    pub reactivated: usize,
    /// `Active → Inactive`.
    pub deactivated: usize,
    /// Active markers moved to a fresh placement.
    pub relocated: usize,
}

#[derive(Debug)]
struct Tracked {
    record: MessageRecord,
    state: PresenceState,
}

/// Owns every known message, its presence state and its tile claim.
#[derive(Debug, Default)]
pub struct LifecycleManager {
    entries: FxHashMap<MessageId, Tracked>,
    index: LocationIndex,
}

impl LifecycleManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `record`: checks region integrity, claims its tile and
    /// attempts a first spawn.
    ///
    /// A record whose stored region disagrees with its coordinates is logged
    /// and rejected with [`MessageError::DataIntegrityViolation`]; it never
    /// claims a tile.
    pub fn admit(
        &mut self,
        record: MessageRecord,
        presenter: &mut dyn Presenter,
    ) -> Result<Admission, MessageError> {
        let computed = record.location.region();
        if computed != record.region_id {
            warn!(
                id = %record.id,
                x = record.location.x,
                y = record.location.y,
                computed = %computed,
                stored = %record.region_id,
                "message coordinates compute to a different region; discarding"
            );
            return Err(MessageError::DataIntegrityViolation {
                id: record.id,
                computed,
                stored: record.region_id,
            });
        }

        if self.entries.contains_key(&record.id) {
            return Ok(Admission::AlreadyKnown);
        }

        if !self.index.try_claim(record.location, &record.id) {
            debug!(id = %record.id, location = %record.location, "tile already claimed, skipping");
            return Ok(Admission::LocationTaken);
        }

        let id = record.id.clone();
        let mut tracked = Tracked {
            record,
            state: PresenceState::Unspawned,
        };
        if let Some(placement) = presenter.resolve(tracked.record.location) {
            if presenter.spawn(&tracked.record, placement) {
                tracked.state = PresenceState::Active;
            }
        }
        let state = tracked.state;
        self.entries.insert(id, tracked);
        Ok(Admission::Admitted(state))
    }

    /// Runs one presence pass over every tracked message.
    pub fn reconcile(&mut self, presenter: &mut dyn Presenter) -> ReconcileStats {
        let mut stats = ReconcileStats::default();

        for (id, tracked) in &mut self.entries {
            let placement = presenter.resolve(tracked.record.location);
            match (tracked.state, placement) {
                (PresenceState::Unspawned, Some(placement)) => {
                    if presenter.spawn(&tracked.record, placement) {
                        tracked.state = PresenceState::Active;
                        stats.spawned += 1;
                    }
                }
                (PresenceState::Unspawned, None) => {}
                (PresenceState::Active, Some(placement)) => {
                    presenter.relocate(id, placement);
                    stats.relocated += 1;
                }
                (PresenceState::Active, None) => {
                    presenter.deactivate(id);
                    tracked.state = PresenceState::Inactive;
                    stats.deactivated += 1;
                }
                (PresenceState::Inactive, Some(placement)) => {
                    if presenter.spawn(&tracked.record, placement) {
                        tracked.state = PresenceState::Active;
                        stats.reactivated += 1;
                    }
                }
                (PresenceState::Inactive, None) => {}
            }
        }

        stats
    }

    /// Stops tracking `id`, despawning its marker and releasing its tile.
    pub fn remove(&mut self, id: &MessageId, presenter: &mut dyn Presenter) -> Option<MessageRecord> {
        let tracked = self.entries.remove(id)?;
        self.release(id, &tracked, presenter);
        Some(tracked.record)
    }

    /// Removes every message of `key`. Returns how many were removed.
    pub fn evict_region(&mut self, key: &RegionKey, presenter: &mut dyn Presenter) -> usize {
        self.remove_where(presenter, |record| record.region_key() == *key)
    }

    /// Removes remote messages of `key` whose id is not in `keep`.
    ///
    /// Local-only placements are never removed this way: the backend does
    /// not know them, so their absence from a fetch means nothing.
    pub fn retain_region(
        &mut self,
        key: &RegionKey,
        keep: &FxHashSet<MessageId>,
        presenter: &mut dyn Presenter,
    ) -> usize {
        self.remove_where(presenter, |record| {
            record.region_key() == *key && !record.id.is_local() && !keep.contains(&record.id)
        })
    }

    /// Removes every message whose region fails `keep`.
    pub fn retain_regions<F>(&mut self, keep: F, presenter: &mut dyn Presenter) -> usize
    where
        F: Fn(&RegionKey) -> bool,
    {
        self.remove_where(presenter, |record| !keep(&record.region_key()))
    }

    /// Despawns and forgets everything.
    pub fn clear(&mut self, presenter: &mut dyn Presenter) {
        for (id, tracked) in self.entries.drain() {
            if tracked.state.was_presented() {
                presenter.despawn(&id);
            }
        }
        self.index.clear();
    }

    /// Presence state of `id`.
    pub fn state(&self, id: &MessageId) -> Option<PresenceState> {
        self.entries.get(id).map(|t| t.state)
    }

    /// The tracked record for `id`.
    pub fn record(&self, id: &MessageId) -> Option<&MessageRecord> {
        self.entries.get(id).map(|t| &t.record)
    }

    /// Mutable access for local vote/report updates.
    pub fn record_mut(&mut self, id: &MessageId) -> Option<&mut MessageRecord> {
        self.entries.get_mut(id).map(|t| &mut t.record)
    }

    /// The tracked message claiming `location`.
    pub fn find_at(&self, location: &LocationKey) -> Option<&MessageRecord> {
        let id = self.index.holder(location)?;
        self.record(id)
    }

    /// Whether any tracked message claims `location`.
    pub fn is_claimed(&self, location: &LocationKey) -> bool {
        self.index.is_claimed(location)
    }

    /// Ids of every tracked message.
    pub fn known_ids(&self) -> FxHashSet<MessageId> {
        self.entries.keys().cloned().collect()
    }

    /// Number of tracked messages in `key` not written by `viewer`.
    pub fn others_in_region(&self, key: &RegionKey, viewer: &str) -> usize {
        self.entries
            .values()
            .filter(|t| t.record.region_key() == *key && !t.record.is_authored_by(viewer))
            .count()
    }

    /// Copies the vote counters of `fetched` onto the tracked records with
    /// the same ids. Returns how many records changed.
    pub fn refresh_votes(&mut self, fetched: &[MessageRecord]) -> usize {
        let mut changed = 0;
        for record in fetched {
            let Some(tracked) = self.entries.get_mut(&record.id) else {
                continue;
            };
            let live = &mut tracked.record;
            if live.upvotes != record.upvotes || live.downvotes != record.downvotes {
                live.upvotes = record.upvotes;
                live.downvotes = record.downvotes;
                changed += 1;
            }
        }
        changed
    }

    /// Whether `id` is tracked.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.contains_key(id)
    }

    /// Iterates over tracked records with their state.
    pub fn iter(&self) -> impl Iterator<Item = (&MessageRecord, PresenceState)> {
        self.entries.values().map(|t| (&t.record, t.state))
    }

    /// Iterates over records currently presented.
    pub fn active(&self) -> impl Iterator<Item = &MessageRecord> {
        self.entries
            .values()
            .filter(|t| t.state == PresenceState::Active)
            .map(|t| &t.record)
    }

    /// Number of tracked messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read access to the claim table.
    pub fn index(&self) -> &LocationIndex {
        &self.index
    }

    fn remove_where<F>(&mut self, presenter: &mut dyn Presenter, predicate: F) -> usize
    where
        F: Fn(&MessageRecord) -> bool,
    {
        let doomed: Vec<MessageId> = self
            .entries
            .iter()
            .filter(|(_, t)| predicate(&t.record))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            if let Some(tracked) = self.entries.remove(id) {
                self.release(id, &tracked, presenter);
            }
        }
        doomed.len()
    }

    fn release(&mut self, id: &MessageId, tracked: &Tracked, presenter: &mut dyn Presenter) {
        if tracked.state.was_presented() {
            presenter.despawn(id);
        }
        self.index.release_if_held_by(&tracked.record.location, id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
