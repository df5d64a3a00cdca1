//! Visible-region tracking and fetch bookkeeping.
//!
//! Every tick the host reports the full set of regions currently in view.
//! [`RegionTracker::reconcile`] diffs that set against the tracked one and
//! reports which regions entered and which left. The diff is always computed
//! from the authoritative visible set, so a region that leaves and re-enters
//! between two ticks is handled like any other transition.
//!
//! Fetches are tagged with a [`FetchTicket`]. A completion is accepted only if
//! its region is still tracked in the same world and its generation matches
//! the request currently pending for that region; anything else is stale.

use rustc_hash::FxHashMap;

use crate::location::{RegionId, WorldId};
use crate::region_cache::RegionKey;

// ---------------------------------------------------------------------------
// FetchTicket
// ---------------------------------------------------------------------------

/// Identifies one fetch request for one region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    /// Region being fetched.
    pub key: RegionKey,
    /// Monotonic request number.
    pub generation: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FetchStatus {
    Pending { generation: u64 },
    Fetched,
}

// ---------------------------------------------------------------------------
// RegionDelta
// ---------------------------------------------------------------------------

/// Regions that changed membership during one [`RegionTracker::reconcile`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionDelta {
    /// Newly visible regions, in ascending order.
    pub entered: Vec<RegionKey>,
    /// Regions no longer visible, in ascending order. Keys carry the world
    /// they were tracked under, which differs from the current world after a
    /// world change.
    pub left: Vec<RegionKey>,
}

impl RegionDelta {
    /// Returns true if nothing entered or left.
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RegionTracker
// ---------------------------------------------------------------------------

/// Tracks the visible regions of one world and their fetch status.
#[derive(Debug, Default)]
pub struct RegionTracker {
    world: Option<WorldId>,
    /// `None` means no fetch is pending and none has been applied.
    tracked: FxHashMap<RegionId, Option<FetchStatus>>,
    /// Never reset, so tickets from before a [`clear`](Self::clear) stay stale.
    next_generation: u64,
}

impl RegionTracker {
    /// Creates a tracker with nothing in view.
    pub fn new() -> Self {
        Self::default()
    }

    /// World of the tracked regions, if any tick has been reconciled.
    pub fn world(&self) -> Option<WorldId> {
        self.world
    }

    /// Replaces the tracked set with `visible` in `world`.
    ///
    /// Changing world reports every previously tracked region as left.
    pub fn reconcile(&mut self, visible: &[RegionId], world: WorldId) -> RegionDelta {
        let mut delta = RegionDelta::default();

        if let Some(previous) = self.world.filter(|&previous| previous != world) {
            delta.left = self
                .tracked
                .keys()
                .map(|&region| RegionKey::new(previous, region))
                .collect();
            self.tracked.clear();
        }
        self.world = Some(world);

        let mut still_visible: Vec<RegionId> = Vec::with_capacity(visible.len());
        for &region in visible {
            if !still_visible.contains(&region) {
                still_visible.push(region);
            }
        }

        let departed: Vec<RegionId> = self
            .tracked
            .keys()
            .filter(|region| !still_visible.contains(region))
            .copied()
            .collect();
        for region in departed {
            self.tracked.remove(&region);
            delta.left.push(RegionKey::new(world, region));
        }

        for region in still_visible {
            if !self.tracked.contains_key(&region) {
                self.tracked.insert(region, None);
                delta.entered.push(RegionKey::new(world, region));
            }
        }

        delta.entered.sort();
        delta.left.sort();
        delta
    }

    /// Whether `key` is tracked in the current world.
    pub fn is_tracked(&self, key: &RegionKey) -> bool {
        self.world == Some(key.world) && self.tracked.contains_key(&key.region)
    }

    /// Tracked regions of the current world, in ascending order.
    pub fn tracked_regions(&self) -> Vec<RegionKey> {
        let Some(world) = self.world else {
            return Vec::new();
        };
        let mut keys: Vec<RegionKey> = self
            .tracked
            .keys()
            .map(|&region| RegionKey::new(world, region))
            .collect();
        keys.sort();
        keys
    }

    /// Marks `region` as pending and returns the ticket to fetch it with.
    ///
    /// Returns `None` if the region is untracked, already pending, or already
    /// fetched.
    pub fn begin_fetch(&mut self, region: RegionId) -> Option<FetchTicket> {
        let world = self.world?;
        let status = self.tracked.get_mut(&region)?;
        if status.is_some() {
            return None;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        *status = Some(FetchStatus::Pending { generation });
        Some(FetchTicket {
            key: RegionKey::new(world, region),
            generation,
        })
    }

    /// Starts a fetch for every tracked region that needs one, in ascending
    /// region order.
    pub fn begin_due_fetches(&mut self) -> Vec<FetchTicket> {
        let mut due: Vec<RegionId> = self
            .tracked
            .iter()
            .filter(|(_, status)| status.is_none())
            .map(|(&region, _)| region)
            .collect();
        due.sort();
        due.into_iter()
            .filter_map(|region| self.begin_fetch(region))
            .collect()
    }

    /// Accepts a completed fetch. Returns `false` if the ticket is stale.
    pub fn accept(&mut self, ticket: &FetchTicket) -> bool {
        if !self.ticket_is_current(ticket) {
            return false;
        }
        self.tracked
            .insert(ticket.key.region, Some(FetchStatus::Fetched));
        true
    }

    /// Records a failed fetch so the region is requested again next cycle.
    /// Stale tickets are ignored.
    pub fn fail(&mut self, ticket: &FetchTicket) {
        if self.ticket_is_current(ticket) {
            self.tracked.insert(ticket.key.region, None);
        }
    }

    /// Forgets the fetch status of a tracked region so it is fetched again.
    pub fn invalidate(&mut self, region: RegionId) {
        if let Some(status) = self.tracked.get_mut(&region) {
            *status = None;
        }
    }

    /// Whether a fetch for `region` is in flight.
    pub fn is_pending(&self, region: RegionId) -> bool {
        matches!(
            self.tracked.get(&region),
            Some(Some(FetchStatus::Pending { .. }))
        )
    }

    /// Whether a fetch for `region` has been applied.
    pub fn is_fetched(&self, region: RegionId) -> bool {
        matches!(self.tracked.get(&region), Some(Some(FetchStatus::Fetched)))
    }

    /// Number of tracked regions.
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    /// Returns true if no region is tracked.
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Forgets every region and the current world. Generations keep counting.
    pub fn clear(&mut self) {
        self.tracked.clear();
        self.world = None;
    }

    fn ticket_is_current(&self, ticket: &FetchTicket) -> bool {
        if self.world != Some(ticket.key.world) {
            return false;
        }
        matches!(
            self.tracked.get(&ticket.key.region),
            Some(Some(FetchStatus::Pending { generation })) if *generation == ticket.generation
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
