//! Choosing which fetched messages of a region to present.
//!
//! The viewer's own messages are always presented and never count against the
//! cap. Other authors compete for [`SelectionPolicy::max_others`] slots: the
//! [`SelectionPolicy::top_voted`] best-scored are taken first, the remaining
//! slots are filled from a uniform shuffle of everything else.
//!
//! [`select`] is pure apart from the caller-supplied RNG, so a seeded RNG
//! makes the whole selection reproducible.

use std::cmp::Ordering;

use rand::Rng;
use rand::seq::SliceRandom;
use rustc_hash::FxHashSet;

use crate::message::{MessageId, MessageRecord};

/// Number of best-scored messages by other authors that are always selected.
pub const TOP_VOTED_COUNT: usize = 10;

/// Maximum number of messages by other authors presented per region load.
pub const MAX_OTHERS_PER_REGION: usize = 30;

/// Slot budget for other authors' messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionPolicy {
    /// Best-scored messages taken before any random pick.
    pub top_voted: usize,
    /// Hard cap on other authors' messages per region.
    pub max_others: usize,
}

impl SelectionPolicy {
    /// The budget left once `presented` other-authored messages of the
    /// region are already on screen.
    pub fn after_presented(self, presented: usize) -> Self {
        Self {
            top_voted: self.top_voted.saturating_sub(presented),
            max_others: self.max_others.saturating_sub(presented),
        }
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            top_voted: TOP_VOTED_COUNT,
            max_others: MAX_OTHERS_PER_REGION,
        }
    }
}

/// Who is looking and what they want to see.
#[derive(Clone, Copy, Debug)]
pub struct Audience<'a> {
    /// The viewer's display name.
    pub viewer: &'a str,
    /// Present the viewer's own messages.
    pub show_own: bool,
    /// Present other authors' messages.
    pub show_others: bool,
}

/// Output of [`select`], kept in its three tiers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// The viewer's own messages, uncapped, in input order.
    pub own: Vec<MessageRecord>,
    /// Best-scored messages by other authors, best first.
    pub top_voted: Vec<MessageRecord>,
    /// Randomly chosen messages from the rest.
    pub random_picks: Vec<MessageRecord>,
}

impl Selection {
    /// Total number of selected messages.
    pub fn len(&self) -> usize {
        self.own.len() + self.top_voted.len() + self.random_picks.len()
    }

    /// Returns true if nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of selected messages not authored by the viewer.
    pub fn others_len(&self) -> usize {
        self.top_voted.len() + self.random_picks.len()
    }

    /// Iterates in presentation order: own, then top-voted, then random.
    pub fn iter(&self) -> impl Iterator<Item = &MessageRecord> {
        self.own
            .iter()
            .chain(self.top_voted.iter())
            .chain(self.random_picks.iter())
    }

    /// Consumes the selection into presentation order.
    pub fn into_ordered(self) -> Vec<MessageRecord> {
        let mut out = self.own;
        out.extend(self.top_voted);
        out.extend(self.random_picks);
        out
    }
}

/// Orders by score descending, then id ascending.
fn by_score(a: &MessageRecord, b: &MessageRecord) -> Ordering {
    b.score().cmp(&a.score()).then_with(|| a.id.cmp(&b.id))
}

/// Selects the messages of one region to present this cycle.
///
/// Records whose id is in `already_presented` are skipped entirely; they keep
/// whatever presence they already have.
pub fn select<R: Rng + ?Sized>(
    records: &[MessageRecord],
    audience: Audience<'_>,
    already_presented: &FxHashSet<MessageId>,
    policy: &SelectionPolicy,
    rng: &mut R,
) -> Selection {
    let mut selection = Selection::default();
    let mut others: Vec<MessageRecord> = Vec::new();

    for record in records {
        if already_presented.contains(&record.id) {
            continue;
        }
        if record.is_authored_by(audience.viewer) {
            if audience.show_own {
                selection.own.push(record.clone());
            }
        } else {
            others.push(record.clone());
        }
    }

    if !audience.show_others || others.is_empty() {
        return selection;
    }

    others.sort_by(by_score);

    let top_count = policy.top_voted.min(policy.max_others).min(others.len());
    let mut remaining = others.split_off(top_count);
    selection.top_voted = others;

    remaining.shuffle(rng);
    let random_slots = policy.max_others - selection.top_voted.len();
    remaining.truncate(random_slots);
    selection.random_picks = remaining;

    selection
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
