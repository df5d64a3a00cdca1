//! Message records: identity, placement, votes and text validation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::location::{LocationKey, RegionId, WorldId};
use crate::region_cache::RegionKey;

/// Maximum message length in characters, after trimming.
pub const MAX_TEXT_CHARS: usize = 100;

/// Prefix of ids assigned to placements that were never synced.
pub const LOCAL_ID_PREFIX: &str = "local-";

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Opaque, globally unique message identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Wraps a server- or locally-assigned id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the id of an unsynced placement created at `unix_ms`.
    ///
    /// `sequence` disambiguates placements made within the same millisecond.
    pub fn local(unix_ms: u64, sequence: u32) -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{unix_ms}-{sequence}"))
    }

    /// Whether this id belongs to a local-only placement.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MarkerKind
// ---------------------------------------------------------------------------

/// Presentation variant of the marker drawn at a message's tile.
///
/// The host maps each kind to its own model; the core only carries it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// Small parchment note.
    #[default]
    Note,
    /// Gravestone.
    Grave,
    /// Wooden signpost.
    Sign,
    /// Stacked stones.
    Cairn,
}

impl MarkerKind {
    /// All variants, in menu order.
    pub const ALL: [MarkerKind; 4] = [
        MarkerKind::Note,
        MarkerKind::Grave,
        MarkerKind::Sign,
        MarkerKind::Cairn,
    ];
}

// ---------------------------------------------------------------------------
// MessageRecord
// ---------------------------------------------------------------------------

/// A message as fetched from the backend or placed locally.
///
/// Immutable apart from the vote counters and `reported_by_viewer`, which are
/// bumped locally after a successful vote or report and never re-synced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    /// Unique id.
    pub id: MessageId,
    /// Author display name.
    pub author: String,
    /// Message body (at most [`MAX_TEXT_CHARS`] characters).
    pub text: String,
    /// Tile the message is attached to.
    pub location: LocationKey,
    /// World the message was placed in.
    pub world_id: WorldId,
    /// Region as stored by the backend. Must equal `location.region()`.
    pub region_id: RegionId,
    /// Creation time, Unix milliseconds.
    pub created_at: u64,
    /// Marker variant.
    pub marker_kind: MarkerKind,
    /// Up-vote count.
    pub upvotes: u32,
    /// Down-vote count.
    pub downvotes: u32,
    /// Whether the local viewer reported this message during this session.
    pub reported_by_viewer: bool,
}

impl MessageRecord {
    /// Vote score: `upvotes - downvotes`.
    pub fn score(&self) -> i64 {
        i64::from(self.upvotes) - i64::from(self.downvotes)
    }

    /// Case-insensitive author comparison.
    pub fn is_authored_by(&self, name: &str) -> bool {
        same_name(&self.author, name)
    }

    /// Whether the stored region agrees with the one computed from the tile.
    pub fn region_is_consistent(&self) -> bool {
        self.location.region() == self.region_id
    }

    /// Cache partition this record belongs to.
    pub fn region_key(&self) -> RegionKey {
        RegionKey::new(self.world_id, self.region_id)
    }

    /// Applies a successful vote locally.
    pub fn apply_vote(&mut self, direction: VoteDirection) {
        match direction {
            VoteDirection::Up => self.upvotes = self.upvotes.saturating_add(1),
            VoteDirection::Down => self.downvotes = self.downvotes.saturating_add(1),
        }
    }
}

/// Case-insensitive display-name equality.
pub fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Direction of a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    /// Thumbs up.
    Up,
    /// Thumbs down.
    Down,
}

impl VoteDirection {
    /// Wire name of the direction.
    pub fn as_str(self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

// ---------------------------------------------------------------------------
// MessageDraft
// ---------------------------------------------------------------------------

/// A validated message the viewer wants to place, before the backend assigns
/// an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDraft {
    /// Author display name (the viewer).
    pub author: String,
    /// Trimmed, validated text.
    pub text: String,
    /// Target tile.
    pub location: LocationKey,
    /// Target world.
    pub world_id: WorldId,
    /// Marker variant.
    pub marker_kind: MarkerKind,
}

impl MessageDraft {
    /// Region computed from the target tile.
    pub fn region_id(&self) -> RegionId {
        self.location.region()
    }

    /// Turns the draft into a local-only record with zero votes.
    pub fn into_local_record(self, id: MessageId, created_at: u64) -> MessageRecord {
        let region_id = self.region_id();
        MessageRecord {
            id,
            author: self.author,
            text: self.text,
            location: self.location,
            world_id: self.world_id,
            region_id,
            created_at,
            marker_kind: self.marker_kind,
            upvotes: 0,
            downvotes: 0,
            reported_by_viewer: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Text validation
// ---------------------------------------------------------------------------

/// Reason a message body was rejected before any remote call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TextRejection {
    /// Empty or whitespace-only.
    #[error("message is empty")]
    Empty,
    /// Longer than [`MAX_TEXT_CHARS`] characters after trimming.
    #[error("message is {0} characters long (max {MAX_TEXT_CHARS})")]
    TooLong(usize),
}

/// Trims `raw` and checks it against the length rules.
pub fn validate_text(raw: &str) -> Result<String, TextRejection> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TextRejection::Empty);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_TEXT_CHARS {
        return Err(TextRejection::TooLong(chars));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
