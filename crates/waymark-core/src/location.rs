//! Tile addressing and placement exclusivity.
//!
//! A [`LocationKey`] names a single tile `(x, y, plane)`. Tiles are grouped
//! into 64×64 regions; [`LocationKey::region`] is the only place the region
//! arithmetic lives, so fetched records can be validated against it.
//!
//! The [`LocationIndex`] maps each tile to at most one [`MessageId`]. It is the
//! single authority for "is this spot taken", used both for remote messages
//! and for the viewer's own placements before any save is attempted.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::message::MessageId;

/// log2 of the region edge length in tiles.
pub const REGION_SHIFT: i32 = 6;

/// Edge length of a region in tiles.
pub const REGION_SIZE: i32 = 1 << REGION_SHIFT;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Game world (server shard) identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub i32);

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Region identifier, packed as `(region_x << 8) | region_y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub i32);

impl RegionId {
    /// Region containing the tile column `(x, y)`.
    pub fn containing(x: i32, y: i32) -> Self {
        Self(((x >> REGION_SHIFT) << 8) | (y >> REGION_SHIFT))
    }

    /// South-west corner tile of this region on the given plane.
    pub fn base_tile(self, plane: i32) -> LocationKey {
        let rx = self.0 >> 8;
        let ry = self.0 & 0xff;
        LocationKey::new(rx << REGION_SHIFT, ry << REGION_SHIFT, plane)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LocationKey
// ---------------------------------------------------------------------------

/// A single world tile. `plane` is the vertical level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey {
    /// Tile X coordinate.
    pub x: i32,
    /// Tile Y coordinate.
    pub y: i32,
    /// Vertical level.
    pub plane: i32,
}

impl LocationKey {
    /// Creates a new tile key.
    pub fn new(x: i32, y: i32, plane: i32) -> Self {
        Self { x, y, plane }
    }

    /// The region this tile belongs to, computed purely from coordinates.
    pub fn region(&self) -> RegionId {
        RegionId::containing(self.x, self.y)
    }

    /// Returns the tile offset by `(dx, dy)` on the same plane.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            plane: self.plane,
        }
    }

    /// Chebyshev distance in tiles, or `None` when the planes differ.
    pub fn distance_to(&self, other: &LocationKey) -> Option<u32> {
        if self.plane != other.plane {
            return None;
        }
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        Some(dx.max(dy))
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.plane)
    }
}

// ---------------------------------------------------------------------------
// LocationIndex
// ---------------------------------------------------------------------------

/// Tile → message claim table.
///
/// At most one message id may hold a tile at any time. Claims are taken when a
/// message is admitted and survive while it is `Unspawned`, `Active` or
/// `Inactive`; they are released only on eviction or deletion.
#[derive(Debug, Default)]
pub struct LocationIndex {
    claims: FxHashMap<LocationKey, MessageId>,
}

impl LocationIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            claims: FxHashMap::default(),
        }
    }

    /// Claims `key` for `id`.
    ///
    /// Returns `true` if the tile was free or is already held by `id`, and
    /// `false` if another message holds it.
    pub fn try_claim(&mut self, key: LocationKey, id: &MessageId) -> bool {
        match self.claims.get(&key) {
            Some(holder) => holder == id,
            None => {
                self.claims.insert(key, id.clone());
                true
            }
        }
    }

    /// Releases `key` regardless of holder, returning the previous holder.
    pub fn release(&mut self, key: &LocationKey) -> Option<MessageId> {
        self.claims.remove(key)
    }

    /// Releases `key` only if `id` currently holds it.
    pub fn release_if_held_by(&mut self, key: &LocationKey, id: &MessageId) -> bool {
        if self.claims.get(key) == Some(id) {
            self.claims.remove(key);
            true
        } else {
            false
        }
    }

    /// Whether any message holds `key`.
    pub fn is_claimed(&self, key: &LocationKey) -> bool {
        self.claims.contains_key(key)
    }

    /// The message currently holding `key`.
    pub fn holder(&self, key: &LocationKey) -> Option<&MessageId> {
        self.claims.get(key)
    }

    /// Number of claimed tiles.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Returns true if no tile is claimed.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Iterates over all claimed tiles.
    pub fn claimed(&self) -> impl Iterator<Item = &LocationKey> {
        self.claims.keys()
    }

    /// Drops every claim.
    pub fn clear(&mut self) {
        self.claims.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
