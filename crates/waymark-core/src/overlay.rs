//! Data the host draws next to markers near the viewer.

use crate::lifecycle::LifecycleManager;
use crate::location::LocationKey;
use crate::message::{MessageId, MessageRecord};

/// Smallest allowed label radius, in tiles.
pub const MIN_LABEL_RADIUS: u32 = 1;

/// Largest allowed label radius, in tiles.
pub const MAX_LABEL_RADIUS: u32 = 20;

/// Default label radius, in tiles.
pub const DEFAULT_LABEL_RADIUS: u32 = 5;

/// One overlay label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageLabel {
    /// Message the label belongs to.
    pub id: MessageId,
    /// Tile the label is anchored to.
    pub location: LocationKey,
    /// Message body.
    pub text: String,
    /// Author display name.
    pub author: String,
    /// Up-vote count.
    pub upvotes: u32,
    /// Down-vote count.
    pub downvotes: u32,
    /// Chebyshev distance from the viewer.
    pub distance: u32,
}

impl MessageLabel {
    fn from_record(record: &MessageRecord, distance: u32) -> Self {
        Self {
            id: record.id.clone(),
            location: record.location,
            text: record.text.clone(),
            author: record.author.clone(),
            upvotes: record.upvotes,
            downvotes: record.downvotes,
            distance,
        }
    }
}

/// Full details shown when the viewer examines a marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDetails {
    /// Author display name.
    pub author: String,
    /// Message body.
    pub text: String,
    /// Creation time, Unix milliseconds.
    pub created_at: u64,
    /// Up-vote count.
    pub upvotes: u32,
    /// Down-vote count.
    pub downvotes: u32,
    /// Whether the viewer reported it this session.
    pub reported_by_viewer: bool,
}

impl From<&MessageRecord> for MessageDetails {
    fn from(record: &MessageRecord) -> Self {
        Self {
            author: record.author.clone(),
            text: record.text.clone(),
            created_at: record.created_at,
            upvotes: record.upvotes,
            downvotes: record.downvotes,
            reported_by_viewer: record.reported_by_viewer,
        }
    }
}

/// Clamps a configured radius into the supported range.
pub fn clamp_radius(radius: u32) -> u32 {
    radius.clamp(MIN_LABEL_RADIUS, MAX_LABEL_RADIUS)
}

/// Labels for every active message within `radius` tiles of `viewer` on the
/// viewer's plane, nearest first.
pub fn labels_near(lifecycle: &LifecycleManager, viewer: LocationKey, radius: u32) -> Vec<MessageLabel> {
    let radius = clamp_radius(radius);
    let mut labels: Vec<MessageLabel> = lifecycle
        .active()
        .filter_map(|record| {
            let distance = viewer.distance_to(&record.location)?;
            (distance <= radius).then(|| MessageLabel::from_record(record, distance))
        })
        .collect();
    labels.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
    labels
}
