//! The presentation seam: how the core asks the host to draw markers.
//!
//! The host owns renderable handles keyed by [`MessageId`]; it never owns
//! message identity. Every call is made from the tick that owns core state.

use crate::location::LocationKey;
use crate::message::{MessageId, MessageRecord};

/// Where a tile currently projects in the host's local scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Scene-local X.
    pub local_x: i32,
    /// Scene-local Y.
    pub local_y: i32,
    /// Plane the marker is drawn on.
    pub plane: i32,
}

/// Host-side marker rendering.
pub trait Presenter {
    /// Projects `location` into the current scene, or `None` while the tile is
    /// not renderable (outside the loaded scene, different plane, ...).
    fn resolve(&self, location: LocationKey) -> Option<Placement>;

    /// Creates (or re-creates) the marker for `record`. Returns `false` if the
    /// host could not build it, e.g. its model failed to load. Any previous
    /// handle for the same id is replaced.
    fn spawn(&mut self, record: &MessageRecord, placement: Placement) -> bool;

    /// Moves an active marker.
    fn relocate(&mut self, id: &MessageId, placement: Placement);

    /// Hides a marker whose tile stopped resolving. The handle may be kept.
    fn deactivate(&mut self, id: &MessageId);

    /// Destroys the marker and any handle kept for it.
    fn despawn(&mut self, id: &MessageId);
}
