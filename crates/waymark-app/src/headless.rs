//! Presenter without a renderer: keeps marker handles in a map and logs every
//! transition.

use rustc_hash::FxHashMap;
use tracing::{debug, info, trace};
use waymark_core::{LocationKey, MarkerKind, MessageId, MessageRecord, Placement, Presenter};

use crate::viewer::SCENE_RADIUS;

/// Fine units per tile in scene-local coordinates.
pub const LOCAL_UNITS_PER_TILE: i32 = 128;

/// A marker the headless host is "drawing".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub placement: Placement,
    pub active: bool,
}

/// Headless stand-in for the game's scene graph.
#[derive(Debug, Default)]
pub struct HeadlessPresenter {
    /// South-west corner of the loaded scene.
    scene_base: Option<LocationKey>,
    markers: FxHashMap<MessageId, Marker>,
}

impl HeadlessPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the scene centred on `center`.
    pub fn load_scene(&mut self, center: LocationKey) {
        self.scene_base = Some(center.offset(-SCENE_RADIUS, -SCENE_RADIUS));
    }

    /// Drops the scene; nothing resolves until the next load.
    pub fn unload_scene(&mut self) {
        self.scene_base = None;
    }

    pub fn marker(&self, id: &MessageId) -> Option<&Marker> {
        self.markers.get(id)
    }

    /// Markers currently drawn.
    pub fn active_count(&self) -> usize {
        self.markers.values().filter(|m| m.active).count()
    }

    /// Handles held, drawn or not.
    pub fn handle_count(&self) -> usize {
        self.markers.len()
    }
}

impl Presenter for HeadlessPresenter {
    fn resolve(&self, location: LocationKey) -> Option<Placement> {
        let base = self.scene_base?;
        let dx = location.x - base.x;
        let dy = location.y - base.y;
        let span = 0..SCENE_RADIUS * 2;
        if !span.contains(&dx) || !span.contains(&dy) {
            return None;
        }
        // Markers stand in the middle of their tile.
        Some(Placement {
            local_x: dx * LOCAL_UNITS_PER_TILE + LOCAL_UNITS_PER_TILE / 2,
            local_y: dy * LOCAL_UNITS_PER_TILE + LOCAL_UNITS_PER_TILE / 2,
            plane: location.plane,
        })
    }

    fn spawn(&mut self, record: &MessageRecord, placement: Placement) -> bool {
        info!(
            "Spawned {:?} for {} by {} at {}: {:?}",
            record.marker_kind, record.id, record.author, record.location, record.text
        );
        self.markers.insert(
            record.id.clone(),
            Marker {
                kind: record.marker_kind,
                placement,
                active: true,
            },
        );
        true
    }

    fn relocate(&mut self, id: &MessageId, placement: Placement) {
        if let Some(marker) = self.markers.get_mut(id) {
            trace!("Moved {id} to ({}, {})", placement.local_x, placement.local_y);
            marker.placement = placement;
        }
    }

    fn deactivate(&mut self, id: &MessageId) {
        if let Some(marker) = self.markers.get_mut(id) {
            debug!("Hid {id}");
            marker.active = false;
        }
    }

    fn despawn(&mut self, id: &MessageId) {
        if self.markers.remove(id).is_some() {
            debug!("Despawned {id}");
        }
    }
}
