//! A stand-in for the game host: a viewer walking a square route, and the
//! scene of regions loaded around it.

use waymark_core::{LocationKey, REGION_SIZE, RegionId};

/// Tiles loaded on each side of the viewer. The host loads a 104x104 tile
/// scene centred on the player.
pub const SCENE_RADIUS: i32 = 52;

/// Regions intersecting the scene centred on `center`, sorted.
pub fn visible_regions(center: LocationKey) -> Vec<RegionId> {
    let min_x = (center.x - SCENE_RADIUS).max(0);
    let min_y = (center.y - SCENE_RADIUS).max(0);
    let max_x = center.x + SCENE_RADIUS - 1;
    let max_y = center.y + SCENE_RADIUS - 1;

    let mut regions = Vec::new();
    let mut x = min_x - min_x.rem_euclid(REGION_SIZE);
    while x <= max_x {
        let mut y = min_y - min_y.rem_euclid(REGION_SIZE);
        while y <= max_y {
            regions.push(RegionId::containing(x, y));
            y += REGION_SIZE;
        }
        x += REGION_SIZE;
    }
    regions.sort();
    regions
}

/// Walks a square loop one tile per tick, counter-clockwise from its start.
#[derive(Clone, Debug)]
pub struct SimulatedViewer {
    start: LocationKey,
    position: LocationKey,
    side: i32,
    walked: i32,
}

impl SimulatedViewer {
    /// A viewer at `start` walking a square with `side` tiles per edge.
    pub fn new(start: LocationKey, side: i32) -> Self {
        Self {
            start,
            position: start,
            side: side.max(1),
            walked: 0,
        }
    }

    pub fn position(&self) -> LocationKey {
        self.position
    }

    /// Moves one tile along the route.
    pub fn step(&mut self) {
        self.walked = (self.walked + 1) % (self.side * 4);
        let edge = self.walked / self.side;
        let along = self.walked % self.side;
        let (dx, dy) = match edge {
            0 => (along, 0),
            1 => (self.side, along),
            2 => (self.side - along, self.side),
            _ => (0, self.side - along),
        };
        self.position = self.start.offset(dx, dy);
    }
}
