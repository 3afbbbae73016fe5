//! Tile coordinates, compass directions and the client viewport.
//!
//! All positions are absolute tile coordinates on a plane. The client renders
//! a 104x104 tile window ("viewport") anchored on an 8-tile segment grid; a
//! fresh viewport is requested whenever an entity drifts too close to its
//! edge.

use serde::{Deserialize, Serialize};

/// Size in tiles of one region segment.
pub const SEGMENT_SIZE: i32 = 8;

/// Furthest Chebyshev distance at which another entity is rendered.
pub const RENDER_DISTANCE: i32 = SEGMENT_SIZE * 2;

/// Largest x or y coordinate on the map.
pub const MAX_COORDINATE: i32 = 16383;

/// Absolute tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    /// Height level, 0..=3 on the reference client.
    #[serde(default, alias = "z")]
    pub plane: u8,
}

impl Position {
    pub const fn new(x: i32, y: i32, plane: u8) -> Self {
        Self { x, y, plane }
    }

    /// Whether both coordinates lie on the map, `0..=MAX_COORDINATE`.
    pub fn is_on_map(&self) -> bool {
        (0..=MAX_COORDINATE).contains(&self.x) && (0..=MAX_COORDINATE).contains(&self.y)
    }

    /// Chebyshev distance test; positions on different planes are never
    /// within distance of each other.
    pub fn is_within_distance(&self, other: &Position, distance: i32) -> bool {
        self.plane == other.plane
            && (other.x - self.x).abs() <= distance
            && (other.y - self.y).abs() <= distance
    }

    /// Whether `other` is close enough to be rendered from here.
    pub fn is_viewable_from(&self, other: &Position) -> bool {
        self.is_within_distance(other, RENDER_DISTANCE)
    }

    /// Returns this position moved one tile in `direction`.
    pub fn step(&self, direction: Direction) -> Position {
        let (dx, dy) = direction.delta();
        Position::new(self.x + dx, self.y + dy, self.plane)
    }

    /// Segment coordinate (x / 8) containing this tile.
    pub fn segment_x(&self) -> i32 {
        self.x >> 3
    }

    /// Segment coordinate (y / 8) containing this tile.
    pub fn segment_y(&self) -> i32 {
        self.y >> 3
    }

    /// Manhattan distance, used to rank candidate approach tiles.
    pub fn manhattan(&self, other: &Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.plane)
    }
}

/// One of the eight compass directions, numbered as the client expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    NorthWest = 0,
    North = 1,
    NorthEast = 2,
    West = 3,
    East = 4,
    SouthWest = 5,
    South = 6,
    SouthEast = 7,
}

const DELTA_X: [i32; 8] = [-1, 0, 1, -1, 1, -1, 0, 1];
const DELTA_Y: [i32; 8] = [1, 1, 1, 0, 0, -1, -1, -1];

impl Direction {
    /// Resolves a step delta to a direction. Only the signs matter; a zero
    /// delta yields `None`.
    pub fn from_delta(dx: i32, dy: i32) -> Option<Direction> {
        use Direction::*;
        match (dx.signum(), dy.signum()) {
            (-1, -1) => Some(SouthWest),
            (-1, 1) => Some(NorthWest),
            (-1, 0) => Some(West),
            (1, -1) => Some(SouthEast),
            (1, 1) => Some(NorthEast),
            (1, 0) => Some(East),
            (0, -1) => Some(South),
            (0, 1) => Some(North),
            _ => None,
        }
    }

    /// Unit vector for this direction.
    pub fn delta(self) -> (i32, i32) {
        let i = self as usize;
        (DELTA_X[i], DELTA_Y[i])
    }

    /// Wire value (3 bits).
    pub fn value(self) -> u32 {
        self as u32
    }
}

/// The client's 104x104 viewport derived from an anchor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Segment x of the viewport's south-west corner.
    pub region_x: i32,
    /// Segment y of the viewport's south-west corner.
    pub region_y: i32,
}

impl Viewport {
    /// Viewport anchored so that `anchor` sits six segments in from the
    /// south-west corner.
    pub fn new(anchor: &Position) -> Self {
        Self {
            region_x: anchor.segment_x() - 6,
            region_y: anchor.segment_y() - 6,
        }
    }

    /// X coordinate of `position` relative to this viewport.
    pub fn local_x(&self, position: &Position) -> i32 {
        position.x - SEGMENT_SIZE * self.region_x
    }

    /// Y coordinate of `position` relative to this viewport.
    pub fn local_y(&self, position: &Position) -> i32 {
        position.y - SEGMENT_SIZE * self.region_y
    }

    /// Whether `position` has drifted close enough to the viewport edge that
    /// the client needs a rebuild. The margin is two segments on the near
    /// edges; the far edges trip at eleven segments.
    pub fn needs_rebuild(&self, position: &Position) -> bool {
        let dx = self.local_x(position);
        let dy = self.local_y(position);
        dx < 2 * SEGMENT_SIZE
            || dx >= 11 * SEGMENT_SIZE
            || dy < 2 * SEGMENT_SIZE
            || dy > 11 * SEGMENT_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chebyshev_distance_requires_same_plane() {
        let a = Position::new(3200, 3200, 0);
        assert!(a.is_within_distance(&Position::new(3216, 3184, 0), 16));
        assert!(!a.is_within_distance(&Position::new(3217, 3200, 0), 16));
        assert!(!a.is_within_distance(&Position::new(3200, 3200, 1), 16));
    }

    #[test]
    fn map_bounds() {
        assert!(Position::new(0, MAX_COORDINATE, 0).is_on_map());
        assert!(!Position::new(-1, 3200, 0).is_on_map());
        assert!(!Position::new(3200, MAX_COORDINATE + 1, 0).is_on_map());
        assert!(!Position::new(i32::MIN, 3200, 0).is_on_map());
    }

    #[test]
    fn direction_deltas_round_trip() {
        for d in [
            Direction::NorthWest,
            Direction::North,
            Direction::NorthEast,
            Direction::West,
            Direction::East,
            Direction::SouthWest,
            Direction::South,
            Direction::SouthEast,
        ] {
            let (dx, dy) = d.delta();
            assert_eq!(Direction::from_delta(dx, dy), Some(d));
        }
        assert_eq!(Direction::from_delta(0, 0), None);
        assert_eq!(Direction::from_delta(5, -2), Some(Direction::SouthEast));
    }

    #[test]
    fn viewport_locals_and_rebuild_margin() {
        let anchor = Position::new(3200, 3200, 0);
        let vp = Viewport::new(&anchor);
        assert_eq!(vp.region_x, 394);
        assert_eq!(vp.local_x(&anchor), 48);
        assert_eq!(vp.local_y(&anchor), 48);
        assert!(!vp.needs_rebuild(&anchor));
        assert!(!vp.needs_rebuild(&Position::new(3200 - 32, 3200, 0)));
        assert!(vp.needs_rebuild(&Position::new(3200 - 33, 3200, 0)));
        assert!(vp.needs_rebuild(&Position::new(3200 + 40, 3200, 0)));
        assert!(!vp.needs_rebuild(&Position::new(3200, 3200 + 40, 0)));
        assert!(vp.needs_rebuild(&Position::new(3200, 3200 + 41, 0)));
    }
}
