//! Cardinal directions and direction bit sets.
//!
//! Blocked sides of a tile are stored as a [`DirectionMask`]. A side listed in
//! the mask is sealed: the explosion can neither leave the tile through it nor
//! enter the tile through it.

use glam::IVec2;
use serde::{Deserialize, Serialize};

/// One of the four cardinal directions (+y is north, +x is east).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// All cardinal directions in a fixed iteration order.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Tile offset for one step in this direction.
    pub fn offset(self) -> IVec2 {
        match self {
            Direction::North => IVec2::new(0, 1),
            Direction::South => IVec2::new(0, -1),
            Direction::East => IVec2::new(1, 0),
            Direction::West => IVec2::new(-1, 0),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    /// Single-bit mask for this direction.
    pub fn mask(self) -> DirectionMask {
        match self {
            Direction::North => DirectionMask::NORTH,
            Direction::South => DirectionMask::SOUTH,
            Direction::East => DirectionMask::EAST,
            Direction::West => DirectionMask::WEST,
        }
    }
}

/// Diagonal steps, each expressed as the two cardinal legs that make it up.
pub const DIAGONALS: [(Direction, Direction); 4] = [
    (Direction::North, Direction::East),
    (Direction::South, Direction::East),
    (Direction::South, Direction::West),
    (Direction::North, Direction::West),
];

/// Bit set of cardinal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DirectionMask(pub u8);

impl DirectionMask {
    pub const NONE: DirectionMask = DirectionMask(0);
    pub const NORTH: DirectionMask = DirectionMask(1);
    pub const SOUTH: DirectionMask = DirectionMask(1 << 1);
    pub const EAST: DirectionMask = DirectionMask(1 << 2);
    pub const WEST: DirectionMask = DirectionMask(1 << 3);
    pub const ALL: DirectionMask = DirectionMask(0b1111);

    #[inline]
    pub fn contains(self, dir: Direction) -> bool {
        self.0 & dir.mask().0 != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_all(self) -> bool {
        self.0 & Self::ALL.0 == Self::ALL.0
    }

    pub fn insert(&mut self, dir: Direction) {
        self.0 |= dir.mask().0;
    }

    pub fn union(self, other: DirectionMask) -> DirectionMask {
        DirectionMask(self.0 | other.0)
    }

    /// True when every side in `entry` is blocked by this mask.
    ///
    /// An empty `entry` set is never considered blocked.
    pub fn blocks_all_of(self, entry: DirectionMask) -> bool {
        !entry.is_empty() && self.0 & entry.0 == entry.0
    }

    /// Iterate the directions contained in the mask.
    pub fn iter(self) -> impl Iterator<Item = Direction> {
        Direction::ALL.into_iter().filter(move |d| self.contains(*d))
    }
}

impl From<Direction> for DirectionMask {
    fn from(dir: Direction) -> Self {
        dir.mask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposites_cancel_offsets() {
        for dir in Direction::ALL {
            assert_eq!(dir.offset() + dir.opposite().offset(), IVec2::ZERO);
        }
    }

    #[test]
    fn test_blocks_all_of() {
        let wall = DirectionMask::ALL;
        assert!(wall.blocks_all_of(DirectionMask::NORTH));

        let window = DirectionMask::NORTH;
        assert!(window.blocks_all_of(DirectionMask::NORTH));
        assert!(!window.blocks_all_of(DirectionMask::NORTH.union(DirectionMask::EAST)));
        assert!(!window.blocks_all_of(DirectionMask::NONE));
    }

    #[test]
    fn test_mask_iteration() {
        let mask = DirectionMask::SOUTH.union(DirectionMask::WEST);
        let dirs: Vec<_> = mask.iter().collect();
        assert_eq!(dirs, vec![Direction::South, Direction::West]);
    }
}
