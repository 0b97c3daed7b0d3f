use serde::Deserialize;
use std::fmt;

/// Number of z-layers in the world (0 = highest floor, 7 = surface, 15 = deepest).
pub const MAP_MAX_LAYERS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
    Northeast,
    Northwest,
    Southeast,
    Southwest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionDelta {
    pub dx: i16,
    pub dy: i16,
    pub dz: i8,
}

impl Position {
    pub const fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, delta: PositionDelta) -> Option<Self> {
        let x = i32::from(self.x) + i32::from(delta.dx);
        let y = i32::from(self.y) + i32::from(delta.dy);
        let z = i16::from(self.z) + i16::from(delta.dz);

        if x < 0 || y < 0 || z < 0 {
            return None;
        }

        if x > i32::from(u16::MAX) || y > i32::from(u16::MAX) || z >= i16::from(MAP_MAX_LAYERS) {
            return None;
        }

        Some(Self {
            x: x as u16,
            y: y as u16,
            z: z as u8,
        })
    }

    pub fn offset_by(self, dx: i32, dy: i32) -> Option<Self> {
        let dx = i16::try_from(dx).ok()?;
        let dy = i16::try_from(dy).ok()?;
        self.offset(PositionDelta { dx, dy, dz: 0 })
    }

    pub fn step(self, direction: Direction) -> Option<Self> {
        self.offset(direction.delta())
    }

    /// Signed x difference `self - other`.
    pub fn offset_x(self, other: Position) -> i32 {
        i32::from(self.x) - i32::from(other.x)
    }

    /// Signed y difference `self - other`.
    pub fn offset_y(self, other: Position) -> i32 {
        i32::from(self.y) - i32::from(other.y)
    }

    /// Signed z difference `self - other`.
    pub fn offset_z(self, other: Position) -> i32 {
        i32::from(self.z) - i32::from(other.z)
    }

    pub fn distance_x(self, other: Position) -> u32 {
        self.offset_x(other).unsigned_abs()
    }

    pub fn distance_y(self, other: Position) -> u32 {
        self.offset_y(other).unsigned_abs()
    }

    pub fn distance_z(self, other: Position) -> u32 {
        self.offset_z(other).unsigned_abs()
    }

    /// Chebyshev distance on the x/y plane; z is ignored.
    pub fn distance(self, other: Position) -> u32 {
        self.distance_x(other).max(self.distance_y(other))
    }

    pub fn in_range(self, other: Position, range_x: u32, range_y: u32, range_z: u32) -> bool {
        self.distance_x(other) <= range_x
            && self.distance_y(other) <= range_y
            && self.distance_z(other) <= range_z
    }

    pub fn is_underground(self) -> bool {
        self.z > 7
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Northeast,
        Direction::Northwest,
        Direction::Southeast,
        Direction::Southwest,
    ];

    pub const ORTHOGONAL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn delta(self) -> PositionDelta {
        match self {
            Direction::North => PositionDelta { dx: 0, dy: -1, dz: 0 },
            Direction::East => PositionDelta { dx: 1, dy: 0, dz: 0 },
            Direction::South => PositionDelta { dx: 0, dy: 1, dz: 0 },
            Direction::West => PositionDelta { dx: -1, dy: 0, dz: 0 },
            Direction::Northeast => PositionDelta { dx: 1, dy: -1, dz: 0 },
            Direction::Northwest => PositionDelta { dx: -1, dy: -1, dz: 0 },
            Direction::Southeast => PositionDelta { dx: 1, dy: 1, dz: 0 },
            Direction::Southwest => PositionDelta { dx: -1, dy: 1, dz: 0 },
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(
            self,
            Direction::Northeast
                | Direction::Northwest
                | Direction::Southeast
                | Direction::Southwest
        )
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::Northeast => Direction::Southwest,
            Direction::Northwest => Direction::Southeast,
            Direction::Southeast => Direction::Northwest,
            Direction::Southwest => Direction::Northeast,
        }
    }

    /// Direction of a single-cell step; `None` for (0, 0) or non-unit deltas.
    pub fn from_delta(dx: i32, dy: i32) -> Option<Direction> {
        match (dx, dy) {
            (0, -1) => Some(Direction::North),
            (1, 0) => Some(Direction::East),
            (0, 1) => Some(Direction::South),
            (-1, 0) => Some(Direction::West),
            (1, -1) => Some(Direction::Northeast),
            (-1, -1) => Some(Direction::Northwest),
            (1, 1) => Some(Direction::Southeast),
            (-1, 1) => Some(Direction::Southwest),
            _ => None,
        }
    }

    /// Octant in which `to` lies as seen from `from`, by the signs of the offsets.
    pub fn toward(from: Position, to: Position) -> Option<Direction> {
        let dx = to.offset_x(from).signum();
        let dy = to.offset_y(from).signum();
        Direction::from_delta(dx, dy)
    }
}
