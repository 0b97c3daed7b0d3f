use crate::world::position::Position;

pub const WALK_CACHE_RADIUS: u16 = 11;
const WALK_CACHE_SIDE: usize = WALK_CACHE_RADIUS as usize * 2 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkCacheEntry {
    Blocked,
    Walkable,
    /// Outside the cached window or not computed yet; callers must check the tile.
    Unknown,
}

/// Walkability snapshot of the square around a creature, on its own floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkCache {
    center: Position,
    cells: Vec<bool>,
    filled: bool,
}

impl WalkCache {
    pub fn new(center: Position) -> Self {
        Self {
            center,
            cells: vec![false; WALK_CACHE_SIDE * WALK_CACHE_SIDE],
            filled: false,
        }
    }

    pub fn center(&self) -> Position {
        self.center
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// Moves the window; every cell must be refilled before it is trusted again.
    pub fn recenter(&mut self, center: Position) {
        self.center = center;
        self.cells.iter_mut().for_each(|cell| *cell = false);
        self.filled = false;
    }

    pub fn mark_filled(&mut self) {
        self.filled = true;
    }

    fn index(&self, position: Position) -> Option<usize> {
        if position.z != self.center.z {
            return None;
        }
        let dx = position.offset_x(self.center);
        let dy = position.offset_y(self.center);
        let radius = i32::from(WALK_CACHE_RADIUS);
        if dx.abs() > radius || dy.abs() > radius {
            return None;
        }
        Some((dy + radius) as usize * WALK_CACHE_SIDE + (dx + radius) as usize)
    }

    pub fn lookup(&self, position: Position) -> WalkCacheEntry {
        if position.z != self.center.z {
            return WalkCacheEntry::Blocked;
        }
        if position == self.center {
            return WalkCacheEntry::Walkable;
        }
        if !self.filled {
            return WalkCacheEntry::Unknown;
        }
        match self.index(position) {
            Some(index) if self.cells[index] => WalkCacheEntry::Walkable,
            Some(_) => WalkCacheEntry::Blocked,
            None => WalkCacheEntry::Unknown,
        }
    }

    /// Records a cell; returns false when it lies outside the window.
    pub fn set(&mut self, position: Position, walkable: bool) -> bool {
        match self.index(position) {
            Some(index) => {
                self.cells[index] = walkable;
                true
            }
            None => false,
        }
    }

    /// Every position covered by the window, row by row.
    pub fn window(&self) -> impl Iterator<Item = Position> + '_ {
        let radius = i32::from(WALK_CACHE_RADIUS);
        let cx = i32::from(self.center.x);
        let cy = i32::from(self.center.y);
        let z = self.center.z;
        (cy - radius..=cy + radius).flat_map(move |y| {
            (cx - radius..=cx + radius).filter_map(move |x| {
                let x = u16::try_from(x).ok()?;
                let y = u16::try_from(y).ok()?;
                Some(Position::new(x, y, z))
            })
        })
    }
}
