use crate::world::map::Map;
use crate::world::position::Position;
use crate::world::tile::TileFlags;

impl Map {
    /// Missing tiles never block. With `block_floor`, any ground blocks too.
    pub fn is_tile_clear(&self, x: u16, y: u16, z: u8, block_floor: bool) -> bool {
        let Some(tile) = self.tile(Position::new(x, y, z)) else {
            return true;
        };
        if block_floor && tile.ground().is_some() {
            return false;
        }
        !tile.has_flag(TileFlags::BLOCK_PROJECTILE)
    }

    /// Walks the cells strictly between the endpoints along the major axis.
    /// The 0.1 bias keeps exact diagonals from rounding down a cell.
    fn check_line(&self, major0: u16, minor0: u16, major1: u16, minor1: u16, z: u8, steep: bool) -> bool {
        let d_major = f32::from(major1) - f32::from(major0);
        let slope = if d_major == 0.0 {
            1.0
        } else {
            (f32::from(minor1) - f32::from(minor0)) / d_major
        };
        let mut minor = f32::from(minor0) + slope;
        let mut major = major0.saturating_add(1);
        while major < major1 {
            let cell = (minor + 0.1).floor().clamp(0.0, f32::from(u16::MAX)) as u16;
            let clear = if steep {
                self.is_tile_clear(cell, major, z, false)
            } else {
                self.is_tile_clear(major, cell, z, false)
            };
            if !clear {
                return false;
            }
            minor += slope;
            major += 1;
        }
        true
    }

    /// Grid raycast on one floor; endpoints are not tested.
    pub fn check_sight_line(&self, x0: u16, y0: u16, x1: u16, y1: u16, z: u8) -> bool {
        if x0 == x1 && y0 == y1 {
            return true;
        }
        let dx = (i32::from(x1) - i32::from(x0)).abs();
        let dy = (i32::from(y1) - i32::from(y0)).abs();
        if dy > dx {
            if y1 > y0 {
                return self.check_line(y0, x0, y1, x1, z, true);
            }
            return self.check_line(y1, x1, y0, x0, z, true);
        }
        if x0 > x1 {
            return self.check_line(x1, y1, x0, y0, z, false);
        }
        self.check_line(x0, y0, x1, y1, z, false)
    }

    /// Line of sight between two positions.
    ///
    /// With `same_floor` the positions must share a floor. Without it, sight
    /// may pass over an obstacle through the floor above, reach one floor up,
    /// or look down through open tiles, but never across the surface boundary.
    pub fn is_sight_clear(&self, from: Position, to: Position, same_floor: bool) -> bool {
        if from == to {
            return true;
        }
        let diff_x = from.distance_x(to);
        let diff_y = from.distance_y(to);
        let diff_z = from.distance_z(to);

        if diff_z == 0 {
            if diff_x < 2 && diff_y < 2 {
                return true;
            }
            let clear = self.check_sight_line(from.x, from.y, to.x, to.y, from.z);
            if clear || same_floor {
                return clear;
            }
            if from.z == 0 {
                return true;
            }
            let above = from.z - 1;
            return self.is_tile_clear(from.x, from.y, above, true)
                && self.is_tile_clear(to.x, to.y, above, true)
                && self.check_sight_line(from.x, from.y, to.x, to.y, above);
        }

        if same_floor {
            return false;
        }
        if from.is_underground() != to.is_underground() {
            return false;
        }

        if from.z > to.z {
            if diff_z > 1 {
                return false;
            }
            let above = from.z - 1;
            return self.is_tile_clear(from.x, from.y, above, true)
                && self.check_sight_line(from.x, from.y, to.x, to.y, above);
        }

        for z in from.z..to.z {
            if !self.is_tile_clear(to.x, to.y, z, true) {
                return false;
            }
        }
        self.check_sight_line(from.x, from.y, to.x, to.y, from.z)
    }

    /// Per-axis range check plus optional line of sight.
    pub fn can_throw_object_to(
        &self,
        from: Position,
        to: Position,
        check_line_of_sight: bool,
        same_floor: bool,
        range_x: u32,
        range_y: u32,
    ) -> bool {
        if from.distance_x(to) > range_x || from.distance_y(to) > range_y {
            return false;
        }
        !check_line_of_sight || self.is_sight_clear(from, to, same_floor)
    }
}
