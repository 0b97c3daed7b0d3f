use crate::entities::creature::CreatureId;
use crate::world::position::{Direction, Position, PositionDelta};
use crate::world::spectators::SpectatorQuery;
use crate::world::state::WorldState;
use crate::world::tile::{Tile, TileFlags};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::BTreeSet;

/// Shape of a spell or rune area, relative to its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "shape")]
pub enum AreaShape {
    /// Euclidean disc around the origin.
    Circle { radius: u8 },
    Square { radius: u8 },
    /// Cells in front of the origin, origin excluded.
    Line { direction: Direction, length: u8 },
    /// Cells within `range` whose bearing differs from `direction` by at most `angle` degrees.
    Cone { direction: Direction, range: u8, angle: u16 },
}

impl AreaShape {
    pub fn positions(&self, origin: Position) -> Vec<Position> {
        match *self {
            AreaShape::Circle { radius } => offset_positions(origin, circle_offsets(radius)),
            AreaShape::Square { radius } => offset_positions(origin, square_offsets(radius)),
            AreaShape::Line { direction, length } => line_positions(origin, direction, length),
            AreaShape::Cone {
                direction,
                range,
                angle,
            } => cone_positions(origin, direction, range, angle),
        }
    }
}

pub fn circle_offsets(radius: u8) -> Vec<(i16, i16)> {
    if radius == 0 {
        return vec![(0, 0)];
    }
    let radius = i16::from(radius);
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

fn square_offsets(radius: u8) -> Vec<(i16, i16)> {
    let radius = i16::from(radius);
    (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
        .collect()
}

fn offset_positions(origin: Position, offsets: Vec<(i16, i16)>) -> Vec<Position> {
    offsets
        .into_iter()
        .filter_map(|(dx, dy)| origin.offset(PositionDelta { dx, dy, dz: 0 }))
        .collect()
}

pub fn line_positions(origin: Position, direction: Direction, length: u8) -> Vec<Position> {
    let mut positions = Vec::with_capacity(usize::from(length));
    let mut current = origin;
    for _ in 0..length {
        let Some(next) = current.step(direction) else {
            break;
        };
        positions.push(next);
        current = next;
    }
    positions
}

pub fn cone_positions(origin: Position, direction: Direction, range: u8, angle: u16) -> Vec<Position> {
    if range == 0 {
        return Vec::new();
    }
    let base = direction.delta();
    let base_angle = f32::from(base.dy).atan2(f32::from(base.dx)).to_degrees();
    let max_angle = f32::from(angle);
    let range = i16::from(range);
    let mut positions = Vec::new();

    for dy in -range..=range {
        for dx in -range..=range {
            if dx == 0 && dy == 0 {
                continue;
            }
            let bearing = f32::from(dy).atan2(f32::from(dx)).to_degrees();
            if angle_delta(base_angle, bearing).abs() > max_angle {
                continue;
            }
            if let Some(position) = origin.offset(PositionDelta { dx, dy, dz: 0 }) {
                positions.push(position);
            }
        }
    }
    positions
}

fn angle_delta(a: f32, b: f32) -> f32 {
    let mut delta = b - a;
    while delta > 180.0 {
        delta -= 360.0;
    }
    while delta < -180.0 {
        delta += 360.0;
    }
    delta
}

/// Farthest reach below and above zero among `offsets`.
fn reach(offsets: impl Iterator<Item = i32>) -> (u16, u16) {
    offsets.fold((0, 0), |(low, high), offset| {
        let magnitude = offset.unsigned_abs().min(u32::from(u16::MAX)) as u16;
        if offset < 0 {
            (low.max(magnitude), high)
        } else {
            (low, high.max(magnitude))
        }
    })
}

/// Cells an area actually reaches and the creatures standing on them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AreaHit {
    pub positions: Vec<Position>,
    pub creatures: Vec<CreatureId>,
}

impl WorldState {
    /// Resolves `shape` at `origin` against the map.
    ///
    /// Cells need a same-floor line of sight from the caster (or from the
    /// origin when there is none). Missing tiles count as solid, so they
    /// are dropped together with blocking, floor-change and teleport cells.
    /// Aggressive areas also skip protection zones.
    pub fn resolve_area(
        &mut self,
        caster: Option<CreatureId>,
        origin: Position,
        shape: AreaShape,
        aggressive: bool,
    ) -> AreaHit {
        let eye = caster
            .and_then(|id| self.creatures.position(id))
            .unwrap_or(origin);

        let mut positions = Vec::new();
        for position in shape.positions(origin) {
            let tile = self
                .map
                .tile(position)
                .map(Cow::Borrowed)
                .unwrap_or_else(|| Cow::Owned(Tile::blocking_placeholder(position)));
            if tile.has_flag(TileFlags::BLOCK_SOLID | TileFlags::FLOORCHANGE | TileFlags::TELEPORT) {
                continue;
            }
            if aggressive && tile.is_protection_zone() {
                continue;
            }
            if eye.z != position.z || !self.map.is_sight_clear(eye, position, true) {
                continue;
            }
            positions.push(position);
        }
        if positions.is_empty() {
            return AreaHit::default();
        }

        let (min_x, max_x) = reach(positions.iter().map(|p| p.offset_x(origin)));
        let (min_y, max_y) = reach(positions.iter().map(|p| p.offset_y(origin)));
        let query = SpectatorQuery::new(origin).ranges(
            min_x.max(1),
            max_x.max(1),
            min_y.max(1),
            max_y.max(1),
        );
        let spectators = self.spectators(&query);

        let cells: BTreeSet<Position> = positions.iter().copied().collect();
        let creatures = spectators
            .iter()
            .copied()
            .filter(|id| {
                self.creatures
                    .position(*id)
                    .map(|position| cells.contains(&position))
                    .unwrap_or(false)
            })
            .collect();
        log::debug!(
            target: "spectators",
            "area {:?} at {}: {} cells reachable",
            shape,
            origin,
            cells.len()
        );
        AreaHit {
            positions,
            creatures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::entities::creature::Creature;
    use crate::entities::item::{Item, ItemTypeId};
    use crate::entities::monster::MonsterType;

    fn world() -> WorldState {
        let mut world = WorldState::new(WorldConfig {
            seed: Some(5),
            ..WorldConfig::default()
        });
        for x in 90..=110 {
            for y in 90..=110 {
                world.set_tile(Tile::with_ground(Position::new(x, y, 7), ItemTypeId(102)));
            }
        }
        world
    }

    #[test]
    fn circle_radius_one_is_a_plus() {
        let mut offsets = circle_offsets(1);
        offsets.sort();
        assert_eq!(offsets, vec![(-1, 0), (0, -1), (0, 0), (0, 1), (1, 0)]);
        assert_eq!(circle_offsets(0), vec![(0, 0)]);
    }

    #[test]
    fn line_stops_at_map_edge() {
        let line = line_positions(Position::new(1, 5, 7), Direction::West, 4);
        assert_eq!(line, vec![Position::new(0, 5, 7)]);
    }

    #[test]
    fn cone_faces_its_direction() {
        let origin = Position::new(50, 50, 7);
        let cone = cone_positions(origin, Direction::North, 2, 60);
        assert!(cone.contains(&Position::new(50, 48, 7)));
        assert!(cone.contains(&Position::new(49, 49, 7)));
        assert!(!cone.contains(&Position::new(48, 49, 7)));
        assert!(!cone.contains(&Position::new(50, 51, 7)));
        assert!(!cone.contains(&Position::new(52, 50, 7)));
    }

    #[test]
    fn area_skips_walls_shadows_and_missing_tiles() {
        let mut world = world();
        let origin = Position::new(100, 100, 7);
        world.add_item(Position::new(102, 100, 7), Item::wall(ItemTypeId(1100)));
        let hit = world.resolve_area(None, origin, AreaShape::Line { direction: Direction::East, length: 4 }, true);
        assert_eq!(hit.positions, vec![Position::new(101, 100, 7)]);

        let edge = Position::new(110, 100, 7);
        let hit = world.resolve_area(None, edge, AreaShape::Square { radius: 1 }, true);
        assert_eq!(hit.positions.len(), 6);
        assert!(hit.positions.iter().all(|p| p.x <= 110));
    }

    #[test]
    fn aggressive_areas_spare_protection_zones() {
        let mut world = world();
        let origin = Position::new(100, 100, 7);
        if let Some(tile) = world.map.tile_mut(Position::new(101, 100, 7)) {
            tile.set_zone(TileFlags::PROTECTION_ZONE);
        }
        let shape = AreaShape::Circle { radius: 1 };
        assert_eq!(world.resolve_area(None, origin, shape, true).positions.len(), 4);
        assert_eq!(world.resolve_area(None, origin, shape, false).positions.len(), 5);
    }

    #[test]
    fn area_collects_creatures_inside_only() {
        let mut world = world();
        let caster = world
            .spawn_creature(Creature::player("Sorcerer", Position::new(100, 100, 7)))
            .unwrap();
        let inside = world
            .spawn_creature(Creature::monster("Rat", Position::new(102, 101, 7), MonsterType::default()))
            .unwrap();
        let outside = world
            .spawn_creature(Creature::monster("Rat", Position::new(104, 100, 7), MonsterType::default()))
            .unwrap();

        let shape = AreaShape::Circle { radius: 2 };
        let hit = world.resolve_area(Some(caster), Position::new(101, 100, 7), shape, true);
        assert!(hit.creatures.contains(&caster));
        assert!(hit.creatures.contains(&inside));
        assert!(!hit.creatures.contains(&outside));
    }

    #[test]
    fn shapes_parse_from_yaml() {
        let shape: AreaShape =
            serde_yaml::from_str("shape: cone\ndirection: south\nrange: 3\nangle: 45\n").unwrap();
        assert_eq!(
            shape,
            AreaShape::Cone {
                direction: Direction::South,
                range: 3,
                angle: 45
            }
        );
    }
}
