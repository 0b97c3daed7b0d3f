use crate::entities::creature::{Creature, CreatureRegistry};
use crate::world::map::Map;
use crate::world::position::{Direction, Position};
use crate::world::tile::{QueryFlags, Tile, TileFlags};
use crate::world::walk_cache::WalkCacheEntry;
use serde::Deserialize;
use std::collections::HashMap;

/// Neighbour offsets for the start node, orthogonal ones first.
static ALL_NEIGHBORS: [(i32, i32); 8] = [
    (-1, 0),
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, -1),
    (1, -1),
    (1, 1),
    (-1, 1),
];

/// Neighbour offsets once a node has a parent, keyed by the direction from
/// the node back to its parent. Orthogonal entries come first so the
/// no-diagonal search can take a prefix.
static FORWARD_NEIGHBORS: [(Direction, [(i32, i32); 5]); 8] = [
    (Direction::North, [(-1, 0), (0, 1), (1, 0), (1, 1), (-1, 1)]),
    (Direction::East, [(-1, 0), (0, 1), (0, -1), (-1, -1), (-1, 1)]),
    (Direction::South, [(-1, 0), (1, 0), (0, -1), (-1, -1), (1, -1)]),
    (Direction::West, [(0, 1), (1, 0), (0, -1), (1, -1), (1, 1)]),
    (Direction::Southwest, [(1, 0), (0, -1), (-1, -1), (1, -1), (1, 1)]),
    (Direction::Southeast, [(-1, 0), (0, -1), (-1, -1), (1, -1), (-1, 1)]),
    (Direction::Northwest, [(0, 1), (1, 0), (1, -1), (1, 1), (-1, 1)]),
    (Direction::Northeast, [(-1, 0), (0, 1), (-1, -1), (1, 1), (-1, 1)]),
];

/// Tunables of the node-pool search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathfinderConfig {
    pub max_nodes: usize,
    pub normal_walk_cost: u32,
    pub diagonal_walk_cost: u32,
    /// Closed nodes after which an unbounded search gives up.
    pub closed_node_limit: u32,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_nodes: 512,
            normal_walk_cost: 10,
            diagonal_walk_cost: 25,
            closed_node_limit: 100,
        }
    }
}

impl PathfinderConfig {
    /// Cost of a single step, before tile penalties.
    pub fn step_cost(&self, direction: Direction) -> u32 {
        if direction.is_diagonal() {
            self.diagonal_walk_cost
        } else {
            self.normal_walk_cost
        }
    }

    fn creature_penalty(&self) -> u32 {
        self.normal_walk_cost * 3
    }

    fn field_penalty(&self) -> u32 {
        self.normal_walk_cost * 18
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindPathParams {
    /// Accept goal cells anywhere around the target, not just on the side facing the start.
    pub full_path_search: bool,
    pub clear_sight: bool,
    pub allow_diagonal: bool,
    /// Drop neighbours that leave the goal's range window.
    pub keep_distance: bool,
    /// Per-axis bound around the start; 0 is unbounded.
    pub max_search_dist: u32,
    pub min_target_dist: i32,
    pub max_target_dist: i32,
}

impl Default for FindPathParams {
    fn default() -> Self {
        Self {
            full_path_search: true,
            clear_sight: true,
            allow_diagonal: true,
            keep_distance: false,
            max_search_dist: 0,
            min_target_dist: -1,
            max_target_dist: -1,
        }
    }
}

impl FindPathParams {
    pub fn toward(min_target_dist: i32, max_target_dist: i32) -> Self {
        Self {
            min_target_dist,
            max_target_dist,
            ..Self::default()
        }
    }
}

/// Goal predicate of a path search.
pub trait PathCondition {
    /// Cheap window test, also used to prune neighbours under `keep_distance`.
    fn is_in_range(&self, start: Position, test: Position, params: &FindPathParams) -> bool;

    /// Whether `test` is an acceptable goal. `best_match` starts at 0; a
    /// match that leaves it non-zero is kept while the search looks for a
    /// better one.
    fn matches(
        &self,
        map: &Map,
        start: Position,
        test: Position,
        params: &FindPathParams,
        best_match: &mut i32,
    ) -> bool;
}

/// Reach a cell within [min, max] of a fixed target, exactly max if possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenPathingCondition {
    pub target: Position,
}

impl FrozenPathingCondition {
    pub fn new(target: Position) -> Self {
        Self { target }
    }
}

impl PathCondition for FrozenPathingCondition {
    fn is_in_range(&self, start: Position, test: Position, params: &FindPathParams) -> bool {
        let max = params.max_target_dist;
        let tx = i32::from(self.target.x);
        let ty = i32::from(self.target.y);
        let x = i32::from(test.x);
        let y = i32::from(test.y);

        if params.full_path_search {
            return x <= tx + max && x >= tx - max && y <= ty + max && y >= ty - max;
        }

        let dx = start.offset_x(self.target);
        let dy = start.offset_y(self.target);
        let (east, west) = (if dx >= 0 { max } else { 0 }, if dx <= 0 { max } else { 0 });
        let (south, north) = (if dy >= 0 { max } else { 0 }, if dy <= 0 { max } else { 0 });
        x <= tx + east && x >= tx - west && y <= ty + south && y >= ty - north
    }

    fn matches(
        &self,
        map: &Map,
        start: Position,
        test: Position,
        params: &FindPathParams,
        best_match: &mut i32,
    ) -> bool {
        if !self.is_in_range(start, test, params) {
            return false;
        }
        if params.clear_sight && !map.is_sight_clear(test, self.target, true) {
            return false;
        }

        let distance = self.target.distance(test) as i32;
        if params.max_target_dist == 1 {
            return distance >= params.min_target_dist && distance <= params.max_target_dist;
        }
        if distance > params.max_target_dist || distance < params.min_target_dist {
            return false;
        }
        if distance == params.max_target_dist {
            *best_match = 0;
            return true;
        }
        if distance > *best_match {
            *best_match = distance;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Copy)]
struct AStarNode {
    x: u16,
    y: u16,
    parent: Option<usize>,
    f: u32,
}

/// Fixed-capacity node pool with an open flag per node.
#[derive(Debug)]
struct AStarNodes {
    nodes: Vec<AStarNode>,
    open: Vec<bool>,
    index: HashMap<u32, usize>,
    closed: u32,
    capacity: usize,
}

impl AStarNodes {
    fn new(start: Position, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut nodes = Self {
            nodes: Vec::with_capacity(capacity),
            open: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            closed: 0,
            capacity,
        };
        nodes.push(None, start.x, start.y, 0);
        nodes
    }

    fn key(x: u16, y: u16) -> u32 {
        (u32::from(x) << 16) | u32::from(y)
    }

    fn push(&mut self, parent: Option<usize>, x: u16, y: u16, f: u32) -> usize {
        let id = self.nodes.len();
        self.nodes.push(AStarNode { x, y, parent, f });
        self.open.push(true);
        self.index.insert(Self::key(x, y), id);
        id
    }

    /// Next free slot, or `None` once the pool is spent.
    fn create_open_node(&mut self, parent: usize, x: u16, y: u16, f: u32) -> Option<usize> {
        if self.nodes.len() >= self.capacity {
            return None;
        }
        Some(self.push(Some(parent), x, y, f))
    }

    /// Lowest f among open nodes; the earliest node wins ties.
    fn best_node(&self) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (id, node) in self.nodes.iter().enumerate() {
            if !self.open[id] {
                continue;
            }
            if best.map(|(_, f)| node.f < f).unwrap_or(true) {
                best = Some((id, node.f));
            }
        }
        best.map(|(id, _)| id)
    }

    fn close_node(&mut self, id: usize) {
        self.open[id] = false;
        self.closed += 1;
    }

    fn open_node(&mut self, id: usize) {
        if !self.open[id] {
            self.open[id] = true;
            self.closed = self.closed.saturating_sub(1);
        }
    }

    fn node_at(&self, x: u16, y: u16) -> Option<usize> {
        self.index.get(&Self::key(x, y)).copied()
    }

    fn closed_nodes(&self) -> u32 {
        self.closed
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}

fn is_solid(map: &Map, position: Position) -> bool {
    map.tile(position)
        .map(|tile| tile.has_flag(TileFlags::BLOCK_SOLID | TileFlags::IMMOVABLE_BLOCK_SOLID))
        .unwrap_or(true)
}

impl Map {
    /// Tile the creature could step onto during a path search.
    ///
    /// The creature's walk cache answers first; otherwise the tile must exist
    /// and accept the creature under pathfinding rules.
    pub fn can_walk_to<'a>(
        &'a self,
        registry: &CreatureRegistry,
        creature: &Creature,
        position: Position,
    ) -> Option<&'a Tile> {
        let cached = creature
            .walk_cache
            .as_ref()
            .map(|cache| cache.lookup(position))
            .unwrap_or(WalkCacheEntry::Unknown);
        match cached {
            WalkCacheEntry::Blocked => return None,
            WalkCacheEntry::Walkable => return self.tile(position),
            WalkCacheEntry::Unknown => {}
        }

        let tile = self.tile(position)?;
        if position != creature.position {
            let mut flags = QueryFlags::PATHFINDING;
            if !creature.is_player() {
                flags = flags | QueryFlags::IGNORE_FIELD_DAMAGE;
            }
            tile.query_add(creature, flags, registry).ok()?;
        }
        Some(tile)
    }

    /// Extra cost of standing on `tile`: visible creatures and fields the
    /// mover would rather avoid.
    fn tile_walk_cost(
        &self,
        registry: &CreatureRegistry,
        creature: &Creature,
        tile: &Tile,
        config: &PathfinderConfig,
    ) -> u32 {
        let mut cost = 0;
        if tile
            .top_visible_creature(creature, registry)
            .map(|id| id != creature.id)
            .unwrap_or(false)
        {
            cost += config.creature_penalty();
        }
        if let Some(field) = tile.field() {
            if field.is_damaging()
                && !creature.is_immune(field.kind)
                && creature.is_monster()
                && !creature.can_walk_on_field(field.kind)
            {
                cost += config.field_penalty();
            }
        }
        cost
    }

    /// A diagonal step may not squeeze between two solid corner cells.
    fn cuts_corner(&self, from: Position, dx: i32, dy: i32) -> bool {
        if dx == 0 || dy == 0 {
            return false;
        }
        let solid = |corner: Option<Position>| corner.map(|p| is_solid(self, p)).unwrap_or(true);
        solid(from.offset_by(dx, 0)) && solid(from.offset_by(0, dy))
    }

    /// Cheapest-first search from the creature's position to any cell
    /// accepted by `condition`. Directions come back in walking order; an
    /// empty path means the creature already stands on a goal cell.
    pub fn get_path_matching<C: PathCondition>(
        &self,
        registry: &CreatureRegistry,
        creature: &Creature,
        condition: &C,
        params: &FindPathParams,
        config: &PathfinderConfig,
    ) -> Option<Vec<Direction>> {
        let start = creature.position;
        let mut nodes = AStarNodes::new(start, config.max_nodes);
        let mut found: Option<usize> = None;
        let mut best_match = 0;
        let mut exhausted = false;

        while params.max_search_dist != 0 || nodes.closed_nodes() < config.closed_node_limit {
            let Some(current) = nodes.best_node() else {
                break;
            };
            let node = nodes.nodes[current];
            let position = Position::new(node.x, node.y, start.z);

            if condition.matches(self, start, position, params, &mut best_match) {
                found = Some(current);
                if best_match == 0 {
                    break;
                }
            }

            let neighbors: &[(i32, i32)] = match node.parent {
                Some(parent) => {
                    let parent = nodes.nodes[parent];
                    let back = Direction::from_delta(
                        i32::from(parent.x) - i32::from(node.x),
                        i32::from(parent.y) - i32::from(node.y),
                    );
                    let row = FORWARD_NEIGHBORS
                        .iter()
                        .find(|(direction, _)| Some(*direction) == back)
                        .map(|(_, row)| row.as_slice())
                        .unwrap_or(&[]);
                    if params.allow_diagonal {
                        row
                    } else {
                        &row[..row.len().min(3)]
                    }
                }
                None if params.allow_diagonal => &ALL_NEIGHBORS,
                None => &ALL_NEIGHBORS[..4],
            };

            for &(dx, dy) in neighbors {
                let Some(next) = position.offset_by(dx, dy) else {
                    continue;
                };
                if params.max_search_dist != 0
                    && (start.distance_x(next) > params.max_search_dist
                        || start.distance_y(next) > params.max_search_dist)
                {
                    continue;
                }
                if params.keep_distance && !condition.is_in_range(start, next, params) {
                    continue;
                }
                if self.cuts_corner(position, dx, dy) {
                    continue;
                }

                let existing = nodes.node_at(next.x, next.y);
                let tile = match existing {
                    Some(_) => self.tile(next),
                    None => self.can_walk_to(registry, creature, next),
                };
                let Some(tile) = tile else {
                    continue;
                };

                let step = if dx.abs() == dy.abs() {
                    config.diagonal_walk_cost
                } else {
                    config.normal_walk_cost
                };
                let new_f = node.f + step + self.tile_walk_cost(registry, creature, tile, config);

                match existing {
                    Some(id) => {
                        if nodes.nodes[id].f <= new_f {
                            continue;
                        }
                        nodes.nodes[id].f = new_f;
                        nodes.nodes[id].parent = Some(current);
                        nodes.open_node(id);
                    }
                    None => {
                        if nodes.create_open_node(current, next.x, next.y, new_f).is_none() {
                            exhausted = true;
                            break;
                        }
                    }
                }
            }

            if exhausted {
                break;
            }
            nodes.close_node(current);
        }

        if exhausted {
            log::warn!(
                target: "lag",
                "path search for {} from {} spent all {} nodes (match found: {})",
                creature.name,
                start,
                nodes.len(),
                found.is_some()
            );
        }

        let Some(found) = found else {
            log::debug!(
                target: "pathfinding",
                "no path for {} from {} after {} closed nodes",
                creature.name,
                start,
                nodes.closed_nodes()
            );
            return None;
        };

        let mut steps = Vec::new();
        let mut cursor = found;
        while let Some(parent) = nodes.nodes[cursor].parent {
            let child = nodes.nodes[cursor];
            let from = nodes.nodes[parent];
            if let Some(direction) = Direction::from_delta(
                i32::from(child.x) - i32::from(from.x),
                i32::from(child.y) - i32::from(from.y),
            ) {
                steps.push(direction);
            }
            cursor = parent;
        }
        steps.reverse();
        Some(steps)
    }

    /// Path to a cell between `min_target_dist` and `max_target_dist` of `target`.
    pub fn get_path_to(
        &self,
        registry: &CreatureRegistry,
        creature: &Creature,
        target: Position,
        params: &FindPathParams,
        config: &PathfinderConfig,
    ) -> Option<Vec<Direction>> {
        if target.z != creature.position.z {
            return None;
        }
        self.get_path_matching(
            registry,
            creature,
            &FrozenPathingCondition::new(target),
            params,
            config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::creature::CreatureId;
    use crate::entities::item::{FieldKind, Item, ItemTypeId};
    use crate::entities::monster::MonsterType;
    use crate::world::tile::Tile;

    fn open_floor() -> Map {
        let mut map = Map::default();
        for x in 80..=140 {
            for y in 80..=140 {
                map.set_tile(Tile::with_ground(Position::new(x, y, 7), ItemTypeId(102)));
            }
        }
        map
    }

    fn wall(map: &mut Map, x: u16, y: u16) {
        if let Some(tile) = map.tile_mut(Position::new(x, y, 7)) {
            tile.add_item(Item::wall(ItemTypeId(1100)));
        }
    }

    fn spawn(map: &mut Map, registry: &mut CreatureRegistry, creature: Creature) -> CreatureId {
        let position = creature.position;
        let is_player = creature.is_player();
        let id = registry.insert(creature);
        assert!(map.add_creature(id, position, is_player));
        id
    }

    fn walk(from: Position, steps: &[Direction]) -> Position {
        steps
            .iter()
            .fold(from, |position, direction| position.step(*direction).unwrap())
    }

    fn cost(steps: &[Direction], config: &PathfinderConfig) -> u32 {
        steps.iter().map(|direction| config.step_cost(*direction)).sum()
    }

    #[test]
    fn straight_path_cost_is_sum_of_steps() {
        let map = open_floor();
        let mut registry = CreatureRegistry::new();
        let id = registry.insert(Creature::player("Walker", Position::new(100, 100, 7)));
        let walker = registry.get(id).unwrap();
        let config = PathfinderConfig::default();

        let target = Position::new(106, 100, 7);
        let path = map
            .get_path_to(&registry, walker, target, &FindPathParams::toward(0, 0), &config)
            .expect("path");
        assert_eq!(path, vec![Direction::East; 6]);
        assert_eq!(cost(&path, &config), 60);
    }

    #[test]
    fn two_orthogonal_steps_beat_one_diagonal() {
        let map = open_floor();
        let mut registry = CreatureRegistry::new();
        let start = Position::new(100, 100, 7);
        let id = registry.insert(Creature::player("Walker", start));
        let walker = registry.get(id).unwrap();
        let config = PathfinderConfig::default();

        let target = Position::new(101, 101, 7);
        let path = map
            .get_path_to(&registry, walker, target, &FindPathParams::toward(0, 0), &config)
            .expect("path");
        assert_eq!(path.len(), 2);
        assert!(path.iter().all(|direction| !direction.is_diagonal()));
        assert_eq!(walk(start, &path), target);
        assert_eq!(cost(&path, &config), 20);
    }

    #[test]
    fn walls_force_a_detour() {
        let mut map = open_floor();
        for y in 98..=102 {
            wall(&mut map, 103, y);
        }
        let mut registry = CreatureRegistry::new();
        let start = Position::new(100, 100, 7);
        let id = registry.insert(Creature::player("Walker", start));
        let walker = registry.get(id).unwrap();
        let config = PathfinderConfig {
            closed_node_limit: 1000,
            ..PathfinderConfig::default()
        };

        let target = Position::new(106, 100, 7);
        let path = map
            .get_path_to(&registry, walker, target, &FindPathParams::toward(0, 0), &config)
            .expect("path");
        assert_eq!(walk(start, &path), target);
        let mut position = start;
        for direction in &path {
            position = position.step(*direction).unwrap();
            assert!(map.tile(position).map(|t| !t.has_flag(TileFlags::BLOCK_SOLID)).unwrap());
        }
        assert!(cost(&path, &config) > 60);
    }

    #[test]
    fn keep_distance_search_backs_away_on_the_far_side() {
        let map = open_floor();
        let mut registry = CreatureRegistry::new();
        let start = Position::new(100, 100, 7);
        let id = registry.insert(Creature::monster("Deer", start, MonsterType::default()));
        let deer = registry.get(id).unwrap();
        let threat = Position::new(98, 100, 7);
        let params = FindPathParams {
            full_path_search: false,
            clear_sight: false,
            keep_distance: true,
            ..FindPathParams::toward(1, 5)
        };

        let path = map
            .get_path_to(&registry, deer, threat, &params, &PathfinderConfig::default())
            .expect("path");
        let end = walk(start, &path);
        assert_eq!(end.distance(threat), 5);
        assert!(end.x > start.x);
        let mut position = start;
        for direction in &path {
            position = position.step(*direction).unwrap();
            assert!(position.x >= threat.x, "left the window at {}", position);
        }
    }

    #[test]
    fn enclosed_goal_fails_after_closed_node_limit() {
        let mut map = open_floor();
        for x in 109..=111 {
            for y in 109..=111 {
                if (x, y) != (110, 110) {
                    wall(&mut map, x, y);
                }
            }
        }
        let mut registry = CreatureRegistry::new();
        let id = registry.insert(Creature::player("Walker", Position::new(100, 100, 7)));
        let walker = registry.get(id).unwrap();

        let path = map.get_path_to(
            &registry,
            walker,
            Position::new(110, 110, 7),
            &FindPathParams::toward(0, 0),
            &PathfinderConfig::default(),
        );
        assert!(path.is_none());
    }

    #[test]
    fn enclosed_start_fails_when_open_set_empties() {
        let mut map = open_floor();
        for x in 99..=101 {
            for y in 99..=101 {
                if (x, y) != (100, 100) {
                    wall(&mut map, x, y);
                }
            }
        }
        let mut registry = CreatureRegistry::new();
        let id = registry.insert(Creature::player("Walker", Position::new(100, 100, 7)));
        let walker = registry.get(id).unwrap();
        let params = FindPathParams {
            max_search_dist: 10,
            ..FindPathParams::toward(0, 0)
        };

        let path = map.get_path_to(
            &registry,
            walker,
            Position::new(105, 100, 7),
            &params,
            &PathfinderConfig::default(),
        );
        assert!(path.is_none());
    }

    #[test]
    fn small_pool_is_exhausted_before_far_goal() {
        let map = open_floor();
        let mut registry = CreatureRegistry::new();
        let id = registry.insert(Creature::player("Walker", Position::new(100, 100, 7)));
        let walker = registry.get(id).unwrap();
        let config = PathfinderConfig {
            max_nodes: 16,
            ..PathfinderConfig::default()
        };

        let path = map.get_path_to(
            &registry,
            walker,
            Position::new(130, 100, 7),
            &FindPathParams::toward(0, 0),
            &config,
        );
        assert!(path.is_none());
    }

    #[test]
    fn diagonal_between_two_solid_corners_is_rejected() {
        let mut map = open_floor();
        wall(&mut map, 101, 100);
        wall(&mut map, 100, 101);
        let mut registry = CreatureRegistry::new();
        let start = Position::new(100, 100, 7);
        let id = registry.insert(Creature::player("Walker", start));
        let walker = registry.get(id).unwrap();

        let target = Position::new(101, 101, 7);
        let path = map
            .get_path_to(
                &registry,
                walker,
                target,
                &FindPathParams::toward(0, 0),
                &PathfinderConfig::default(),
            )
            .expect("path around");
        assert!(path.len() > 1);
        assert_eq!(walk(start, &path), target);
    }

    #[test]
    fn one_solid_corner_and_a_creature_do_not_block_a_diagonal() {
        let mut map = open_floor();
        wall(&mut map, 101, 100);
        let mut registry = CreatureRegistry::new();
        spawn(&mut map, &mut registry, Creature::player("Blocker", Position::new(100, 101, 7)));
        let start = Position::new(100, 100, 7);
        let id = registry.insert(Creature::player("Walker", start));
        let walker = registry.get(id).unwrap();

        let path = map
            .get_path_to(
                &registry,
                walker,
                Position::new(101, 101, 7),
                &FindPathParams::toward(0, 0),
                &PathfinderConfig::default(),
            )
            .expect("path");
        assert_eq!(path, vec![Direction::Southeast]);
    }

    #[test]
    fn no_diagonal_search_only_uses_orthogonal_steps() {
        let map = open_floor();
        let mut registry = CreatureRegistry::new();
        let start = Position::new(100, 100, 7);
        let id = registry.insert(Creature::player("Walker", start));
        let walker = registry.get(id).unwrap();
        let params = FindPathParams {
            allow_diagonal: false,
            ..FindPathParams::toward(0, 0)
        };

        let target = Position::new(103, 97, 7);
        let path = map
            .get_path_to(&registry, walker, target, &params, &PathfinderConfig::default())
            .expect("path");
        assert_eq!(path.len(), 6);
        assert!(path.iter().all(|direction| !direction.is_diagonal()));
        assert_eq!(walk(start, &path), target);
    }

    #[test]
    fn melee_goal_stops_next_to_target() {
        let map = open_floor();
        let mut registry = CreatureRegistry::new();
        let start = Position::new(100, 100, 7);
        let id = registry.insert(Creature::player("Walker", start));
        let walker = registry.get(id).unwrap();

        let target = Position::new(105, 100, 7);
        let path = map
            .get_path_to(
                &registry,
                walker,
                target,
                &FindPathParams::toward(1, 1),
                &PathfinderConfig::default(),
            )
            .expect("path");
        assert_eq!(walk(start, &path).distance(target), 1);
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn already_at_goal_yields_empty_path() {
        let map = open_floor();
        let mut registry = CreatureRegistry::new();
        let start = Position::new(100, 100, 7);
        let id = registry.insert(Creature::player("Walker", start));
        let walker = registry.get(id).unwrap();

        let path = map.get_path_to(
            &registry,
            walker,
            Position::new(101, 100, 7),
            &FindPathParams::toward(1, 1),
            &PathfinderConfig::default(),
        );
        assert_eq!(path, Some(Vec::new()));
    }

    #[test]
    fn distance_goal_prefers_exact_max_distance() {
        let map = open_floor();
        let mut registry = CreatureRegistry::new();
        let start = Position::new(100, 100, 7);
        let id = registry.insert(Creature::player("Archer", start));
        let archer = registry.get(id).unwrap();

        let target = Position::new(102, 100, 7);
        let path = map
            .get_path_to(
                &registry,
                archer,
                target,
                &FindPathParams::toward(1, 4),
                &PathfinderConfig::default(),
            )
            .expect("path");
        assert_eq!(walk(start, &path).distance(target), 4);
    }

    #[test]
    fn walk_cache_overrides_tile_lookup() {
        let mut map = open_floor();
        let mut registry = CreatureRegistry::new();
        let start = Position::new(100, 100, 7);
        let id = spawn(
            &mut map,
            &mut registry,
            Creature::monster("Rat", start, MonsterType::default()),
        );
        {
            let rat = registry.get_mut(id).unwrap();
            let cache = rat.walk_cache.as_mut().unwrap();
            let cells: Vec<Position> = cache.window().collect();
            for cell in cells {
                cache.set(cell, cell != Position::new(101, 100, 7));
            }
            cache.mark_filled();
        }
        let rat = registry.get(id).unwrap();
        assert!(map.can_walk_to(&registry, rat, Position::new(101, 100, 7)).is_none());
        assert!(map.can_walk_to(&registry, rat, Position::new(100, 101, 7)).is_some());

        let params = FindPathParams {
            allow_diagonal: false,
            ..FindPathParams::toward(0, 0)
        };
        let path = map
            .get_path_to(&registry, rat, Position::new(102, 100, 7), &params, &PathfinderConfig::default())
            .expect("path");
        assert_eq!(path.len(), 4);
        assert_ne!(path[0], Direction::East);
    }

    #[test]
    fn blocking_creature_makes_tile_unwalkable_for_monsters() {
        let mut map = open_floor();
        let mut registry = CreatureRegistry::new();
        spawn(&mut map, &mut registry, Creature::player("Knight", Position::new(101, 100, 7)));
        let id = spawn(
            &mut map,
            &mut registry,
            Creature::monster("Rat", Position::new(100, 100, 7), MonsterType::default()),
        );
        let rat = registry.get(id).unwrap();
        assert!(map.can_walk_to(&registry, rat, Position::new(101, 100, 7)).is_none());
        assert!(map.can_walk_to(&registry, rat, Position::new(99, 100, 7)).is_some());
        assert!(map.can_walk_to(&registry, rat, Position::new(100, 100, 7)).is_some());
    }

    #[test]
    fn damaging_fields_are_detoured_by_monsters() {
        let mut map = open_floor();
        let mut registry = CreatureRegistry::new();
        let race = MonsterType {
            walks_on: vec![FieldKind::Fire],
            ..MonsterType::default()
        };
        let start = Position::new(100, 100, 7);
        let id = spawn(&mut map, &mut registry, Creature::monster("Demon", start, race));
        for y in 97..=103 {
            if let Some(tile) = map.tile_mut(Position::new(102, y, 7)) {
                tile.add_item(Item::field(ItemTypeId(1492), FieldKind::Energy, 30));
            }
        }
        let monster = registry.get(id).unwrap();
        let path = map
            .get_path_to(
                &registry,
                monster,
                Position::new(104, 100, 7),
                &FindPathParams::toward(0, 0),
                &PathfinderConfig {
                    closed_node_limit: 1000,
                    ..PathfinderConfig::default()
                },
            )
            .expect("path");
        // energy fields block this monster outright under pathfinding rules
        let mut position = start;
        for direction in &path {
            position = position.step(*direction).unwrap();
            assert!(map.tile(position).and_then(|t| t.field()).is_none());
        }
    }

    #[test]
    fn side_facing_range_excludes_the_far_side() {
        let condition = FrozenPathingCondition::new(Position::new(110, 100, 7));
        let params = FindPathParams {
            full_path_search: false,
            ..FindPathParams::toward(1, 3)
        };
        let start = Position::new(100, 100, 7);
        assert!(condition.is_in_range(start, Position::new(107, 100, 7), &params));
        assert!(!condition.is_in_range(start, Position::new(112, 100, 7), &params));
        let full = FindPathParams::toward(1, 3);
        assert!(condition.is_in_range(start, Position::new(112, 100, 7), &full));
    }
}
