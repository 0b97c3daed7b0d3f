use crate::entities::creature::{Creature, CreatureRegistry};
use crate::entities::monster::MonsterType;
use crate::world::map::Map;
use crate::world::pathfinding::FindPathParams;
use crate::world::position::{Direction, Position};
use crate::world::tile::QueryFlags;
use crate::world::walk_cache::WalkCacheEntry;
use rand::seq::SliceRandom;
use rand::Rng;

/// Result of a table-driven chase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    /// Already at the preferred distance.
    Hold,
    Step(Direction),
    /// The tables cannot help; a path search decides.
    Defer,
}

/// Flee candidates by the octant the threat lies in, best first.
fn flee_list(threat: Direction) -> [Direction; 5] {
    use Direction::*;
    match threat {
        North => [South, West, East, Southwest, Southeast],
        East => [West, North, South, Northwest, Southwest],
        South => [North, West, East, Northwest, Northeast],
        West => [East, North, South, Northeast, Southeast],
        Southwest => [North, East, Northeast, Northwest, Southeast],
        Southeast => [North, West, Northwest, Southwest, Northeast],
        Northwest => [South, East, Southeast, Southwest, Northeast],
        Northeast => [South, West, Southwest, Northwest, Southeast],
    }
}

fn chase_list(target: Direction) -> [Direction; 3] {
    use Direction::*;
    match target {
        North => [North, West, East],
        East => [East, North, South],
        South => [South, West, East],
        West => [West, North, South],
        Southwest => [South, West, Southwest],
        Southeast => [South, East, Southeast],
        Northwest => [North, West, Northwest],
        Northeast => [North, East, Northeast],
    }
}

/// Last-resort flee moves, tried in a random rotation.
fn escape_list(threat: Direction) -> [Direction; 3] {
    use Direction::*;
    match threat {
        North => [North, Northwest, Northeast],
        East => [East, Northeast, Southeast],
        South => [South, Southwest, Southeast],
        West => [West, Northwest, Southwest],
        Southwest => [Southwest, West, South],
        Southeast => [Southeast, East, South],
        Northwest => [Northwest, West, North],
        Northeast => [Northeast, East, North],
    }
}

/// Orders a tier pair; `first` leads two times in three.
fn coin_order<R: Rng>(rng: &mut R, first: Direction, second: Direction) -> [Direction; 2] {
    if rng.gen_ratio(1, 3) {
        [second, first]
    } else {
        [first, second]
    }
}

/// Step decisions for one monster against a read-only world.
pub struct MonsterMover<'a> {
    map: &'a Map,
    registry: &'a CreatureRegistry,
    monster: &'a Creature,
    race: MonsterType,
}

impl<'a> MonsterMover<'a> {
    pub fn new(map: &'a Map, registry: &'a CreatureRegistry, monster: &'a Creature) -> Self {
        let race = monster
            .brain
            .as_ref()
            .map(|brain| brain.race.clone())
            .unwrap_or_default();
        Self {
            map,
            registry,
            monster,
            race,
        }
    }

    pub fn position(&self) -> Position {
        self.monster.position
    }

    /// Whether one step from `from` lands on a cell the monster may enter on its own.
    pub fn can_walk_to(&self, from: Position, direction: Direction) -> bool {
        let Some(next) = from.step(direction) else {
            return false;
        };
        if !self.monster.in_spawn_range(next) {
            return false;
        }
        let cached = self
            .monster
            .walk_cache
            .as_ref()
            .map(|cache| cache.lookup(next))
            .unwrap_or(WalkCacheEntry::Unknown);
        if cached == WalkCacheEntry::Blocked {
            return false;
        }
        let Some(tile) = self.map.tile(next) else {
            return false;
        };
        let occupied = tile
            .top_visible_creature(self.monster, self.registry)
            .map(|id| id != self.monster.id)
            .unwrap_or(false);
        !occupied
            && tile
                .query_add(self.monster, QueryFlags::PATHFINDING, self.registry)
                .is_ok()
    }

    pub fn random_step<R: Rng>(&self, rng: &mut R) -> Option<Direction> {
        let here = self.position();
        let mut directions = Direction::ALL;
        directions.shuffle(rng);
        directions
            .into_iter()
            .find(|direction| self.can_walk_to(here, *direction))
    }

    fn first_walkable(&self, candidates: &[Direction]) -> Option<Direction> {
        let here = self.position();
        candidates
            .iter()
            .copied()
            .find(|direction| self.can_walk_to(here, *direction))
    }

    /// Step away from `target`, degrading to a random step.
    pub fn flee_from_target<R: Rng>(&self, target: Position, rng: &mut R) -> Option<Direction> {
        self.flee_table_step(target, rng)
            .or_else(|| self.escape_step(target, rng))
            .or_else(|| self.random_step(rng))
    }

    /// First walkable entry of the flee table for the octant `target` lies in.
    pub fn flee_table_step<R: Rng>(&self, target: Position, rng: &mut R) -> Option<Direction> {
        let threat = Direction::toward(self.position(), target)?;
        let list = flee_list(threat);
        let mut order = Vec::with_capacity(5);
        if threat.is_diagonal() {
            order.extend(coin_order(rng, list[0], list[1]));
            order.push(list[2]);
        } else {
            order.push(list[0]);
            order.extend(coin_order(rng, list[1], list[2]));
        }
        order.extend(coin_order(rng, list[3], list[4]));
        self.first_walkable(&order)
    }

    /// Cornered move along the escape list, starting at a random rotation.
    pub fn escape_step<R: Rng>(&self, target: Position, rng: &mut R) -> Option<Direction> {
        let threat = Direction::toward(self.position(), target)?;
        let escape = escape_list(threat);
        let rotation = rng.gen_range(0..escape.len());
        let rotated: Vec<Direction> = (0..escape.len())
            .map(|i| escape[(rotation + i) % escape.len()])
            .collect();
        self.first_walkable(&rotated)
    }

    /// Close in on `target` using the chase tables while it is near and visible.
    pub fn follow_target_from_distance<R: Rng>(
        &self,
        target: Position,
        rng: &mut R,
    ) -> FollowOutcome {
        let here = self.position();
        let distance = here.distance(target);
        if target.z != here.z
            || distance > self.race.chase_range
            || !self.map.is_sight_clear(here, target, true)
        {
            return FollowOutcome::Defer;
        }
        if distance <= self.race.target_distance {
            return FollowOutcome::Hold;
        }
        let Some(toward) = Direction::toward(here, target) else {
            return FollowOutcome::Hold;
        };

        let list = chase_list(toward);
        let mut order = Vec::with_capacity(3);
        if toward.is_diagonal() {
            order.extend(coin_order(rng, list[0], list[1]));
            order.push(list[2]);
        } else {
            order.push(list[0]);
            order.extend(coin_order(rng, list[1], list[2]));
        }
        match self.first_walkable(&order) {
            Some(direction) => FollowOutcome::Step(direction),
            None => FollowOutcome::Defer,
        }
    }

    /// Within attack range with a clear line to the target.
    pub fn can_use_attack(&self, from: Position, target: Position) -> bool {
        from.z == target.z
            && from.distance(target) <= self.race.attack_range
            && self.map.is_sight_clear(from, target, true)
    }

    /// Sidestep around `target` without changing the distance to it.
    pub fn dance_step<R: Rng>(
        &self,
        target: Position,
        keep_attack: bool,
        keep_distance: bool,
        rng: &mut R,
    ) -> Option<Direction> {
        let here = self.position();
        let attack_now = self.can_use_attack(here, target);
        let offset_x = here.offset_x(target);
        let offset_y = here.offset_y(target);
        let distance = here.distance(target);

        let allowed = |direction: Direction| match direction {
            Direction::North => offset_y >= 0,
            Direction::South => offset_y <= 0,
            Direction::East => offset_x <= 0,
            Direction::West => offset_x >= 0,
            _ => false,
        };

        let candidates: Vec<Direction> = Direction::ORTHOGONAL
            .into_iter()
            .filter(|direction| !keep_distance || allowed(*direction))
            .filter(|direction| {
                here.step(*direction)
                    .map(|next| next.distance(target) == distance)
                    .unwrap_or(false)
            })
            .filter(|direction| self.can_walk_to(here, *direction))
            .filter(|direction| {
                !keep_attack
                    || !attack_now
                    || here
                        .step(*direction)
                        .map(|next| self.can_use_attack(next, target))
                        .unwrap_or(false)
            })
            .collect();
        candidates.choose(rng).copied()
    }

    /// Path-search parameters toward `target` for this monster.
    pub fn path_search_params(&self, target: &Creature, max_viewport_x: u16) -> FindPathParams {
        let mut params = FindPathParams::toward(1, self.race.target_distance as i32);
        if self.monster.master == Some(target.id) {
            params.max_target_dist = 2;
            params.full_path_search = true;
        } else if self.monster.is_fleeing() {
            params.max_target_dist = i32::from(max_viewport_x);
            params.clear_sight = false;
            params.keep_distance = true;
            params.full_path_search = false;
        } else if self.race.target_distance <= 1 {
            params.full_path_search = true;
        } else {
            params.full_path_search = !self.can_use_attack(self.position(), target.position);
        }
        params
    }
}
