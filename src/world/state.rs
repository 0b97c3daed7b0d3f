use crate::config::WorldConfig;
use crate::entities::creature::{Creature, CreatureId, CreatureRegistry};
use crate::entities::item::{Item, ItemTypeId};
use crate::world::map::Map;
use crate::world::movement::{FollowOutcome, MonsterMover};
use crate::world::pathfinding::FindPathParams;
use crate::world::position::{Direction, Position};
use crate::world::spectators::{SpectatorQuery, SpectatorVec};
use crate::world::tile::{PlacementError, QueryFlags, Tile};
use crate::world::time::{step_duration, GameClock, GameTick};
use crate::world::viewport::Viewport;
use crate::world::walk_cache::WALK_CACHE_RADIUS;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::time::{Duration, Instant};

/// Ground speed used for step pacing; tiles carry no speed of their own.
pub const DEFAULT_GROUND_SPEED: u16 = 150;

const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

const EXTENDED_OFFSETS: [(i32, i32); 4] = [(0, -2), (-2, 0), (2, 0), (0, 2)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    UnknownCreature,
    /// The step leaves the coordinate space or lands where no tile exists.
    NoTile,
    Blocked(PlacementError),
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveError::UnknownCreature => write!(f, "unknown creature"),
            MoveError::NoTile => write!(f, "no tile at destination"),
            MoveError::Blocked(reason) => write!(f, "destination blocked: {}", reason),
        }
    }
}

impl std::error::Error for MoveError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatureStep {
    pub id: CreatureId,
    pub from: Position,
    pub to: Position,
    pub direction: Direction,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub tick: GameTick,
    pub moves: Vec<CreatureStep>,
    /// Monsters that had a player in view and decided on a move.
    pub thinking: usize,
    /// Monsters skipped because no player could see them.
    pub idle: usize,
    /// Monsters content with their position this tick.
    pub holding: usize,
    /// Monsters that wanted to move but had no legal step.
    pub stuck: usize,
    pub teleports: usize,
    pub path_searches: usize,
    pub path_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathUpdate {
    Keep,
    /// The step was taken from the committed path.
    Advance,
    Replace(Position, Vec<Direction>),
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    Step(Direction, PathUpdate),
    Hold(PathUpdate),
    /// Idle and waiting out the random-step interval.
    Wait,
    Stuck,
}

enum PathChoice {
    Step(Direction, PathUpdate),
    Arrived,
    Failed,
}

pub struct WorldState {
    pub map: Map,
    pub creatures: CreatureRegistry,
    pub config: WorldConfig,
    pub clock: GameClock,
    rng: StdRng,
}

impl WorldState {
    pub fn new(config: WorldConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            map: Map::new(config.viewport, config.chunk_cache_capacity),
            creatures: CreatureRegistry::new(),
            clock: GameClock::new(Duration::from_millis(config.tick_ms)),
            config,
            rng,
        }
    }

    pub fn set_tile(&mut self, tile: Tile) -> bool {
        let position = tile.position();
        if !self.map.set_tile(tile) {
            return false;
        }
        self.refresh_walk_cells(position);
        true
    }

    /// Places a new creature at `center` or a free cell around it.
    ///
    /// `extended` also tries cells two steps away (in sight of the center)
    /// before the direct neighbours; `force` skips the check on the center.
    pub fn place_creature(
        &mut self,
        mut creature: Creature,
        center: Position,
        extended: bool,
        force: bool,
    ) -> Option<CreatureId> {
        let position = find_placement(
            &self.map,
            &self.creatures,
            &mut self.rng,
            &creature,
            center,
            extended,
            force,
        )?;
        creature.position = position;
        if let Some(cache) = creature.walk_cache.as_mut() {
            cache.recenter(position);
        }
        let is_player = creature.is_player();
        let name = creature.name.clone();
        let id = self.creatures.insert(creature);
        if !self.map.add_creature(id, position, is_player) {
            self.creatures.remove(id);
            return None;
        }
        self.refresh_walk_cache(id);
        self.refresh_walk_cells(position);
        log::debug!(target: "map", "placed {} ({:?}) at {}", name, id, position);
        Some(id)
    }

    pub fn spawn_creature(&mut self, creature: Creature) -> Option<CreatureId> {
        let center = creature.position;
        self.place_creature(creature, center, false, false)
    }

    /// One step in `direction` under normal placement rules.
    pub fn move_creature(&mut self, id: CreatureId, direction: Direction) -> Result<Position, MoveError> {
        let creature = self.creatures.get(id).ok_or(MoveError::UnknownCreature)?;
        let from = creature.position;
        let to = from.step(direction).ok_or(MoveError::NoTile)?;
        let tile = self.map.tile(to).ok_or(MoveError::NoTile)?;
        tile.query_add(creature, QueryFlags::NONE, &self.creatures)
            .map_err(MoveError::Blocked)?;
        self.relocate(id, to, Some(direction))?;
        Ok(to)
    }

    /// Moves a creature to any existing tile, ignoring what blocks it.
    pub fn teleport(&mut self, id: CreatureId, to: Position) -> Result<Position, MoveError> {
        if self.creatures.get(id).is_none() {
            return Err(MoveError::UnknownCreature);
        }
        if self.map.tile(to).is_none() {
            return Err(MoveError::NoTile);
        }
        self.relocate(id, to, None)?;
        Ok(to)
    }

    fn relocate(&mut self, id: CreatureId, to: Position, direction: Option<Direction>) -> Result<(), MoveError> {
        let creature = self.creatures.get(id).ok_or(MoveError::UnknownCreature)?;
        let from = creature.position;
        let is_player = creature.is_player();
        if from == to {
            return Ok(());
        }
        if !self.map.move_creature(id, from, to, is_player) {
            return Err(MoveError::NoTile);
        }
        if let Some(creature) = self.creatures.get_mut(id) {
            creature.position = to;
            match direction {
                Some(direction) => creature.direction = direction,
                // a committed path no longer starts here
                None => {
                    if let Some(brain) = creature.brain.as_mut() {
                        brain.drop_path();
                    }
                }
            }
        }
        self.refresh_walk_cache(id);
        self.refresh_walk_cells(from);
        self.refresh_walk_cells(to);
        Ok(())
    }

    /// Makes a monster target `challenger` for the next `ticks` thinks.
    /// Summons and unknown creatures refuse the challenge.
    pub fn challenge(&mut self, id: CreatureId, challenger: CreatureId, ticks: u32) -> bool {
        if id == challenger || self.creatures.get(challenger).is_none() {
            return false;
        }
        let Some(monster) = self.creatures.get_mut(id) else {
            return false;
        };
        if monster.is_summon() {
            return false;
        }
        let Some(brain) = monster.brain.as_mut() else {
            return false;
        };
        if brain.target != Some(challenger) {
            brain.target = Some(challenger);
            brain.drop_path();
        }
        brain.challenge_ticks = ticks;
        log::debug!(target: "monster", "{:?} challenged by {:?} for {} thinks", id, challenger, ticks);
        true
    }

    pub fn remove_creature(&mut self, id: CreatureId) -> Option<Creature> {
        let creature = self.creatures.get(id)?;
        let position = creature.position;
        self.map.remove_creature(id, position, creature.is_player());
        let removed = self.creatures.remove(id)?;
        self.forget_creature(id);
        self.refresh_walk_cells(position);
        Some(removed)
    }

    /// Clears every reference other creatures hold to `id`.
    fn forget_creature(&mut self, id: CreatureId) {
        for other in self.creatures.ids() {
            let Some(other) = self.creatures.get_mut(other) else {
                continue;
            };
            if other.master == Some(id) {
                other.master = None;
            }
            if let Some(brain) = other.brain.as_mut() {
                if brain.target == Some(id) {
                    brain.target = None;
                    brain.challenge_ticks = 0;
                    brain.drop_path();
                }
            }
        }
    }

    pub fn add_item(&mut self, position: Position, item: Item) -> bool {
        let Some(tile) = self.map.tile_mut(position) else {
            return false;
        };
        tile.add_item(item);
        self.refresh_walk_cells(position);
        true
    }

    pub fn remove_item(&mut self, position: Position, type_id: ItemTypeId) -> Option<Item> {
        let item = self.map.tile_mut(position)?.remove_item(type_id)?;
        self.refresh_walk_cells(position);
        Some(item)
    }

    /// Empties a tile. Players on it go home; everyone else is removed.
    pub fn remove_tile(&mut self, position: Position) -> bool {
        let creatures = &self.creatures;
        let Some((_, occupants)) = self
            .map
            .clear_tile(position, |id| creatures.get(id).map(|c| c.is_player()).unwrap_or(false))
        else {
            return false;
        };

        for id in occupants {
            let home = self
                .creatures
                .get(id)
                .filter(|creature| creature.is_player())
                .and_then(|creature| creature.home)
                .filter(|home| *home != position && self.map.tile(*home).is_some());
            match home {
                Some(home) => {
                    self.map.add_creature(id, home, true);
                    if let Some(creature) = self.creatures.get_mut(id) {
                        creature.position = home;
                    }
                    self.refresh_walk_cells(home);
                    log::info!(target: "map", "{:?} sent home to {} after tile removal", id, home);
                }
                None => {
                    // already unlinked from the map
                    self.creatures.remove(id);
                    self.forget_creature(id);
                    log::info!(target: "map", "{:?} removed with tile {}", id, position);
                }
            }
        }
        self.refresh_walk_cells(position);
        true
    }

    pub fn spectators(&mut self, query: &SpectatorQuery) -> SpectatorVec {
        let mut out = SpectatorVec::new();
        self.map.get_spectators(&self.creatures, &mut out, query);
        out
    }

    pub fn find_path(
        &self,
        id: CreatureId,
        target: Position,
        params: &FindPathParams,
    ) -> Option<Vec<Direction>> {
        let creature = self.creatures.get(id)?;
        self.map
            .get_path_to(&self.creatures, creature, target, params, &self.config.pathfinding)
    }

    /// Queues a walk to `target`; false when no path exists.
    pub fn walk_to(&mut self, id: CreatureId, target: Position) -> bool {
        let Some(path) = self.find_path(id, target, &FindPathParams::toward(0, 0)) else {
            return false;
        };
        match self.creatures.get_mut(id) {
            Some(creature) => {
                creature.auto_walk = path.into();
                true
            }
            None => false,
        }
    }

    /// Rebuilds a creature's whole walk cache around its position.
    fn refresh_walk_cache(&mut self, id: CreatureId) {
        let Some(creature) = self.creatures.get_mut(id) else {
            return;
        };
        let Some(mut cache) = creature.walk_cache.take() else {
            return;
        };
        let center = creature.position;
        cache.recenter(center);

        if let Some(creature) = self.creatures.get(id) {
            let cells: Vec<Position> = cache.window().collect();
            for cell in cells {
                let walkable = self
                    .map
                    .tile(cell)
                    .map(|tile| {
                        tile.query_add(
                            creature,
                            QueryFlags::PATHFINDING | QueryFlags::IGNORE_FIELD_DAMAGE,
                            &self.creatures,
                        )
                        .is_ok()
                    })
                    .unwrap_or(false);
                cache.set(cell, walkable);
            }
        }
        cache.mark_filled();
        if let Some(creature) = self.creatures.get_mut(id) {
            creature.walk_cache = Some(cache);
        }
    }

    /// Updates one cell in the walk cache of every monster that covers it.
    fn refresh_walk_cells(&mut self, position: Position) {
        let query = SpectatorQuery::new(position).range(WALK_CACHE_RADIUS, WALK_CACHE_RADIUS);
        let nearby = self.spectators(&query);
        for id in nearby.iter() {
            let Some(creature) = self.creatures.get(*id) else {
                continue;
            };
            if creature.walk_cache.is_none() || creature.position == position {
                continue;
            }
            let walkable = self
                .map
                .tile(position)
                .map(|tile| {
                    tile.query_add(
                        creature,
                        QueryFlags::PATHFINDING | QueryFlags::IGNORE_FIELD_DAMAGE,
                        &self.creatures,
                    )
                    .is_ok()
                })
                .unwrap_or(false);
            if let Some(cache) = self
                .creatures
                .get_mut(*id)
                .and_then(|creature| creature.walk_cache.as_mut())
            {
                cache.set(position, walkable);
            }
        }
    }

    fn movement_cooldown_ticks(&self, creature_speed: u16, direction: Direction) -> u64 {
        let duration = step_duration(DEFAULT_GROUND_SPEED, creature_speed, direction.is_diagonal());
        self.clock.ticks_from_duration_round_up(duration).max(1)
    }

    fn record_step(&mut self, id: CreatureId, from: Position, to: Position, direction: Direction) -> CreatureStep {
        let now = self.clock.now();
        let speed = self.creatures.get(id).map(|c| c.speed).unwrap_or(1);
        let ticks = self.movement_cooldown_ticks(speed, direction);
        if let Some(creature) = self.creatures.get_mut(id) {
            creature.move_cooldown.reset_from_now_ticks(&self.clock, ticks);
            if let Some(brain) = creature.brain.as_mut() {
                brain.last_step = now;
            }
        }
        CreatureStep {
            id,
            from,
            to,
            direction,
        }
    }

    /// Advances the clock by one tick and lets every creature act.
    pub fn tick(&mut self) -> TickOutcome {
        let started = Instant::now();
        let tick = self.clock.advance(1);
        self.map.clear_spectator_cache();
        let mut outcome = TickOutcome {
            tick,
            ..TickOutcome::default()
        };

        for id in self.creatures.ids() {
            let Some(creature) = self.creatures.get(id) else {
                continue;
            };
            if !creature.move_cooldown.is_ready(&self.clock) {
                continue;
            }
            if creature.is_monster() {
                self.think_monster(id, &mut outcome);
            } else if !creature.auto_walk.is_empty() {
                self.advance_auto_walk(id, &mut outcome);
            }
        }

        let elapsed = started.elapsed();
        if elapsed > self.clock.tick_length() {
            log::warn!(
                target: "lag",
                "tick {} took {} ms ({} creatures, {} path searches)",
                tick.0,
                elapsed.as_millis(),
                self.creatures.len(),
                outcome.path_searches
            );
        }
        outcome
    }

    fn advance_auto_walk(&mut self, id: CreatureId, outcome: &mut TickOutcome) {
        let Some(direction) = self
            .creatures
            .get_mut(id)
            .and_then(|creature| creature.auto_walk.pop_front())
        else {
            return;
        };
        let from = match self.creatures.get(id) {
            Some(creature) => creature.position,
            None => return,
        };
        match self.move_creature(id, direction) {
            Ok(to) => {
                let step = self.record_step(id, from, to, direction);
                outcome.moves.push(step);
            }
            Err(err) => {
                log::debug!(target: "map", "{:?} auto-walk stopped at {}: {}", id, from, err);
                if let Some(creature) = self.creatures.get_mut(id) {
                    creature.auto_walk.clear();
                }
            }
        }
    }

    /// Nearest player the monster can see on its own floor, ties by handle.
    fn select_target(&self, monster: &Creature, players: &SpectatorVec) -> Option<CreatureId> {
        let view = Viewport::awareness(monster.position, self.config.viewport);
        players
            .iter()
            .filter_map(|id| self.creatures.get(*id))
            .filter(|player| {
                player.position.z == monster.position.z
                    && view.contains(player.position)
                    && monster.can_see_creature(player)
                    && !self
                        .map
                        .tile(player.position)
                        .map(|tile| tile.is_protection_zone())
                        .unwrap_or(false)
            })
            .min_by_key(|player| (monster.position.distance(player.position), player.id))
            .map(|player| player.id)
    }

    fn think_monster(&mut self, id: CreatureId, outcome: &mut TickOutcome) {
        let Some(monster) = self.creatures.get(id) else {
            return;
        };
        let here = monster.position;

        if let Some(leash) = monster.spawn {
            if !leash.contains(here) {
                let creature = monster.clone();
                let home = find_placement(
                    &self.map,
                    &self.creatures,
                    &mut self.rng,
                    &creature,
                    leash.center,
                    false,
                    true,
                );
                if let Some(home) = home {
                    if self.teleport(id, home).is_ok() {
                        log::debug!(target: "monster", "{} left its spawn, returned to {}", creature.name, home);
                        outcome.teleports += 1;
                    }
                }
                return;
            }
        }

        let watchers = self.spectators(
            &SpectatorQuery::new(here)
                .multifloor(true)
                .only_players(true),
        );
        if watchers.is_empty() {
            if let Some(brain) = self
                .creatures
                .get_mut(id)
                .and_then(|creature| creature.brain.as_mut())
            {
                brain.target = None;
                brain.challenge_ticks = 0;
                brain.drop_path();
            }
            outcome.idle += 1;
            return;
        }
        outcome.thinking += 1;

        let Some(monster) = self.creatures.get(id) else {
            return;
        };
        let challenger = monster
            .brain
            .as_ref()
            .filter(|brain| brain.challenge_ticks > 0)
            .and_then(|brain| brain.target)
            .filter(|challenger| {
                self.creatures
                    .get(*challenger)
                    .map(|challenger| challenger.position.z == here.z)
                    .unwrap_or(false)
            });
        let target = match monster.master {
            Some(master) => self
                .creatures
                .get(master)
                .and_then(|master| master.brain.as_ref())
                .and_then(|brain| brain.target),
            None => challenger.or_else(|| self.select_target(monster, &watchers)),
        };
        let spawn = monster.spawn;
        let walk_home_radius = self.config.monsters.walk_to_spawn_radius;

        if let Some(brain) = self
            .creatures
            .get_mut(id)
            .and_then(|creature| creature.brain.as_mut())
        {
            if brain.target != target {
                log::debug!(target: "monster", "{:?} switches target {:?} -> {:?}", id, brain.target, target);
                brain.target = target;
                brain.challenge_ticks = 0;
                brain.drop_path();
            }
            brain.walking_home = match (target, spawn) {
                (None, Some(leash)) => {
                    let distance = here.distance(leash.center);
                    distance > walk_home_radius || (brain.walking_home && distance > 1)
                }
                _ => false,
            };
        }

        if let Some(creature) = self.creatures.get_mut(id) {
            let fleeing = creature.is_fleeing();
            if let Some(brain) = creature.brain.as_mut() {
                if brain.fleeing != fleeing {
                    brain.fleeing = fleeing;
                    brain.drop_path();
                }
                brain.challenge_ticks = brain.challenge_ticks.saturating_sub(1);
            }
        }

        let plan = self.plan_monster(id, outcome);
        self.apply_plan(id, here, plan, outcome);
    }

    fn plan_monster(&mut self, id: CreatureId, outcome: &mut TickOutcome) -> Plan {
        let Self {
            map,
            creatures,
            config,
            clock,
            rng,
        } = self;
        let (map, creatures): (&Map, &CreatureRegistry) = (map, creatures);
        let (config, clock): (&WorldConfig, &GameClock) = (config, clock);
        let Some(monster) = creatures.get(id) else {
            return Plan::Stuck;
        };
        let Some(brain) = monster.brain.as_ref() else {
            return Plan::Stuck;
        };
        let mover = MonsterMover::new(map, creatures, monster);
        let here = monster.position;

        let chase = |goal: Position, params: FindPathParams, outcome: &mut TickOutcome| {
            if let Some(direction) = brain.committed_step(goal) {
                if mover.can_walk_to(here, direction) {
                    return PathChoice::Step(direction, PathUpdate::Advance);
                }
            }
            outcome.path_searches += 1;
            match map.get_path_to(creatures, monster, goal, &params, &config.pathfinding) {
                Some(steps) if steps.is_empty() => PathChoice::Arrived,
                Some(steps) if mover.can_walk_to(here, steps[0]) => {
                    PathChoice::Step(steps[0], PathUpdate::Replace(goal, steps))
                }
                Some(_) => PathChoice::Failed,
                None => {
                    outcome.path_failures += 1;
                    PathChoice::Failed
                }
            }
        };

        let target = brain.target.and_then(|target| creatures.get(target));
        let Some(target) = target else {
            if let Some(master) = monster.master.and_then(|master| creatures.get(master)) {
                if here.z != master.position.z || here.distance(master.position) <= 2 {
                    return Plan::Hold(PathUpdate::Drop);
                }
                let params = mover.path_search_params(master, config.viewport.max_x);
                return match chase(master.position, params, outcome) {
                    PathChoice::Step(direction, update) => Plan::Step(direction, update),
                    PathChoice::Arrived => Plan::Hold(PathUpdate::Drop),
                    PathChoice::Failed => random_plan(&mover, rng),
                };
            }

            if brain.walking_home {
                if let Some(leash) = monster.spawn {
                    match chase(leash.center, FindPathParams::toward(0, 1), outcome) {
                        PathChoice::Step(direction, update) => return Plan::Step(direction, update),
                        PathChoice::Arrived => return Plan::Hold(PathUpdate::Drop),
                        PathChoice::Failed => {}
                    }
                }
            }

            let interval = Duration::from_millis(config.monsters.random_step_interval_ms);
            if clock.elapsed_since(brain.last_step) < interval {
                return Plan::Wait;
            }
            return random_plan(&mover, rng);
        };

        let goal = target.position;
        if brain.fleeing {
            if let Some(direction) = brain.committed_step(goal) {
                if mover.can_walk_to(here, direction) {
                    return Plan::Step(direction, PathUpdate::Advance);
                }
            }
            if let Some(direction) = mover.flee_table_step(goal, rng) {
                return Plan::Step(direction, PathUpdate::Drop);
            }
            let params = mover.path_search_params(target, config.viewport.max_x);
            if let PathChoice::Step(direction, update) = chase(goal, params, outcome) {
                return Plan::Step(direction, update);
            }
            let fallback = mover
                .dance_step(goal, false, false, rng)
                .or_else(|| mover.escape_step(goal, rng))
                .or_else(|| mover.random_step(rng));
            return match fallback {
                Some(direction) => Plan::Step(direction, PathUpdate::Drop),
                None => Plan::Stuck,
            };
        }

        match mover.follow_target_from_distance(goal, rng) {
            FollowOutcome::Hold => {
                let roll: u32 = rng.gen_range(1..=100);
                if roll > brain.race.static_attack_chance {
                    if let Some(direction) = mover.dance_step(goal, true, true, rng) {
                        return Plan::Step(direction, PathUpdate::Drop);
                    }
                }
                Plan::Hold(PathUpdate::Keep)
            }
            FollowOutcome::Step(direction) => Plan::Step(direction, PathUpdate::Drop),
            FollowOutcome::Defer => {
                let params = mover.path_search_params(target, config.viewport.max_x);
                match chase(goal, params, outcome) {
                    PathChoice::Step(direction, update) => Plan::Step(direction, update),
                    PathChoice::Arrived => Plan::Hold(PathUpdate::Drop),
                    PathChoice::Failed => random_plan(&mover, rng),
                }
            }
        }
    }

    fn apply_plan(&mut self, id: CreatureId, here: Position, plan: Plan, outcome: &mut TickOutcome) {
        let update = match &plan {
            Plan::Step(_, update) | Plan::Hold(update) => update.clone(),
            Plan::Wait | Plan::Stuck => PathUpdate::Keep,
        };
        if let Some(brain) = self
            .creatures
            .get_mut(id)
            .and_then(|creature| creature.brain.as_mut())
        {
            match update {
                PathUpdate::Keep | PathUpdate::Advance => {}
                PathUpdate::Replace(goal, steps) => brain.commit_path(goal, steps),
                PathUpdate::Drop => brain.drop_path(),
            }
        }

        match plan {
            Plan::Step(direction, update) => match self.move_creature(id, direction) {
                Ok(to) => {
                    if matches!(update, PathUpdate::Advance | PathUpdate::Replace(..)) {
                        if let Some(brain) = self
                            .creatures
                            .get_mut(id)
                            .and_then(|creature| creature.brain.as_mut())
                        {
                            brain.path.pop_front();
                        }
                    }
                    let step = self.record_step(id, here, to, direction);
                    outcome.moves.push(step);
                }
                Err(err) => {
                    log::debug!(target: "monster", "{:?} step {:?} from {} failed: {}", id, direction, here, err);
                    if let Some(brain) = self
                        .creatures
                        .get_mut(id)
                        .and_then(|creature| creature.brain.as_mut())
                    {
                        brain.drop_path();
                    }
                    outcome.stuck += 1;
                }
            },
            Plan::Hold(_) | Plan::Wait => outcome.holding += 1,
            Plan::Stuck => {
                log::debug!(target: "monster", "{:?} has no legal move at {}", id, here);
                outcome.stuck += 1;
            }
        }
    }
}

fn random_plan(mover: &MonsterMover<'_>, rng: &mut StdRng) -> Plan {
    match mover.random_step(rng) {
        Some(direction) => Plan::Step(direction, PathUpdate::Drop),
        None => Plan::Stuck,
    }
}

/// Cell for `creature` at or around `center`. Protection-zone centers only
/// spill over into protection zones.
fn find_placement<R: Rng>(
    map: &Map,
    registry: &CreatureRegistry,
    rng: &mut R,
    creature: &Creature,
    center: Position,
    extended: bool,
    force: bool,
) -> Option<Position> {
    let (found, in_protection_zone) = match map.tile(center) {
        Some(tile) => {
            let result = tile.query_add(creature, QueryFlags::IGNORE_BLOCK_ITEM, registry);
            let allowed = matches!(result, Ok(()) | Err(PlacementError::NotInvited));
            (force || allowed, tile.is_protection_zone())
        }
        None => (false, false),
    };
    if found {
        return Some(center);
    }

    let mut candidates: Vec<(i32, i32)> = Vec::with_capacity(12);
    if extended {
        let mut far = EXTENDED_OFFSETS;
        far.shuffle(rng);
        candidates.extend(far);
    }
    let mut near = NEIGHBOR_OFFSETS;
    near.shuffle(rng);
    candidates.extend(near);

    candidates
        .into_iter()
        .filter_map(|(dx, dy)| center.offset_by(dx, dy))
        .find(|position| {
            let Some(tile) = map.tile(*position) else {
                return false;
            };
            if in_protection_zone && !tile.is_protection_zone() {
                return false;
            }
            tile.query_add(creature, QueryFlags::NONE, registry).is_ok()
                && (!extended || map.is_sight_clear(center, *position, false))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::creature::SpawnLeash;
    use crate::entities::monster::MonsterType;
    use crate::world::tile::TileFlags;
    use crate::world::walk_cache::WalkCacheEntry;

    fn world() -> WorldState {
        let config = WorldConfig {
            seed: Some(11),
            ..WorldConfig::default()
        };
        let mut world = WorldState::new(config);
        for x in 80..=140 {
            for y in 80..=140 {
                world.set_tile(Tile::with_ground(Position::new(x, y, 7), ItemTypeId(102)));
            }
        }
        world
    }

    fn wall(world: &mut WorldState, x: u16, y: u16) {
        world.add_item(Position::new(x, y, 7), Item::wall(ItemTypeId(1100)));
    }

    fn rat(position: Position) -> Creature {
        Creature::monster("Rat", position, MonsterType::default())
    }

    #[test]
    fn placement_uses_center_when_free() {
        let mut world = world();
        let id = world
            .spawn_creature(Creature::player("Knight", Position::new(100, 100, 7)))
            .unwrap();
        assert_eq!(world.creatures.position(id), Some(Position::new(100, 100, 7)));
        assert!(world
            .map
            .tile(Position::new(100, 100, 7))
            .unwrap()
            .has_creature(id));
    }

    #[test]
    fn placement_spills_to_neighbour_when_occupied() {
        let mut world = world();
        let center = Position::new(100, 100, 7);
        world.spawn_creature(Creature::player("Knight", center)).unwrap();
        let id = world.place_creature(rat(center), center, false, false).unwrap();
        let position = world.creatures.position(id).unwrap();
        assert_ne!(position, center);
        assert_eq!(position.distance(center), 1);
    }

    #[test]
    fn protection_zone_placement_stays_inside() {
        let mut world = world();
        let center = Position::new(100, 100, 7);
        for (x, y) in [(100, 100), (101, 100)] {
            if let Some(tile) = world.map.tile_mut(Position::new(x, y, 7)) {
                tile.set_zone(TileFlags::PROTECTION_ZONE);
            }
        }
        world.spawn_creature(Creature::player("Knight", center)).unwrap();
        let id = world
            .place_creature(Creature::player("Druid", center), center, false, false)
            .unwrap();
        assert_eq!(world.creatures.position(id), Some(Position::new(101, 100, 7)));
    }

    #[test]
    fn extended_placement_prefers_distance_two() {
        let mut world = world();
        let center = Position::new(100, 100, 7);
        world.spawn_creature(Creature::player("Knight", center)).unwrap();
        let id = world
            .place_creature(Creature::player("Druid", center), center, true, false)
            .unwrap();
        assert_eq!(world.creatures.position(id).unwrap().distance(center), 2);
    }

    #[test]
    fn forced_placement_ignores_occupants() {
        let mut world = world();
        let center = Position::new(100, 100, 7);
        world.spawn_creature(Creature::player("Knight", center)).unwrap();
        let id = world
            .place_creature(Creature::player("Druid", center), center, false, true)
            .unwrap();
        assert_eq!(world.creatures.position(id), Some(center));
    }

    #[test]
    fn move_updates_tile_position_and_direction() {
        let mut world = world();
        let id = world
            .spawn_creature(Creature::player("Knight", Position::new(100, 100, 7)))
            .unwrap();
        let to = world.move_creature(id, Direction::North).unwrap();
        assert_eq!(to, Position::new(100, 99, 7));
        let knight = world.creatures.get(id).unwrap();
        assert_eq!(knight.position, to);
        assert_eq!(knight.direction, Direction::North);
        assert!(world.map.tile(to).unwrap().has_creature(id));
        assert!(!world.map.tile(Position::new(100, 100, 7)).unwrap().has_creature(id));
    }

    #[test]
    fn move_into_wall_is_blocked() {
        let mut world = world();
        wall(&mut world, 101, 100);
        let id = world
            .spawn_creature(Creature::player("Knight", Position::new(100, 100, 7)))
            .unwrap();
        assert!(matches!(
            world.move_creature(id, Direction::East),
            Err(MoveError::Blocked(_))
        ));
        assert_eq!(world.creatures.position(id), Some(Position::new(100, 100, 7)));
        assert_eq!(
            world.move_creature(CreatureId(999), Direction::East),
            Err(MoveError::UnknownCreature)
        );
    }

    #[test]
    fn moving_across_leaves_keeps_spectators_exact() {
        let mut world = world();
        let id = world
            .spawn_creature(Creature::player("Knight", Position::new(103, 100, 7)))
            .unwrap();
        let query = SpectatorQuery::new(Position::new(100, 100, 7)).range(3, 3);
        assert!(world.spectators(&query).contains(id));
        world.move_creature(id, Direction::East).unwrap();
        assert!(!world.spectators(&query).contains(id));
        world.move_creature(id, Direction::West).unwrap();
        assert!(world.spectators(&query).contains(id));
    }

    #[test]
    fn walk_caches_follow_creature_moves() {
        let mut world = world();
        let rat_id = world.spawn_creature(rat(Position::new(100, 100, 7))).unwrap();
        let knight = world
            .spawn_creature(Creature::player("Knight", Position::new(104, 100, 7)))
            .unwrap();
        let lookup = |world: &WorldState, position: Position| {
            world
                .creatures
                .get(rat_id)
                .and_then(|rat| rat.walk_cache.as_ref())
                .map(|cache| cache.lookup(position))
        };
        assert_eq!(lookup(&world, Position::new(104, 100, 7)), Some(WalkCacheEntry::Blocked));
        world.move_creature(knight, Direction::South).unwrap();
        assert_eq!(lookup(&world, Position::new(104, 100, 7)), Some(WalkCacheEntry::Walkable));
        assert_eq!(lookup(&world, Position::new(104, 101, 7)), Some(WalkCacheEntry::Blocked));

        world.move_creature(rat_id, Direction::West).unwrap();
        assert_eq!(lookup(&world, Position::new(100, 100, 7)), Some(WalkCacheEntry::Walkable));
        assert_eq!(lookup(&world, Position::new(104, 101, 7)), Some(WalkCacheEntry::Blocked));
    }

    #[test]
    fn item_changes_refresh_walk_caches() {
        let mut world = world();
        let rat_id = world.spawn_creature(rat(Position::new(100, 100, 7))).unwrap();
        let cell = Position::new(102, 100, 7);
        wall(&mut world, 102, 100);
        let entry = |world: &WorldState| {
            world.creatures.get(rat_id).unwrap().walk_cache.as_ref().unwrap().lookup(cell)
        };
        assert_eq!(entry(&world), WalkCacheEntry::Blocked);
        world.remove_item(cell, ItemTypeId(1100)).unwrap();
        assert_eq!(entry(&world), WalkCacheEntry::Walkable);
    }

    #[test]
    fn removing_a_tile_sends_players_home_and_drops_monsters() {
        let mut world = world();
        let home = Position::new(90, 90, 7);
        let mut knight = Creature::player("Knight", Position::new(100, 100, 7));
        knight.home = Some(home);
        let knight = world.spawn_creature(knight).unwrap();
        let rat_id = world
            .place_creature(rat(Position::new(100, 100, 7)), Position::new(100, 100, 7), false, true)
            .unwrap();

        assert!(world.remove_tile(Position::new(100, 100, 7)));
        assert_eq!(world.creatures.position(knight), Some(home));
        assert!(world.map.tile(home).unwrap().has_creature(knight));
        assert!(world.creatures.get(rat_id).is_none());
        let tile = world.map.tile(Position::new(100, 100, 7)).unwrap();
        assert!(tile.ground().is_none());
        assert!(tile.creatures().is_empty());
    }

    #[test]
    fn removed_creature_is_dropped_as_target() {
        let mut world = world();
        let knight = world
            .spawn_creature(Creature::player("Knight", Position::new(105, 100, 7)))
            .unwrap();
        let rat_id = world.spawn_creature(rat(Position::new(100, 100, 7))).unwrap();
        world.tick();
        assert_eq!(
            world.creatures.get(rat_id).unwrap().brain.as_ref().unwrap().target,
            Some(knight)
        );
        world.remove_creature(knight).unwrap();
        assert_eq!(world.creatures.get(rat_id).unwrap().brain.as_ref().unwrap().target, None);
        assert!(world.map.tile(Position::new(105, 100, 7)).unwrap().creatures().is_empty());
    }

    #[test]
    fn player_auto_walk_follows_path() {
        let mut world = world();
        let id = world
            .spawn_creature(Creature::player("Knight", Position::new(100, 100, 7)))
            .unwrap();
        assert!(world.walk_to(id, Position::new(103, 100, 7)));
        let mut ticks = 0;
        while world.creatures.position(id) != Some(Position::new(103, 100, 7)) && ticks < 100 {
            world.tick();
            ticks += 1;
        }
        assert_eq!(world.creatures.position(id), Some(Position::new(103, 100, 7)));
        assert!(world.creatures.get(id).unwrap().auto_walk.is_empty());
    }

    #[test]
    fn unwatched_monsters_do_not_think() {
        let mut world = world();
        world.spawn_creature(rat(Position::new(100, 100, 7))).unwrap();
        world
            .spawn_creature(Creature::player("Knight", Position::new(130, 130, 7)))
            .unwrap();
        let outcome = world.tick();
        assert_eq!(outcome.idle, 1);
        assert_eq!(outcome.thinking, 0);
        assert!(outcome.moves.is_empty());
    }

    #[test]
    fn monster_closes_in_on_player() {
        let mut world = world();
        let knight = world
            .spawn_creature(Creature::player("Knight", Position::new(108, 100, 7)))
            .unwrap();
        let rat_id = world.spawn_creature(rat(Position::new(100, 100, 7))).unwrap();
        for _ in 0..200 {
            world.tick();
        }
        let rat = world.creatures.position(rat_id).unwrap();
        let knight = world.creatures.position(knight).unwrap();
        assert!(rat.distance(knight) <= 1, "rat at {} knight at {}", rat, knight);
    }

    #[test]
    fn monster_walks_around_wall_with_path_search() {
        let mut world = world();
        world.config.pathfinding.closed_node_limit = 1000;
        for y in 98..=102 {
            wall(&mut world, 103, y);
        }
        let knight = world
            .spawn_creature(Creature::player("Knight", Position::new(106, 100, 7)))
            .unwrap();
        let rat_id = world.spawn_creature(rat(Position::new(100, 100, 7))).unwrap();
        let mut searches = 0;
        for _ in 0..300 {
            searches += world.tick().path_searches;
        }
        assert!(searches > 0);
        let rat = world.creatures.position(rat_id).unwrap();
        assert!(rat.distance(world.creatures.position(knight).unwrap()) <= 1);
    }

    #[test]
    fn wounded_monster_flees() {
        let mut world = world();
        world
            .spawn_creature(Creature::player("Knight", Position::new(100, 95, 7)))
            .unwrap();
        let race = MonsterType {
            run_away_health: 50,
            ..MonsterType::default()
        };
        let coward = Creature::monster("Deer", Position::new(100, 100, 7), race).with_health(10, 100);
        let id = world.spawn_creature(coward).unwrap();
        let outcome = world.tick();
        assert_eq!(outcome.moves.len(), 1);
        assert_eq!(world.creatures.position(id), Some(Position::new(100, 101, 7)));
    }

    #[test]
    fn boxed_in_fleeing_monster_searches_its_way_out() {
        let mut world = world();
        for (x, y) in [(99, 100), (101, 100), (99, 101), (100, 101), (101, 101)] {
            wall(&mut world, x, y);
        }
        let knight = world
            .spawn_creature(Creature::player("Knight", Position::new(100, 96, 7)))
            .unwrap();
        let race = MonsterType {
            run_away_health: 50,
            ..MonsterType::default()
        };
        let coward = Creature::monster("Deer", Position::new(100, 100, 7), race).with_health(10, 100);
        let id = world.spawn_creature(coward).unwrap();

        let outcome = world.tick();
        assert_eq!(outcome.path_searches, 1);
        assert_eq!(outcome.moves.len(), 1);
        assert!(matches!(
            outcome.moves[0].direction,
            Direction::North | Direction::Northwest | Direction::Northeast
        ));
        assert!(world.creatures.get(id).unwrap().brain.as_ref().unwrap().fleeing);

        for _ in 0..200 {
            world.tick();
        }
        let deer = world.creatures.position(id).unwrap();
        let knight = world.creatures.position(knight).unwrap();
        assert!(deer.distance(knight) >= 5, "deer at {} knight at {}", deer, knight);
    }

    #[test]
    fn cornered_fleeing_monster_sidesteps_before_escaping() {
        for seed in 0..10 {
            let mut world = world();
            world.rng = StdRng::seed_from_u64(seed);
            world.config.pathfinding.max_nodes = 1;
            for (x, y) in [(100, 101), (101, 100), (101, 101), (99, 101), (101, 99)] {
                wall(&mut world, x, y);
            }
            let knight = Position::new(96, 96, 7);
            world.spawn_creature(Creature::player("Knight", knight)).unwrap();
            let race = MonsterType {
                run_away_health: 50,
                ..MonsterType::default()
            };
            let coward = Creature::monster("Deer", Position::new(100, 100, 7), race).with_health(10, 100);
            let id = world.spawn_creature(coward).unwrap();

            let outcome = world.tick();
            assert_eq!(outcome.path_searches, 1);
            assert_eq!(outcome.moves.len(), 1);
            assert!(matches!(outcome.moves[0].direction, Direction::North | Direction::West));
            assert_eq!(world.creatures.position(id).unwrap().distance(knight), 4);
        }
    }

    #[test]
    fn teleport_drops_committed_path() {
        let mut world = world();
        world.config.pathfinding.closed_node_limit = 1000;
        for y in 96..=104 {
            wall(&mut world, 103, y);
        }
        world
            .spawn_creature(Creature::player("Knight", Position::new(106, 100, 7)))
            .unwrap();
        let rat_id = world.spawn_creature(rat(Position::new(100, 100, 7))).unwrap();
        let committed = |world: &WorldState| {
            !world.creatures.get(rat_id).unwrap().brain.as_ref().unwrap().path.is_empty()
        };
        for _ in 0..50 {
            if committed(&world) {
                break;
            }
            world.tick();
        }
        assert!(committed(&world));

        world.teleport(rat_id, Position::new(95, 95, 7)).unwrap();
        let brain = world.creatures.get(rat_id).unwrap().brain.as_ref().unwrap();
        assert!(brain.path.is_empty());
        assert_eq!(brain.path_goal, None);
    }

    #[test]
    fn challenge_keeps_a_wounded_monster_engaged() {
        let mut world = world();
        let knight = world
            .spawn_creature(Creature::player("Knight", Position::new(100, 95, 7)))
            .unwrap();
        let race = MonsterType {
            run_away_health: 50,
            ..MonsterType::default()
        };
        let coward = Creature::monster("Deer", Position::new(100, 100, 7), race.clone()).with_health(10, 100);
        let id = world.spawn_creature(coward).unwrap();
        let summon = world
            .spawn_creature(Creature::summon("Skeleton", Position::new(90, 90, 7), race, knight))
            .unwrap();

        assert!(world.challenge(id, knight, 3));
        assert!(!world.challenge(summon, knight, 3));
        assert!(!world.challenge(id, CreatureId(999), 3));

        world.tick();
        let deer = world.creatures.get(id).unwrap();
        assert!(deer.position.distance(Position::new(100, 95, 7)) < 5);
        let brain = deer.brain.as_ref().unwrap();
        assert_eq!(brain.target, Some(knight));
        assert_eq!(brain.challenge_ticks, 2);
        assert!(!brain.fleeing);

        for _ in 0..200 {
            world.tick();
        }
        let brain = world.creatures.get(id).unwrap().brain.as_ref().unwrap();
        assert_eq!(brain.challenge_ticks, 0);
        assert!(brain.fleeing);
    }

    #[test]
    fn leashed_monster_outside_spawn_is_returned() {
        let mut world = world();
        world
            .spawn_creature(Creature::player("Knight", Position::new(100, 100, 7)))
            .unwrap();
        let leash = SpawnLeash {
            center: Position::new(95, 95, 7),
            radius: 2,
            z_range: 0,
        };
        let id = world
            .spawn_creature(rat(Position::new(105, 105, 7)).with_spawn(leash))
            .unwrap();
        let outcome = world.tick();
        assert_eq!(outcome.teleports, 1);
        assert_eq!(world.creatures.position(id), Some(Position::new(95, 95, 7)));
    }

    #[test]
    fn idle_monster_respects_random_step_interval() {
        let mut world = world();
        world
            .spawn_creature(Creature::player("Knight", Position::new(100, 100, 7)))
            .unwrap();
        if let Some(tile) = world.map.tile_mut(Position::new(100, 100, 7)) {
            tile.set_zone(TileFlags::PROTECTION_ZONE);
        }
        let rat_id = world.spawn_creature(rat(Position::new(104, 100, 7))).unwrap();
        // 1000 ms interval at 50 ms per tick
        let mut moves = 0;
        for _ in 0..60 {
            moves += world
                .tick()
                .moves
                .iter()
                .filter(|step| step.id == rat_id)
                .count();
        }
        assert!((1..=3).contains(&moves), "moves = {}", moves);
    }

    #[test]
    fn cooldown_scales_with_speed_and_diagonals() {
        let world = world();
        let straight = world.movement_cooldown_ticks(220, Direction::North);
        let diagonal = world.movement_cooldown_ticks(220, Direction::Northeast);
        assert_eq!(straight, 14);
        assert_eq!(diagonal, 41);
        assert!(world.movement_cooldown_ticks(440, Direction::North) < straight);
    }
}
