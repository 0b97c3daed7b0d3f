use crate::entities::item::{FieldKind, FieldSet};
use crate::entities::monster::{MonsterBrain, MonsterType};
use crate::world::position::{Direction, Position};
use crate::world::time::Cooldown;
use crate::world::walk_cache::WalkCache;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CreatureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatureKind {
    Player,
    Npc,
    Monster,
    Summon,
}

/// Area a spawned monster may not leave on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnLeash {
    pub center: Position,
    /// Chebyshev radius; 0 means unbounded.
    pub radius: u16,
    /// Allowed floor difference; 0 means unbounded.
    pub z_range: u8,
}

impl SpawnLeash {
    pub fn contains(&self, position: Position) -> bool {
        if self.radius == 0 {
            return true;
        }
        let radius = u32::from(self.radius);
        if self.center.distance_x(position) > radius || self.center.distance_y(position) > radius {
            return false;
        }
        self.z_range == 0 || self.center.distance_z(position) <= u32::from(self.z_range)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creature {
    pub id: CreatureId,
    pub name: String,
    pub kind: CreatureKind,
    pub position: Position,
    pub direction: Direction,
    pub health: i32,
    pub max_health: i32,
    pub speed: u16,
    pub ghost: bool,
    pub pushable: bool,
    pub can_push_items: bool,
    pub can_push_creatures: bool,
    /// Gamemaster access: walks through creatures.
    pub access: bool,
    pub immunities: FieldSet,
    pub walks_on_fields: FieldSet,
    pub house_access: Vec<u32>,
    /// Where a player is sent when the tile under them disappears.
    pub home: Option<Position>,
    pub master: Option<CreatureId>,
    pub spawn: Option<SpawnLeash>,
    pub walk_cache: Option<WalkCache>,
    pub brain: Option<MonsterBrain>,
    pub auto_walk: VecDeque<Direction>,
    pub move_cooldown: Cooldown,
}

impl Creature {
    fn base(name: &str, kind: CreatureKind, position: Position) -> Self {
        Self {
            id: CreatureId(0),
            name: name.to_string(),
            kind,
            position,
            direction: Direction::South,
            health: 100,
            max_health: 100,
            speed: 220,
            ghost: false,
            pushable: true,
            can_push_items: false,
            can_push_creatures: false,
            access: false,
            immunities: FieldSet::empty(),
            walks_on_fields: FieldSet::empty(),
            house_access: Vec::new(),
            home: None,
            master: None,
            spawn: None,
            walk_cache: None,
            brain: None,
            auto_walk: VecDeque::new(),
            move_cooldown: Cooldown::default(),
        }
    }

    pub fn player(name: &str, position: Position) -> Self {
        Self {
            home: Some(position),
            ..Self::base(name, CreatureKind::Player, position)
        }
    }

    pub fn npc(name: &str, position: Position) -> Self {
        Self {
            pushable: false,
            ..Self::base(name, CreatureKind::Npc, position)
        }
    }

    pub fn monster(name: &str, position: Position, race: MonsterType) -> Self {
        let mut creature = Self::base(name, CreatureKind::Monster, position);
        creature.pushable = race.pushable;
        creature.can_push_items = race.can_push_items;
        creature.can_push_creatures = race.can_push_creatures;
        creature.immunities = race.immunities.iter().copied().collect();
        creature.walks_on_fields = race.walks_on.iter().copied().collect();
        creature.walk_cache = Some(WalkCache::new(position));
        creature.brain = Some(MonsterBrain::new(race));
        creature
    }

    pub fn summon(name: &str, position: Position, race: MonsterType, master: CreatureId) -> Self {
        let mut creature = Self::monster(name, position, race);
        creature.kind = CreatureKind::Summon;
        creature.master = Some(master);
        creature
    }

    pub fn with_health(mut self, health: i32, max_health: i32) -> Self {
        self.health = health;
        self.max_health = max_health;
        self
    }

    pub fn with_spawn(mut self, leash: SpawnLeash) -> Self {
        self.spawn = Some(leash);
        self
    }

    pub fn is_player(&self) -> bool {
        self.kind == CreatureKind::Player
    }

    pub fn is_monster(&self) -> bool {
        matches!(self.kind, CreatureKind::Monster | CreatureKind::Summon)
    }

    pub fn is_summon(&self) -> bool {
        self.master.is_some()
    }

    /// Whether `other` is visible to this creature (ghosts are only seen with access).
    pub fn can_see_creature(&self, other: &Creature) -> bool {
        !other.ghost || self.access
    }

    pub fn is_immune(&self, kind: FieldKind) -> bool {
        self.immunities.contains(kind)
    }

    pub fn can_walk_on_field(&self, kind: FieldKind) -> bool {
        self.walks_on_fields.contains(kind)
    }

    pub fn in_spawn_range(&self, position: Position) -> bool {
        self.spawn.map(|leash| leash.contains(position)).unwrap_or(true)
    }

    /// Health at or under the run-away threshold, unchallenged, and not a summon.
    pub fn is_fleeing(&self) -> bool {
        let Some(brain) = self.brain.as_ref() else {
            return false;
        };
        !self.is_summon() && self.health <= brain.race.run_away_health && brain.challenge_ticks == 0
    }
}

/// Owner of every creature in the world, addressed by handle.
#[derive(Debug, Default)]
pub struct CreatureRegistry {
    creatures: BTreeMap<CreatureId, Creature>,
    next_id: u32,
}

impl CreatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a fresh handle and stores the creature.
    pub fn insert(&mut self, mut creature: Creature) -> CreatureId {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let id = CreatureId(self.next_id);
        creature.id = id;
        self.creatures.insert(id, creature);
        id
    }

    pub fn remove(&mut self, id: CreatureId) -> Option<Creature> {
        self.creatures.remove(&id)
    }

    pub fn get(&self, id: CreatureId) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    pub fn get_mut(&mut self, id: CreatureId) -> Option<&mut Creature> {
        self.creatures.get_mut(&id)
    }

    pub fn position(&self, id: CreatureId) -> Option<Position> {
        self.get(id).map(|creature| creature.position)
    }

    pub fn ids(&self) -> Vec<CreatureId> {
        self.creatures.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Creature> {
        self.creatures.values()
    }

    pub fn len(&self) -> usize {
        self.creatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creatures.is_empty()
    }
}
