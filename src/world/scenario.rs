use crate::config::{ConfigError, WorldConfig};
use crate::entities::creature::{Creature, CreatureId, SpawnLeash};
use crate::entities::item::{FieldKind, Item, ItemTypeId};
use crate::entities::monster::MonsterType;
use crate::world::position::{Position, MAP_MAX_LAYERS};
use crate::world::state::WorldState;
use crate::world::tile::{Tile, TileFlags};
use serde::Deserialize;
use std::path::Path;

pub const GROUND_ITEM: ItemTypeId = ItemTypeId(102);
pub const WALL_ITEM: ItemTypeId = ItemTypeId(1100);

fn field_item(kind: FieldKind) -> ItemTypeId {
    match kind {
        FieldKind::Fire => ItemTypeId(1492),
        FieldKind::Energy => ItemTypeId(1495),
        FieldKind::Poison => ItemTypeId(1496),
    }
}

/// Inclusive rectangle on one floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Area {
    pub x1: u16,
    pub y1: u16,
    pub x2: u16,
    pub y2: u16,
    pub z: u8,
}

impl Area {
    pub fn positions(&self) -> impl Iterator<Item = Position> {
        let (x1, x2) = if self.x1 <= self.x2 { (self.x1, self.x2) } else { (self.x2, self.x1) };
        let (y1, y2) = if self.y1 <= self.y2 { (self.y1, self.y2) } else { (self.y2, self.y1) };
        let z = self.z;
        (y1..=y2).flat_map(move |y| (x1..=x2).map(move |x| Position::new(x, y, z)))
    }
}

fn default_field_damage() -> u32 {
    20
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FieldSpec {
    pub position: Position,
    pub kind: FieldKind,
    #[serde(default = "default_field_damage")]
    pub damage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerSpec {
    pub name: String,
    pub position: Position,
    #[serde(default)]
    pub speed: Option<u16>,
    #[serde(default)]
    pub home: Option<Position>,
    /// Auto-walk destination queued at start.
    #[serde(default)]
    pub walk_to: Option<Position>,
}

fn default_health() -> i32 {
    100
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SummonSpec {
    pub name: String,
    #[serde(flatten)]
    pub race: MonsterType,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonsterSpec {
    pub name: String,
    pub position: Position,
    #[serde(default = "default_health")]
    pub health: i32,
    #[serde(default = "default_health")]
    pub max_health: i32,
    #[serde(default)]
    pub speed: Option<u16>,
    /// Leash radius around the spawn position; 0 leaves the monster unleashed.
    #[serde(default)]
    pub spawn_radius: u16,
    #[serde(default)]
    pub summons: Vec<SummonSpec>,
    #[serde(flatten)]
    pub race: MonsterType,
}

/// World layout and population loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub world: WorldConfig,
    pub ground: Vec<Area>,
    pub walls: Vec<Area>,
    pub protection_zones: Vec<Area>,
    pub fields: Vec<FieldSpec>,
    pub players: Vec<PlayerSpec>,
    pub monsters: Vec<MonsterSpec>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(path.to_path_buf(), err.to_string()))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let scenario: Self =
            serde_yaml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.world.validate()?;
        let areas = self
            .ground
            .iter()
            .chain(&self.walls)
            .chain(&self.protection_zones);
        for area in areas {
            if area.z >= MAP_MAX_LAYERS {
                return Err(ConfigError::Invalid(format!("floor {} out of range", area.z)));
            }
        }
        let positions = self
            .fields
            .iter()
            .map(|field| field.position)
            .chain(self.players.iter().map(|player| player.position))
            .chain(self.monsters.iter().map(|monster| monster.position));
        for position in positions {
            if position.z >= MAP_MAX_LAYERS {
                return Err(ConfigError::Invalid(format!("position {} out of range", position)));
            }
        }
        Ok(())
    }

    /// Lays out the map, then spawns players before monsters so monster
    /// walk caches see them.
    pub fn build(&self) -> WorldState {
        let mut world = WorldState::new(self.world.clone());

        for area in &self.ground {
            for position in area.positions() {
                world.set_tile(Tile::with_ground(position, GROUND_ITEM));
            }
        }
        for area in &self.protection_zones {
            for position in area.positions() {
                if let Some(tile) = world.map.tile_mut(position) {
                    tile.set_zone(TileFlags::PROTECTION_ZONE);
                }
            }
        }
        for area in &self.walls {
            for position in area.positions() {
                world.add_item(position, Item::wall(WALL_ITEM));
            }
        }
        for field in &self.fields {
            let item = Item::field(field_item(field.kind), field.kind, field.damage);
            if !world.add_item(field.position, item) {
                log::warn!(target: "map", "field at {} has no tile", field.position);
            }
        }

        for spec in &self.players {
            let mut player = Creature::player(&spec.name, spec.position);
            if let Some(speed) = spec.speed {
                player.speed = speed;
            }
            if spec.home.is_some() {
                player.home = spec.home;
            }
            let Some(id) = world.spawn_creature(player) else {
                log::warn!(target: "map", "no room for player {} at {}", spec.name, spec.position);
                continue;
            };
            if let Some(goal) = spec.walk_to {
                if !world.walk_to(id, goal) {
                    log::info!(target: "map", "{} has no path to {}", spec.name, goal);
                }
            }
        }

        for spec in &self.monsters {
            let Some(id) = spawn_monster(&mut world, spec) else {
                log::warn!(target: "map", "no room for monster {} at {}", spec.name, spec.position);
                continue;
            };
            for summon in &spec.summons {
                let position = world.creatures.position(id).unwrap_or(spec.position);
                let creature = Creature::summon(&summon.name, position, summon.race.clone(), id);
                if world.place_creature(creature, position, true, false).is_none() {
                    log::warn!(target: "map", "no room for summon {} near {}", summon.name, position);
                }
            }
        }

        log::info!(
            target: "map",
            "scenario built: {} tiles, {} creatures",
            world.map.tile_count(),
            world.creatures.len()
        );
        world
    }
}

fn spawn_monster(world: &mut WorldState, spec: &MonsterSpec) -> Option<CreatureId> {
    let mut monster = Creature::monster(&spec.name, spec.position, spec.race.clone())
        .with_health(spec.health, spec.max_health);
    if let Some(speed) = spec.speed {
        monster.speed = speed;
    }
    if spec.spawn_radius > 0 {
        monster = monster.with_spawn(SpawnLeash {
            center: spec.position,
            radius: spec.spawn_radius,
            z_range: 0,
        });
    }
    world.spawn_creature(monster)
}
