use crate::entities::creature::{Creature, CreatureId, CreatureKind, CreatureRegistry};
use crate::entities::item::{FloorChange, Item, ItemProperty, ItemTypeId, MagicField};
use crate::world::position::Position;
use std::fmt;
use std::ops::BitOr;

/// Cached per-tile state, kept in sync with the item stack on every add/remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileFlags(u32);

impl TileFlags {
    pub const NONE: Self = Self(0);
    pub const FLOORCHANGE_DOWN: Self = Self(1 << 0);
    pub const FLOORCHANGE_NORTH: Self = Self(1 << 1);
    pub const FLOORCHANGE_SOUTH: Self = Self(1 << 2);
    pub const FLOORCHANGE_EAST: Self = Self(1 << 3);
    pub const FLOORCHANGE_WEST: Self = Self(1 << 4);
    pub const FLOORCHANGE_SOUTH_ALT: Self = Self(1 << 5);
    pub const FLOORCHANGE_EAST_ALT: Self = Self(1 << 6);
    pub const PROTECTION_ZONE: Self = Self(1 << 7);
    pub const NO_PVP_ZONE: Self = Self(1 << 8);
    pub const NO_LOGOUT: Self = Self(1 << 9);
    pub const PVP_ZONE: Self = Self(1 << 10);
    pub const TELEPORT: Self = Self(1 << 11);
    pub const MAGIC_FIELD: Self = Self(1 << 12);
    pub const BLOCK_SOLID: Self = Self(1 << 17);
    pub const BLOCK_PATH: Self = Self(1 << 18);
    pub const IMMOVABLE_BLOCK_SOLID: Self = Self(1 << 19);
    pub const IMMOVABLE_BLOCK_PATH: Self = Self(1 << 20);
    pub const IMMOVABLE_NO_FIELD_BLOCK_PATH: Self = Self(1 << 21);
    pub const NO_FIELD_BLOCK_PATH: Self = Self(1 << 22);
    pub const SUPPORTS_HANGABLE: Self = Self(1 << 23);
    pub const BLOCK_PROJECTILE: Self = Self(1 << 24);

    pub const FLOORCHANGE: Self = Self(0x7f);
    pub const ZONES: Self = Self((1 << 7) | (1 << 8) | (1 << 9) | (1 << 10));

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when any bit of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Flags an item contributes to the tile holding it.
    pub fn of_item(item: &Item) -> Self {
        let mut flags = Self::NONE;
        if let Some(change) = item.floor_change {
            flags.insert(match change {
                FloorChange::Down => Self::FLOORCHANGE_DOWN,
                FloorChange::North => Self::FLOORCHANGE_NORTH,
                FloorChange::South => Self::FLOORCHANGE_SOUTH,
                FloorChange::East => Self::FLOORCHANGE_EAST,
                FloorChange::West => Self::FLOORCHANGE_WEST,
                FloorChange::SouthAlt => Self::FLOORCHANGE_SOUTH_ALT,
                FloorChange::EastAlt => Self::FLOORCHANGE_EAST_ALT,
            });
        }
        for (property, flag) in [
            (ItemProperty::BlockSolid, Self::BLOCK_SOLID),
            (ItemProperty::ImmovableBlockSolid, Self::IMMOVABLE_BLOCK_SOLID),
            (ItemProperty::BlockPath, Self::BLOCK_PATH),
            (ItemProperty::ImmovableBlockPath, Self::IMMOVABLE_BLOCK_PATH),
            (ItemProperty::NoFieldBlockPath, Self::NO_FIELD_BLOCK_PATH),
            (ItemProperty::ImmovableNoFieldBlockPath, Self::IMMOVABLE_NO_FIELD_BLOCK_PATH),
            (ItemProperty::SupportsHangable, Self::SUPPORTS_HANGABLE),
            (ItemProperty::BlockProjectile, Self::BLOCK_PROJECTILE),
        ] {
            if item.has_property(property) {
                flags.insert(flag);
            }
        }
        if item.is_teleport() {
            flags.insert(Self::TELEPORT);
        }
        if item.field.is_some() {
            flags.insert(Self::MAGIC_FIELD);
        }
        flags
    }
}

impl BitOr for TileFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Modifiers for `Tile::query_add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryFlags(u8);

impl QueryFlags {
    pub const NONE: Self = Self(0);
    pub const PATHFINDING: Self = Self(1 << 0);
    pub const IGNORE_FIELD_DAMAGE: Self = Self(1 << 1);
    pub const IGNORE_BLOCK_ITEM: Self = Self(1 << 2);
    pub const IGNORE_BLOCK_CREATURE: Self = Self(1 << 3);
    pub const NO_LIMIT: Self = Self(1 << 4);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for QueryFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementError {
    NotPossible,
    NotEnoughRoom,
    NotInvited,
}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementError::NotPossible => write!(f, "not possible"),
            PlacementError::NotEnoughRoom => write!(f, "there is not enough room"),
            PlacementError::NotInvited => write!(f, "not invited to this house"),
        }
    }
}

impl std::error::Error for PlacementError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    Static,
    Dynamic,
    House(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    position: Position,
    kind: TileKind,
    ground: Option<Item>,
    /// Down items (newest first) followed by always-on-top items in top order.
    items: Vec<Item>,
    down_item_count: usize,
    /// Front is the topmost creature.
    creatures: Vec<CreatureId>,
    flags: TileFlags,
}

impl Tile {
    pub fn new(position: Position) -> Self {
        Self::with_kind(position, TileKind::Dynamic)
    }

    pub fn with_kind(position: Position, kind: TileKind) -> Self {
        Self {
            position,
            kind,
            ground: None,
            items: Vec::new(),
            down_item_count: 0,
            creatures: Vec::new(),
            flags: TileFlags::NONE,
        }
    }

    /// Ground-only tile.
    pub fn with_ground(position: Position, ground: ItemTypeId) -> Self {
        let mut tile = Self::new(position);
        tile.add_item(Item::ground(ground));
        tile
    }

    /// Stand-in for a position without a tile: no ground, blocks everything.
    pub fn blocking_placeholder(position: Position) -> Self {
        let mut tile = Self::with_kind(position, TileKind::Static);
        tile.flags = TileFlags::BLOCK_SOLID
            | TileFlags::IMMOVABLE_BLOCK_SOLID
            | TileFlags::BLOCK_PROJECTILE;
        tile
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn kind(&self) -> TileKind {
        self.kind
    }

    pub fn house_id(&self) -> Option<u32> {
        match self.kind {
            TileKind::House(id) => Some(id),
            _ => None,
        }
    }

    pub fn ground(&self) -> Option<&Item> {
        self.ground.as_ref()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn down_items(&self) -> &[Item] {
        &self.items[..self.down_item_count]
    }

    pub fn top_items(&self) -> &[Item] {
        &self.items[self.down_item_count..]
    }

    pub fn creatures(&self) -> &[CreatureId] {
        &self.creatures
    }

    pub fn top_creature(&self) -> Option<CreatureId> {
        self.creatures.first().copied()
    }

    /// Topmost creature `viewer` can see.
    pub fn top_visible_creature(
        &self,
        viewer: &Creature,
        registry: &CreatureRegistry,
    ) -> Option<CreatureId> {
        self.creatures.iter().copied().find(|id| {
            registry
                .get(*id)
                .map(|other| other.id == viewer.id || viewer.can_see_creature(other))
                .unwrap_or(false)
        })
    }

    pub fn has_creature(&self, id: CreatureId) -> bool {
        self.creatures.contains(&id)
    }

    pub fn flags(&self) -> TileFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: TileFlags) -> bool {
        self.flags.intersects(flag)
    }

    pub fn set_zone(&mut self, zone: TileFlags) {
        self.flags.insert(TileFlags(zone.bits() & TileFlags::ZONES.bits()));
    }

    pub fn is_protection_zone(&self) -> bool {
        self.has_flag(TileFlags::PROTECTION_ZONE)
    }

    fn things(&self) -> impl Iterator<Item = &Item> {
        self.ground.iter().chain(self.items.iter())
    }

    pub fn has_property(&self, property: ItemProperty) -> bool {
        self.things().any(|item| item.has_property(property))
    }

    /// First damaging or harmless field lying on the tile.
    pub fn field(&self) -> Option<MagicField> {
        if !self.has_flag(TileFlags::MAGIC_FIELD) {
            return None;
        }
        self.items.iter().find_map(|item| item.field)
    }

    /// Adds an item; a ground item replaces the current ground, which is returned.
    pub fn add_item(&mut self, item: Item) -> Option<Item> {
        if item.is_ground() {
            let previous = self.ground.replace(item);
            if let Some(old) = previous.as_ref() {
                self.reset_tile_flags(old);
            }
            if let Some(ground) = self.ground.as_ref() {
                let flags = TileFlags::of_item(ground);
                self.set_tile_flags(flags);
            }
            return previous;
        }

        let flags = TileFlags::of_item(&item);
        match item.top_order {
            Some(order) => {
                let top_start = self.down_item_count;
                let index = self.items[top_start..]
                    .iter()
                    .position(|other| other.top_order.unwrap_or(u8::MAX) > order)
                    .map(|offset| top_start + offset)
                    .unwrap_or(self.items.len());
                self.items.insert(index, item);
            }
            None => {
                self.items.insert(0, item);
                self.down_item_count += 1;
            }
        }
        self.set_tile_flags(flags);
        None
    }

    /// Removes the first stacked item of the given type, the ground last.
    pub fn remove_item(&mut self, type_id: ItemTypeId) -> Option<Item> {
        let removed = match self.items.iter().position(|item| item.type_id == type_id) {
            Some(index) => {
                if index < self.down_item_count {
                    self.down_item_count -= 1;
                }
                Some(self.items.remove(index))
            }
            None if self.ground.as_ref().map(|g| g.type_id) == Some(type_id) => self.ground.take(),
            None => None,
        }?;
        self.reset_tile_flags(&removed);
        Some(removed)
    }

    /// Empties ground and item stack; zone flags survive.
    pub fn clear_items(&mut self) -> Vec<Item> {
        let mut removed: Vec<Item> = self.ground.take().into_iter().collect();
        removed.append(&mut self.items);
        self.down_item_count = 0;
        self.flags = TileFlags(self.flags.bits() & TileFlags::ZONES.bits());
        removed
    }

    fn set_tile_flags(&mut self, flags: TileFlags) {
        let flags = if self.has_flag(TileFlags::FLOORCHANGE) {
            flags.without(TileFlags::FLOORCHANGE)
        } else {
            flags
        };
        self.flags.insert(flags);
    }

    /// Clears the flags `removed` contributed unless a remaining item still provides them.
    fn reset_tile_flags(&mut self, removed: &Item) {
        let contributed = TileFlags::of_item(removed);
        let remaining = self
            .things()
            .fold(TileFlags::NONE, |acc, item| acc | TileFlags::of_item(item));
        let mut cleared = contributed.without(remaining);
        if contributed.intersects(TileFlags::FLOORCHANGE) {
            cleared.insert(TileFlags::FLOORCHANGE.without(remaining));
        }
        self.flags.remove(cleared);
        if !self.has_flag(TileFlags::FLOORCHANGE) {
            let first_change = self
                .things()
                .map(|item| TileFlags(TileFlags::of_item(item).bits() & TileFlags::FLOORCHANGE.bits()))
                .find(|flags| flags.bits() != 0);
            if let Some(change) = first_change {
                self.flags.insert(change);
            }
        }
    }

    pub(crate) fn add_creature(&mut self, id: CreatureId) {
        self.creatures.insert(0, id);
    }

    pub(crate) fn remove_creature(&mut self, id: CreatureId) -> bool {
        match self.creatures.iter().position(|other| *other == id) {
            Some(index) => {
                self.creatures.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn take_creatures(&mut self) -> Vec<CreatureId> {
        std::mem::take(&mut self.creatures)
    }

    /// Whether `mover` may enter this tile.
    ///
    /// Non-mutating; pathfinding and the walk caches call it for cells the
    /// creature is not standing on.
    pub fn query_add(
        &self,
        mover: &Creature,
        flags: QueryFlags,
        registry: &CreatureRegistry,
    ) -> Result<(), PlacementError> {
        if flags.contains(QueryFlags::NO_LIMIT) {
            return Ok(());
        }
        if flags.contains(QueryFlags::PATHFINDING)
            && self.has_flag(TileFlags::FLOORCHANGE | TileFlags::TELEPORT)
        {
            return Err(PlacementError::NotPossible);
        }
        if self.ground.is_none() {
            return Err(PlacementError::NotPossible);
        }

        match mover.kind {
            CreatureKind::Monster | CreatureKind::Summon => {
                self.query_add_monster(mover, flags, registry)
            }
            CreatureKind::Player => self.query_add_player(mover, flags, registry),
            CreatureKind::Npc => self.query_add_npc(mover, flags, registry),
        }
    }

    fn occupants<'a>(
        &'a self,
        mover: &'a Creature,
        registry: &'a CreatureRegistry,
    ) -> impl Iterator<Item = &'a Creature> + 'a {
        self.creatures
            .iter()
            .filter(move |id| **id != mover.id)
            .filter_map(move |id| registry.get(*id))
    }

    fn query_add_monster(
        &self,
        mover: &Creature,
        flags: QueryFlags,
        registry: &CreatureRegistry,
    ) -> Result<(), PlacementError> {
        let pathfinding = flags.contains(QueryFlags::PATHFINDING);
        if self.has_flag(TileFlags::PROTECTION_ZONE | TileFlags::FLOORCHANGE | TileFlags::TELEPORT)
            || self.house_id().is_some()
        {
            return Err(PlacementError::NotPossible);
        }
        if self.has_flag(TileFlags::IMMOVABLE_BLOCK_SOLID) {
            return Err(PlacementError::NotPossible);
        }
        if pathfinding && self.has_flag(TileFlags::IMMOVABLE_NO_FIELD_BLOCK_PATH) {
            return Err(PlacementError::NotPossible);
        }
        if (self.has_flag(TileFlags::BLOCK_SOLID)
            || (pathfinding && self.has_flag(TileFlags::NO_FIELD_BLOCK_PATH)))
            && !(mover.can_push_items || flags.contains(QueryFlags::IGNORE_BLOCK_ITEM))
        {
            return Err(PlacementError::NotPossible);
        }

        if !flags.contains(QueryFlags::IGNORE_BLOCK_CREATURE) {
            for occupant in self.occupants(mover, registry) {
                if occupant.ghost {
                    continue;
                }
                let pushable = mover.can_push_creatures
                    && !mover.is_summon()
                    && occupant.kind == CreatureKind::Monster
                    && occupant.pushable;
                if !pushable {
                    return Err(PlacementError::NotEnoughRoom);
                }
            }
        }

        if let Some(field) = self.field() {
            if field.is_damaging() && !mover.is_immune(field.kind) {
                let tolerated = flags.contains(QueryFlags::IGNORE_FIELD_DAMAGE)
                    && mover.can_walk_on_field(field.kind);
                if !tolerated {
                    return Err(PlacementError::NotPossible);
                }
            }
        }
        Ok(())
    }

    fn query_add_player(
        &self,
        mover: &Creature,
        flags: QueryFlags,
        registry: &CreatureRegistry,
    ) -> Result<(), PlacementError> {
        if flags.contains(QueryFlags::IGNORE_BLOCK_ITEM) {
            if self.has_flag(TileFlags::IMMOVABLE_BLOCK_SOLID) {
                return Err(PlacementError::NotPossible);
            }
        } else if self.has_flag(TileFlags::BLOCK_SOLID) {
            return Err(PlacementError::NotEnoughRoom);
        }
        if let Some(house) = self.house_id() {
            if !mover.access && !mover.house_access.contains(&house) {
                return Err(PlacementError::NotInvited);
            }
        }
        if !flags.contains(QueryFlags::IGNORE_BLOCK_CREATURE)
            && !mover.access
            && self.occupants(mover, registry).any(|other| !other.ghost)
        {
            return Err(PlacementError::NotPossible);
        }
        if flags.contains(QueryFlags::PATHFINDING)
            && !flags.contains(QueryFlags::IGNORE_FIELD_DAMAGE)
        {
            if let Some(field) = self.field() {
                if field.is_damaging() && !mover.is_immune(field.kind) {
                    return Err(PlacementError::NotPossible);
                }
            }
        }
        Ok(())
    }

    fn query_add_npc(
        &self,
        mover: &Creature,
        flags: QueryFlags,
        registry: &CreatureRegistry,
    ) -> Result<(), PlacementError> {
        if !flags.contains(QueryFlags::IGNORE_BLOCK_ITEM) && self.has_flag(TileFlags::BLOCK_SOLID)
        {
            return Err(PlacementError::NotEnoughRoom);
        }
        if !flags.contains(QueryFlags::IGNORE_BLOCK_CREATURE)
            && self.occupants(mover, registry).next().is_some()
        {
            return Err(PlacementError::NotEnoughRoom);
        }
        Ok(())
    }
}
