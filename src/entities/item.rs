use serde::Deserialize;
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemTypeId(pub u16);

/// Static capability bits of an item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemProperties(u16);

impl ItemProperties {
    pub const NONE: Self = Self(0);
    pub const BLOCK_SOLID: Self = Self(1 << 0);
    pub const BLOCK_PATH: Self = Self(1 << 1);
    pub const BLOCK_PROJECTILE: Self = Self(1 << 2);
    pub const MOVEABLE: Self = Self(1 << 3);
    pub const GROUND: Self = Self(1 << 4);
    pub const SUPPORTS_HANGABLE: Self = Self(1 << 5);
    pub const TELEPORT: Self = Self(1 << 6);

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ItemProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Derived properties queried by tiles; several combine two capability bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemProperty {
    BlockSolid,
    ImmovableBlockSolid,
    BlockPath,
    ImmovableBlockPath,
    NoFieldBlockPath,
    ImmovableNoFieldBlockPath,
    BlockProjectile,
    SupportsHangable,
    Moveable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Fire,
    Energy,
    Poison,
}

impl FieldKind {
    pub const fn bit(self) -> u8 {
        match self {
            FieldKind::Fire => 1 << 0,
            FieldKind::Energy => 1 << 1,
            FieldKind::Poison => 1 << 2,
        }
    }
}

/// Set of field kinds, used for immunities and "may walk over" abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldSet(u8);

impl FieldSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, kind: FieldKind) -> Self {
        self.0 |= kind.bit();
        self
    }

    pub fn contains(self, kind: FieldKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

impl FromIterator<FieldKind> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), FieldSet::with)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicField {
    pub kind: FieldKind,
    pub damage: u32,
}

impl MagicField {
    pub fn is_damaging(&self) -> bool {
        self.damage > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorChange {
    Down,
    North,
    South,
    East,
    West,
    SouthAlt,
    EastAlt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub type_id: ItemTypeId,
    pub properties: ItemProperties,
    /// Always-on-top items carry their stacking order; lower is closer to the ground.
    pub top_order: Option<u8>,
    pub floor_change: Option<FloorChange>,
    pub field: Option<MagicField>,
}

impl Item {
    pub fn new(type_id: ItemTypeId, properties: ItemProperties) -> Self {
        Self {
            type_id,
            properties,
            top_order: None,
            floor_change: None,
            field: None,
        }
    }

    pub fn ground(type_id: ItemTypeId) -> Self {
        Self::new(type_id, ItemProperties::GROUND)
    }

    /// Immovable wall: blocks walking, pathing and projectiles.
    pub fn wall(type_id: ItemTypeId) -> Self {
        Self::new(
            type_id,
            ItemProperties::BLOCK_SOLID
                | ItemProperties::BLOCK_PATH
                | ItemProperties::BLOCK_PROJECTILE
                | ItemProperties::SUPPORTS_HANGABLE,
        )
        .with_top_order(1)
    }

    pub fn field(type_id: ItemTypeId, kind: FieldKind, damage: u32) -> Self {
        Self {
            field: Some(MagicField { kind, damage }),
            ..Self::new(type_id, ItemProperties::BLOCK_PATH | ItemProperties::MOVEABLE)
        }
    }

    pub fn with_top_order(mut self, order: u8) -> Self {
        self.top_order = Some(order);
        self
    }

    pub fn with_floor_change(mut self, floor_change: FloorChange) -> Self {
        self.floor_change = Some(floor_change);
        self.top_order.get_or_insert(2);
        self
    }

    pub fn is_ground(&self) -> bool {
        self.properties.contains(ItemProperties::GROUND)
    }

    pub fn is_always_on_top(&self) -> bool {
        self.top_order.is_some()
    }

    pub fn is_teleport(&self) -> bool {
        self.properties.contains(ItemProperties::TELEPORT)
    }

    pub fn has_property(&self, property: ItemProperty) -> bool {
        let props = self.properties;
        let moveable = props.contains(ItemProperties::MOVEABLE);
        let block_path = props.contains(ItemProperties::BLOCK_PATH);
        match property {
            ItemProperty::BlockSolid => props.contains(ItemProperties::BLOCK_SOLID),
            ItemProperty::ImmovableBlockSolid => {
                props.contains(ItemProperties::BLOCK_SOLID) && !moveable
            }
            ItemProperty::BlockPath => block_path,
            ItemProperty::ImmovableBlockPath => block_path && !moveable,
            ItemProperty::NoFieldBlockPath => block_path && self.field.is_none(),
            ItemProperty::ImmovableNoFieldBlockPath => {
                block_path && self.field.is_none() && !moveable
            }
            ItemProperty::BlockProjectile => props.contains(ItemProperties::BLOCK_PROJECTILE),
            ItemProperty::SupportsHangable => props.contains(ItemProperties::SUPPORTS_HANGABLE),
            ItemProperty::Moveable => moveable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_is_immovable_and_blocking() {
        let wall = Item::wall(ItemTypeId(1100));
        assert!(wall.has_property(ItemProperty::BlockSolid));
        assert!(wall.has_property(ItemProperty::ImmovableBlockSolid));
        assert!(wall.has_property(ItemProperty::ImmovableNoFieldBlockPath));
        assert!(wall.has_property(ItemProperty::BlockProjectile));
        assert!(wall.is_always_on_top());
    }

    #[test]
    fn fields_block_paths_but_not_as_obstacles() {
        let fire = Item::field(ItemTypeId(1492), FieldKind::Fire, 20);
        assert!(fire.has_property(ItemProperty::BlockPath));
        assert!(!fire.has_property(ItemProperty::NoFieldBlockPath));
        assert!(!fire.has_property(ItemProperty::BlockSolid));
        assert!(fire.field.map(|field| field.is_damaging()).unwrap_or(false));
    }

    #[test]
    fn moveable_solid_is_not_immovable() {
        let crate_item = Item::new(
            ItemTypeId(1739),
            ItemProperties::BLOCK_SOLID | ItemProperties::MOVEABLE,
        );
        assert!(crate_item.has_property(ItemProperty::BlockSolid));
        assert!(!crate_item.has_property(ItemProperty::ImmovableBlockSolid));
    }

    #[test]
    fn field_set_collects_kinds() {
        let set: FieldSet = [FieldKind::Fire, FieldKind::Poison].into_iter().collect();
        assert!(set.contains(FieldKind::Fire));
        assert!(!set.contains(FieldKind::Energy));
        assert!(set.contains(FieldKind::Poison));
    }
}
