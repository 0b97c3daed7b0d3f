use crate::entities::creature::CreatureId;
use crate::entities::item::Item;
use crate::world::position::{Position, MAP_MAX_LAYERS};
use crate::world::spectators::SpectatorCache;
use crate::world::tile::Tile;
use crate::world::viewport::ViewportSize;

pub const FLOOR_BITS: u32 = 3;
pub const FLOOR_SIZE: u16 = 1 << FLOOR_BITS;
pub const FLOOR_MASK: u16 = FLOOR_SIZE - 1;
const FLOOR_CELLS: usize = (FLOOR_SIZE as usize) * (FLOOR_SIZE as usize);
const ROOT_LEVEL: u32 = 15;

/// One z-layer of a leaf: 8x8 lazily created tiles.
#[derive(Debug)]
pub struct Floor {
    tiles: [Option<Box<Tile>>; FLOOR_CELLS],
}

impl Default for Floor {
    fn default() -> Self {
        Self {
            tiles: std::array::from_fn(|_| None),
        }
    }
}

impl Floor {
    fn slot(x: u16, y: u16) -> usize {
        usize::from(x & FLOOR_MASK) * usize::from(FLOOR_SIZE) + usize::from(y & FLOOR_MASK)
    }

    pub fn tile(&self, x: u16, y: u16) -> Option<&Tile> {
        self.tiles[Self::slot(x, y)].as_deref()
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter().filter_map(|tile| tile.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeafId(u32);

impl LeafId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// 8x8 column of the world holding all 16 floors plus flattened creature lists.
#[derive(Debug, Default)]
pub struct Leaf {
    floors: [Option<Box<Floor>>; MAP_MAX_LAYERS as usize],
    creatures: Vec<CreatureId>,
    players: Vec<CreatureId>,
    pub(super) south: Option<LeafId>,
    pub(super) east: Option<LeafId>,
}

impl Leaf {
    pub fn floor(&self, z: u8) -> Option<&Floor> {
        self.floors.get(usize::from(z))?.as_deref()
    }

    pub fn creatures(&self) -> &[CreatureId] {
        &self.creatures
    }

    pub fn players(&self) -> &[CreatureId] {
        &self.players
    }

    pub fn south(&self) -> Option<LeafId> {
        self.south
    }

    pub fn east(&self) -> Option<LeafId> {
        self.east
    }

    pub(crate) fn add_creature(&mut self, id: CreatureId, is_player: bool) {
        self.creatures.push(id);
        if is_player {
            self.players.push(id);
        }
    }

    pub(crate) fn remove_creature(&mut self, id: CreatureId, is_player: bool) {
        if let Some(index) = self.creatures.iter().position(|other| *other == id) {
            self.creatures.swap_remove(index);
        }
        if is_player {
            if let Some(index) = self.players.iter().position(|other| *other == id) {
                self.players.swap_remove(index);
            }
        }
    }
}

#[derive(Debug)]
enum QTreeNode {
    Branch(Box<[Option<QTreeNode>; 4]>),
    Leaf(LeafId),
}

fn child_index(x: u16, y: u16, level: u32) -> usize {
    usize::from((x >> level) & 1) | (usize::from((y >> level) & 1) << 1)
}

/// Sparse quadtree over the 65536x65536 plane.
///
/// Each branch level consumes one bit of x and y, from bit 15 down to bit 3;
/// the remaining three bits address a tile inside the leaf's floors.
#[derive(Debug)]
pub struct Map {
    root: QTreeNode,
    pub(super) leaves: Vec<Leaf>,
    tile_count: usize,
    pub(super) spectators: SpectatorCache,
    viewport: ViewportSize,
}

impl Default for Map {
    fn default() -> Self {
        Self::new(ViewportSize::default(), 1024)
    }
}

impl Map {
    pub fn new(viewport: ViewportSize, chunk_cache_capacity: usize) -> Self {
        Self {
            root: QTreeNode::Branch(Box::default()),
            leaves: Vec::new(),
            tile_count: 0,
            spectators: SpectatorCache::new(chunk_cache_capacity),
            viewport,
        }
    }

    pub fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaf_id(&self, x: u16, y: u16) -> Option<LeafId> {
        let mut node = &self.root;
        let mut level = ROOT_LEVEL;
        loop {
            match node {
                QTreeNode::Leaf(id) => return Some(*id),
                QTreeNode::Branch(children) => {
                    node = children[child_index(x, y, level)].as_ref()?;
                    level = level.checked_sub(1)?;
                }
            }
        }
    }

    pub fn leaf(&self, id: LeafId) -> Option<&Leaf> {
        self.leaves.get(id.index())
    }

    pub fn leaf_at(&self, x: u16, y: u16) -> Option<&Leaf> {
        self.leaf_id(x, y).and_then(|id| self.leaf(id))
    }

    fn create_leaf(&mut self, x: u16, y: u16) -> LeafId {
        let leaves = &mut self.leaves;
        let mut created = false;
        let mut node = &mut self.root;
        let mut level = ROOT_LEVEL;
        let id = loop {
            let children = match node {
                QTreeNode::Leaf(id) => break *id,
                QTreeNode::Branch(children) => children,
            };
            let leaf_level = level == FLOOR_BITS;
            node = children[child_index(x, y, level)].get_or_insert_with(|| {
                if leaf_level {
                    created = true;
                    leaves.push(Leaf::default());
                    QTreeNode::Leaf(LeafId((leaves.len() - 1) as u32))
                } else {
                    QTreeNode::Branch(Box::default())
                }
            });
            level = level.saturating_sub(1);
        };
        if created {
            self.link_siblings(id, x, y);
        }
        id
    }

    fn link_siblings(&mut self, id: LeafId, x: u16, y: u16) {
        if let Some(north) = y.checked_sub(FLOOR_SIZE).and_then(|ny| self.leaf_id(x, ny)) {
            self.leaves[north.index()].south = Some(id);
        }
        if let Some(west) = x.checked_sub(FLOOR_SIZE).and_then(|nx| self.leaf_id(nx, y)) {
            self.leaves[west.index()].east = Some(id);
        }
        let south = y.checked_add(FLOOR_SIZE).and_then(|ny| self.leaf_id(x, ny));
        let east = x.checked_add(FLOOR_SIZE).and_then(|nx| self.leaf_id(nx, y));
        let leaf = &mut self.leaves[id.index()];
        leaf.south = south;
        leaf.east = east;
    }

    pub fn tile(&self, position: Position) -> Option<&Tile> {
        if position.z >= MAP_MAX_LAYERS {
            return None;
        }
        self.leaf_at(position.x, position.y)?
            .floor(position.z)?
            .tile(position.x, position.y)
    }

    /// Mutable tile access for item changes; creatures move only through the
    /// placement operations.
    pub fn tile_mut(&mut self, position: Position) -> Option<&mut Tile> {
        if position.z >= MAP_MAX_LAYERS {
            return None;
        }
        let id = self.leaf_id(position.x, position.y)?;
        self.leaves[id.index()].floors[usize::from(position.z)]
            .as_deref_mut()?
            .tiles[Floor::slot(position.x, position.y)]
            .as_deref_mut()
    }

    /// Stores a tile at its own position. An existing tile absorbs the new
    /// tile's ground, items and zone flags instead of being replaced.
    pub fn set_tile(&mut self, mut tile: Tile) -> bool {
        let position = tile.position();
        if position.z >= MAP_MAX_LAYERS {
            log::warn!(target: "map", "set_tile: floor out of range at {}", position);
            return false;
        }
        let id = self.create_leaf(position.x, position.y);
        let floor = self.leaves[id.index()].floors[usize::from(position.z)]
            .get_or_insert_with(Box::default);
        let slot = &mut floor.tiles[Floor::slot(position.x, position.y)];
        match slot {
            Some(existing) => {
                let zones = tile.flags();
                for item in tile.clear_items() {
                    existing.add_item(item);
                }
                existing.set_zone(zones);
            }
            None => {
                tile.take_creatures();
                *slot = Some(Box::new(tile));
                self.tile_count += 1;
            }
        }
        true
    }

    /// Empties a tile, returning its items and the creatures that stood on it.
    /// The creatures are already unlinked from the tile and the leaf.
    pub(crate) fn clear_tile(
        &mut self,
        position: Position,
        is_player: impl Fn(CreatureId) -> bool,
    ) -> Option<(Vec<Item>, Vec<CreatureId>)> {
        let id = self.leaf_id(position.x, position.y)?;
        let tile = self.tile_mut(position)?;
        let items = tile.clear_items();
        let creatures = tile.take_creatures();
        let leaf = &mut self.leaves[id.index()];
        for creature in &creatures {
            leaf.remove_creature(*creature, is_player(*creature));
        }
        if !creatures.is_empty() {
            self.spectators.clear();
        }
        Some((items, creatures))
    }

    /// Links a creature into its tile and leaf; fails when no tile exists.
    pub(crate) fn add_creature(&mut self, id: CreatureId, position: Position, is_player: bool) -> bool {
        let Some(leaf) = self.leaf_id(position.x, position.y) else {
            return false;
        };
        let Some(tile) = self.tile_mut(position) else {
            return false;
        };
        tile.add_creature(id);
        self.leaves[leaf.index()].add_creature(id, is_player);
        self.spectators.clear();
        true
    }

    pub(crate) fn remove_creature(&mut self, id: CreatureId, position: Position, is_player: bool) -> bool {
        let Some(leaf) = self.leaf_id(position.x, position.y) else {
            return false;
        };
        let removed = self
            .tile_mut(position)
            .map(|tile| tile.remove_creature(id))
            .unwrap_or(false);
        if removed {
            self.leaves[leaf.index()].remove_creature(id, is_player);
            self.spectators.clear();
        }
        removed
    }

    /// Moves a creature between tiles, switching leaf lists when the leaf changes.
    pub(crate) fn move_creature(
        &mut self,
        id: CreatureId,
        from: Position,
        to: Position,
        is_player: bool,
    ) -> bool {
        let (Some(old_leaf), Some(new_leaf)) = (self.leaf_id(from.x, from.y), self.leaf_id(to.x, to.y))
        else {
            return false;
        };
        if self.tile(to).is_none() || !self.tile(from).map(|t| t.has_creature(id)).unwrap_or(false) {
            return false;
        }
        if let Some(tile) = self.tile_mut(from) {
            tile.remove_creature(id);
        }
        if let Some(tile) = self.tile_mut(to) {
            tile.add_creature(id);
        }
        if old_leaf != new_leaf {
            self.leaves[old_leaf.index()].remove_creature(id, is_player);
            self.leaves[new_leaf.index()].add_creature(id, is_player);
        }
        self.spectators.clear();
        true
    }
}
