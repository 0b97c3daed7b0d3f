use crate::entities::creature::{CreatureId, CreatureRegistry};
use crate::world::map::{LeafId, Map, FLOOR_MASK, FLOOR_SIZE};
use crate::world::position::{Position, MAP_MAX_LAYERS};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// De-duplicated list of creatures observing (or observed in) an area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpectatorVec(Vec<CreatureId>);

impl SpectatorVec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `ids`, skipping handles already present.
    pub fn add_spectators(&mut self, ids: &[CreatureId]) {
        if self.0.is_empty() {
            self.0.extend_from_slice(ids);
            return;
        }
        for id in ids {
            if !self.0.contains(id) {
                self.0.push(*id);
            }
        }
    }

    pub fn contains(&self, id: CreatureId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[CreatureId] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CreatureId> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a SpectatorVec {
    type Item = &'a CreatureId;
    type IntoIter = std::slice::Iter<'a, CreatureId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Area query parameters. Ranges of 0 fall back to the map's viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectatorQuery {
    pub center: Position,
    pub multifloor: bool,
    pub only_players: bool,
    pub min_range_x: u16,
    pub max_range_x: u16,
    pub min_range_y: u16,
    pub max_range_y: u16,
}

impl SpectatorQuery {
    pub fn new(center: Position) -> Self {
        Self {
            center,
            multifloor: false,
            only_players: false,
            min_range_x: 0,
            max_range_x: 0,
            min_range_y: 0,
            max_range_y: 0,
        }
    }

    pub fn multifloor(mut self, multifloor: bool) -> Self {
        self.multifloor = multifloor;
        self
    }

    pub fn only_players(mut self, only_players: bool) -> Self {
        self.only_players = only_players;
        self
    }

    /// Symmetric range around the center.
    pub fn range(mut self, range_x: u16, range_y: u16) -> Self {
        self.min_range_x = range_x;
        self.max_range_x = range_x;
        self.min_range_y = range_y;
        self.max_range_y = range_y;
        self
    }

    pub fn ranges(mut self, min_x: u16, max_x: u16, min_y: u16, max_y: u16) -> Self {
        self.min_range_x = min_x;
        self.max_range_x = max_x;
        self.min_range_y = min_y;
        self.max_range_y = max_y;
        self
    }
}

/// Floors scanned for a multi-floor query centered on `z`.
pub fn floor_range(z: u8, multifloor: bool) -> (u8, u8) {
    if !multifloor {
        return (z, z);
    }
    if z > 7 {
        (z.saturating_sub(2), (z + 2).min(MAP_MAX_LAYERS - 1))
    } else if z == 6 {
        (0, 8)
    } else if z == 7 {
        (0, 9)
    } else {
        (0, 7)
    }
}

/// Scan rectangle rounded out to leaf boundaries, plus floors and filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ChunkKey {
    x1: u16,
    y1: u16,
    x2: u16,
    y2: u16,
    min_z: u8,
    max_z: u8,
    only_players: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub clears: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64) / (total as f64)
        }
    }
}

/// Two-tier spectator cache, dropped wholesale whenever a creature appears,
/// disappears or moves.
#[derive(Debug)]
pub struct SpectatorCache {
    positions: HashMap<Position, Vec<CreatureId>>,
    players: HashMap<Position, Vec<CreatureId>>,
    chunks: LruCache<ChunkKey, Vec<(CreatureId, Position)>>,
    stats: CacheStats,
}

impl SpectatorCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            positions: HashMap::new(),
            players: HashMap::new(),
            chunks: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    pub fn clear(&mut self) {
        if self.positions.is_empty() && self.players.is_empty() && self.chunks.is_empty() {
            return;
        }
        self.positions.clear();
        self.players.clear();
        self.chunks.clear();
        self.stats.clears += 1;
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.positions.len() + self.players.len() + self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact bounds of one query.
#[derive(Debug, Clone, Copy)]
struct QueryBounds {
    center: Position,
    min_x: i32,
    max_x: i32,
    min_y: i32,
    max_y: i32,
    min_z: u8,
    max_z: u8,
}

impl QueryBounds {
    /// Floors other than the center's are shifted by their z offset.
    fn contains(&self, position: Position) -> bool {
        if position.z < self.min_z || position.z > self.max_z {
            return false;
        }
        let offset_z = self.center.offset_z(position);
        let x = i32::from(position.x);
        let y = i32::from(position.y);
        let cx = i32::from(self.center.x);
        let cy = i32::from(self.center.y);
        x >= cx - self.min_x + offset_z
            && x <= cx + self.max_x + offset_z
            && y >= cy - self.min_y + offset_z
            && y <= cy + self.max_y + offset_z
    }
}

fn clamp_coordinate(value: i32) -> u16 {
    value.clamp(0, i32::from(u16::MAX)) as u16
}

impl Map {
    /// Appends to `out` every creature inside the query area.
    pub fn get_spectators(
        &mut self,
        registry: &CreatureRegistry,
        out: &mut SpectatorVec,
        query: &SpectatorQuery,
    ) {
        let center = query.center;
        if center.z >= MAP_MAX_LAYERS {
            return;
        }
        let viewport = self.viewport();
        let or_default = |range: u16, default: u16| if range == 0 { default } else { range };
        let min_x = or_default(query.min_range_x, viewport.max_x);
        let max_x = or_default(query.max_range_x, viewport.max_x);
        let min_y = or_default(query.min_range_y, viewport.max_y);
        let max_y = or_default(query.max_range_y, viewport.max_y);

        let default_view = query.multifloor
            && min_x == viewport.max_x
            && max_x == viewport.max_x
            && min_y == viewport.max_y
            && max_y == viewport.max_y;
        if default_view {
            let cached = if query.only_players {
                self.spectators.players.get(&center)
            } else {
                self.spectators.positions.get(&center)
            };
            if let Some(ids) = cached {
                out.add_spectators(ids);
                self.spectators.stats.hits += 1;
                return;
            }
        }

        let (min_z, max_z) = floor_range(center.z, query.multifloor);
        let bounds = QueryBounds {
            center,
            min_x: i32::from(min_x),
            max_x: i32::from(max_x),
            min_y: i32::from(min_y),
            max_y: i32::from(max_y),
            min_z,
            max_z,
        };
        let cx = i32::from(center.x);
        let cy = i32::from(center.y);
        let cz = i32::from(center.z);
        let x1 = clamp_coordinate(cx - bounds.min_x + (cz - i32::from(max_z)));
        let y1 = clamp_coordinate(cy - bounds.min_y + (cz - i32::from(max_z)));
        let x2 = clamp_coordinate(cx + bounds.max_x + (cz - i32::from(min_z)));
        let y2 = clamp_coordinate(cy + bounds.max_y + (cz - i32::from(min_z)));
        let key = ChunkKey {
            x1: x1 & !FLOOR_MASK,
            y1: y1 & !FLOOR_MASK,
            x2: x2 | FLOOR_MASK,
            y2: y2 | FLOOR_MASK,
            min_z,
            max_z,
            only_players: query.only_players,
        };

        let found: Vec<CreatureId> = match self.spectators.chunks.get(&key) {
            Some(candidates) => {
                self.spectators.stats.hits += 1;
                filter_exact(candidates, &bounds)
            }
            None => {
                self.spectators.stats.misses += 1;
                let candidates = self.scan_leaves(registry, &key);
                let found = filter_exact(&candidates, &bounds);
                self.spectators.chunks.put(key, candidates);
                found
            }
        };

        if default_view {
            let cache = if query.only_players {
                &mut self.spectators.players
            } else {
                &mut self.spectators.positions
            };
            cache.insert(center, found.clone());
        }
        out.add_spectators(&found);
    }

    /// Walks every leaf of the rounded rectangle along sibling links,
    /// descending from the root only where a link is missing.
    fn scan_leaves(&self, registry: &CreatureRegistry, key: &ChunkKey) -> Vec<(CreatureId, Position)> {
        let mut found = Vec::new();
        let step = u32::from(FLOOR_SIZE);
        let leaf_at = |x: u32, y: u32| -> Option<LeafId> {
            let x = u16::try_from(x).ok()?;
            let y = u16::try_from(y).ok()?;
            self.leaf_id(x, y)
        };

        let mut row_start = self.leaf_id(key.x1, key.y1);
        let mut ny = u32::from(key.y1);
        while ny <= u32::from(key.y2) {
            let mut current = row_start;
            let mut nx = u32::from(key.x1);
            while nx <= u32::from(key.x2) {
                match current.and_then(|id| self.leaf(id)) {
                    Some(leaf) => {
                        let ids = if key.only_players {
                            leaf.players()
                        } else {
                            leaf.creatures()
                        };
                        for id in ids {
                            let Some(position) = registry.position(*id) else {
                                continue;
                            };
                            if position.z >= key.min_z && position.z <= key.max_z {
                                found.push((*id, position));
                            }
                        }
                        current = leaf.east();
                    }
                    None => current = leaf_at(nx + step, ny),
                }
                nx += step;
            }
            row_start = match row_start.and_then(|id| self.leaf(id)) {
                Some(leaf) => leaf.south(),
                None => leaf_at(u32::from(key.x1), ny + step),
            };
            ny += step;
        }
        found
    }

    pub fn clear_spectator_cache(&mut self) {
        self.spectators.clear();
    }

    pub fn spectator_cache(&self) -> &SpectatorCache {
        &self.spectators
    }
}

fn filter_exact(candidates: &[(CreatureId, Position)], bounds: &QueryBounds) -> Vec<CreatureId> {
    candidates
        .iter()
        .filter(|(_, position)| bounds.contains(*position))
        .map(|(id, _)| *id)
        .collect()
}
