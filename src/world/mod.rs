pub mod map;
pub mod movement;
pub mod pathfinding;
pub mod position;
pub mod scenario;
pub mod sight;
pub mod spectators;
pub mod state;
pub mod tile;
pub mod time;
pub mod viewport;
pub mod walk_cache;
