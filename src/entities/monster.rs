use crate::entities::creature::CreatureId;
use crate::entities::item::FieldKind;
use crate::world::position::{Direction, Position};
use crate::world::time::GameTick;
use serde::Deserialize;
use std::collections::VecDeque;

/// Movement-relevant parameters of a monster race.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonsterType {
    /// Distance the monster tries to keep from its target; 1 is melee.
    pub target_distance: u32,
    /// Farthest distance from which the monster can attack.
    pub attack_range: u32,
    /// Health at or below which the monster flees.
    pub run_away_health: i32,
    /// Percent chance per think to stand still instead of dancing around the target.
    pub static_attack_chance: u32,
    /// Beyond this distance the table-driven chase gives way to a full path search.
    pub chase_range: u32,
    pub can_push_items: bool,
    pub can_push_creatures: bool,
    pub pushable: bool,
    pub immunities: Vec<FieldKind>,
    /// Field kinds the monster walks over despite the damage.
    pub walks_on: Vec<FieldKind>,
}

impl Default for MonsterType {
    fn default() -> Self {
        Self {
            target_distance: 1,
            attack_range: 1,
            run_away_health: 0,
            static_attack_chance: 95,
            chase_range: 8,
            can_push_items: false,
            can_push_creatures: false,
            pushable: true,
            immunities: Vec::new(),
            walks_on: Vec::new(),
        }
    }
}

/// Per-monster decision state carried between think ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonsterBrain {
    pub race: MonsterType,
    pub target: Option<CreatureId>,
    /// Committed path and the goal position it was computed for.
    pub path: VecDeque<Direction>,
    pub path_goal: Option<Position>,
    /// The committed path runs away from the target.
    pub fleeing: bool,
    /// Thinks left during which the target is kept and fleeing is suppressed.
    pub challenge_ticks: u32,
    pub last_step: GameTick,
    pub walking_home: bool,
}

impl MonsterBrain {
    pub fn new(race: MonsterType) -> Self {
        Self {
            race,
            target: None,
            path: VecDeque::new(),
            path_goal: None,
            fleeing: false,
            challenge_ticks: 0,
            last_step: GameTick(0),
            walking_home: false,
        }
    }

    pub fn commit_path(&mut self, goal: Position, steps: Vec<Direction>) {
        self.path = steps.into();
        self.path_goal = Some(goal);
    }

    pub fn drop_path(&mut self) {
        self.path.clear();
        self.path_goal = None;
    }

    /// Next committed step, valid only while the goal has not moved.
    pub fn committed_step(&self, goal: Position) -> Option<Direction> {
        if self.path_goal != Some(goal) {
            return None;
        }
        self.path.front().copied()
    }
}
