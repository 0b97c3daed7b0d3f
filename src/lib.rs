pub mod combat;
pub mod config;
pub mod entities;
pub mod telemetry;
pub mod world;

pub use combat::area::{AreaHit, AreaShape};
pub use config::{AppConfig, ConfigError, WorldConfig};
pub use entities::creature::{Creature, CreatureId, CreatureRegistry};
pub use world::pathfinding::{FindPathParams, PathfinderConfig};
pub use world::position::{Direction, Position};
pub use world::scenario::Scenario;
pub use world::spectators::{SpectatorQuery, SpectatorVec};
pub use world::state::{MoveError, TickOutcome, WorldState};

/// Counters summed over a whole run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub moves: usize,
    pub thinking: usize,
    pub idle: usize,
    pub stuck: usize,
    pub teleports: usize,
    pub path_searches: usize,
    pub path_failures: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        self.moves += outcome.moves.len();
        self.thinking += outcome.thinking;
        self.idle += outcome.idle;
        self.stuck += outcome.stuck;
        self.teleports += outcome.teleports;
        self.path_searches += outcome.path_searches;
        self.path_failures += outcome.path_failures;
    }
}

/// Runs `ticks` ticks of an already built world.
pub fn simulate(world: &mut WorldState, ticks: u64) -> RunSummary {
    let mut summary = RunSummary::default();
    for _ in 0..ticks {
        let outcome = world.tick();
        summary.record(&outcome);
    }
    summary
}

pub fn run(args: &[String]) -> Result<(), String> {
    let config = AppConfig::from_args(args)?;
    if let Some(log_dir) = &config.log_dir {
        telemetry::logging::init(log_dir, log::LevelFilter::Debug)?;
    }

    let mut scenario = Scenario::load(&config.scenario).map_err(|err| err.to_string())?;
    if config.seed.is_some() {
        scenario.world.seed = config.seed;
    }
    let mut world = scenario.build();
    log::info!(
        target: "map",
        "running {} for {} ticks",
        config.scenario.display(),
        config.ticks
    );

    let summary = simulate(&mut world, config.ticks);
    let cache = world.map.spectator_cache().stats();
    println!("tibia-world: {}", config.scenario.display());
    println!("- tiles: {}", world.map.tile_count());
    println!("- creatures: {}", world.creatures.len());
    println!("- ticks: {}", summary.ticks);
    println!("- moves: {}", summary.moves);
    println!(
        "- monsters: thinking={}, idle={}, stuck={}, teleports={}",
        summary.thinking, summary.idle, summary.stuck, summary.teleports
    );
    println!(
        "- path searches: {} ({} failed)",
        summary.path_searches, summary.path_failures
    );
    println!("- spectator cache hit rate: {:.2}", cache.hit_rate());
    log::logger().flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORRIDOR: &str = r#"
world:
  seed: 9
ground:
  - { x1: 200, y1: 200, x2: 230, y2: 210, z: 7 }
players:
  - name: Paladin
    position: { x: 202, y: 205, z: 7 }
monsters:
  - name: Wolf
    position: { x: 212, y: 205, z: 7 }
    spawn_radius: 20
"#;

    #[test]
    fn simulation_counts_ticks_and_moves() {
        let mut world = Scenario::from_yaml(CORRIDOR).unwrap().build();
        let summary = simulate(&mut world, 120);
        assert_eq!(summary.ticks, 120);
        assert!(summary.moves > 0);
        assert_eq!(summary.idle, 0);
        assert_eq!(world.clock.now().0, 120);
    }

    #[test]
    fn run_reports_missing_scenario() {
        let args = vec![
            "tibia-world".to_string(),
            std::env::temp_dir()
                .join("tibia-world-no-such-scenario.yaml")
                .display()
                .to_string(),
            "5".to_string(),
        ];
        let err = run(&args).unwrap_err();
        assert!(err.starts_with("failed to read"));
    }

    #[test]
    fn run_executes_scenario_file() {
        let path = std::env::temp_dir().join(format!("tibia-world-run-{}.yaml", std::process::id()));
        std::fs::write(&path, CORRIDOR).unwrap();
        let args = vec!["tibia-world".to_string(), path.display().to_string(), "10".to_string()];
        let result = run(&args);
        let _ = std::fs::remove_file(&path);
        assert!(result.is_ok());
    }
}
