use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct GameTick(pub u64);

/// Fixed-length simulation clock. All world mutation happens on tick boundaries.
#[derive(Debug, Clone)]
pub struct GameClock {
    tick_length: Duration,
    tick: GameTick,
}

impl GameClock {
    pub fn new(tick_length: Duration) -> Self {
        let tick_length = if tick_length.is_zero() {
            Duration::from_millis(1)
        } else {
            tick_length
        };
        Self {
            tick_length,
            tick: GameTick(0),
        }
    }

    pub fn tick_length(&self) -> Duration {
        self.tick_length
    }

    pub fn now(&self) -> GameTick {
        self.tick
    }

    pub fn advance(&mut self, ticks: u64) -> GameTick {
        self.tick.0 = self.tick.0.saturating_add(ticks);
        self.tick
    }

    pub fn ticks_from_duration_round_up(&self, duration: Duration) -> u64 {
        if duration.is_zero() {
            return 0;
        }
        let tick_nanos = self.tick_length.as_nanos().max(1);
        let duration_nanos = duration.as_nanos();
        let ticks = (duration_nanos + tick_nanos - 1) / tick_nanos;
        ticks.min(u64::MAX as u128) as u64
    }

    pub fn duration_for_ticks(&self, ticks: u64) -> Duration {
        let nanos = self
            .tick_length
            .as_nanos()
            .saturating_mul(ticks as u128)
            .min(u64::MAX as u128) as u64;
        Duration::from_nanos(nanos)
    }

    /// Time elapsed between `since` and now.
    pub fn elapsed_since(&self, since: GameTick) -> Duration {
        self.duration_for_ticks(self.tick.0.saturating_sub(since.0))
    }
}

/// Time a creature at `creature_speed` needs to cross one tile of
/// `ground_speed`. Diagonal steps cost three times as much; never zero.
pub fn step_duration(ground_speed: u16, creature_speed: u16, diagonal: bool) -> Duration {
    let mut ground = u64::from(ground_speed.max(1));
    if diagonal {
        ground *= 3;
    }
    let millis = ground * 1000 / u64::from(creature_speed.max(1));
    Duration::from_millis(millis.max(1))
}

/// Earliest tick at which an action may run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cooldown {
    ready_at: GameTick,
}

impl Cooldown {
    pub fn new(ready_at: GameTick) -> Self {
        Self { ready_at }
    }

    pub fn ready_at(&self) -> GameTick {
        self.ready_at
    }

    pub fn is_ready(&self, clock: &GameClock) -> bool {
        clock.now() >= self.ready_at
    }

    pub fn remaining_ticks(&self, clock: &GameClock) -> u64 {
        self.ready_at.0.saturating_sub(clock.now().0)
    }

    pub fn reset_from_now_ticks(&mut self, clock: &GameClock, ticks: u64) {
        self.ready_at = GameTick(clock.now().0.saturating_add(ticks));
    }

    pub fn reset_from_now_duration(&mut self, clock: &GameClock, duration: Duration) {
        let ticks = clock.ticks_from_duration_round_up(duration);
        self.reset_from_now_ticks(clock, ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_round_up_to_whole_ticks() {
        let clock = GameClock::new(Duration::from_millis(50));
        assert_eq!(clock.ticks_from_duration_round_up(Duration::from_millis(0)), 0);
        assert_eq!(clock.ticks_from_duration_round_up(Duration::from_millis(1)), 1);
        assert_eq!(clock.ticks_from_duration_round_up(Duration::from_millis(100)), 2);
        assert_eq!(clock.ticks_from_duration_round_up(Duration::from_millis(101)), 3);
    }

    #[test]
    fn cooldown_ready_after_reset_elapses() {
        let mut clock = GameClock::new(Duration::from_millis(50));
        let mut cooldown = Cooldown::default();
        assert!(cooldown.is_ready(&clock));
        cooldown.reset_from_now_duration(&clock, Duration::from_millis(120));
        assert_eq!(cooldown.remaining_ticks(&clock), 3);
        clock.advance(2);
        assert!(!cooldown.is_ready(&clock));
        clock.advance(1);
        assert!(cooldown.is_ready(&clock));
    }

    #[test]
    fn step_duration_follows_ground_and_speed() {
        assert_eq!(step_duration(150, 220, false), Duration::from_millis(681));
        assert_eq!(step_duration(150, 220, true), Duration::from_millis(2045));
        assert_eq!(step_duration(100, 0, false), Duration::from_millis(100_000));
        assert_eq!(step_duration(1, 60_000, false), Duration::from_millis(1));
    }

    #[test]
    fn elapsed_since_counts_ticks() {
        let mut clock = GameClock::new(Duration::from_millis(50));
        let start = clock.now();
        clock.advance(20);
        assert_eq!(clock.elapsed_since(start), Duration::from_millis(1000));
    }
}
