use rand::Rng;

use plaza_common::config::WalkConfig;
use plaza_protocol::Direction as WireDirection;
use plaza_world::{try_move, Direction, MoveOutcome, Position, WorldBounds};

const TURN_CHANCE: f64 = 0.2;

pub struct Walker {
    bounds: WorldBounds,
    step: f64,
    wander: bool,
    heading: Direction,
}

impl Walker {
    pub fn from_config(config: &WalkConfig) -> Self {
        Self {
            bounds: WorldBounds::default(),
            step: config.step,
            wander: config.wander,
            heading: Direction::Right,
        }
    }

    pub fn start(&self, config: &WalkConfig) -> Position {
        self.bounds.clamp(Position::new(config.start_x, config.start_y))
    }

    pub fn next(&mut self, position: Position, rng: &mut impl Rng) -> Option<(Position, WireDirection)> {
        if !self.wander {
            return None;
        }
        if rng.gen_bool(TURN_CHANCE) {
            self.heading = Direction::ALL[rng.gen_range(0..Direction::ALL.len())];
        }
        let next = match try_move(position, self.heading, self.step, &self.bounds) {
            MoveOutcome::Moved(next) => next,
            MoveOutcome::Blocked => {
                self.heading = self.heading.opposite();
                match try_move(position, self.heading, self.step, &self.bounds) {
                    MoveOutcome::Moved(next) => next,
                    MoveOutcome::Blocked => return None,
                }
            }
        };
        Some((next, wire_direction(self.heading)))
    }
}

pub fn wire_direction(dir: Direction) -> WireDirection {
    match dir {
        Direction::Up => WireDirection::Up,
        Direction::Down => WireDirection::Down,
        Direction::Left => WireDirection::Left,
        Direction::Right => WireDirection::Right,
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn still_walker_never_moves() {
        let mut walker = Walker::from_config(&WalkConfig {
            wander: false,
            ..WalkConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(walker.next(Position::new(0.0, 0.0), &mut rng), None);
    }

    #[test]
    fn walk_stays_inside_bounds() {
        let config = WalkConfig {
            start_x: 4090.0,
            start_y: -4090.0,
            step: 16.0,
            ..WalkConfig::default()
        };
        let mut walker = Walker::from_config(&config);
        let bounds = WorldBounds::default();
        let mut rng = StdRng::seed_from_u64(11);
        let mut position = walker.start(&config);
        for _ in 0..500 {
            if let Some((next, _)) = walker.next(position, &mut rng) {
                assert!(bounds.contains(&next));
                position = next;
            }
        }
    }
}
