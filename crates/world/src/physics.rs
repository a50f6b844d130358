use serde::{Deserialize, Serialize};

use crate::map::{Position, WorldBounds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Moved(Position),
    Blocked,
}

pub fn step(position: Position, dir: Direction, distance: f64) -> Position {
    match dir {
        Direction::Up => Position::new(position.x, position.y - distance),
        Direction::Down => Position::new(position.x, position.y + distance),
        Direction::Left => Position::new(position.x - distance, position.y),
        Direction::Right => Position::new(position.x + distance, position.y),
    }
}

pub fn try_move(position: Position, dir: Direction, distance: f64, bounds: &WorldBounds) -> MoveOutcome {
    let next = step(position, dir, distance);
    if bounds.contains(&next) {
        return MoveOutcome::Moved(next);
    }
    let clamped = bounds.clamp(next);
    if clamped == position {
        MoveOutcome::Blocked
    } else {
        MoveOutcome::Moved(clamped)
    }
}
