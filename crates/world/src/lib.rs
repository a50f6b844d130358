pub mod chunk;
pub mod map;
pub mod physics;

pub use chunk::*;
pub use map::*;
pub use physics::*;
