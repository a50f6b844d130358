pub mod channels;
pub mod envelope;
pub mod messages;
pub mod presence;
pub mod signaling;

pub use channels::*;
pub use messages::*;
pub use presence::*;
pub use signaling::*;
