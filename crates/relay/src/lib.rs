pub mod server;
pub mod state;

pub use server::RelayServer;
