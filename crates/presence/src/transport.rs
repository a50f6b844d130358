use plaza_protocol::{PresenceRecord, SignalMessage};

use crate::error::TransportError;

pub trait PresenceTransport {
    fn subscribe(&mut self, channel: &str) -> Result<(), TransportError>;
    fn unsubscribe(&mut self, channel: &str) -> Result<(), TransportError>;
    fn track(&mut self, channel: &str, presence: &PresenceRecord) -> Result<(), TransportError>;
}

pub trait SignalSink {
    fn send_signal(&mut self, message: &SignalMessage) -> Result<(), TransportError>;
}
