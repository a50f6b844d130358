pub mod error;
pub mod media;
pub mod mesh;
pub mod payload;
pub mod session;
pub mod sync;
pub mod transport;
pub mod visibility;

pub use error::{MediaError, SessionError, SignalError, TransportError};
pub use media::{acquire_local_media, LocalMedia, MediaDevices};
pub use mesh::{
    should_initiate, CallMesh, ConnectionState, MediaDirective, MeshSettings, MeshUpdate,
    NegotiationRole, PeerConnection, PeerConnector, PeerLink, TransportState,
};
pub use payload::{payload_for_scope, public_payload, tenant_payload, ANONYMOUS_LABEL};
pub use session::{MediaState, PrivacySettings, Session};
pub use sync::{PresenceEvent, PresenceSynchronizer, SyncOutcome, SyncSettings};
pub use transport::{PresenceTransport, SignalSink};
pub use visibility::{apply_visibility, classify, Redaction, ViewerContext, GHOST_LABEL};
