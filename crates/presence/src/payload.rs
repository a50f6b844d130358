use plaza_protocol::{ChannelScope, PresenceRecord, Role, Status};

use crate::session::Session;

pub const ANONYMOUS_LABEL: &str = "Anonymous";

pub fn tenant_payload(session: &Session, updated_at: i64) -> PresenceRecord {
    let privacy = session.privacy;
    let (x, y) = if privacy.show_location {
        (session.position.x, session.position.y)
    } else {
        (0.0, 0.0)
    };
    PresenceRecord {
        peer_id: session.user_id.clone(),
        tenant_id: session.tenant_id.clone(),
        department_id: session.department_id.clone(),
        visibility_level: session.visibility_level,
        x,
        y,
        direction: session.direction,
        status: if privacy.show_status {
            session.status
        } else {
            Status::neutral()
        },
        name: session.name.clone(),
        role: session.role,
        avatar_config: session.avatar_config.clone(),
        profile_photo: session.profile_photo.clone(),
        mic_on: session.media.mic_on,
        camera_on: session.media.camera_on,
        screen_sharing: session.media.screen_sharing,
        is_private: false,
        activity: if privacy.show_activity {
            session.activity.clone()
        } else {
            None
        },
        updated_at,
    }
}

pub fn public_payload(session: &Session, updated_at: i64) -> PresenceRecord {
    let mut record = tenant_payload(session, updated_at);
    record.name = ANONYMOUS_LABEL.to_string();
    record.role = Role::lowest();
    record.avatar_config = None;
    record.profile_photo = None;
    record.mic_on = false;
    record.camera_on = false;
    record.screen_sharing = false;
    record.is_private = true;
    record.status = Status::Away;
    record.activity = None;
    record
}

pub fn payload_for_scope(session: &Session, scope: &ChannelScope, updated_at: i64) -> PresenceRecord {
    match scope {
        ChannelScope::Tenant(_) => tenant_payload(session, updated_at),
        ChannelScope::Public => public_payload(session, updated_at),
    }
}
