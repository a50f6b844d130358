use plaza_protocol::{PresenceRecord, Role, VisibilityLevel};

use crate::payload::ANONYMOUS_LABEL;

pub const GHOST_LABEL: &str = "Colleague";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerContext {
    pub tenant_id: Option<String>,
    pub department_id: Option<String>,
    pub role: Role,
    pub department_scoping: bool,
    pub authorized_partners: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redaction {
    Full,
    Ghost { keep_name: bool },
    Anonymous,
}

pub fn classify(peer: &PresenceRecord, viewer: &ViewerContext) -> Redaction {
    let Some(viewer_tenant) = viewer.tenant_id.as_deref() else {
        return Redaction::Full;
    };

    let same_tenant = match peer.tenant_id.as_deref() {
        None => true,
        Some(tenant) => tenant == viewer_tenant,
    };

    if same_tenant {
        let scoped =
            viewer.department_scoping || peer.visibility_level == VisibilityLevel::Department;
        let departments_differ = matches!(
            (viewer.department_id.as_deref(), peer.department_id.as_deref()),
            (Some(mine), Some(theirs)) if mine != theirs
        );
        if scoped && viewer.role != Role::Admin && departments_differ {
            return Redaction::Ghost { keep_name: false };
        }
        return Redaction::Full;
    }

    let partner = peer
        .tenant_id
        .as_deref()
        .is_some_and(|tenant| viewer.authorized_partners.iter().any(|p| p == tenant));
    if partner {
        return Redaction::Full;
    }

    if viewer.role == Role::Moderator {
        return Redaction::Ghost { keep_name: true };
    }

    Redaction::Anonymous
}

pub fn redact(peer: &PresenceRecord, viewer: &ViewerContext) -> PresenceRecord {
    let mut record = peer.clone();
    match classify(peer, viewer) {
        Redaction::Full => {}
        Redaction::Ghost { keep_name } => ghost(&mut record, keep_name),
        Redaction::Anonymous => anonymize(&mut record),
    }
    record
}

pub fn apply_visibility(peers: &[PresenceRecord], viewer: &ViewerContext) -> Vec<PresenceRecord> {
    peers.iter().map(|peer| redact(peer, viewer)).collect()
}

fn ghost(record: &mut PresenceRecord, keep_name: bool) {
    if !keep_name {
        record.name = GHOST_LABEL.to_string();
    }
    record.profile_photo = None;
    record.activity = None;
    silence(record);
}

fn anonymize(record: &mut PresenceRecord) {
    record.name = ANONYMOUS_LABEL.to_string();
    record.role = Role::lowest();
    record.avatar_config = None;
    record.profile_photo = None;
    record.activity = None;
    silence(record);
}

fn silence(record: &mut PresenceRecord) {
    record.mic_on = false;
    record.camera_on = false;
    record.screen_sharing = false;
    record.is_private = true;
}

#[cfg(test)]
mod tests {
    use plaza_protocol::{Direction, Status};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    fn peer(id: &str, tenant: Option<&str>, department: Option<&str>) -> PresenceRecord {
        PresenceRecord {
            peer_id: id.to_string(),
            tenant_id: tenant.map(str::to_string),
            department_id: department.map(str::to_string),
            visibility_level: VisibilityLevel::Tenant,
            x: 40.0,
            y: 12.0,
            direction: Direction::Left,
            status: Status::Busy,
            name: format!("Real {id}"),
            role: Role::Member,
            avatar_config: Some(serde_json::json!({ "skin": "fox" })),
            profile_photo: Some("https://cdn.example/p.png".to_string()),
            mic_on: true,
            camera_on: true,
            screen_sharing: true,
            is_private: false,
            activity: Some("reviewing".to_string()),
            updated_at: 10,
        }
    }

    fn viewer(tenant: Option<&str>, department: Option<&str>, role: Role) -> ViewerContext {
        ViewerContext {
            tenant_id: tenant.map(str::to_string),
            department_id: department.map(str::to_string),
            role,
            department_scoping: false,
            authorized_partners: vec!["partner".to_string()],
        }
    }

    #[test]
    fn open_space_passes_everything() {
        let peers = vec![peer("a", Some("x"), None), peer("b", Some("y"), Some("ops"))];
        let out = apply_visibility(&peers, &viewer(None, None, Role::Guest));
        assert_eq!(out, peers);
    }

    #[test]
    fn same_tenant_is_full_detail() {
        let p = peer("a", Some("acme"), Some("ops"));
        let v = viewer(Some("acme"), Some("sales"), Role::Member);
        assert_eq!(classify(&p, &v), Redaction::Full);
        assert_eq!(redact(&p, &v), p);
    }

    #[test]
    fn department_scope_ghosts_other_departments() {
        let p = peer("a", Some("acme"), Some("ops"));
        let mut v = viewer(Some("acme"), Some("sales"), Role::Member);
        v.department_scoping = true;

        let out = redact(&p, &v);
        assert_eq!(out.name, GHOST_LABEL);
        assert_eq!((out.x, out.y), (40.0, 12.0));
        assert!(!out.mic_on && !out.camera_on && !out.screen_sharing);
        assert!(out.is_private);
        assert_eq!(out.role, Role::Member);

        v.role = Role::Admin;
        assert_eq!(classify(&p, &v), Redaction::Full);
    }

    #[test]
    fn peer_can_request_department_scope() {
        let mut p = peer("a", None, Some("ops"));
        p.visibility_level = VisibilityLevel::Department;
        let v = viewer(Some("acme"), Some("sales"), Role::Moderator);
        assert_eq!(classify(&p, &v), Redaction::Ghost { keep_name: false });

        let same_department = viewer(Some("acme"), Some("ops"), Role::Member);
        assert_eq!(classify(&p, &same_department), Redaction::Full);
    }

    #[test]
    fn authorized_partner_is_full_detail() {
        let p = peer("a", Some("partner"), Some("ops"));
        let v = viewer(Some("acme"), Some("sales"), Role::Guest);
        assert_eq!(classify(&p, &v), Redaction::Full);
    }

    #[test]
    fn moderator_sees_foreign_ghost_with_name() {
        let p = peer("a", Some("globex"), None);
        let v = viewer(Some("acme"), None, Role::Moderator);
        let out = redact(&p, &v);
        assert_eq!(out.name, "Real a");
        assert!(out.is_private);
        assert!(!out.mic_on);
    }

    #[test]
    fn stranger_is_anonymized_even_with_mic_on() {
        let p = peer("a", Some("globex"), None);
        let v = viewer(Some("acme"), None, Role::Admin);
        let out = redact(&p, &v);
        assert_eq!(out.name, ANONYMOUS_LABEL);
        assert_eq!(out.role, Role::Guest);
        assert!(out.is_private);
        assert!(!out.mic_on && !out.camera_on);
        assert!(out.avatar_config.is_none());
        assert_eq!(out.tenant_id.as_deref(), Some("globex"));
    }

    fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Admin),
            Just(Role::Moderator),
            Just(Role::Member),
            Just(Role::Guest)
        ]
    }

    fn arb_tag() -> impl Strategy<Value = Option<String>> {
        prop::option::of(prop_oneof![Just("a".to_string()), Just("b".to_string()), Just("c".to_string())])
    }

    fn arb_peer() -> impl Strategy<Value = PresenceRecord> {
        (arb_tag(), arb_tag(), any::<bool>(), any::<bool>(), any::<bool>(), arb_role()).prop_map(
            |(tenant, department, mic, camera, department_level, role)| {
                let mut p = peer("p", tenant.as_deref(), department.as_deref());
                p.mic_on = mic;
                p.camera_on = camera;
                p.role = role;
                if department_level {
                    p.visibility_level = VisibilityLevel::Department;
                }
                p
            },
        )
    }

    fn arb_viewer() -> impl Strategy<Value = ViewerContext> {
        (arb_tag(), arb_tag(), arb_role(), any::<bool>(), prop::collection::vec(arb_tag(), 0..3))
            .prop_map(|(tenant, department, role, scoping, partners)| ViewerContext {
                tenant_id: tenant,
                department_id: department,
                role,
                department_scoping: scoping,
                authorized_partners: partners.into_iter().flatten().collect(),
            })
    }

    proptest! {
        #[test]
        fn policy_is_idempotent(
            peers in prop::collection::vec(arb_peer(), 0..8),
            v in arb_viewer(),
        ) {
            let once = apply_visibility(&peers, &v);
            let twice = apply_visibility(&once, &v);
            prop_assert_eq!(once.len(), peers.len());
            prop_assert_eq!(twice, once);
        }

        #[test]
        fn redacted_peers_never_expose_media(p in arb_peer(), v in arb_viewer()) {
            let out = redact(&p, &v);
            if classify(&p, &v) != Redaction::Full {
                prop_assert!(!out.mic_on && !out.camera_on && out.is_private);
            }
            prop_assert_eq!(out.peer_id, p.peer_id);
            prop_assert_eq!((out.x, out.y), (p.x, p.y));
        }
    }
}
