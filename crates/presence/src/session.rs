use plaza_common::config::{IdentityConfig, PrivacyConfig};
use plaza_protocol::{Direction, Role, Status, VisibilityLevel};
use plaza_world::{chunk_of, Chunk, Position};

use crate::error::SessionError;
use crate::visibility::ViewerContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivacySettings {
    pub show_location: bool,
    pub show_status: bool,
    pub show_activity: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            show_location: true,
            show_status: true,
            show_activity: true,
        }
    }
}

impl From<&PrivacyConfig> for PrivacySettings {
    fn from(config: &PrivacyConfig) -> Self {
        Self {
            show_location: config.show_location,
            show_status: config.show_status,
            show_activity: config.show_activity,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaState {
    pub mic_on: bool,
    pub camera_on: bool,
    pub screen_sharing: bool,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub workspace_id: String,
    pub tenant_id: Option<String>,
    pub department_id: Option<String>,
    pub role: Role,
    pub name: String,
    pub avatar_config: Option<serde_json::Value>,
    pub profile_photo: Option<String>,
    pub visibility_level: VisibilityLevel,
    pub authorized_partners: Vec<String>,
    pub department_scoping: bool,
    pub position: Position,
    pub direction: Direction,
    pub status: Status,
    pub activity: Option<String>,
    pub media: MediaState,
    pub privacy: PrivacySettings,
}

impl Session {
    pub fn new(user_id: &str, workspace_id: &str, name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            workspace_id: workspace_id.to_string(),
            tenant_id: None,
            department_id: None,
            role: Role::Member,
            name: name.to_string(),
            avatar_config: None,
            profile_photo: None,
            visibility_level: VisibilityLevel::Tenant,
            authorized_partners: Vec::new(),
            department_scoping: false,
            position: Position::new(0.0, 0.0),
            direction: Direction::Down,
            status: Status::Available,
            activity: None,
            media: MediaState::default(),
            privacy: PrivacySettings::default(),
        }
    }

    pub fn from_config(
        workspace_id: &str,
        identity: &IdentityConfig,
        privacy: &PrivacyConfig,
    ) -> Result<Self, SessionError> {
        let role = identity.role.parse::<Role>().map_err(SessionError::Role)?;
        let mut session = Session::new(&identity.user_id, workspace_id, &identity.name);
        session.tenant_id = identity.tenant_id.clone().filter(|id| !id.is_empty());
        session.department_id = identity.department_id.clone().filter(|id| !id.is_empty());
        session.role = role;
        session.avatar_config = identity.avatar.clone().map(serde_json::Value::String);
        session.profile_photo = identity.profile_photo.clone();
        session.authorized_partners = identity.authorized_partners.clone();
        session.department_scoping = identity.department_scoping;
        session.visibility_level = if identity.department_scoping {
            VisibilityLevel::Department
        } else {
            VisibilityLevel::Tenant
        };
        session.privacy = PrivacySettings::from(privacy);
        Ok(session)
    }

    pub fn chunk(&self, chunk_size: f64) -> Chunk {
        chunk_of(self.position.x, self.position.y, chunk_size)
    }

    pub fn viewer(&self) -> ViewerContext {
        ViewerContext {
            tenant_id: self.tenant_id.clone(),
            department_id: self.department_id.clone(),
            role: self.role,
            department_scoping: self.department_scoping,
            authorized_partners: self.authorized_partners.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: &str) -> IdentityConfig {
        IdentityConfig {
            user_id: "u_ana".to_string(),
            name: "Ana".to_string(),
            tenant_id: Some("acme".to_string()),
            department_id: Some("".to_string()),
            role: role.to_string(),
            avatar: Some("fox".to_string()),
            profile_photo: None,
            authorized_partners: vec!["globex".to_string()],
            department_scoping: true,
        }
    }

    #[test]
    fn builds_from_identity_config() {
        let session =
            Session::from_config("hq", &identity("Moderator"), &PrivacyConfig::default())
                .expect("session");
        assert_eq!(session.role, Role::Moderator);
        assert_eq!(session.tenant_id.as_deref(), Some("acme"));
        assert_eq!(session.department_id, None);
        assert_eq!(session.visibility_level, VisibilityLevel::Department);
        assert_eq!(
            session.avatar_config,
            Some(serde_json::Value::String("fox".to_string()))
        );
        assert_eq!(session.viewer().authorized_partners, vec!["globex".to_string()]);
    }

    #[test]
    fn rejects_unknown_role() {
        let err = Session::from_config("hq", &identity("owner"), &PrivacyConfig::default())
            .expect_err("role");
        assert!(err.to_string().contains("owner"));
    }
}
