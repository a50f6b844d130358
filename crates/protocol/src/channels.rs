const PUBLIC_SCOPE: &str = "publico";
const TENANT_SCOPE: &str = "empresa";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelScope {
    Public,
    Tenant(String),
}

impl ChannelScope {
    pub fn is_tenant(&self) -> bool {
        matches!(self, ChannelScope::Tenant(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresenceChannel {
    pub workspace_id: String,
    pub chunk_key: String,
    pub scope: ChannelScope,
}

impl PresenceChannel {
    pub fn public(workspace_id: &str, chunk_key: &str) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            chunk_key: chunk_key.to_string(),
            scope: ChannelScope::Public,
        }
    }

    pub fn tenant(workspace_id: &str, chunk_key: &str, tenant_id: &str) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            chunk_key: chunk_key.to_string(),
            scope: ChannelScope::Tenant(tenant_id.to_string()),
        }
    }

    pub fn key(&self) -> String {
        match &self.scope {
            ChannelScope::Public => format!(
                "workspace:{}:{}:{PUBLIC_SCOPE}",
                self.workspace_id, self.chunk_key
            ),
            ChannelScope::Tenant(tenant_id) => format!(
                "workspace:{}:{}:{TENANT_SCOPE}:{tenant_id}",
                self.workspace_id, self.chunk_key
            ),
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        let rest = key.strip_prefix("workspace:")?;
        let mut parts = rest.split(':');
        let workspace_id = parts.next().filter(|part| !part.is_empty())?;
        let chunk_key = parts.next().filter(|part| !part.is_empty())?;
        let scope = match parts.next()? {
            PUBLIC_SCOPE => ChannelScope::Public,
            TENANT_SCOPE => {
                let tenant_id = parts.next().filter(|part| !part.is_empty())?;
                ChannelScope::Tenant(tenant_id.to_string())
            }
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            workspace_id: workspace_id.to_string(),
            chunk_key: chunk_key.to_string(),
            scope,
        })
    }
}

pub fn signaling_channel(workspace_id: &str) -> String {
    format!("webrtc:{workspace_id}")
}

pub fn parse_signaling_channel(key: &str) -> Option<&str> {
    key.strip_prefix("webrtc:").filter(|id| !id.is_empty() && !id.contains(':'))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn channel_names_follow_scope() {
        assert_eq!(
            PresenceChannel::public("hq", "0_-1").key(),
            "workspace:hq:0_-1:publico"
        );
        assert_eq!(
            PresenceChannel::tenant("hq", "2_3", "acme").key(),
            "workspace:hq:2_3:empresa:acme"
        );
        assert_eq!(signaling_channel("hq"), "webrtc:hq");
    }

    #[test]
    fn parse_reads_back_both_scopes() {
        let tenant = PresenceChannel::parse("workspace:hq:2_3:empresa:acme").expect("tenant");
        assert_eq!(tenant.scope, ChannelScope::Tenant("acme".to_string()));
        assert_eq!(tenant.chunk_key, "2_3");

        let public = PresenceChannel::parse("workspace:hq:-1_0:publico").expect("public");
        assert_eq!(public.scope, ChannelScope::Public);
        assert_eq!(public.workspace_id, "hq");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(PresenceChannel::parse("workspace:hq:2_3").is_none());
        assert!(PresenceChannel::parse("workspace:hq:2_3:empresa").is_none());
        assert!(PresenceChannel::parse("workspace:hq:2_3:publico:extra").is_none());
        assert!(PresenceChannel::parse("room:hq:2_3:publico").is_none());
        assert_eq!(parse_signaling_channel("webrtc:hq"), Some("hq"));
        assert_eq!(parse_signaling_channel("webrtc:"), None);
    }
}
