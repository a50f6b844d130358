use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub bind_addr: String,
    #[serde(default = "default_max_channels_per_connection")]
    pub max_channels_per_connection: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub relay_url: String,
    pub workspace_id: String,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub space: SpaceConfig,
    #[serde(default)]
    pub mesh: MeshConfig,
    #[serde(default)]
    pub walk: WalkConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub user_id: String,
    pub name: String,
    pub tenant_id: Option<String>,
    pub department_id: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    pub avatar: Option<String>,
    pub profile_photo: Option<String>,
    // Other tenants whose members this user sees in full detail.
    #[serde(default)]
    pub authorized_partners: Vec<String>,
    #[serde(default)]
    pub department_scoping: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    #[serde(default = "default_true")]
    pub show_location: bool,
    #[serde(default = "default_true")]
    pub show_status: bool,
    #[serde(default = "default_true")]
    pub show_activity: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            show_location: true,
            show_status: true,
            show_activity: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: f64,
    #[serde(default = "default_neighborhood_radius")]
    pub neighborhood_radius: u32,
    #[serde(default = "default_resync_interval_ms")]
    pub resync_interval_ms: u64,
    #[serde(default = "default_connect_debounce_secs")]
    pub connect_debounce_secs: u64,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            neighborhood_radius: default_neighborhood_radius(),
            resync_interval_ms: default_resync_interval_ms(),
            connect_debounce_secs: default_connect_debounce_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    #[serde(default = "default_proximity_radius")]
    pub proximity_radius: f64,
    #[serde(default)]
    pub close_on_proximity_exit: bool,
    // Zero drops candidates that arrive before the connection exists.
    #[serde(default = "default_early_candidate_capacity")]
    pub early_candidate_capacity: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            proximity_radius: default_proximity_radius(),
            close_on_proximity_exit: false,
            early_candidate_capacity: default_early_candidate_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkConfig {
    #[serde(default)]
    pub start_x: f64,
    #[serde(default)]
    pub start_y: f64,
    #[serde(default = "default_walk_step")]
    pub step: f64,
    #[serde(default = "default_walk_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_true")]
    pub wander: bool,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            start_x: 0.0,
            start_y: 0.0,
            step: default_walk_step(),
            tick_ms: default_walk_tick_ms(),
            wander: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    #[serde(default = "default_true")]
    pub microphone: bool,
    #[serde(default = "default_true")]
    pub camera: bool,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            microphone: true,
            camera: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_role() -> String {
    "member".to_string()
}

fn default_max_channels_per_connection() -> usize {
    256
}

fn default_chunk_size() -> f64 {
    512.0
}

fn default_neighborhood_radius() -> u32 {
    1
}

fn default_resync_interval_ms() -> u64 {
    5_000
}

fn default_connect_debounce_secs() -> u64 {
    30
}

fn default_proximity_radius() -> f64 {
    120.0
}

fn default_early_candidate_capacity() -> usize {
    16
}

fn default_walk_step() -> f64 {
    8.0
}

fn default_walk_tick_ms() -> u64 {
    200
}

pub fn load_config<T: for<'de> Deserialize<'de>>(path: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn client_config_fills_tuning_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            relay_url = "ws://127.0.0.1:7400"
            workspace_id = "hq"

            [identity]
            user_id = "u_ana"
            name = "Ana"
            tenant_id = "acme"
            "#,
        )
        .expect("parse");
        assert_eq!(config.identity.role, "member");
        assert_eq!(config.space.neighborhood_radius, 1);
        assert_eq!(config.space.connect_debounce_secs, 30);
        assert_eq!(config.mesh.early_candidate_capacity, 16);
        assert!(!config.mesh.close_on_proximity_exit);
        assert!(config.privacy.show_location);
        assert!(config.identity.authorized_partners.is_empty());
    }

    #[test]
    fn relay_config_defaults_channel_cap() {
        let config: RelayConfig = toml::from_str(r#"bind_addr = "0.0.0.0:7400""#).expect("parse");
        assert_eq!(config.max_channels_per_connection, 256);
    }
}
