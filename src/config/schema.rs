use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub gateway: ListenerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Role name to raw permission mapping; parsed strictly at startup.
    #[serde(default)]
    pub acl: HashMap<String, serde_json::Value>,
    /// Per-plugin configuration sub-maps, keyed by plugin name.
    #[serde(default)]
    pub plugins_args: HashMap<String, serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Connection string handed to the store collaborator; `${VAR}`
    /// references are substituted from the environment.
    #[serde(default)]
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferConfig {
    #[serde(default = "default_segment_size")]
    pub segment_size_bytes: usize,
    /// Upper bound on segments one exchange may hold; together with the
    /// segment size this is the per-exchange body budget.
    #[serde(default = "default_max_segments")]
    pub max_segments: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityConfig {
    /// Header carrying the authenticated user id, set by the upstream
    /// proxy.
    #[serde(default = "default_identity_header")]
    pub header: String,
    /// User id to role list.
    #[serde(default)]
    pub users: HashMap<String, Vec<String>>,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8009
}

fn default_segment_size() -> usize {
    16 * 1024
}

fn default_max_segments() -> usize {
    1024
}

fn default_identity_header() -> String {
    "x-forwarded-user".to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            segment_size_bytes: default_segment_size(),
            max_segments: default_max_segments(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            header: default_identity_header(),
            users: HashMap::new(),
        }
    }
}

impl Config {
    /// The configuration sub-map for one plugin; absent names resolve to
    /// an empty map, never to a missing value.
    pub fn plugin_args(&self, name: &str) -> serde_json::Map<String, serde_json::Value> {
        self.plugins_args.get(name).cloned().unwrap_or_default()
    }
}
