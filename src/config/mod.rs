pub mod loader;
pub mod schema;

pub use loader::{load_from_env_or_file, load_from_path, validate};
pub use schema::{BufferConfig, Config, IdentityConfig, ListenerConfig, StoreConfig};
