mod loader;
mod schema;

pub use loader::{apply_env_overrides, load_from_env_or_default, load_from_path, ENV_PREFIX};
pub use schema::{
    AgentConfig, RelayerConfig, RunMode, StorageConfig, SystemConfig, WatcherConfig,
};

#[cfg(test)]
mod tests;
