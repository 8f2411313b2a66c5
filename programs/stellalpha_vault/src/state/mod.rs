pub mod user_vault;
pub mod global_config;
pub mod trader_state;

pub use user_vault::*;
pub use global_config::*;
pub use trader_state::*;
