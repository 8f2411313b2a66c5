pub mod admin;
pub mod swap;
pub mod trader;
pub mod vault;

pub use admin::*;
pub use swap::*;
pub use trader::*;
pub use vault::*;
