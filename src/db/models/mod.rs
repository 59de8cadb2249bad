//! Database models split into domain-specific modules.

pub mod cart;
pub mod reset_token;
pub mod role;
pub mod user;

pub use cart::*;
pub use reset_token::*;
pub use role::*;
pub use user::*;
