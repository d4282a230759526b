//! Database models split into domain-specific modules.

pub mod common;
pub mod device;
pub mod user;

pub use common::*;
pub use device::*;
pub use user::*;
