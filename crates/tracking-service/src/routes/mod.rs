//! HTTP route handlers.

pub mod carts;
pub mod jobs;
pub mod system;
