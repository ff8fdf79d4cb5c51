//! API handlers module

pub mod digest;
pub mod health;
pub mod sessions;
pub mod tools;
