//! Domain layer - core business logic and entities

pub mod pair;
pub mod swap;
pub mod execution;
