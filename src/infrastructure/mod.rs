//! Adapters behind the domain interfaces

pub mod memory;
pub mod paper;
