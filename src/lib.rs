//! Swapchain - triangular sell-buy-sell swap bot
//! Built with Domain-Driven Design principles

pub mod domain;
pub mod infrastructure;
pub mod application;
pub mod shared;

// Re-export main types for convenience
pub use application::SwapChainService;
pub use domain::execution::SwapExecutor;
pub use domain::swap::{SbsSwapFinder, SwapChainBuilder, SwapValidator};
