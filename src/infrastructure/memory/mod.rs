//! In-process storage and clocks

mod action_store;
mod chain_store;
mod clock;
mod order_store;
mod pair_store;

pub use action_store::InMemoryActionRepository;
pub use chain_store::InMemoryChainRepository;
pub use clock::{ManualTimeService, TokioTimeService};
pub use order_store::InMemoryOrderUpdater;
pub use pair_store::InMemoryPairRepository;
