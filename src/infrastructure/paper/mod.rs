//! Simulated spot exchange for dry runs and tests

mod paper_exchange;

pub use paper_exchange::PaperExchange;
