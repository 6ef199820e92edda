//! Time services: wall clock for the bot, manual clock for tests and dry runs

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::execution::TimeService;
use crate::shared::utils::now_timestamp;

/// Real time: tokio sleeps and the system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimeService;

impl TokioTimeService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeService for TokioTimeService {
    async fn wait_seconds(&self, seconds: u64) {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }

    fn now(&self) -> i64 {
        now_timestamp()
    }
}

/// Clock that only moves when waited on; records every wait
#[derive(Debug, Default)]
pub struct ManualTimeService {
    now: AtomicI64,
    waits: Mutex<Vec<u64>>,
}

impl ManualTimeService {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
            waits: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Requested waits in call order
    pub fn waits(&self) -> Vec<u64> {
        self.waits
            .lock()
            .map(|waits| waits.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TimeService for ManualTimeService {
    async fn wait_seconds(&self, seconds: u64) {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(seconds);
        }
        self.advance(seconds as i64);
        tokio::task::yield_now().await;
    }

    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
