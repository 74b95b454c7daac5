use log::info;
use std::sync::Arc;

/// The "logging" lamp (the board LED on hardware).
pub trait Indicator: Send + Sync {
    fn set(&self, on: bool);
}

/// Writes lamp transitions to the log.
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn set(&self, on: bool) {
        info!("logging indicator {}", if on { "on" } else { "off" });
    }
}

/// Holds the indicator on for its lifetime.
pub struct IndicatorGuard {
    indicator: Arc<dyn Indicator>,
}

impl IndicatorGuard {
    pub fn on(indicator: Arc<dyn Indicator>) -> Self {
        indicator.set(true);
        Self { indicator }
    }
}

impl Drop for IndicatorGuard {
    fn drop(&mut self) {
        self.indicator.set(false);
    }
}
