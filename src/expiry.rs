//! Expiry clock
//!
//!  Turns "a frame went by" into registry ticks. How often that happens is
//!  the driver's business; what a tick does belongs to the registry.

use std::time::Duration;

use tracing::warn;

use crate::aircraft::{AircraftRegistry, RegistryEvent};

pub struct ExpiryScheduler<'a> {
    registry: &'a mut AircraftRegistry,
}

impl<'a> ExpiryScheduler<'a> {
    pub fn new(registry: &'a mut AircraftRegistry) -> Self {
        Self { registry }
    }

    /// Age the registry by `delta` seconds.
    ///
    /// Negative, NaN or infinite deltas are reported and ignored; the
    /// registry is left untouched.
    pub fn advance(&mut self, delta: f64) -> Vec<RegistryEvent> {
        if !delta.is_finite() || delta < 0.0 {
            warn!("Ignoring expiry tick with invalid elapsed time {}", delta);
            return Vec::new();
        }
        self.registry.tick(delta)
    }

    pub fn advance_duration(&mut self, delta: Duration) -> Vec<RegistryEvent> {
        self.advance(delta.as_secs_f64())
    }
}
