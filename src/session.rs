//! Surveillance session
//!
//!  Owns the aircraft registry for the lifetime of one feed session and
//!  applies feed events and expiry ticks to it, one at a time.

use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::aircraft::{AircraftRegistry, RegistryEvent};
use crate::expiry::ExpiryScheduler;
use crate::feed::FeedEvent;
use crate::sbs::{self, ParseError};

/// Message counters for the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub accepted: u64,
    pub rejected: u64,
    /// Individual fields dropped from otherwise accepted messages
    pub dropped_fields: u64,
    pub disconnects: u64,
}

pub struct Session {
    registry: AircraftRegistry,
    stats: SessionStats,
    connected: bool,
}

impl Session {
    pub fn new(registry: AircraftRegistry) -> Self {
        Self {
            registry,
            stats: SessionStats::default(),
            connected: false,
        }
    }

    pub fn registry(&self) -> &AircraftRegistry {
        &self.registry
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Parse one line and apply it. Rejected lines leave the registry alone.
    pub fn handle_line(&mut self, line: &str, now: Instant) -> Option<RegistryEvent> {
        let msg = match sbs::parse(line) {
            Ok(msg) => msg,
            Err(ParseError::Empty) => return None,
            Err(e) => {
                self.stats.rejected += 1;
                debug!("Rejected message {:?}: {}", line, e);
                return None;
            }
        };

        trace!(
            "{:?} type {:?} from {} (aircraft id {:?}, flight id {:?})",
            msg.message_type, msg.transmission_type, msg.hex, msg.aircraft_id, msg.flight_id
        );
        for error in &msg.field_errors {
            trace!("Dropped field from {}: {}", msg.hex, error);
        }
        self.stats.dropped_fields += msg.field_errors.len() as u64;
        self.stats.accepted += 1;

        Some(self.registry.upsert(&msg.hex, &msg.fields, now))
    }

    pub fn handle_feed_event(&mut self, event: FeedEvent, now: Instant) -> Option<RegistryEvent> {
        match event {
            FeedEvent::Line(line) => self.handle_line(&line, now),
            FeedEvent::Connected(addr) => {
                self.connected = true;
                info!("Feed connected: {} ({} aircraft retained)", addr, self.registry.len());
                None
            }
            FeedEvent::Disconnected(reason) => {
                // Keep the last known picture; TTL decides what goes
                self.connected = false;
                self.stats.disconnects += 1;
                warn!(
                    "Feed disconnected: {} ({} aircraft left to expire)",
                    reason,
                    self.registry.len()
                );
                None
            }
        }
    }

    pub fn advance(&mut self, delta: Duration) -> Vec<RegistryEvent> {
        ExpiryScheduler::new(&mut self.registry).advance_duration(delta)
    }

    /// End of session: drop every record.
    pub fn close(&mut self) {
        info!(
            "Session closed: {} accepted, {} rejected, {} fields dropped, {} aircraft cleared",
            self.stats.accepted,
            self.stats.rejected,
            self.stats.dropped_fields,
            self.registry.len()
        );
        self.registry.clear();
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::ExpirySettings;
    use crate::origin::GeoPoint;
    use crate::projection::Projector;

    fn session(max_ttl: f64) -> Session {
        let origin = GeoPoint::new(25.7959, -80.2870).unwrap();
        Session::new(AircraftRegistry::new(
            Projector::with_origin(origin, 1.0).unwrap(),
            ExpirySettings {
                max_ttl,
                decay_rate: 1.0,
            },
        ))
    }

    #[test]
    fn test_end_to_end_scenarios() {
        let mut session = session(60.0);
        let now = Instant::now();

        // Altitude only
        let event = session.handle_line("MSG,5,,,A1B2C3,,,,,,,3500,,,,,,,,,,", now);
        assert_eq!(event, Some(RegistryEvent::Created("A1B2C3".into())));
        let ac = session.registry().get("A1B2C3").unwrap();
        assert_eq!(ac.altitude, Some(3500.0));
        assert!(ac.projected().is_none());

        // Position arrives
        session.handle_line("MSG,3,,,A1B2C3,,,,,,,,,,25.80,-80.29,,,,,,", now);
        let ac = session.registry().get("A1B2C3").unwrap();
        assert!(ac.projected().is_some());
        assert_eq!(ac.altitude, Some(3500.0));

        // Malformed altitude, position still applied
        let event = session.handle_line(
            "MSG,3,,,A1B2C3,,,,,,,notanumber,,,25.81,-80.30,,,,,,",
            now,
        );
        assert_eq!(event, Some(RegistryEvent::Updated("A1B2C3".into())));
        let ac = session.registry().get("A1B2C3").unwrap();
        assert_eq!(ac.altitude, Some(3500.0));
        assert_eq!(ac.latitude, Some(25.81));
        assert_eq!(session.stats().dropped_fields, 1);

        // Empty hex rejected
        let before = session.registry().get("A1B2C3").unwrap().clone();
        assert_eq!(session.handle_line("MSG,3,,,,,,,,,,9999,,,1.0,1.0,,,,,,", now), None);
        assert_eq!(session.registry().len(), 1);
        let after = session.registry().get("A1B2C3").unwrap();
        assert_eq!(after.altitude, before.altitude);
        assert_eq!(after.messages, before.messages);

        assert_eq!(
            session.stats(),
            SessionStats {
                accepted: 3,
                rejected: 1,
                dropped_fields: 1,
                disconnects: 0,
            }
        );
    }

    #[test]
    fn test_expiry_through_session() {
        let mut session = session(5.0);
        session.handle_line("MSG,5,,,A1B2C3,,,,,,,3500,,,,,,,,,,", Instant::now());

        assert!(session.advance(Duration::from_secs(2)).is_empty());
        assert!(session.advance(Duration::from_secs(2)).is_empty());
        let ttl = session.registry().get("A1B2C3").unwrap().ttl();
        assert!((ttl - 1.0).abs() < 1e-9);

        let events = session.advance(Duration::from_secs(2));
        assert_eq!(events, vec![RegistryEvent::Expired("A1B2C3".into())]);
        assert_eq!(session.registry().all().count(), 0);
    }

    #[test]
    fn test_disconnect_retains_aircraft() {
        let mut session = session(60.0);
        let now = Instant::now();
        session.handle_feed_event(FeedEvent::Connected("127.0.0.1:30003".into()), now);
        assert!(session.is_connected());
        session.handle_feed_event(
            FeedEvent::Line("MSG,5,,,A1B2C3,,,,,,,3500,,,,,,,,,,".into()),
            now,
        );
        session.handle_feed_event(FeedEvent::Disconnected("reset by peer".into()), now);

        assert!(!session.is_connected());
        assert_eq!(session.registry().len(), 1);
        assert_eq!(session.stats().disconnects, 1);
    }

    #[test]
    fn test_blank_lines_are_not_counted() {
        let mut session = session(60.0);
        assert_eq!(session.handle_line("", Instant::now()), None);
        assert_eq!(session.stats(), SessionStats::default());
    }

    #[test]
    fn test_close_clears_registry() {
        let mut session = session(60.0);
        session.handle_line("MSG,5,,,A1B2C3,,,,,,,3500,,,,,,,,,,", Instant::now());
        session.close();
        assert!(session.registry().is_empty());
    }
}
