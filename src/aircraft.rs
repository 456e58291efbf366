//! Aircraft tracking
//!
//!  Maintains the registry of recently heard aircraft keyed by ICAO hex,
//!  merges partial BaseStation updates into each record and ages records
//!  out once their time-to-live runs below zero.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::origin::GeoPoint;
use crate::projection::{PlanarPoint, Projector};
use crate::sbs::ParsedFields;

/// Default time-to-live in seconds
pub const DEFAULT_TTL_SECS: f64 = 60.0;

/// Tracked aircraft data
#[derive(Debug, Clone)]
pub struct AircraftRecord {
    /// ICAO address, fixed at creation
    hex: String,
    /// Flight callsign
    pub callsign: Option<String>,
    /// Altitude in feet
    pub altitude: Option<f64>,
    /// Ground speed in knots
    pub ground_speed: Option<f64>,
    /// Track over ground in degrees
    pub track: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub on_ground: Option<bool>,
    /// Squawk code (identity)
    pub squawk: Option<String>,
    /// Position on the local plane, derived from latitude/longitude
    projected: Option<PlanarPoint>,
    /// Seconds left before eviction
    ttl: f64,
    /// When the first message for this hex was accepted
    pub first_seen: Instant,
    /// When the latest message for this hex was accepted
    pub last_updated: Instant,
    /// Accepted message count
    pub messages: u64,
}

impl AircraftRecord {
    pub fn new(hex: impl Into<String>, ttl: f64, now: Instant) -> Self {
        Self {
            hex: hex.into(),
            callsign: None,
            altitude: None,
            ground_speed: None,
            track: None,
            latitude: None,
            longitude: None,
            on_ground: None,
            squawk: None,
            projected: None,
            ttl,
            first_seen: now,
            last_updated: now,
            messages: 0,
        }
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn projected(&self) -> Option<PlanarPoint> {
        self.projected
    }

    pub fn ttl(&self) -> f64 {
        self.ttl
    }

    pub fn position(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
            _ => None,
        }
    }

    /// Copy every field carried by `fields`, leave the rest alone.
    fn merge(&mut self, fields: &ParsedFields) {
        if let Some(callsign) = &fields.callsign {
            self.callsign = Some(callsign.clone());
        }
        if let Some(altitude) = fields.altitude {
            self.altitude = Some(altitude);
        }
        if let Some(speed) = fields.ground_speed {
            self.ground_speed = Some(speed);
        }
        if let Some(track) = fields.track {
            self.track = Some(track);
        }
        if let Some(lat) = fields.latitude {
            self.latitude = Some(lat);
        }
        if let Some(lon) = fields.longitude {
            self.longitude = Some(lon);
        }
        if let Some(on_ground) = fields.on_ground {
            self.on_ground = Some(on_ground);
        }
        if let Some(squawk) = &fields.squawk {
            self.squawk = Some(squawk.clone());
        }
    }

    fn reproject(&mut self, projector: &Projector) {
        if let Some(position) = self.position() {
            self.projected = Some(projector.project(position));
        }
    }
}

/// Serializable view of a record for headless consumers
#[derive(Debug, Clone, Serialize)]
pub struct AircraftSnapshot {
    pub hex: String,
    pub callsign: Option<String>,
    pub altitude: Option<f64>,
    pub ground_speed: Option<f64>,
    pub track: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub on_ground: Option<bool>,
    pub squawk: Option<String>,
    pub position: Option<PlanarPoint>,
    pub ttl: f64,
    pub messages: u64,
}

impl From<&AircraftRecord> for AircraftSnapshot {
    fn from(ac: &AircraftRecord) -> Self {
        Self {
            hex: ac.hex.clone(),
            callsign: ac.callsign.clone(),
            altitude: ac.altitude,
            ground_speed: ac.ground_speed,
            track: ac.track,
            lat: ac.latitude,
            lon: ac.longitude,
            on_ground: ac.on_ground,
            squawk: ac.squawk.clone(),
            position: ac.projected,
            ttl: ac.ttl,
            messages: ac.messages,
        }
    }
}

/// Lifecycle notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "hex", rename_all = "lowercase")]
pub enum RegistryEvent {
    Created(String),
    Updated(String),
    Expired(String),
}

impl RegistryEvent {
    #[cfg(test)]
    fn hex(&self) -> &str {
        match self {
            RegistryEvent::Created(hex) | RegistryEvent::Updated(hex) | RegistryEvent::Expired(hex) => hex,
        }
    }
}

impl fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryEvent::Created(hex) => write!(f, "created {hex}"),
            RegistryEvent::Updated(hex) => write!(f, "updated {hex}"),
            RegistryEvent::Expired(hex) => write!(f, "expired {hex}"),
        }
    }
}

/// TTL settings for the registry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpirySettings {
    /// TTL given to a record on every accepted message
    pub max_ttl: f64,
    /// TTL consumed per second of elapsed time
    pub decay_rate: f64,
}

impl Default for ExpirySettings {
    fn default() -> Self {
        Self {
            max_ttl: DEFAULT_TTL_SECS,
            decay_rate: 1.0,
        }
    }
}

type Listener = Box<dyn FnMut(&RegistryEvent)>;

/// Registry of live aircraft keyed by hex identifier
pub struct AircraftRegistry {
    aircraft: HashMap<String, AircraftRecord>,
    projector: Projector,
    expiry: ExpirySettings,
    listeners: Vec<Listener>,
}

impl AircraftRegistry {
    pub fn new(projector: Projector, expiry: ExpirySettings) -> Self {
        Self {
            aircraft: HashMap::new(),
            projector,
            expiry,
            listeners: Vec::new(),
        }
    }

    /// Register a callback that sees every event, e.g. to release per-aircraft
    /// resources on `Expired`.
    pub fn subscribe(&mut self, listener: impl FnMut(&RegistryEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    /// Create or merge the record for `hex`.
    ///
    /// Every accepted message restores the full TTL, even one whose record
    /// already went negative but has not been ticked out yet.
    pub fn upsert(&mut self, hex: &str, fields: &ParsedFields, now: Instant) -> RegistryEvent {
        let max_ttl = self.expiry.max_ttl;
        let event = if self.aircraft.contains_key(hex) {
            RegistryEvent::Updated(hex.to_string())
        } else {
            self.aircraft
                .insert(hex.to_string(), AircraftRecord::new(hex, max_ttl, now));
            RegistryEvent::Created(hex.to_string())
        };

        if let Some(aircraft) = self.aircraft.get_mut(hex) {
            aircraft.merge(fields);
            aircraft.ttl = max_ttl;
            aircraft.last_updated = now;
            aircraft.messages += 1;
            aircraft.reproject(&self.projector);
        }

        match &event {
            RegistryEvent::Created(hex) => info!("New aircraft {}", hex),
            _ => debug!("Aircraft {} updated", hex),
        }
        self.notify(&event);
        event
    }

    /// Age every record by `elapsed` seconds and evict those below zero.
    pub fn tick(&mut self, elapsed: f64) -> Vec<RegistryEvent> {
        debug_assert!(elapsed >= 0.0, "negative tick {elapsed}");
        let decay = elapsed * self.expiry.decay_rate;

        // Collect first, remove after, so eviction never disturbs the walk
        let mut expired = Vec::new();
        for aircraft in self.aircraft.values_mut() {
            aircraft.ttl -= decay;
            if aircraft.ttl < 0.0 {
                expired.push(aircraft.hex.clone());
            }
        }

        let events: Vec<RegistryEvent> = expired
            .into_iter()
            .filter_map(|hex| self.aircraft.remove(&hex))
            .map(|aircraft| {
                info!(
                    "Aircraft {} expired after {} messages over {:.0}s",
                    aircraft.hex,
                    aircraft.messages,
                    aircraft
                        .last_updated
                        .duration_since(aircraft.first_seen)
                        .as_secs_f64()
                );
                RegistryEvent::Expired(aircraft.hex)
            })
            .collect();

        for event in &events {
            self.notify(event);
        }
        events
    }

    /// Get aircraft by hex identifier
    pub fn get(&self, hex: &str) -> Option<&AircraftRecord> {
        self.aircraft.get(hex)
    }

    /// Current records; call again for a fresh view
    pub fn all(&self) -> impl Iterator<Item = &AircraftRecord> {
        self.aircraft.values()
    }

    pub fn snapshot(&self) -> Vec<AircraftSnapshot> {
        let mut snapshot: Vec<AircraftSnapshot> = self.all().map(AircraftSnapshot::from).collect();
        snapshot.sort_by(|a, b| a.hex.cmp(&b.hex));
        snapshot
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    /// Drop every record at session end. No `Expired` events are sent.
    pub fn clear(&mut self) {
        self.aircraft.clear();
    }

    fn notify(&mut self, event: &RegistryEvent) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }
}
