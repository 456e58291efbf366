//! Terminal presentation of the registry
//!
//!  A thin consumer of the registry's pull API: an interactive table
//!  redrawn every frame and a JSON snapshot for headless use.

use std::io::{self, Write};
use std::time::Instant;

use crate::aircraft::{AircraftRecord, AircraftRegistry};
use crate::session::SessionStats;

// ANSI color codes
const RED: &str = "\x1B[91m";
const YELLOW: &str = "\x1B[93m";
const BOLD: &str = "\x1B[1m";
const RESET: &str = "\x1B[0m";

/// Hijack, radio failure and general emergency
fn emergency(squawk: Option<&str>) -> Option<(&'static str, &'static str)> {
    match squawk? {
        "7500" => Some((RED, "HIJACK (7500)")),
        "7600" => Some((YELLOW, "RADIO FAILURE (7600)")),
        "7700" => Some((RED, "EMERGENCY (7700)")),
        _ => None,
    }
}

fn opt<T: std::fmt::Display>(value: Option<T>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_default()
}

fn format_row(ac: &AircraftRecord) -> String {
    let hex = match emergency(ac.squawk.as_deref()) {
        Some((color, _)) => format!("{color}{:<6}{RESET}", ac.hex()),
        None => format!("{:<6}", ac.hex()),
    };
    let (x, y) = match ac.projected() {
        Some(p) => (format!("{:.0}", p.x), format!("{:.0}", p.y)),
        None => (String::new(), String::new()),
    };

    format!(
        "{} {:<8} {:>7} {:>5} {:>5} {:>9} {:>10} {:>9} {:>9} {:>4} {:>5.1}",
        hex,
        ac.callsign.as_deref().unwrap_or(""),
        opt(ac.altitude, 0),
        opt(ac.ground_speed, 0),
        opt(ac.track, 0),
        opt(ac.latitude, 4),
        opt(ac.longitude, 4),
        x,
        y,
        ac.squawk.as_deref().unwrap_or(""),
        ac.ttl()
    )
}

/// Build the full table, most recently heard aircraft first.
pub fn render_table(
    registry: &AircraftRegistry,
    stats: SessionStats,
    connected: bool,
    max_rows: usize,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{BOLD}{:<6} {:<8} {:>7} {:>5} {:>5} {:>9} {:>10} {:>9} {:>9} {:>4} {:>5}{RESET}\n",
        "Hex", "Flight", "Alt", "Spd", "Trk", "Lat", "Lon", "X", "Y", "Sqk", "TTL"
    ));
    out.push_str(&"-".repeat(85));
    out.push('\n');

    let mut aircraft: Vec<&AircraftRecord> = registry.all().collect();
    aircraft.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));

    for ac in aircraft.iter().take(max_rows) {
        out.push_str(&format_row(ac));
        out.push('\n');
        if let Some((color, warning)) = emergency(ac.squawk.as_deref()) {
            out.push_str(&format!("{color}  ! {warning}{RESET}\n"));
        }
    }

    out.push_str(&"-".repeat(85));
    out.push('\n');
    let origin = registry
        .projector()
        .origin()
        .map(|o| o.to_string())
        .unwrap_or_else(|| "unset".to_string());
    out.push_str(&format!(
        "Aircraft: {} | Origin: {} | Feed: {} | Msgs: {} ok / {} rejected | Ctrl+C to exit\n",
        aircraft.len(),
        origin,
        if connected { "up" } else { "down" },
        stats.accepted,
        stats.rejected
    ));
    out
}

/// Clear the screen and draw the table.
pub fn draw(table: &str) {
    print!("\x1B[2J\x1B[H{}", table);
    io::stdout().flush().ok();
}

/// One JSON line holding every aircraft.
pub fn json_snapshot(registry: &AircraftRegistry, now: Instant) -> serde_json::Result<String> {
    let aircraft = registry.snapshot();
    let seen: Vec<f64> = registry
        .all()
        .map(|ac| now.saturating_duration_since(ac.last_updated).as_secs_f64())
        .collect();
    let oldest = seen.into_iter().fold(0.0, f64::max);

    serde_json::to_string(&serde_json::json!({
        "count": aircraft.len(),
        "oldest_seen_secs": oldest,
        "aircraft": aircraft,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::ExpirySettings;
    use crate::origin::GeoPoint;
    use crate::projection::Projector;
    use crate::sbs;

    fn registry() -> AircraftRegistry {
        let origin = GeoPoint::new(25.7959, -80.2870).unwrap();
        let mut registry = AircraftRegistry::new(
            Projector::with_origin(origin, 1.0).unwrap(),
            ExpirySettings::default(),
        );
        for line in [
            "MSG,3,,,A1B2C3,,,,,,AAL123,3500,250,90,25.80,-80.29,,1200,,,,0",
            "MSG,6,,,4840D6,,,,,,,,,,,,,7700,,,,0",
        ] {
            let msg = sbs::parse(line).unwrap();
            registry.upsert(&msg.hex, &msg.fields, Instant::now());
        }
        registry
    }

    #[test]
    fn test_render_table() {
        let registry = registry();
        let table = render_table(&registry, SessionStats::default(), true, 15);

        assert!(table.contains("AAL123"));
        assert!(table.contains("25.8000"));
        assert!(table.contains("EMERGENCY (7700)"));
        assert!(table.contains("Aircraft: 2"));
        assert!(table.contains("Feed: up"));
    }

    #[test]
    fn test_render_table_limits_rows() {
        let registry = registry();
        let table = render_table(&registry, SessionStats::default(), false, 1);
        let rows = table.matches("A1B2C3").count() + table.matches("4840D6").count();
        assert_eq!(rows, 1);
        assert!(table.contains("Aircraft: 2"));
    }

    #[test]
    fn test_json_snapshot() {
        let registry = registry();
        let text = json_snapshot(&registry, Instant::now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["count"], 2);
        let first = &value["aircraft"][0];
        assert_eq!(first["hex"], "4840D6");
        assert_eq!(first["squawk"], "7700");
        assert!(first["position"].is_null());

        let second = &value["aircraft"][1];
        assert_eq!(second["callsign"], "AAL123");
        assert!(second["position"]["x"].is_number());
    }
}
