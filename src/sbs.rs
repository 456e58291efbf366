//! SBS/BaseStation message parser
//!
//!  Parses one comma-separated BaseStation line (as served on port 30003)
//!  into a sparse set of fields. An empty position means "not carried by
//!  this message", never zero.

use std::fmt;

use thiserror::Error;

/// Field positions within a BaseStation line
pub const FIELD_MESSAGE_TYPE: usize = 0;
pub const FIELD_TRANSMISSION_TYPE: usize = 1;
pub const FIELD_AIRCRAFT_ID: usize = 3;
pub const FIELD_HEX_IDENT: usize = 4;
pub const FIELD_FLIGHT_ID: usize = 5;
pub const FIELD_CALLSIGN: usize = 10;
pub const FIELD_ALTITUDE: usize = 11;
pub const FIELD_GROUND_SPEED: usize = 12;
pub const FIELD_TRACK: usize = 13;
pub const FIELD_LATITUDE: usize = 14;
pub const FIELD_LONGITUDE: usize = 15;
pub const FIELD_SQUAWK: usize = 17;
pub const FIELD_ON_GROUND: usize = 21;

const DELIMITER: char = ',';

/// Fields that can fail to parse without rejecting the whole message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    TransmissionType,
    Altitude,
    GroundSpeed,
    Track,
    Latitude,
    Longitude,
    OnGround,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::TransmissionType => "transmission type",
            Field::Altitude => "altitude",
            Field::GroundSpeed => "ground speed",
            Field::Track => "track",
            Field::Latitude => "latitude",
            Field::Longitude => "longitude",
            Field::OnGround => "on-ground flag",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("missing hex identifier")]
    MissingHex,
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: Field, value: String },
}

/// BaseStation message type (first field)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    /// Selection change
    Sel,
    /// New id
    Id,
    /// New aircraft
    Air,
    /// Status change
    Sta,
    /// Click
    Clk,
    /// Transmission message from the aircraft
    Msg,
    Other(String),
}

impl MessageType {
    fn from_field(s: &str) -> Self {
        match s {
            "SEL" => MessageType::Sel,
            "ID" => MessageType::Id,
            "AIR" => MessageType::Air,
            "STA" => MessageType::Sta,
            "CLK" => MessageType::Clk,
            "MSG" => MessageType::Msg,
            other => MessageType::Other(other.to_string()),
        }
    }
}

/// Sparse field set: `None` means the message did not carry the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFields {
    pub callsign: Option<String>,
    pub altitude: Option<f64>,
    pub ground_speed: Option<f64>,
    pub track: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub squawk: Option<String>,
    pub on_ground: Option<bool>,
}

/// One accepted BaseStation message
#[derive(Debug, Clone, PartialEq)]
pub struct SbsMessage {
    pub message_type: MessageType,
    pub transmission_type: Option<u8>,
    pub aircraft_id: Option<String>,
    /// ICAO address, upper case
    pub hex: String,
    pub flight_id: Option<String>,
    pub fields: ParsedFields,
    /// Fields that were present but malformed and have been dropped
    pub field_errors: Vec<ParseError>,
}

/// Parse a single BaseStation line.
pub fn parse(raw: &str) -> Result<SbsMessage, ParseError> {
    let line = raw.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let parts: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
    let text = |idx: usize| -> Option<&str> { parts.get(idx).copied().filter(|s| !s.is_empty()) };

    let hex = text(FIELD_HEX_IDENT)
        .ok_or(ParseError::MissingHex)?
        .to_ascii_uppercase();

    let mut field_errors = Vec::new();
    let mut number = |idx: usize, field: Field| -> Option<f64> {
        let value = text(idx)?;
        match value.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            _ => {
                field_errors.push(invalid(field, value));
                None
            }
        }
    };

    let fields = ParsedFields {
        callsign: text(FIELD_CALLSIGN).map(str::to_string),
        altitude: number(FIELD_ALTITUDE, Field::Altitude),
        ground_speed: number(FIELD_GROUND_SPEED, Field::GroundSpeed),
        track: number(FIELD_TRACK, Field::Track),
        latitude: number(FIELD_LATITUDE, Field::Latitude),
        longitude: number(FIELD_LONGITUDE, Field::Longitude),
        squawk: text(FIELD_SQUAWK).map(str::to_string),
        on_ground: None,
    };

    let on_ground = text(FIELD_ON_GROUND).and_then(|value| match value {
        "-1" | "1" => Some(true),
        "0" => Some(false),
        v if v.eq_ignore_ascii_case("true") => Some(true),
        v if v.eq_ignore_ascii_case("false") => Some(false),
        v => {
            field_errors.push(invalid(Field::OnGround, v));
            None
        }
    });

    let transmission_type = text(FIELD_TRANSMISSION_TYPE).and_then(|value| match value.parse() {
        Ok(t) => Some(t),
        Err(_) => {
            field_errors.push(invalid(Field::TransmissionType, value));
            None
        }
    });

    Ok(SbsMessage {
        message_type: MessageType::from_field(text(FIELD_MESSAGE_TYPE).unwrap_or_default()),
        transmission_type,
        aircraft_id: text(FIELD_AIRCRAFT_ID).map(str::to_string),
        hex,
        flight_id: text(FIELD_FLIGHT_ID).map(str::to_string),
        fields: ParsedFields { on_ground, ..fields },
        field_errors,
    })
}

fn invalid(field: Field, value: &str) -> ParseError {
    ParseError::InvalidField {
        field,
        value: value.to_string(),
    }
}
