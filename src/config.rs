//! Configuration and command-line argument parsing

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::aircraft::{DEFAULT_TTL_SECS, ExpirySettings};

pub const ENV_ORIGIN_LATITUDE: &str = "SKIES_ADSB_DEFAULT_ORIGIN_LATITUDE";
pub const ENV_ORIGIN_LONGITUDE: &str = "SKIES_ADSB_DEFAULT_ORIGIN_LONGITUDE";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("help requested")]
    Help,
    #[error("unknown option: {0}")]
    UnknownOption(String),
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("invalid value {value:?} for {option}")]
    InvalidValue { option: String, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    // Input
    pub sbs_host: String,
    pub sbs_port: u16,
    pub filename: Option<PathBuf>,
    pub reconnect_delay: Duration,

    // Origin
    pub origin_lat: Option<f64>,
    pub origin_lon: Option<f64>,
    pub origins_file: Option<PathBuf>,
    pub origin_name: Option<String>,

    // Tracking
    pub ttl: f64,
    pub decay_rate: f64,
    pub scale: f64,
    pub frame_interval: Duration,

    // Output
    pub interactive: bool,
    pub interactive_rows: usize,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sbs_host: "127.0.0.1".to_string(),
            sbs_port: 30003,
            filename: None,
            reconnect_delay: Duration::from_secs(5),
            origin_lat: None,
            origin_lon: None,
            origins_file: None,
            origin_name: None,
            ttl: DEFAULT_TTL_SECS,
            decay_rate: 1.0,
            scale: 1.0,
            frame_interval: Duration::from_millis(100),
            interactive: false,
            interactive_rows: 15,
            json: false,
        }
    }
}

impl Config {
    pub fn from_args() -> Self {
        match Self::parse(env::args().skip(1), |key| env::var(key).ok()) {
            Ok(config) => config,
            Err(ConfigError::Help) => {
                print_help();
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("{}", e);
                print_help();
                std::process::exit(1);
            }
        }
    }

    /// Parse arguments (without the program name). `env` looks up environment
    /// variables; the default origin variables win over `--origin-lat/--origin-lon`.
    pub fn parse<I, E>(args: I, env: E) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
        E: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--sbs-host" => config.sbs_host = value(&arg, &mut args)?,
                "--sbs-port" => config.sbs_port = parsed(&arg, &mut args)?,
                "--ifile" => config.filename = Some(PathBuf::from(value(&arg, &mut args)?)),
                "--reconnect-secs" => {
                    config.reconnect_delay = Duration::from_secs(parsed(&arg, &mut args)?)
                }
                "--origin-lat" => config.origin_lat = Some(parsed(&arg, &mut args)?),
                "--origin-lon" => config.origin_lon = Some(parsed(&arg, &mut args)?),
                "--origins-file" => {
                    config.origins_file = Some(PathBuf::from(value(&arg, &mut args)?))
                }
                "--origin-name" => config.origin_name = Some(value(&arg, &mut args)?),
                "--ttl" => config.ttl = positive(&arg, &mut args)?,
                "--decay-rate" => config.decay_rate = positive(&arg, &mut args)?,
                "--scale" => config.scale = positive(&arg, &mut args)?,
                "--frame-ms" => {
                    let ms: u64 = parsed(&arg, &mut args)?;
                    if ms == 0 {
                        return Err(invalid(&arg, "0"));
                    }
                    config.frame_interval = Duration::from_millis(ms);
                }
                "--interactive" => config.interactive = true,
                "--interactive-rows" => config.interactive_rows = parsed(&arg, &mut args)?,
                "--json" => config.json = true,
                "--help" | "-h" => return Err(ConfigError::Help),
                _ => return Err(ConfigError::UnknownOption(arg)),
            }
        }

        if let Some(lat) = env(ENV_ORIGIN_LATITUDE) {
            config.origin_lat = Some(lat.trim().parse().map_err(|_| invalid(ENV_ORIGIN_LATITUDE, &lat))?);
        }
        if let Some(lon) = env(ENV_ORIGIN_LONGITUDE) {
            config.origin_lon = Some(lon.trim().parse().map_err(|_| invalid(ENV_ORIGIN_LONGITUDE, &lon))?);
        }

        Ok(config)
    }

    pub fn sbs_addr(&self) -> String {
        format!("{}:{}", self.sbs_host, self.sbs_port)
    }

    pub fn expiry(&self) -> ExpirySettings {
        ExpirySettings {
            max_ttl: self.ttl,
            decay_rate: self.decay_rate,
        }
    }
}

fn value(option: &str, args: &mut impl Iterator<Item = String>) -> Result<String, ConfigError> {
    args.next()
        .ok_or_else(|| ConfigError::MissingValue(option.to_string()))
}

fn parsed<T: std::str::FromStr>(
    option: &str,
    args: &mut impl Iterator<Item = String>,
) -> Result<T, ConfigError> {
    let raw = value(option, args)?;
    raw.parse().map_err(|_| invalid(option, &raw))
}

fn positive(option: &str, args: &mut impl Iterator<Item = String>) -> Result<f64, ConfigError> {
    let raw = value(option, args)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(invalid(option, &raw)),
    }
}

fn invalid(option: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    }
}

fn print_help() {
    println!(
        r#"skies-adsb - live aircraft picture from an SBS/BaseStation feed

Usage: skies-adsb [OPTIONS]

Options:
  --sbs-host <host>       SBS feed host (default: 127.0.0.1)
  --sbs-port <port>       SBS feed port (default: 30003)
  --ifile <filename>      Replay SBS messages from a file ('-' for stdin)
  --reconnect-secs <s>    Delay before reconnecting a dropped feed (default: 5)
  --origin-lat <degrees>  Default origin latitude
  --origin-lon <degrees>  Default origin longitude
  --origins-file <path>   GeoJSON or Overpass JSON dataset holding the origin
  --origin-name <name>    Pick the origin from the dataset by ICAO code or name
  --ttl <s>               Seconds an aircraft survives without messages (default: 60)
  --decay-rate <r>        TTL consumed per elapsed second (default: 1.0)
  --scale <f>             Units per meter on the local plane (default: 1.0)
  --frame-ms <ms>         Expiry tick and refresh interval (default: 100)
  --interactive           Interactive mode refreshing data on screen
  --interactive-rows <N>  Max rows in interactive mode (default: 15)
  --json                  Print a JSON snapshot of all aircraft every second
  --help                  Show this help

Environment:
  {ENV_ORIGIN_LATITUDE}, {ENV_ORIGIN_LONGITUDE}
                          Default origin, overriding --origin-lat/--origin-lon
"#
    );
}
