//!   skies-adsb:   live aircraft picture from an SBS/BaseStation feed
//!
//!  Parses BaseStation messages, keeps one record per ICAO address,
//!  projects positions onto a local plane around the session origin and
//!  expires aircraft that go quiet.

mod aircraft;
mod config;
mod display;
mod expiry;
mod feed;
mod origin;
mod projection;
mod sbs;
mod session;

use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::aircraft::{AircraftRegistry, RegistryEvent};
use crate::config::Config;
use crate::origin::{GeoPoint, OriginDataset, OriginSource};
use crate::projection::Projector;
use crate::session::Session;

const JSON_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_args();

    // Interactive mode owns the terminal
    if !config.interactive {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
        info!("skies-adsb starting...");
        info!("Configuration: {:?}", config);
    }

    let (origin, source) = resolve_origin(&config)?;
    info!("Origin {} from {}", origin, source);

    let mut projector = Projector::new(config.scale)?;
    projector.init_origin(origin)?;
    info!("Projecting at {} units per meter", projector.scale());
    let mut registry = AircraftRegistry::new(projector, config.expiry());
    if config.json {
        registry.subscribe(|event| {
            if matches!(event, RegistryEvent::Updated(_)) {
                return;
            }
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Cannot serialize event {}: {}", event, e),
            }
        });
    }

    // Single-threaded: feed events and frame ticks are handled one at a time
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(config, Session::new(registry)));
    Ok(())
}

fn resolve_origin(config: &Config) -> Result<(GeoPoint, OriginSource), Box<dyn std::error::Error>> {
    let dataset = match &config.origins_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let dataset = OriginDataset::from_json(&text)?;
            let found = dataset.find_origin(config.origin_name.as_deref())?;
            let name = found.icao.clone().or_else(|| found.name.clone());
            Some((found.point, name))
        }
        None => None,
    };

    let configured = match (config.origin_lat, config.origin_lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)?),
        (None, None) => None,
        _ => {
            warn!("Ignoring half-specified default origin, both latitude and longitude are needed");
            None
        }
    };

    // No position receiver is wired into the CLI, so there is never a live fix here
    Ok(origin::select_origin(None, dataset, configured)?)
}

async fn run(config: Config, mut session: Session) {
    let (tx, mut rx) = feed::channel();

    let feed_handle = match config.filename.clone() {
        Some(path) => tokio::spawn(async move {
            if let Err(e) = feed::run_file_feed(path, tx).await {
                error!("Feed error: {}", e);
            }
        }),
        None => tokio::spawn(feed::run_tcp_feed(config.sbs_addr(), config.reconnect_delay, tx)),
    };

    let mut frames = tokio::time::interval(config.frame_interval);
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_frame = Instant::now();
    let mut last_json = Instant::now();
    let mut feed_done = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = rx.recv(), if !feed_done => match event {
                Some(event) => {
                    session.handle_feed_event(event, Instant::now());
                }
                None => {
                    // Input is over; what is left ages out on its own
                    info!(
                        "Feed finished, waiting for {} aircraft to expire",
                        session.registry().len()
                    );
                    feed_done = true;
                }
            },
            _ = frames.tick() => {
                let now = Instant::now();
                session.advance(now - last_frame);
                last_frame = now;

                if config.interactive {
                    display::draw(&display::render_table(
                        session.registry(),
                        session.stats(),
                        session.is_connected(),
                        config.interactive_rows,
                    ));
                }
                if config.json && now - last_json >= JSON_INTERVAL {
                    last_json = now;
                    match display::json_snapshot(session.registry(), now) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Cannot serialize snapshot: {}", e),
                    }
                }
                if feed_done && session.registry().is_empty() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    feed_handle.abort();
    session.close();
}
