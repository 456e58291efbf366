//! BaseStation feed input
//!
//!  Pulls raw SBS lines from a TCP port (dump1090 `--net-sbs-port`,
//!  readsb, a receiver's port 30003) or from a capture file and pushes
//!  them into the session's event channel.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("feed read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// What the feed reports to the session
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Connected(String),
    Line(String),
    Disconnected(String),
}

pub fn channel() -> (mpsc::Sender<FeedEvent>, mpsc::Receiver<FeedEvent>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

/// Keep a TCP feed alive, reconnecting after `reconnect_delay` whenever the
/// connection drops. Returns once the receiving side goes away.
pub async fn run_tcp_feed(addr: String, reconnect_delay: Duration, tx: mpsc::Sender<FeedEvent>) {
    loop {
        let reason = match TcpStream::connect(&addr).await {
            Ok(socket) => {
                info!("Connected to SBS feed {}", addr);
                if tx.send(FeedEvent::Connected(addr.clone())).await.is_err() {
                    return;
                }
                match forward_lines(BufReader::new(socket), &tx).await {
                    Ok(true) => "connection closed by peer".to_string(),
                    Ok(false) => return,
                    Err(e) => e.to_string(),
                }
            }
            Err(e) => format!("connect to {addr} failed: {e}"),
        };

        warn!("SBS feed {} unavailable: {}", addr, reason);
        if tx.send(FeedEvent::Disconnected(reason)).await.is_err() {
            return;
        }
        tokio::time::sleep(reconnect_delay).await;
        debug!("Reconnecting to SBS feed {}", addr);
    }
}

/// Replay a capture file (`-` reads stdin), then report end of input.
pub async fn run_file_feed(path: PathBuf, tx: mpsc::Sender<FeedEvent>) -> Result<(), FeedError> {
    let name = path.display().to_string();
    let keep_going = if name == "-" {
        info!("Reading SBS messages from stdin");
        forward_lines(BufReader::new(io::stdin()), &tx).await?
    } else {
        let file = File::open(&path).await.map_err(|source| FeedError::Open {
            path: path.clone(),
            source,
        })?;
        info!("Reading SBS messages from {}", name);
        forward_lines(BufReader::new(file), &tx).await?
    };

    if keep_going {
        let _ = tx
            .send(FeedEvent::Disconnected(format!("end of input {name}")))
            .await;
    }
    Ok(())
}

/// Forward non-empty lines. `Ok(false)` means the receiver is gone.
///
/// Lines that are not valid UTF-8 are skipped, the rest of the stream is kept.
async fn forward_lines<R>(mut reader: R, tx: &mpsc::Sender<FeedEvent>) -> Result<bool, FeedError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                debug!("Skipping garbled line ({} bytes): {}", buf.len(), e);
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        if tx.send(FeedEvent::Line(line.to_string())).await.is_err() {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_forward_lines_skips_blanks() {
        let input: &[u8] = b"MSG,3,,,A1B2C3\r\n\r\n   \nMSG,4,,,4840D6\n";
        let (tx, mut rx) = channel();
        assert!(forward_lines(input, &tx).await.unwrap());
        drop(tx);

        let mut got = Vec::new();
        while let Some(event) = rx.recv().await {
            got.push(event);
        }
        assert_eq!(
            got,
            vec![
                FeedEvent::Line("MSG,3,,,A1B2C3".into()),
                FeedEvent::Line("MSG,4,,,4840D6".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_forward_lines_skips_invalid_utf8() {
        let input: &[u8] = b"MSG,5,,,A1B2C3,,,,,,,3500,,,,,,,,,,\nMSG,5,,,BAD\xff\xfe,,,,,,,100,,,,,,,,,,\nMSG,5,,,4840D6,,,,,,,9000,,,,,,,,,,";
        let (tx, mut rx) = channel();
        assert!(forward_lines(input, &tx).await.unwrap());
        drop(tx);

        let mut got = Vec::new();
        while let Some(event) = rx.recv().await {
            got.push(event);
        }
        assert_eq!(
            got,
            vec![
                FeedEvent::Line("MSG,5,,,A1B2C3,,,,,,,3500,,,,,,,,,,".into()),
                FeedEvent::Line("MSG,5,,,4840D6,,,,,,,9000,,,,,,,,,,".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_forward_lines_stops_without_receiver() {
        let input: &[u8] = b"MSG,3,,,A1B2C3\n";
        let (tx, rx) = channel();
        drop(rx);
        assert!(!forward_lines(input, &tx).await.unwrap());
    }

    #[tokio::test]
    async fn test_tcp_feed_reports_connect_lines_and_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"MSG,5,,,A1B2C3,,,,,,,3500,,,,,,,,,,\n")
                .await
                .unwrap();
        });

        let (tx, mut rx) = channel();
        let feed = tokio::spawn(run_tcp_feed(addr.clone(), Duration::from_secs(60), tx));

        assert_eq!(rx.recv().await, Some(FeedEvent::Connected(addr)));
        assert_eq!(
            rx.recv().await,
            Some(FeedEvent::Line("MSG,5,,,A1B2C3,,,,,,,3500,,,,,,,,,,".into()))
        );
        assert!(matches!(rx.recv().await, Some(FeedEvent::Disconnected(_))));
        feed.abort();
    }

    #[tokio::test]
    async fn test_file_feed_missing_file() {
        let (tx, _rx) = channel();
        let err = run_file_feed(PathBuf::from("/nonexistent/capture.sbs"), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Open { .. }));
    }
}
