//! Forza "Data Out" Dash recorder: decodes datagrams and drives a capture
//! session until the race ends.

use time::OffsetDateTime;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use forza_ingest_core::*;
use model::TelemetryRecord;

mod parser;

pub use parser::{decode, DecodeError, DASH_MIN_LEN};

/// Large enough for every Dash variant (311..331 bytes) with headroom.
pub const RECV_BUFFER_LEN: usize = 2048;

pub async fn bind(listen_address: &str, listen_port: u16) -> Result<UdpSocket, SessionError> {
    let socket = UdpSocket::bind((listen_address, listen_port))
        .await
        .map_err(|source| SessionError::Bind {
            addr: format!("{listen_address}:{listen_port}"),
            source,
        })?;
    if let Ok(local) = socket.local_addr() {
        info!(%local, "listening for dash telemetry");
    }
    Ok(socket)
}

/// Feeds datagrams from `source` into `capture` until the race ends, the
/// source runs dry, or shutdown is requested.
///
/// There is no receive timeout: if the game stops sending, this waits until
/// shutdown is requested.
pub async fn drive<S, R, D>(
    source: &mut S,
    mut capture: SessionCapture<R, D>,
    mut shutdown: ShutdownRx,
) -> Result<SessionCapture<R, D>, SessionError>
where
    S: DatagramSource + ?Sized,
    R: RecordSink,
    D: DisplaySink,
{
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    loop {
        let len = tokio::select! {
            received = source.recv_datagram(&mut buf) => {
                match received.map_err(SessionError::Receive)? {
                    Some(len) => len,
                    None => {
                        debug!(phase = ?capture.phase(), "datagram source closed");
                        break;
                    }
                }
            }
            _ = shutdown_requested(&mut shutdown) => {
                info!(phase = ?capture.phase(), "shutdown requested");
                capture.interrupt()?;
                break;
            }
        };

        let frame = match decode(&buf[..len]) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(%err, "discarding datagram");
                continue;
            }
        };
        let record = TelemetryRecord::new(frame, OffsetDateTime::now_utc());
        if capture.feed(record)? == Phase::Ended {
            break;
        }
    }
    Ok(capture)
}

/// Binds `listen_address:listen_port`, records one race into `sink` and
/// returns every accepted tick. The socket is closed on return.
pub async fn run<R, D>(
    listen_address: &str,
    listen_port: u16,
    sink: R,
    display: D,
    shutdown: ShutdownRx,
) -> Result<Vec<TelemetryRecord>, SessionError>
where
    R: RecordSink,
    D: DisplaySink,
{
    let mut socket = bind(listen_address, listen_port).await?;
    let capture = drive(&mut socket, SessionCapture::new(sink, display), shutdown).await?;
    Ok(capture.into_history())
}
