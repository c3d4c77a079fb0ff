//! Core capture types and traits shared by the recorder crates

use serde::{Serialize, Deserialize};
use std::{io, path::PathBuf};
use tokio::sync::{mpsc, watch};

use model::{DerivedMetrics, TelemetryRecord};

mod capture;

pub use capture::{Phase, SessionCapture};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("receive: {0}")]
    Receive(#[source] io::Error),
    #[error("record sink: {0}")]
    Sink(#[from] SinkError),
}

/// Append-only destination for accepted ticks.
///
/// `begin` is called exactly once, on the first active record, before any
/// `append`. Every `append` is followed by a `flush`.
pub trait RecordSink: Send {
    fn begin(&mut self) -> Result<(), SinkError>;
    fn append(&mut self, record: &TelemetryRecord, metrics: &DerivedMetrics) -> Result<(), SinkError>;
    fn flush(&mut self) -> Result<(), SinkError>;
    fn close(&mut self) -> Result<(), SinkError>;
}

impl<T: RecordSink + ?Sized> RecordSink for Box<T> {
    fn begin(&mut self) -> Result<(), SinkError> { (**self).begin() }
    fn append(&mut self, record: &TelemetryRecord, metrics: &DerivedMetrics) -> Result<(), SinkError> {
        (**self).append(record, metrics)
    }
    fn flush(&mut self) -> Result<(), SinkError> { (**self).flush() }
    fn close(&mut self) -> Result<(), SinkError> { (**self).close() }
}

/// What the live readout shows for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub speed_mph: f64,
    pub gear: u8,
    pub current_rpm: f32,
    pub max_rpm: f32,
    pub percent_max_rpm: f64,
}

impl Snapshot {
    pub fn new(record: &TelemetryRecord, metrics: &DerivedMetrics) -> Self {
        Self {
            speed_mph: metrics.speed_mph,
            gear: record.frame.gear,
            current_rpm: record.frame.current_engine_rpm,
            max_rpm: record.frame.engine_max_rpm,
            percent_max_rpm: metrics.percent_max_rpm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub last_speed_mph: Option<f64>,
    pub ticks: usize,
}

/// Live readout. Best effort: implementations swallow (and log) their own
/// write failures so a broken terminal never ends a session.
pub trait DisplaySink: Send {
    fn show(&mut self, snapshot: &Snapshot);
    fn finish(&mut self, summary: &FinalSummary);
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn show(&mut self, snapshot: &Snapshot) { (**self).show(snapshot) }
    fn finish(&mut self, summary: &FinalSummary) { (**self).finish(summary) }
}

/// Display that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn show(&mut self, _snapshot: &Snapshot) {}
    fn finish(&mut self, _summary: &FinalSummary) {}
}

/// Anything that can hand over one datagram at a time.
#[async_trait::async_trait]
pub trait DatagramSource: Send {
    /// Waits for the next datagram and copies it into `buf`.
    /// `Ok(None)` means no more datagrams will ever arrive.
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

#[async_trait::async_trait]
impl DatagramSource for tokio::net::UdpSocket {
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let (len, _peer) = self.recv_from(buf).await?;
        Ok(Some(len))
    }
}

/// Datagrams pushed in-process, e.g. from a test or a synthetic generator.
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self { Self { rx } }
}

pub fn datagram_channel(capacity: usize) -> (mpsc::Sender<Vec<u8>>, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ChannelSource::new(rx))
}

#[async_trait::async_trait]
impl DatagramSource for ChannelSource {
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.rx.recv().await {
            Some(pkt) => {
                // same truncation a UDP socket applies to oversized datagrams
                let len = pkt.len().min(buf.len());
                buf[..len].copy_from_slice(&pkt[..len]);
                Ok(Some(len))
            }
            None => Ok(None),
        }
    }
}

pub type ShutdownTx = watch::Sender<bool>;
pub type ShutdownRx = watch::Receiver<bool>;

pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    watch::channel(false)
}

/// Resolves once shutdown is requested. Never resolves if the sender is
/// dropped without requesting it.
pub async fn shutdown_requested(rx: &mut ShutdownRx) {
    let requested = rx.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}
