// apps/recorder/src/supervisor.rs
use std::{net::SocketAddr, sync::Arc};

use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use forza_ingest_core::{
    shutdown_channel, DisplaySink, NullDisplay, SessionCapture, SessionError, ShutdownTx,
};
use iox::{ChannelDisplay, CsvRecordSink, DisplayTx};
use model::TelemetryRecord;

use crate::config::SessionDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("session task aborted: {0}")]
    Join(#[from] JoinError),
}

/// Requests every running session to stop.
#[derive(Clone)]
pub struct Stopper(Arc<ShutdownTx>);

impl Stopper {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

pub struct SessionHandle {
    pub id: Uuid,
    pub descriptor: SessionDescriptor,
    /// Bound socket address; `None` when binding failed.
    pub local_addr: Option<SocketAddr>,
    task: JoinHandle<Result<Vec<TelemetryRecord>, SessionError>>,
}

pub struct SessionOutcome {
    pub id: Uuid,
    pub descriptor: SessionDescriptor,
    pub result: Result<Vec<TelemetryRecord>, SupervisorError>,
}

/// Runs one independent capture per configured session. Sessions share
/// nothing but the shutdown signal and (optionally) the console renderer.
pub struct Supervisor {
    sessions: Vec<SessionDescriptor>,
    shutdown: Arc<ShutdownTx>,
    display: Option<DisplayTx>,
}

impl Supervisor {
    pub fn configure(sessions: Vec<SessionDescriptor>) -> Self {
        let (tx, _) = shutdown_channel();
        Self { sessions, shutdown: Arc::new(tx), display: None }
    }

    /// Sends every session's live readout to a console renderer.
    pub fn with_display(mut self, tx: DisplayTx) -> Self {
        self.display = Some(tx);
        self
    }

    pub fn sessions(&self) -> &[SessionDescriptor] { &self.sessions }

    pub fn stopper(&self) -> Stopper { Stopper(self.shutdown.clone()) }

    pub fn shutdown(&self) { self.stopper().stop() }

    /// Binds every listener, then spawns its capture task. A session that
    /// fails to bind gets a handle that resolves to the bind error; the
    /// others start regardless.
    pub async fn start_all(&self) -> Vec<SessionHandle> {
        let mut handles = Vec::with_capacity(self.sessions.len());
        for d in &self.sessions {
            let id = Uuid::new_v4();
            let span = info_span!("session", %id, port = d.listen_port, output = %d.output.display());

            let (local_addr, task) = match forza_ingest_dash::bind(&d.listen_address, d.listen_port)
                .instrument(span.clone())
                .await
            {
                Ok(mut socket) => {
                    let local_addr = socket.local_addr().ok();
                    let sink = CsvRecordSink::new(d.output.clone());
                    let display = self.display_for(d);
                    let shutdown = self.shutdown.subscribe();
                    let task = tokio::spawn(
                        async move {
                            let capture = SessionCapture::new(sink, display);
                            let capture = forza_ingest_dash::drive(&mut socket, capture, shutdown).await?;
                            Ok::<_, SessionError>(capture.into_history())
                        }
                        .instrument(span),
                    );
                    (local_addr, task)
                }
                Err(err) => {
                    error!(parent: &span, %err, "session failed to start");
                    (None, tokio::spawn(async move { Err::<Vec<TelemetryRecord>, _>(err) }))
                }
            };
            handles.push(SessionHandle { id, descriptor: d.clone(), local_addr, task });
        }
        handles
    }

    /// Waits for every session. One session failing or panicking does not
    /// affect the others' outcomes.
    pub async fn join_all(handles: Vec<SessionHandle>) -> Vec<SessionOutcome> {
        futures::future::join_all(handles.into_iter().map(|h| async move {
            let result = match h.task.await {
                Ok(res) => res.map_err(SupervisorError::from),
                Err(join) => Err(SupervisorError::from(join)),
            };
            match &result {
                Ok(history) => {
                    let s = analysis::summarize(history);
                    info!(
                        id = %h.id,
                        output = %h.descriptor.output.display(),
                        ticks = s.ticks,
                        duration_ms = s.duration_ms,
                        top_speed_mph = s.top_speed_mph,
                        avg_speed_mph = s.avg_speed_mph,
                        max_rpm = s.max_rpm_seen,
                        "session finished"
                    );
                }
                Err(err) => {
                    error!(id = %h.id, output = %h.descriptor.output.display(), %err, "session failed");
                }
            }
            SessionOutcome { id: h.id, descriptor: h.descriptor, result }
        }))
        .await
    }

    fn display_for(&self, d: &SessionDescriptor) -> Box<dyn DisplaySink> {
        match &self.display {
            Some(tx) => Box::new(ChannelDisplay::new(d.label(), tx.clone())),
            None => Box::new(NullDisplay),
        }
    }
}
