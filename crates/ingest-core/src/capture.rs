use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use model::TelemetryRecord;

use crate::{DisplaySink, FinalSummary, RecordSink, SessionError, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    NotStarted,
    Racing,
    Ended,
}

/// Race-session state for one listener.
///
/// Driven only by the `race_active` flag of each record: the first active
/// record starts the session, the first inactive record after that ends it.
/// Once `Ended`, further records are ignored.
pub struct SessionCapture<R, D> {
    phase: Phase,
    history: Vec<TelemetryRecord>,
    last_speed_mph: Option<f64>,
    sink: R,
    display: D,
}

impl<R: RecordSink, D: DisplaySink> SessionCapture<R, D> {
    pub fn new(sink: R, display: D) -> Self {
        Self { phase: Phase::NotStarted, history: Vec::new(), last_speed_mph: None, sink, display }
    }

    pub fn phase(&self) -> Phase { self.phase }

    pub fn history(&self) -> &[TelemetryRecord] { &self.history }

    pub fn sink(&self) -> &R { &self.sink }

    pub fn display(&self) -> &D { &self.display }

    pub fn feed(&mut self, record: TelemetryRecord) -> Result<Phase, SessionError> {
        match (self.phase, record.race_active()) {
            (Phase::Ended, _) => {}
            (Phase::NotStarted, false) => {}
            (Phase::NotStarted, true) => {
                self.sink.begin()?;
                self.phase = Phase::Racing;
                info!(timestamp_ms = record.frame.timestamp_ms, "race started");
                self.accept(record)?;
            }
            (Phase::Racing, true) => self.accept(record)?,
            (Phase::Racing, false) => {
                self.phase = Phase::Ended;
                info!(ticks = self.history.len(), "race finished");
                self.wind_down()?;
            }
        }
        Ok(self.phase)
    }

    /// Stops a session that never saw its race end, e.g. on shutdown.
    /// Flushes and closes the sink if anything was written; the phase is left
    /// as it was.
    pub fn interrupt(&mut self) -> Result<(), SessionError> {
        if self.phase == Phase::Racing {
            debug!(ticks = self.history.len(), "closing interrupted session");
            self.wind_down()?;
        }
        Ok(())
    }

    pub fn into_history(self) -> Vec<TelemetryRecord> { self.history }

    pub fn into_parts(self) -> (Vec<TelemetryRecord>, R, D) {
        (self.history, self.sink, self.display)
    }

    fn accept(&mut self, record: TelemetryRecord) -> Result<(), SessionError> {
        let metrics = record.metrics();
        self.sink.append(&record, &metrics)?;
        self.sink.flush()?;
        self.display.show(&Snapshot::new(&record, &metrics));
        self.last_speed_mph = Some(metrics.speed_mph);
        self.history.push(record);
        Ok(())
    }

    fn wind_down(&mut self) -> Result<(), SessionError> {
        self.display.finish(&FinalSummary {
            last_speed_mph: self.last_speed_mph,
            ticks: self.history.len(),
        });
        self.sink.close()?;
        Ok(())
    }
}
