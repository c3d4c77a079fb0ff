use anyhow::{anyhow, Result};
use csv::WriterBuilder;
use serde::{Serialize, Deserialize};
use std::{fs::File, path::{Path, PathBuf}};
use time::OffsetDateTime;
use tracing::debug;

use forza_ingest_core::{RecordSink, SinkError};
use model::*;

mod display;

pub use display::*;

/// Column order of every session file. Matches the field order of [`CsvRow`].
pub const CSV_COLUMNS: [&str; 17] = [
    "captured_at", "is_race_on", "timestamp_ms",
    "speed_mps", "speed_kph", "speed_mph", "percent_max_rpm",
    "gear", "engine_rpm", "engine_max_rpm", "engine_idle_rpm",
    "accel_x", "accel_y", "accel_z",
    "vel_x", "vel_y", "vel_z",
];

/// One session file. The file is created, and its header written, only when
/// the race starts; every row is flushed as soon as it is written.
pub struct CsvRecordSink {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    closed: bool,
    rows: u64,
}

impl CsvRecordSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), writer: None, closed: false, rows: 0 }
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn rows_written(&self) -> u64 { self.rows }

    fn writer(&mut self) -> Result<&mut csv::Writer<File>, SinkError> {
        match self.writer.as_mut() {
            Some(w) => Ok(w),
            None if self.closed => Err(anyhow!("{} is already closed", self.path.display()).into()),
            None => Err(anyhow!("{} written before the header", self.path.display()).into()),
        }
    }
}

fn csv_err(err: csv::Error) -> SinkError {
    SinkError::Io(err.into())
}

impl RecordSink for CsvRecordSink {
    fn begin(&mut self) -> Result<(), SinkError> {
        if self.writer.is_some() {
            return Ok(());
        }
        let file = File::create(&self.path)
            .map_err(|source| SinkError::Open { path: self.path.clone(), source })?;
        let mut w = WriterBuilder::new().has_headers(false).from_writer(file);
        w.write_record(CSV_COLUMNS).map_err(csv_err)?;
        w.flush()?;
        debug!(path = %self.path.display(), "session file created");
        self.writer = Some(w);
        self.closed = false;
        Ok(())
    }

    fn append(&mut self, record: &TelemetryRecord, metrics: &DerivedMetrics) -> Result<(), SinkError> {
        let row = CsvRow::new(record, metrics);
        self.writer()?.serialize(row).map_err(csv_err)?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer()?.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut w) = self.writer.take() {
            w.flush()?;
            debug!(path = %self.path.display(), rows = self.rows, "session file closed");
        }
        self.closed = true;
        Ok(())
    }
}

/// Re-reads a session file by column name.
pub fn read_session_csv(path: &Path) -> Result<Vec<(TelemetryRecord, DerivedMetrics)>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.deserialize() {
        let r: CsvRow = rec?;
        out.push(r.into_parts());
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CsvRow {
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    pub is_race_on: bool,
    pub timestamp_ms: u32,
    pub speed_mps: f64,
    pub speed_kph: f64,
    pub speed_mph: f64,
    pub percent_max_rpm: f64,
    pub gear: u8,
    pub engine_rpm: f32,
    pub engine_max_rpm: f32,
    pub engine_idle_rpm: f32,
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub vel_z: f32,
}

impl CsvRow {
    pub fn new(record: &TelemetryRecord, m: &DerivedMetrics) -> Self {
        let f = &record.frame;
        Self {
            captured_at: record.captured_at,
            is_race_on: f.race_active,
            timestamp_ms: f.timestamp_ms,
            speed_mps: m.speed_mps,
            speed_kph: m.speed_kph,
            speed_mph: m.speed_mph,
            percent_max_rpm: m.percent_max_rpm,
            gear: f.gear,
            engine_rpm: f.current_engine_rpm,
            engine_max_rpm: f.engine_max_rpm,
            engine_idle_rpm: f.engine_idle_rpm,
            accel_x: f.accel.x, accel_y: f.accel.y, accel_z: f.accel.z,
            vel_x: f.vel.x, vel_y: f.vel.y, vel_z: f.vel.z,
        }
    }

    pub fn into_parts(self) -> (TelemetryRecord, DerivedMetrics) {
        let frame = DashFrame {
            race_active: self.is_race_on,
            timestamp_ms: self.timestamp_ms,
            engine_max_rpm: self.engine_max_rpm,
            engine_idle_rpm: self.engine_idle_rpm,
            current_engine_rpm: self.engine_rpm,
            accel: Vec3::new(self.accel_x, self.accel_y, self.accel_z),
            vel: Vec3::new(self.vel_x, self.vel_y, self.vel_z),
            gear: self.gear,
        };
        let metrics = DerivedMetrics {
            speed_mps: self.speed_mps,
            speed_kph: self.speed_kph,
            speed_mph: self.speed_mph,
            percent_max_rpm: self.percent_max_rpm,
        };
        (TelemetryRecord::new(frame, self.captured_at), metrics)
    }
}
