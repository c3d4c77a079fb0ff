use model::*;
use serde::{Deserialize, Serialize};

/// Statistics over one recorded session.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SessionSummary {
    pub ticks: usize,
    pub first_timestamp_ms: Option<u32>,
    pub last_timestamp_ms: Option<u32>,
    /// Simulator time between first and last tick.
    pub duration_ms: u64,
    pub top_speed_mph: f64,
    pub avg_speed_mph: f64,
    pub speed_stddev_mph: f64,
    pub last_speed_mph: Option<f64>,
    pub max_rpm_seen: f32,
}

pub fn summarize(history: &[TelemetryRecord]) -> SessionSummary {
    let speeds: Vec<f64> = history.iter().map(|r| r.metrics().speed_mph).collect();
    let first = history.first().map(|r| r.frame.timestamp_ms);
    let last = history.last().map(|r| r.frame.timestamp_ms);
    // simulator clock is u32 ms and may wrap during very long sessions
    let duration_ms = match (first, last) {
        (Some(a), Some(b)) => b.wrapping_sub(a) as u64,
        _ => 0,
    };
    let max_rpm_seen = history
        .iter()
        .map(|r| r.frame.current_engine_rpm)
        .filter(|v| v.is_finite())
        .fold(0.0_f32, f32::max);

    SessionSummary {
        ticks: history.len(),
        first_timestamp_ms: first,
        last_timestamp_ms: last,
        duration_ms,
        top_speed_mph: speeds.iter().copied().fold(0.0_f64, f64::max),
        avg_speed_mph: mean(&speeds),
        speed_stddev_mph: stddev(&speeds),
        last_speed_mph: speeds.last().copied(),
        max_rpm_seen,
    }
}

fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / (v.len() as f64)
}

fn stddev(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let m = mean(v);
    let var = v.iter().map(|x| {
        let d = *x - m;
        d * d
    }).sum::<f64>() / (v.len() as f64);
    var.sqrt()
}
