//! Telemetry records and the quantities derived from them.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const MPS_TO_KPH: f64 = 3.6;
pub const MPS_TO_MPH: f64 = 2.23694;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length, computed in f64.
    pub fn norm(&self) -> f64 {
        let (x, y, z) = (self.x as f64, self.y as f64, self.z as f64);
        (x * x + y * y + z * z).sqrt()
    }
}

/// One decoded Dash datagram. Carries no wall-clock time, so decoding the
/// same bytes always yields the same frame.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct DashFrame {
    pub race_active: bool,
    pub timestamp_ms: u32,
    pub engine_max_rpm: f32,
    pub engine_idle_rpm: f32,
    pub current_engine_rpm: f32,
    /// m/s²
    pub accel: Vec3,
    /// m/s
    pub vel: Vec3,
    /// Raw simulator gear byte.
    pub gear: u8,
}

/// A frame stamped with the moment it was received.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TelemetryRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    pub frame: DashFrame,
}

impl TelemetryRecord {
    pub fn new(frame: DashFrame, captured_at: OffsetDateTime) -> Self {
        Self { captured_at, frame }
    }

    pub fn now(frame: DashFrame) -> Self {
        Self::new(frame, OffsetDateTime::now_utc())
    }

    pub fn race_active(&self) -> bool {
        self.frame.race_active
    }

    pub fn metrics(&self) -> DerivedMetrics {
        derive(&self.frame)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct DerivedMetrics {
    pub speed_mps: f64,
    pub speed_kph: f64,
    pub speed_mph: f64,
    /// NaN when the frame reports a max RPM of zero or either RPM is not finite.
    pub percent_max_rpm: f64,
}

pub fn derive(frame: &DashFrame) -> DerivedMetrics {
    let speed_mps = frame.vel.norm();
    DerivedMetrics {
        speed_mps,
        speed_kph: speed_mps * MPS_TO_KPH,
        speed_mph: speed_mps * MPS_TO_MPH,
        percent_max_rpm: percent_of(frame.current_engine_rpm, frame.engine_max_rpm),
    }
}

fn percent_of(rpm: f32, max_rpm: f32) -> f64 {
    if max_rpm == 0.0 || !rpm.is_finite() || !max_rpm.is_finite() {
        return f64::NAN;
    }
    rpm as f64 / max_rpm as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame_with(vel: Vec3, rpm: f32, max_rpm: f32) -> DashFrame {
        DashFrame {
            race_active: true,
            current_engine_rpm: rpm,
            engine_max_rpm: max_rpm,
            vel,
            gear: 3,
            ..DashFrame::default()
        }
    }

    #[test]
    fn test_derive_straight_line() {
        let m = derive(&frame_with(Vec3::new(10.0, 0.0, 0.0), 4000.0, 8000.0));
        assert!((m.speed_mps - 10.0).abs() < 1e-9);
        assert!((m.speed_kph - 36.0).abs() < 1e-9);
        assert!((m.speed_mph - 22.3694).abs() < 1e-9);
        assert!((m.percent_max_rpm - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_derive_zero_max_rpm_is_nan() {
        let m = derive(&frame_with(Vec3::new(1.0, 2.0, 2.0), 4000.0, 0.0));
        assert!(m.percent_max_rpm.is_nan());
        assert!((m.speed_mps - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_derive_non_finite_rpm_is_nan() {
        for (rpm, max) in [
            (f32::INFINITY, 8000.0),
            (f32::NEG_INFINITY, 8000.0),
            (4000.0, f32::INFINITY),
            (f32::NAN, 8000.0),
        ] {
            let m = derive(&frame_with(Vec3::default(), rpm, max));
            assert!(m.percent_max_rpm.is_nan(), "rpm={rpm} max={max}");
        }
    }

    #[test]
    fn test_derive_negative_components() {
        let m = derive(&frame_with(Vec3::new(-3.0, 0.0, -4.0), 0.0, 7000.0));
        assert!((m.speed_mps - 5.0).abs() < 1e-9);
        assert_eq!(m.percent_max_rpm, 0.0);
    }

    #[test]
    fn test_record_json_uses_rfc3339() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let rec = TelemetryRecord::new(frame_with(Vec3::default(), 0.0, 1.0), at);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["captured_at"], "2023-11-14T22:13:20Z");
        let back: TelemetryRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    proptest! {
        #[test]
        fn prop_speed_is_norm(
            x in -500.0f32..500.0,
            y in -500.0f32..500.0,
            z in -500.0f32..500.0,
        ) {
            let m = derive(&frame_with(Vec3::new(x, y, z), 0.0, 1.0));
            let expected = ((x as f64).powi(2) + (y as f64).powi(2) + (z as f64).powi(2)).sqrt();
            prop_assert!(m.speed_mps >= 0.0);
            prop_assert!((m.speed_mps - expected).abs() <= expected * 1e-6 + 1e-12);
        }

        #[test]
        fn prop_zero_max_rpm_never_faults(rpm in any::<f32>()) {
            let m = derive(&frame_with(Vec3::default(), rpm, 0.0));
            prop_assert!(m.percent_max_rpm.is_nan());
        }

        #[test]
        fn prop_percent_is_finite_or_nan(rpm in any::<f32>(), max in any::<f32>()) {
            let p = derive(&frame_with(Vec3::default(), rpm, max)).percent_max_rpm;
            prop_assert!(p.is_nan() || p.is_finite());
        }
    }
}
