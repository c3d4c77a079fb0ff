use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};

use model::{DashFrame, Vec3};

/// Shortest datagram the decoder accepts; the gear byte sits at the very end.
pub const DASH_MIN_LEN: usize = 320;

// Little-endian layout of the Dash datagram:
// 0x00 is_race_on (i32, non-zero = true)
// 0x04 timestamp_ms (u32)
// 0x08 engine_max_rpm, 0x0C engine_idle_rpm, 0x10 current_engine_rpm (f32)
// 0x14 accel x/y/z (f32)
// 0x20 velocity x/y/z (f32)
// 0x2C..0x13E reserved
// 0x13F gear (u8)
const HEADER_LEN: usize = 44;
const OFF_GEAR: usize = 319;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("dash packet too short: expected at least {DASH_MIN_LEN} bytes, got {len}")]
    TooShort { len: usize },
}

/// Decodes one Dash datagram. Anything of at least [`DASH_MIN_LEN`] bytes is
/// read best-effort; the protocol has no checksum to validate against.
pub fn decode(pkt: &[u8]) -> Result<DashFrame, DecodeError> {
    if pkt.len() < DASH_MIN_LEN {
        return Err(DecodeError::TooShort { len: pkt.len() });
    }
    let gear = pkt[OFF_GEAR];
    read_header(Cursor::new(&pkt[..HEADER_LEN]), gear)
        .map_err(|_| DecodeError::TooShort { len: pkt.len() })
}

fn read_header(mut c: Cursor<&[u8]>, gear: u8) -> io::Result<DashFrame> {
    let is_race_on = c.read_i32::<LittleEndian>()?;
    let timestamp_ms = c.read_u32::<LittleEndian>()?;
    let engine_max_rpm = c.read_f32::<LittleEndian>()?;
    let engine_idle_rpm = c.read_f32::<LittleEndian>()?;
    let current_engine_rpm = c.read_f32::<LittleEndian>()?;
    let accel = read_vec3(&mut c)?;
    let vel = read_vec3(&mut c)?;
    Ok(DashFrame {
        race_active: is_race_on != 0,
        timestamp_ms,
        engine_max_rpm,
        engine_idle_rpm,
        current_engine_rpm,
        accel,
        vel,
        gear,
    })
}

fn read_vec3(c: &mut Cursor<&[u8]>) -> io::Result<Vec3> {
    let x = c.read_f32::<LittleEndian>()?;
    let y = c.read_f32::<LittleEndian>()?;
    let z = c.read_f32::<LittleEndian>()?;
    Ok(Vec3 { x, y, z })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use model::derive;
    use proptest::prelude::*;

    /// Builds a Dash datagram with the given fields and zeroed reserved bytes.
    pub(crate) fn dash_packet(
        race_on: i32,
        vel: (f32, f32, f32),
        gear: u8,
        rpm: f32,
        max_rpm: f32,
    ) -> Vec<u8> {
        let mut data = vec![0u8; DASH_MIN_LEN];
        data[0..4].copy_from_slice(&race_on.to_le_bytes());
        data[4..8].copy_from_slice(&1234u32.to_le_bytes());
        data[8..12].copy_from_slice(&max_rpm.to_le_bytes());
        data[12..16].copy_from_slice(&800.0f32.to_le_bytes());
        data[16..20].copy_from_slice(&rpm.to_le_bytes());
        data[20..24].copy_from_slice(&0.5f32.to_le_bytes());
        data[24..28].copy_from_slice(&(-9.8f32).to_le_bytes());
        data[28..32].copy_from_slice(&1.5f32.to_le_bytes());
        data[32..36].copy_from_slice(&vel.0.to_le_bytes());
        data[36..40].copy_from_slice(&vel.1.to_le_bytes());
        data[40..44].copy_from_slice(&vel.2.to_le_bytes());
        data[OFF_GEAR] = gear;
        data
    }

    #[test]
    fn test_decode_reads_every_field() {
        let frame = decode(&dash_packet(1, (10.0, 0.0, 0.0), 3, 4000.0, 8000.0)).unwrap();
        assert!(frame.race_active);
        assert_eq!(frame.timestamp_ms, 1234);
        assert_eq!(frame.engine_max_rpm, 8000.0);
        assert_eq!(frame.engine_idle_rpm, 800.0);
        assert_eq!(frame.current_engine_rpm, 4000.0);
        assert_eq!(frame.accel, Vec3::new(0.5, -9.8, 1.5));
        assert_eq!(frame.vel, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(frame.gear, 3);
    }

    #[test]
    fn test_decode_then_derive_scenario() {
        let frame = decode(&dash_packet(1, (10.0, 0.0, 0.0), 3, 4000.0, 8000.0)).unwrap();
        let m = derive(&frame);
        assert!((m.speed_mps - 10.0).abs() < 1e-9);
        assert!((m.speed_kph - 36.0).abs() < 1e-9);
        assert!((m.speed_mph - 22.3694).abs() < 1e-6);
        assert!((m.percent_max_rpm - 50.0).abs() < 1e-9);
        assert_eq!(frame.gear, 3);
    }

    #[test]
    fn test_decode_any_nonzero_flag_is_active() {
        assert!(decode(&dash_packet(-7, (0.0, 0.0, 0.0), 0, 0.0, 0.0)).unwrap().race_active);
        assert!(!decode(&dash_packet(0, (0.0, 0.0, 0.0), 0, 0.0, 0.0)).unwrap().race_active);
    }

    #[test]
    fn test_decode_ignores_reserved_and_trailing_bytes() {
        let mut a = dash_packet(1, (1.0, 2.0, 3.0), 5, 1.0, 2.0);
        let b = a.clone();
        for byte in &mut a[HEADER_LEN..OFF_GEAR] {
            *byte = 0xAB;
        }
        a.extend_from_slice(&[0xFF; 11]);
        assert_eq!(decode(&a).unwrap(), decode(&b).unwrap());
    }

    #[test]
    fn test_decode_short_packet() {
        assert_eq!(decode(&[]), Err(DecodeError::TooShort { len: 0 }));
        let pkt = dash_packet(1, (1.0, 0.0, 0.0), 1, 1.0, 1.0);
        assert_eq!(decode(&pkt[..319]), Err(DecodeError::TooShort { len: 319 }));
    }

    fn same_bits(a: &DashFrame, b: &DashFrame) -> bool {
        let bits = |f: &DashFrame| {
            [
                f.engine_max_rpm, f.engine_idle_rpm, f.current_engine_rpm,
                f.accel.x, f.accel.y, f.accel.z, f.vel.x, f.vel.y, f.vel.z,
            ]
            .map(f32::to_bits)
        };
        a.race_active == b.race_active
            && a.timestamp_ms == b.timestamp_ms
            && a.gear == b.gear
            && bits(a) == bits(b)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn prop_short_input_is_too_short(data in proptest::collection::vec(any::<u8>(), 0..DASH_MIN_LEN)) {
            prop_assert_eq!(decode(&data), Err(DecodeError::TooShort { len: data.len() }));
        }

        #[test]
        fn prop_long_input_is_deterministic(
            data in proptest::collection::vec(any::<u8>(), DASH_MIN_LEN..1024),
        ) {
            let a = decode(&data);
            let b = decode(&data);
            prop_assert!(a.is_ok());
            prop_assert!(same_bits(&a.unwrap(), &b.unwrap()));
        }
    }
}
